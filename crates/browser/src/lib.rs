pub mod executor;
pub mod relay;

use async_trait::async_trait;
use browsepilot_core::{BrowserAction, PageContext, Result};

pub use executor::RelayExecutor;
pub use relay::{Command, RelayChannel};

/// Capability port to whatever drives the actual browser. The orchestration
/// loop depends only on this trait; bindings are the long-poll relay to the
/// extension (`RelayExecutor`) or a direct local driver supplied by the
/// embedding process.
#[async_trait]
pub trait BrowserExecutor: Send + Sync {
    /// Perform one action, returning the executor's result text. Fails when
    /// the target element cannot be located or the surface rejects the
    /// action type.
    async fn execute_action(&self, action: &BrowserAction) -> Result<String>;

    /// Snapshot the current page. Never fails: on any transport or scrape
    /// problem the binding returns a minimal context so the loop can keep
    /// going.
    async fn extract_page_context(&self) -> PageContext;

    /// Whether the execution surface is reachable at all. The loop refuses
    /// to start a run against a disconnected surface.
    fn is_connected(&self) -> bool;
}
