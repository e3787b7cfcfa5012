pub mod context;
pub mod history;
pub mod runtime;
pub mod security;
pub mod service;
pub mod stagnation;
pub mod tools;

pub use context::ContextCompressor;
pub use history::ConversationHistory;
pub use runtime::{SecurityPrompt, TaskCallbacks, TaskRunner, UserPrompt};
pub use security::{RiskLevel, SecurityClassifier, SecurityVerdict};
pub use service::{AgentEvent, AgentService, AgentStatus};
pub use stagnation::{StagnationDetector, StagnationVerdict};
pub use tools::{tool_schemas, ToolInvocation};
