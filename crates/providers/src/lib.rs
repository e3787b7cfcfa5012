pub mod anthropic;
pub mod factory;
pub mod openai;

use async_trait::async_trait;
use browsepilot_core::types::{ChatMessage, LLMResponse};
use browsepilot_core::Result;
use serde_json::Value;

/// The oracle abstraction: a conversation plus tool schemas in, optional
/// text plus tool calls out. Everything provider-specific stays behind this
/// trait.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<LLMResponse>;
}

pub use anthropic::AnthropicProvider;
pub use factory::create_provider;
pub use openai::OpenAIProvider;

/// Map a non-success HTTP status from any provider into the error taxonomy
/// the loop recovers on: 429 backs off, context overflows trigger a trim,
/// anything else is a plain provider failure.
pub(crate) fn classify_api_error(status: u16, body: &str) -> browsepilot_core::Error {
    use browsepilot_core::Error;
    if status == 429 {
        return Error::RateLimited(format!("API error {}: {}", status, body));
    }
    let lower = body.to_lowercase();
    if lower.contains("context_length") || lower.contains("context length") || lower.contains("too many tokens") || lower.contains("prompt is too long") {
        return Error::ContextTooLarge(format!("API error {}: {}", status, body));
    }
    Error::Provider(format!("API error {}: {}", status, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use browsepilot_core::Error;

    #[test]
    fn test_classify_rate_limit() {
        assert!(matches!(classify_api_error(429, "slow down"), Error::RateLimited(_)));
    }

    #[test]
    fn test_classify_context_overflow() {
        let err = classify_api_error(400, "maximum context length exceeded");
        assert!(matches!(err, Error::ContextTooLarge(_)));
    }

    #[test]
    fn test_classify_plain_failure() {
        assert!(matches!(classify_api_error(500, "oops"), Error::Provider(_)));
    }
}
