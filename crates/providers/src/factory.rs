use browsepilot_core::config::AgentConfig;
use browsepilot_core::{Error, Result};

use crate::{AnthropicProvider, OpenAIProvider, Provider};

/// Base URLs for the OpenAI-compatible providers selected by model prefix.
fn openai_compatible_base(prefix: &str) -> &'static str {
    match prefix {
        "gemini" => "https://generativelanguage.googleapis.com/v1beta/openai",
        "groq" => "https://api.groq.com/openai/v1",
        "zhipu" => "https://open.bigmodel.cn/api/paas/v4",
        _ => "https://openrouter.ai/api/v1",
    }
}

/// Create a provider from the configured model string. A `claude/` prefix
/// selects the native Anthropic client; `gemini/`, `groq/` and `zhipu/`
/// select their OpenAI-compatible endpoints; anything else goes through
/// OpenRouter with the model id passed verbatim. Prefixes are stripped
/// before the API call.
pub fn create_provider(config: &AgentConfig) -> Result<Box<dyn Provider>> {
    if config.api_key.is_empty() {
        return Err(Error::Config(
            "No API key configured. Set BROWSEPILOT_API_KEY or run `browsepilot onboard`.".to_string(),
        ));
    }

    let model = config.model.as_str();

    if let Some(model) = model.strip_prefix("claude/") {
        return Ok(Box::new(AnthropicProvider::new(
            &config.api_key,
            None,
            model,
            config.max_tokens,
            config.temperature,
        )));
    }
    // Bare anthropic/ prefixes are routed natively as well.
    if let Some(model) = model.strip_prefix("anthropic/") {
        return Ok(Box::new(AnthropicProvider::new(
            &config.api_key,
            None,
            model,
            config.max_tokens,
            config.temperature,
        )));
    }

    for prefix in ["gemini", "groq", "zhipu"] {
        if let Some(stripped) = model.strip_prefix(&format!("{}/", prefix)) {
            return Ok(Box::new(OpenAIProvider::new(
                &config.api_key,
                Some(openai_compatible_base(prefix)),
                stripped,
                config.max_tokens,
                config.temperature,
            )));
        }
    }

    // OpenRouter keeps the full model id, e.g. "meta-llama/llama-3.3-70b-instruct".
    Ok(Box::new(OpenAIProvider::new(
        &config.api_key,
        Some(openai_compatible_base("openrouter")),
        model,
        config.max_tokens,
        config.temperature,
    )))
}
