use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default)]
    pub api_key: String,
    /// Model string with an optional provider prefix, e.g.
    /// `claude/claude-sonnet-4-20250514`, `gemini/gemini-2.0-flash`,
    /// `groq/llama-3.3-70b-versatile`, or a bare OpenRouter model id.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Token budget for the rendered page context (chars ≈ tokens * 3).
    #[serde(default = "default_context_max_tokens")]
    pub context_max_tokens: usize,
    /// Non-system messages kept in the oracle window.
    #[serde(default = "default_history_max_messages")]
    pub history_max_messages: usize,
    #[serde(default = "default_llm_max_retries")]
    pub llm_max_retries: u32,
    #[serde(default = "default_llm_retry_delay_ms")]
    pub llm_retry_delay_ms: u64,
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    400
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_iterations() -> u32 {
    30
}

fn default_context_max_tokens() -> usize {
    8000
}

fn default_history_max_messages() -> usize {
    12
}

fn default_llm_max_retries() -> u32 {
    3
}

fn default_llm_retry_delay_ms() -> u64 {
    2000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_iterations: default_max_iterations(),
            context_max_tokens: default_context_max_tokens(),
            history_max_messages: default_history_max_messages(),
            llm_max_retries: default_llm_max_retries(),
            llm_retry_delay_ms: default_llm_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// How long an inbound extension poll is parked before an empty reply.
    #[serde(default = "default_poll_wait_ms")]
    pub poll_wait_ms: u64,
    /// Per-command timeout for relayed actions.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

fn default_poll_wait_ms() -> u64 {
    25_000
}

fn default_command_timeout_ms() -> u64 {
    30_000
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_wait_ms: default_poll_wait_ms(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

impl Config {
    /// Load from a json5 config file, then apply environment overrides.
    /// A missing file yields the defaults so `onboard` is optional for
    /// env-only setups.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            json5::from_str(&raw).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("BROWSEPILOT_API_KEY") {
            if !key.is_empty() {
                self.agent.api_key = key;
            }
        }
        if let Ok(model) = std::env::var("BROWSEPILOT_MODEL") {
            if !model.is_empty() {
                self.agent.model = model;
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
