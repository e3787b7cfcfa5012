use async_trait::async_trait;
use browsepilot_core::types::{ChatMessage, LLMResponse, ToolCallRequest};
use browsepilot_core::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::{classify_api_error, Provider};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicProvider {
    pub fn new(
        api_key: &str,
        api_base: Option<&str>,
        model: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key: api_key.to_string(),
            api_base: api_base
                .unwrap_or(ANTHROPIC_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            max_tokens,
            temperature,
        }
    }

    /// Convert OpenAI-style tool schemas to Anthropic tool format.
    /// OpenAI: { type: "function", function: { name, description, parameters } }
    /// Anthropic: { name, description, input_schema }
    fn convert_tools(tools: &[Value]) -> Vec<Value> {
        tools
            .iter()
            .filter_map(|tool| {
                let func = tool.get("function")?;
                let name = func.get("name")?.as_str()?;
                let description = func.get("description").and_then(|v| v.as_str()).unwrap_or("");
                let parameters = func.get("parameters").cloned().unwrap_or(serde_json::json!({
                    "type": "object",
                    "properties": {}
                }));

                Some(serde_json::json!({
                    "name": name,
                    "description": description,
                    "input_schema": parameters,
                }))
            })
            .collect()
    }

    /// Convert the conversation to Anthropic format. Anthropic takes the
    /// system text as a top-level parameter; assistant tool calls become
    /// `tool_use` content blocks and tool results become `tool_result`
    /// blocks inside a `user` message.
    fn convert_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
        let mut system_text: Option<String> = None;
        let mut anthropic_messages: Vec<Value> = Vec::new();

        for msg in messages {
            match msg.role.as_str() {
                "system" => {
                    let text = msg.content.clone().unwrap_or_default();
                    system_text = Some(match system_text {
                        Some(existing) => format!("{}\n\n{}", existing, text),
                        None => text,
                    });
                }
                "assistant" => {
                    if let Some(calls) = msg.tool_calls.as_ref().filter(|c| !c.is_empty()) {
                        let mut blocks: Vec<Value> = Vec::new();
                        if let Some(text) = msg.content.as_ref().filter(|t| !t.is_empty()) {
                            blocks.push(serde_json::json!({"type": "text", "text": text}));
                        }
                        for call in calls {
                            blocks.push(serde_json::json!({
                                "type": "tool_use",
                                "id": call.id,
                                "name": call.name,
                                "input": call.arguments,
                            }));
                        }
                        anthropic_messages
                            .push(serde_json::json!({"role": "assistant", "content": blocks}));
                    } else {
                        anthropic_messages.push(serde_json::json!({
                            "role": "assistant",
                            "content": msg.content.clone().unwrap_or_default(),
                        }));
                    }
                }
                "tool" => {
                    anthropic_messages.push(serde_json::json!({
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                            "content": msg.content.clone().unwrap_or_default(),
                        }]
                    }));
                }
                _ => {
                    anthropic_messages.push(serde_json::json!({
                        "role": "user",
                        "content": msg.content.clone().unwrap_or_default(),
                    }));
                }
            }
        }

        (system_text, anthropic_messages)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<LLMResponse> {
        let url = format!("{}/messages", self.api_base);

        let (system, anthropic_messages) = Self::convert_messages(messages);
        let anthropic_tools = Self::convert_tools(tools);

        let mut request = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": anthropic_messages,
        });

        if let Some(sys) = &system {
            request["system"] = Value::String(sys.clone());
        }

        if !anthropic_tools.is_empty() {
            request["tools"] = Value::Array(anthropic_tools);
        }

        info!(
            url = %url,
            model = %self.model,
            tools_count = tools.len(),
            messages_count = messages.len(),
            "Calling Anthropic API"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Anthropic request failed: {}", e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(status = %status, body = %raw_body, "Anthropic API error");
            return Err(classify_api_error(status.as_u16(), &raw_body));
        }

        debug!(body_len = raw_body.len(), "Anthropic raw response");

        let resp: AnthropicResponse = serde_json::from_str(&raw_body).map_err(|e| {
            Error::Provider(format!(
                "Failed to parse Anthropic response: {}. Body: {}",
                e,
                &raw_body[..raw_body.len().min(500)]
            ))
        })?;

        let mut text_parts: Vec<String> = Vec::new();
        let mut tool_calls: Vec<ToolCallRequest> = Vec::new();

        for block in &resp.content {
            match block.block_type.as_str() {
                "text" => {
                    if let Some(text) = &block.text {
                        if !text.is_empty() {
                            text_parts.push(text.clone());
                        }
                    }
                }
                "tool_use" => {
                    if let (Some(id), Some(name)) = (&block.id, &block.name) {
                        let arguments =
                            block.input.clone().unwrap_or(Value::Object(serde_json::Map::new()));
                        tool_calls.push(ToolCallRequest {
                            id: id.clone(),
                            name: name.clone(),
                            arguments,
                        });
                    }
                }
                _ => {}
            }
        }

        let content = if text_parts.is_empty() {
            None
        } else {
            Some(text_parts.join("\n"))
        };

        let finish_reason = match resp.stop_reason.as_deref() {
            Some("end_turn") => "stop".to_string(),
            Some("tool_use") => "tool_calls".to_string(),
            Some("max_tokens") => "length".to_string(),
            Some(other) => other.to_string(),
            None => "stop".to_string(),
        };

        Ok(LLMResponse {
            content,
            tool_calls,
            finish_reason,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
    id: Option<String>,
    name: Option<String>,
    input: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_tools() {
        let tools = vec![serde_json::json!({
            "type": "function",
            "function": {
                "name": "navigate",
                "description": "Go to a URL",
                "parameters": {"type": "object", "properties": {"url": {"type": "string"}}, "required": ["url"]}
            }
        })];
        let converted = AnthropicProvider::convert_tools(&tools);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0]["name"], "navigate");
        assert!(converted[0]["input_schema"]["properties"]["url"].is_object());
    }

    #[test]
    fn test_convert_messages_tool_pairing() {
        let messages = vec![
            ChatMessage::system("prompt"),
            ChatMessage::user("do it"),
            ChatMessage::assistant_with_tools(
                None,
                vec![ToolCallRequest {
                    id: "tc_1".to_string(),
                    name: "click".to_string(),
                    arguments: serde_json::json!({"selector": "#go"}),
                }],
            ),
            ChatMessage::tool_result("tc_1", "OK"),
        ];
        let (system, converted) = AnthropicProvider::convert_messages(&messages);
        assert_eq!(system.as_deref(), Some("prompt"));
        assert_eq!(converted.len(), 3);
        assert_eq!(converted[1]["content"][0]["type"], "tool_use");
        assert_eq!(converted[2]["content"][0]["tool_use_id"], "tc_1");
    }
}
