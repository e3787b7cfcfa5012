use serde::{Deserialize, Serialize};
use tracing::warn;

/// A tool call requested by the oracle. Serializes to the OpenAI-compatible
/// wire format `{id, type: "function", function: {name, arguments}}` where
/// `arguments` is a JSON-encoded string.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl Serialize for ToolCallRequest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("type", "function")?;
        map.serialize_entry(
            "function",
            &serde_json::json!({
                "name": self.name,
                "arguments": self.arguments.to_string()
            }),
        )?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for ToolCallRequest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let obj = value
            .as_object()
            .ok_or_else(|| serde::de::Error::custom("expected object"))?;

        let id = obj
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        // Nested format: {id, type, function: {name, arguments}}
        if let Some(func) = obj.get("function").and_then(|v| v.as_object()) {
            let name = func
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let arguments = match func.get("arguments") {
                Some(serde_json::Value::String(s)) => serde_json::from_str(s).unwrap_or_else(|e| {
                    warn!(error = %e, raw = %s, "Failed to parse tool call arguments as JSON, using empty object");
                    serde_json::Value::Object(serde_json::Map::new())
                }),
                Some(v) => v.clone(),
                None => serde_json::Value::Object(serde_json::Map::new()),
            };
            return Ok(ToolCallRequest { id, name, arguments });
        }

        // Flat format: {id, name, arguments}
        let name = obj
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let arguments = obj
            .get("arguments")
            .cloned()
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        Ok(ToolCallRequest { id, name, arguments })
    }
}

/// One oracle turn: optional free text plus zero or more tool calls.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LLMResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub finish_reason: String,
}

/// A role-tagged message in the conversation sent to the oracle.
///
/// Invariant maintained by `ConversationHistory`: every `tool` message is
/// preceded by an `assistant` message whose `tool_calls` contain the matching
/// `tool_call_id`, and trimming never splits such a pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_with_tools(content: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: &str, content: &str) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.to_string()),
        }
    }

    /// True for assistant messages that carry tool calls. A trimmed history
    /// must never start with one of these: the paired tool results would be
    /// orphaned.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().map(|c| !c.is_empty()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_roundtrip() {
        let call = ToolCallRequest {
            id: "call_1".to_string(),
            name: "navigate".to_string(),
            arguments: serde_json::json!({"url": "https://example.com"}),
        };
        let wire = serde_json::to_value(&call).unwrap();
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "navigate");

        let back: ToolCallRequest = serde_json::from_value(wire).unwrap();
        assert_eq!(back.id, "call_1");
        assert_eq!(back.arguments["url"], "https://example.com");
    }

    #[test]
    fn test_tool_call_flat_format() {
        let flat = serde_json::json!({
            "id": "call_2",
            "name": "click",
            "arguments": {"selector": "#btn"}
        });
        let call: ToolCallRequest = serde_json::from_value(flat).unwrap();
        assert_eq!(call.name, "click");
        assert_eq!(call.arguments["selector"], "#btn");
    }

    #[test]
    fn test_tool_call_malformed_arguments() {
        let wire = serde_json::json!({
            "id": "call_3",
            "function": {"name": "wait", "arguments": "{not json"}
        });
        let call: ToolCallRequest = serde_json::from_value(wire).unwrap();
        assert_eq!(call.name, "wait");
        assert!(call.arguments.as_object().unwrap().is_empty());
    }
}
