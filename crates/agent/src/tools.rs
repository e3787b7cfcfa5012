use browsepilot_core::action::{BrowserAction, ScrollDirection};
use browsepilot_core::types::ToolCallRequest;
use browsepilot_core::{Error, Result};
use serde_json::{json, Value};

/// The fixed tool schema exposed to the oracle, in OpenAI function-call
/// format. Providers translate to their native shape as needed.
pub fn tool_schemas() -> Vec<Value> {
    vec![
        function(
            "navigate",
            "Navigate to a URL. The URL must start with http:// or https://.",
            json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "Destination URL"}
                },
                "required": ["url"]
            }),
        ),
        function(
            "click",
            "Click an element on the page. Use a selector from the listed interactive elements.",
            json!({
                "type": "object",
                "properties": {
                    "selector": {"type": "string", "description": "CSS selector of the element to click"},
                    "description": {"type": "string", "description": "What is being clicked, for the action log"}
                },
                "required": ["selector"]
            }),
        ),
        function(
            "click_text",
            "Click an element by its visible text. Use when the exact selector is unknown but the button label is.",
            json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "Visible text of the button or link"}
                },
                "required": ["text"]
            }),
        ),
        function(
            "type_text",
            "Type text into an input field. Clears the field first.",
            json!({
                "type": "object",
                "properties": {
                    "selector": {"type": "string", "description": "CSS selector of the input"},
                    "text": {"type": "string", "description": "Text to type"}
                },
                "required": ["selector", "text"]
            }),
        ),
        function(
            "scroll",
            "Scroll the page up or down to reveal more elements.",
            json!({
                "type": "object",
                "properties": {
                    "direction": {"type": "string", "enum": ["up", "down"]},
                    "amount": {"type": "number", "description": "Pixels to scroll (default 500)"}
                },
                "required": ["direction"]
            }),
        ),
        function(
            "press_key",
            "Press a keyboard key (Enter, Escape, Tab, ArrowDown, ...).",
            json!({
                "type": "object",
                "properties": {
                    "key": {"type": "string", "description": "Key name"}
                },
                "required": ["key"]
            }),
        ),
        function(
            "hover",
            "Hover the cursor over an element (for dropdown menus).",
            json!({
                "type": "object",
                "properties": {
                    "selector": {"type": "string", "description": "CSS selector of the element"}
                },
                "required": ["selector"]
            }),
        ),
        function(
            "wait",
            "Wait for dynamic content to load.",
            json!({
                "type": "object",
                "properties": {
                    "milliseconds": {"type": "number", "description": "Time to wait in milliseconds"}
                },
                "required": ["milliseconds"]
            }),
        ),
        function("go_back", "Go back to the previous page in the browser history.", empty_params()),
        function("refresh", "Reload the current page.", empty_params()),
        function(
            "select_option",
            "Pick an option in a <select> dropdown.",
            json!({
                "type": "object",
                "properties": {
                    "selector": {"type": "string", "description": "CSS selector of the select element"},
                    "value": {"type": "string", "description": "Option value to select"}
                },
                "required": ["selector", "value"]
            }),
        ),
        function(
            "ask_user",
            "ONLY for requesting PERSONAL data (address, phone, login, password) or clarifying an unclear task. NEVER ask how to find an element on the page - that is your job.",
            json!({
                "type": "object",
                "properties": {
                    "question": {"type": "string", "description": "Question for the user (personal data or task clarification only)"}
                },
                "required": ["question"]
            }),
        ),
        function(
            "confirm_action",
            "Ask the user to confirm an important action (deletion, payment, sending) before doing it. Shows Yes/No buttons.",
            json!({
                "type": "object",
                "properties": {
                    "question": {"type": "string", "description": "Confirmation question, e.g. \"Delete 3 spam emails?\""},
                    "action_description": {"type": "string", "description": "Short label for the confirm button"}
                },
                "required": ["question"]
            }),
        ),
        function(
            "extract_text",
            "Extract and return text from the page by selector, or the main visible text when no selector is given.",
            json!({
                "type": "object",
                "properties": {
                    "selector": {"type": "string", "description": "CSS selector to extract from; main content when omitted"},
                    "maxLength": {"type": "number", "description": "Maximum text length (default 2000)"}
                },
                "required": []
            }),
        ),
        function(
            "complete_task",
            "Finish the task and report the outcome. Put any extracted information the user asked for into summary, in full.",
            json!({
                "type": "object",
                "properties": {
                    "success": {"type": "boolean", "description": "Whether the task succeeded"},
                    "summary": {"type": "string", "description": "Complete answer for the user"}
                },
                "required": ["success", "summary"]
            }),
        ),
    ]
}

fn function(name: &str, description: &str, parameters: Value) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": parameters
        }
    })
}

fn empty_params() -> Value {
    json!({"type": "object", "properties": {}})
}

/// A decoded oracle tool call. Decoding happens once at the boundary so the
/// loop dispatches on variants, not raw strings.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    Navigate { url: String },
    Click { selector: String, description: Option<String> },
    ClickText { text: String },
    TypeText { selector: String, text: String },
    Scroll { direction: ScrollDirection, amount: u32 },
    PressKey { key: String },
    Hover { selector: String },
    Wait { milliseconds: u64 },
    GoBack,
    Refresh,
    SelectOption { selector: String, value: String },
    AskUser { question: String },
    ConfirmAction { question: String, action_description: Option<String> },
    ExtractText { selector: Option<String>, max_length: usize },
    CompleteTask { success: bool, summary: String },
}

impl ToolInvocation {
    pub fn decode(call: &ToolCallRequest) -> Result<Self> {
        let args = &call.arguments;
        let invocation = match call.name.as_str() {
            "navigate" => ToolInvocation::Navigate {
                url: required_str(args, "url", &call.name)?,
            },
            "click" => ToolInvocation::Click {
                selector: required_str(args, "selector", &call.name)?,
                description: optional_str(args, "description"),
            },
            "click_text" => ToolInvocation::ClickText {
                text: required_str(args, "text", &call.name)?,
            },
            "type_text" => ToolInvocation::TypeText {
                selector: required_str(args, "selector", &call.name)?,
                text: required_str(args, "text", &call.name)?,
            },
            "scroll" => {
                let direction = match required_str(args, "direction", &call.name)?.as_str() {
                    "up" => ScrollDirection::Up,
                    "down" => ScrollDirection::Down,
                    other => {
                        return Err(Error::Validation(format!(
                            "scroll: unknown direction \"{}\"",
                            other
                        )))
                    }
                };
                ToolInvocation::Scroll {
                    direction,
                    amount: args.get("amount").and_then(|v| v.as_u64()).unwrap_or(500) as u32,
                }
            }
            "press_key" => ToolInvocation::PressKey {
                key: required_str(args, "key", &call.name)?,
            },
            "hover" => ToolInvocation::Hover {
                selector: required_str(args, "selector", &call.name)?,
            },
            "wait" => ToolInvocation::Wait {
                milliseconds: args
                    .get("milliseconds")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| missing("wait", "milliseconds"))?,
            },
            "go_back" => ToolInvocation::GoBack,
            "refresh" => ToolInvocation::Refresh,
            "select_option" => ToolInvocation::SelectOption {
                selector: required_str(args, "selector", &call.name)?,
                value: required_str(args, "value", &call.name)?,
            },
            "ask_user" => ToolInvocation::AskUser {
                question: required_str(args, "question", &call.name)?,
            },
            "confirm_action" => ToolInvocation::ConfirmAction {
                question: required_str(args, "question", &call.name)?,
                action_description: optional_str(args, "action_description"),
            },
            "extract_text" => ToolInvocation::ExtractText {
                selector: optional_str(args, "selector"),
                max_length: args
                    .get("maxLength")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(2000) as usize,
            },
            "complete_task" => ToolInvocation::CompleteTask {
                success: args
                    .get("success")
                    .and_then(|v| v.as_bool())
                    .ok_or_else(|| missing("complete_task", "success"))?,
                summary: required_str(args, "summary", &call.name)?,
            },
            other => return Err(Error::Validation(format!("Unknown tool: {}", other))),
        };
        Ok(invocation)
    }

    /// Stagnation signature: tool name, plus a selector prefix where one is
    /// targeted so clicks on different elements never count as repetition.
    pub fn signature(&self) -> String {
        let name = self.name();
        match self.target_selector() {
            Some(selector) => {
                let prefix: String = selector.chars().take(50).collect();
                format!("{}:{}", name, prefix)
            }
            None => name.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolInvocation::Navigate { .. } => "navigate",
            ToolInvocation::Click { .. } => "click",
            ToolInvocation::ClickText { .. } => "click_text",
            ToolInvocation::TypeText { .. } => "type_text",
            ToolInvocation::Scroll { .. } => "scroll",
            ToolInvocation::PressKey { .. } => "press_key",
            ToolInvocation::Hover { .. } => "hover",
            ToolInvocation::Wait { .. } => "wait",
            ToolInvocation::GoBack => "go_back",
            ToolInvocation::Refresh => "refresh",
            ToolInvocation::SelectOption { .. } => "select_option",
            ToolInvocation::AskUser { .. } => "ask_user",
            ToolInvocation::ConfirmAction { .. } => "confirm_action",
            ToolInvocation::ExtractText { .. } => "extract_text",
            ToolInvocation::CompleteTask { .. } => "complete_task",
        }
    }

    fn target_selector(&self) -> Option<&str> {
        match self {
            ToolInvocation::Click { selector, .. }
            | ToolInvocation::TypeText { selector, .. }
            | ToolInvocation::Hover { selector }
            | ToolInvocation::SelectOption { selector, .. } => Some(selector),
            _ => None,
        }
    }

    /// The browser action this invocation dispatches, when it is one.
    /// Control-flow tools (`ask_user`, `confirm_action`, `complete_task`)
    /// return `None`.
    pub fn to_action(&self) -> Option<BrowserAction> {
        match self {
            ToolInvocation::Navigate { url } => Some(BrowserAction::Navigate { url: url.clone() }),
            ToolInvocation::Click { selector, .. } => {
                Some(BrowserAction::Click { selector: selector.clone() })
            }
            // The in-page script resolves `text:` selectors by visible text.
            ToolInvocation::ClickText { text } => Some(BrowserAction::Click {
                selector: format!("text:{}", text),
            }),
            ToolInvocation::TypeText { selector, text } => Some(BrowserAction::TypeText {
                selector: selector.clone(),
                text: text.clone(),
            }),
            ToolInvocation::Scroll { direction, amount } => Some(BrowserAction::Scroll {
                direction: *direction,
                amount: *amount,
            }),
            ToolInvocation::PressKey { key } => Some(BrowserAction::PressKey { key: key.clone() }),
            ToolInvocation::Hover { selector } => {
                Some(BrowserAction::Hover { selector: selector.clone() })
            }
            ToolInvocation::Wait { milliseconds } => {
                Some(BrowserAction::Wait { amount: *milliseconds })
            }
            ToolInvocation::GoBack => Some(BrowserAction::GoBack),
            ToolInvocation::Refresh => Some(BrowserAction::Refresh),
            ToolInvocation::SelectOption { selector, value } => Some(BrowserAction::Select {
                selector: selector.clone(),
                value: value.clone(),
            }),
            ToolInvocation::ExtractText { selector, max_length } => {
                Some(BrowserAction::ExtractText {
                    selector: selector.clone(),
                    max_length: *max_length,
                })
            }
            ToolInvocation::AskUser { .. }
            | ToolInvocation::ConfirmAction { .. }
            | ToolInvocation::CompleteTask { .. } => None,
        }
    }
}

fn required_str(args: &Value, field: &str, tool: &str) -> Result<String> {
    args.get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| missing(tool, field))
}

fn optional_str(args: &Value, field: &str) -> Option<String> {
    args.get(field).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn missing(tool: &str, field: &str) -> Error {
    Error::Validation(format!("{}: missing required parameter \"{}\"", tool, field))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: "tc".to_string(),
            name: name.to_string(),
            arguments: args,
        }
    }

    #[test]
    fn test_schema_count_and_names() {
        let schemas = tool_schemas();
        assert_eq!(schemas.len(), 15);
        let names: Vec<&str> = schemas
            .iter()
            .map(|s| s["function"]["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"navigate"));
        assert!(names.contains(&"complete_task"));
        assert!(names.contains(&"confirm_action"));
    }

    #[test]
    fn test_decode_navigate() {
        let inv = ToolInvocation::decode(&call("navigate", json!({"url": "https://example.com"}))).unwrap();
        assert_eq!(inv, ToolInvocation::Navigate { url: "https://example.com".to_string() });
    }

    #[test]
    fn test_decode_missing_field() {
        let err = ToolInvocation::decode(&call("navigate", json!({}))).unwrap_err();
        assert!(err.to_string().contains("url"));
    }

    #[test]
    fn test_decode_unknown_tool() {
        let err = ToolInvocation::decode(&call("teleport", json!({}))).unwrap_err();
        assert!(err.to_string().contains("Unknown tool"));
    }

    #[test]
    fn test_signature_includes_selector_prefix() {
        let inv = ToolInvocation::decode(&call("click", json!({"selector": "#submit"}))).unwrap();
        assert_eq!(inv.signature(), "click:#submit");

        let long = "x".repeat(80);
        let inv = ToolInvocation::decode(&call("click", json!({"selector": long}))).unwrap();
        assert_eq!(inv.signature().len(), "click:".len() + 50);
    }

    #[test]
    fn test_signature_without_selector() {
        let inv = ToolInvocation::decode(&call("go_back", json!({}))).unwrap();
        assert_eq!(inv.signature(), "go_back");
    }

    #[test]
    fn test_click_text_becomes_text_selector() {
        let inv = ToolInvocation::decode(&call("click_text", json!({"text": "Sign in"}))).unwrap();
        match inv.to_action().unwrap() {
            BrowserAction::Click { selector } => assert_eq!(selector, "text:Sign in"),
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_control_tools_have_no_action() {
        let inv = ToolInvocation::decode(&call(
            "complete_task",
            json!({"success": true, "summary": "done"}),
        ))
        .unwrap();
        assert!(inv.to_action().is_none());
    }

    #[test]
    fn test_extract_text_defaults() {
        let inv = ToolInvocation::decode(&call("extract_text", json!({}))).unwrap();
        assert_eq!(
            inv,
            ToolInvocation::ExtractText { selector: None, max_length: 2000 }
        );
    }
}
