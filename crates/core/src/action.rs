use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// A concrete browser action ready for dispatch through the execution port.
/// Serializes as `{"type": "...", ...fields}` which is the shape the remote
/// extension expects inside an `EXECUTE_ACTION` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserAction {
    Navigate {
        url: String,
    },
    Click {
        selector: String,
    },
    TypeText {
        selector: String,
        text: String,
    },
    Scroll {
        direction: ScrollDirection,
        #[serde(default = "default_scroll_amount")]
        amount: u32,
    },
    Wait {
        /// Milliseconds.
        amount: u64,
    },
    PressKey {
        key: String,
    },
    Hover {
        selector: String,
    },
    Select {
        selector: String,
        value: String,
    },
    GoBack,
    GoForward,
    Refresh,
    ExtractText {
        #[serde(skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        #[serde(default = "default_extract_length")]
        max_length: usize,
    },
    Screenshot,
}

fn default_scroll_amount() -> u32 {
    500
}

fn default_extract_length() -> usize {
    2000
}

impl BrowserAction {
    /// Selector targeted by this action, when it has one.
    pub fn selector(&self) -> Option<&str> {
        match self {
            BrowserAction::Click { selector }
            | BrowserAction::TypeText { selector, .. }
            | BrowserAction::Hover { selector }
            | BrowserAction::Select { selector, .. } => Some(selector),
            BrowserAction::ExtractText { selector, .. } => selector.as_deref(),
            _ => None,
        }
    }

    /// One-line rendering for the executed-actions digest fed back to the
    /// oracle each iteration.
    pub fn describe(&self) -> String {
        match self {
            BrowserAction::Navigate { url } => format!("navigate -> {}", url),
            BrowserAction::Click { selector } => format!("click -> {}", selector),
            BrowserAction::TypeText { selector, text } => {
                format!("type_text -> \"{}\" into {}", text, selector)
            }
            BrowserAction::Scroll { direction, .. } => format!("scroll {:?}", direction).to_lowercase(),
            BrowserAction::Wait { amount } => format!("wait {}ms", amount),
            BrowserAction::PressKey { key } => format!("press_key {}", key),
            BrowserAction::Hover { selector } => format!("hover -> {}", selector),
            BrowserAction::Select { selector, value } => {
                format!("select \"{}\" in {}", value, selector)
            }
            BrowserAction::GoBack => "go_back".to_string(),
            BrowserAction::GoForward => "go_forward".to_string(),
            BrowserAction::Refresh => "refresh".to_string(),
            BrowserAction::ExtractText { .. } => "extract_text".to_string(),
            BrowserAction::Screenshot => "screenshot".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_shape() {
        let action = BrowserAction::TypeText {
            selector: "#search".to_string(),
            text: "weather".to_string(),
        };
        let v = serde_json::to_value(&action).unwrap();
        assert_eq!(v["type"], "type_text");
        assert_eq!(v["selector"], "#search");
        assert_eq!(v["text"], "weather");
    }

    #[test]
    fn test_scroll_defaults_on_decode() {
        let action: BrowserAction =
            serde_json::from_value(serde_json::json!({"type": "scroll", "direction": "down"})).unwrap();
        match action {
            BrowserAction::Scroll { direction, amount } => {
                assert_eq!(direction, ScrollDirection::Down);
                assert_eq!(amount, 500);
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_unit_variant_wire_shape() {
        let v = serde_json::to_value(BrowserAction::GoBack).unwrap();
        assert_eq!(v, serde_json::json!({"type": "go_back"}));
    }
}
