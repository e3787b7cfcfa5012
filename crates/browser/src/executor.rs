use async_trait::async_trait;
use browsepilot_core::{BrowserAction, Error, PageContext, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::relay::RelayChannel;
use crate::BrowserExecutor;

/// Relay-backed binding of the execution port. Actions become
/// `EXECUTE_ACTION` commands, snapshots become `GET_PAGE_CONTEXT`; the
/// in-page scraping on the other end is a black box.
pub struct RelayExecutor {
    relay: Arc<RelayChannel>,
}

impl RelayExecutor {
    pub fn new(relay: Arc<RelayChannel>) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl BrowserExecutor for RelayExecutor {
    async fn execute_action(&self, action: &BrowserAction) -> Result<String> {
        let result = self
            .relay
            .send("EXECUTE_ACTION", serde_json::json!({ "action": action }))
            .await?;

        interpret_action_result(&result)
    }

    async fn extract_page_context(&self) -> PageContext {
        match self.relay.send("GET_PAGE_CONTEXT", serde_json::json!({})).await {
            Ok(payload) => decode_page_context(payload),
            Err(e) => {
                warn!(error = %e, "Page context fetch failed, continuing with minimal context");
                PageContext::minimal("", "")
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.relay.is_connected()
    }
}

/// The extension replies `{success, message?, text?, error?}`. Extracted
/// text takes priority over the generic message so `extract_text` results
/// flow back to the oracle verbatim.
fn interpret_action_result(result: &Value) -> Result<String> {
    if result.is_null() {
        return Err(Error::Browser("Empty response from extension".to_string()));
    }

    let success = result.get("success").and_then(|v| v.as_bool()).unwrap_or(false);
    if !success {
        let error = result
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("Action failed in the extension");
        return Err(Error::Browser(error.to_string()));
    }

    if let Some(text) = result.get("text").and_then(|v| v.as_str()) {
        return Ok(text.to_string());
    }
    Ok(result
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("OK")
        .to_string())
}

/// Field-by-field mapping with defaults for anything the scraper omitted.
/// A malformed payload degrades to a minimal context instead of failing the
/// iteration.
fn decode_page_context(payload: Value) -> PageContext {
    if payload.is_null() || !payload.is_object() {
        return PageContext::minimal("", "");
    }

    match serde_json::from_value::<PageContext>(payload.clone()) {
        Ok(mut context) => {
            // Element indexes are presentation-only; renumber when the
            // scraper left them at zero.
            for (i, element) in context.elements.iter_mut().enumerate() {
                if element.index == 0 {
                    element.index = i;
                }
            }
            context.timestamp = chrono::Utc::now().timestamp_millis();
            context
        }
        Err(e) => {
            debug!(error = %e, "Malformed page context payload");
            let url = payload.get("url").and_then(|v| v.as_str()).unwrap_or("");
            let title = payload.get("title").and_then(|v| v.as_str()).unwrap_or("");
            PageContext::minimal(url, title)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_success_message() {
        let result = serde_json::json!({"success": true, "message": "Clicked"});
        assert_eq!(interpret_action_result(&result).unwrap(), "Clicked");
    }

    #[test]
    fn test_interpret_extracted_text_priority() {
        let result = serde_json::json!({"success": true, "message": "OK", "text": "page body"});
        assert_eq!(interpret_action_result(&result).unwrap(), "page body");
    }

    #[test]
    fn test_interpret_failure() {
        let result = serde_json::json!({"success": false, "error": "element not found"});
        let err = interpret_action_result(&result).unwrap_err();
        assert!(matches!(err, Error::Browser(_)));
        assert!(err.to_string().contains("element not found"));
    }

    #[test]
    fn test_interpret_null_response() {
        assert!(interpret_action_result(&Value::Null).is_err());
    }

    #[test]
    fn test_decode_full_context() {
        let payload = serde_json::json!({
            "url": "https://example.com",
            "title": "Example",
            "elements": [
                {"index": 0, "tag": "a", "text": "More", "selector": "a.more"},
                {"index": 0, "tag": "button", "text": "Go", "selector": "#go"}
            ],
            "forms": [],
            "textContent": "Example Domain",
            "hasModal": true,
            "modalHint": "cookie banner"
        });
        let context = decode_page_context(payload);
        assert_eq!(context.url, "https://example.com");
        assert!(context.has_modal);
        assert_eq!(context.modal_hint.as_deref(), Some("cookie banner"));
        // Second element renumbered from its position.
        assert_eq!(context.elements[1].index, 1);
    }

    #[test]
    fn test_decode_garbage_degrades_to_minimal() {
        let context = decode_page_context(serde_json::json!("not an object"));
        assert_eq!(context.url, "");
        assert!(context.elements.is_empty());
    }
}
