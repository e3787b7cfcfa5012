use browsepilot_core::types::ChatMessage;
use tracing::debug;

/// Ordered, role-tagged message log owned by one task run.
///
/// Trimming keeps the system message plus a bounded tail of the rest, and
/// repairs the cut so the surviving history never starts with a `tool`
/// message or an `assistant` message whose tool calls lost their results.
#[derive(Debug, Default)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Bound the window to the system message plus the last `max_non_system`
    /// messages, preserving the tool-call pairing invariant.
    pub fn trim(&mut self, max_non_system: usize) {
        let system: Vec<ChatMessage> = self
            .messages
            .iter()
            .filter(|m| m.role == "system")
            .cloned()
            .collect();
        let mut tail: Vec<ChatMessage> = self
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .cloned()
            .collect();

        if tail.len() <= max_non_system {
            return;
        }

        tail.drain(..tail.len() - max_non_system);

        // A leading tool result has lost its assistant pair; a leading
        // assistant message with tool calls has lost its results. Drop both
        // until the window starts cleanly.
        while tail
            .first()
            .map(|m| m.role == "tool" || (m.role == "assistant" && m.has_tool_calls()))
            .unwrap_or(false)
        {
            tail.remove(0);
        }

        let total = system.len() + tail.len();
        self.messages = system;
        self.messages.extend(tail);
        debug!(messages = total, "Conversation trimmed");
    }

    /// Recovery path for context-overflow errors from the oracle: keep the
    /// system message and only the last `keep` messages, same invariant.
    pub fn aggressive_trim(&mut self, keep: usize) {
        self.trim(keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use browsepilot_core::types::ToolCallRequest;

    fn tool_call(id: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: "click".to_string(),
            arguments: serde_json::json!({"selector": "#x"}),
        }
    }

    fn assert_invariant(history: &ConversationHistory) {
        let first_non_system = history.messages().iter().find(|m| m.role != "system");
        if let Some(first) = first_non_system {
            assert_ne!(first.role, "tool", "window starts with an orphaned tool result");
            assert!(
                !(first.role == "assistant" && first.has_tool_calls()),
                "window starts with unresolved tool calls"
            );
        }
    }

    #[test]
    fn test_trim_noop_when_small() {
        let mut history = ConversationHistory::new();
        history.push(ChatMessage::system("sys"));
        history.push(ChatMessage::user("task"));
        history.trim(12);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_trim_keeps_system_and_tail() {
        let mut history = ConversationHistory::new();
        history.push(ChatMessage::system("sys"));
        for i in 0..20 {
            history.push(ChatMessage::user(&format!("msg {}", i)));
        }
        history.trim(4);
        assert_eq!(history.len(), 5);
        assert_eq!(history.messages()[0].role, "system");
        assert_eq!(history.messages()[1].content.as_deref(), Some("msg 16"));
    }

    #[test]
    fn test_trim_never_leads_with_tool_message() {
        let mut history = ConversationHistory::new();
        history.push(ChatMessage::system("sys"));
        history.push(ChatMessage::user("task"));
        history.push(ChatMessage::assistant_with_tools(None, vec![tool_call("a")]));
        history.push(ChatMessage::tool_result("a", "done"));
        history.push(ChatMessage::user("next"));

        // A cut of 2 would land on [tool, user]; the tool result must go.
        history.trim(2);
        assert_invariant(&history);
        assert_eq!(history.messages()[1].content.as_deref(), Some("next"));
    }

    #[test]
    fn test_trim_never_leads_with_unresolved_assistant() {
        let mut history = ConversationHistory::new();
        history.push(ChatMessage::system("sys"));
        history.push(ChatMessage::user("task"));
        history.push(ChatMessage::assistant_with_tools(None, vec![tool_call("a")]));
        history.push(ChatMessage::tool_result("a", "done"));
        history.push(ChatMessage::user("next"));

        // A cut of 3 would land on [assistant+tools, tool, user]; both the
        // assistant and its result survive together or not at all.
        history.trim(3);
        assert_invariant(&history);
    }

    #[test]
    fn test_trim_invariant_for_any_length() {
        for cut in 0..10 {
            let mut history = ConversationHistory::new();
            history.push(ChatMessage::system("sys"));
            for i in 0..4 {
                history.push(ChatMessage::user(&format!("ctx {}", i)));
                history.push(ChatMessage::assistant_with_tools(None, vec![tool_call(&format!("c{}", i))]));
                history.push(ChatMessage::tool_result(&format!("c{}", i), "ok"));
            }
            history.trim(cut);
            assert_invariant(&history);
        }
    }

    #[test]
    fn test_trim_empty_history() {
        let mut history = ConversationHistory::new();
        history.trim(5);
        assert!(history.is_empty());
    }

    #[test]
    fn test_plain_assistant_message_may_lead() {
        let mut history = ConversationHistory::new();
        history.push(ChatMessage::system("sys"));
        for i in 0..5 {
            history.push(ChatMessage::user(&format!("u{}", i)));
            history.push(ChatMessage::assistant("thinking"));
        }
        history.trim(3);
        assert_invariant(&history);
        // A text-only assistant message is a valid window start.
        assert_eq!(history.messages()[1].role, "assistant");
    }
}
