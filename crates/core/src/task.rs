use crate::action::BrowserAction;
use serde::{Deserialize, Serialize};

/// Terminal artifact of one task run. Immutable once returned; the action
/// log is always populated so a caller can audit partial progress after a
/// failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub summary: String,
    pub actions: Vec<BrowserAction>,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl TaskResult {
    pub fn failed(summary: &str, actions: Vec<BrowserAction>, errors: Vec<String>) -> Self {
        Self {
            success: false,
            summary: summary.to_string(),
            actions,
            errors,
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Info,
    Action,
    Thought,
    Error,
    Success,
    Warning,
    Confirm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Local wall-clock time, HH:MM:SS.
    pub time: String,
    pub kind: LogKind,
    pub message: String,
}

impl LogEntry {
    pub fn new(kind: LogKind, message: &str) -> Self {
        Self {
            time: chrono::Local::now().format("%H:%M:%S").to_string(),
            kind,
            message: message.to_string(),
        }
    }
}
