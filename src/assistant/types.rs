//! Provider-neutral types for the assistant engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Observable status of a remote run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Completed,
    Failed,
    Expired,
    Cancelled,
    Incomplete,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
            Self::Incomplete => "incomplete",
        }
    }

    /// No further status changes will be observed
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Expired | Self::Cancelled | Self::Incomplete
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback request emitted by a run while it is paused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw argument payload as produced by the engine
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Local answer to a tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub call_id: String,
    pub output: String,
}

impl ToolOutput {
    pub fn new(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: output.into(),
        }
    }
}

/// Failure detail reported by the engine for a failed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub code: Option<String>,
    pub message: Option<String>,
}

impl RunError {
    /// `code: message`, or whichever half is present
    pub fn detail(&self) -> Option<String> {
        let code = self.code.as_deref().filter(|c| !c.is_empty());
        let message = self.message.as_deref().filter(|m| !m.is_empty());
        match (code, message) {
            (Some(c), Some(m)) => Some(format!("{c}: {m}")),
            (Some(c), None) => Some(c.to_string()),
            (None, Some(m)) => Some(m.to_string()),
            (None, None) => None,
        }
    }
}

/// Point-in-time view of a remote run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSnapshot {
    pub id: String,
    pub status: RunStatus,
    /// Populated only while `status` is `RequiresAction`
    pub pending_calls: Vec<ToolCall>,
    pub last_error: Option<RunError>,
}

impl RunSnapshot {
    pub fn new(id: impl Into<String>, status: RunStatus) -> Self {
        Self {
            id: id.into(),
            status,
            pending_calls: Vec::new(),
            last_error: None,
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn with_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.pending_calls = calls;
        self
    }

    #[allow(dead_code)] // Used in tests
    pub fn with_error(mut self, code: Option<&str>, message: Option<&str>) -> Self {
        self.last_error = Some(RunError {
            code: code.map(String::from),
            message: message.map(String::from),
        });
        self
    }

    /// Failure detail, falling back to the status name
    pub fn failure_detail(&self) -> String {
        self.last_error
            .as_ref()
            .and_then(RunError::detail)
            .unwrap_or_else(|| self.status.to_string())
    }
}

/// Author of a message inside an execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Message read back from an execution context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    pub id: String,
    pub role: MessageRole,
    /// Text parts in order; non-text parts are dropped
    pub text: Vec<String>,
}

impl ThreadMessage {
    #[allow(dead_code)] // Used in tests
    pub fn assistant(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: MessageRole::Assistant,
            text: vec![text.into()],
        }
    }

    /// Joined text, `None` when the message carries no text
    pub fn joined_text(&self) -> Option<String> {
        if self.text.is_empty() {
            None
        } else {
            Some(self.text.join("\n"))
        }
    }
}
