//! Orchestration error taxonomy

use crate::assistant::{AssistantError, RunStatus};
use crate::tools::ToolError;
use std::time::Duration;
use thiserror::Error;

/// How a turn failure is surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Inactive,
    /// Remote engine or tool fault; callers get a generic failure
    Processing,
    Internal,
    Cancelled,
}

/// Why a chat turn could not be processed
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("conversation {0} not found")]
    NotFound(String),

    #[error("conversation {0} is not active")]
    ConversationInactive(String),

    #[error("failed to create execution context: {0}")]
    ContextCreation(AssistantError),

    #[error("failed to submit message: {0}")]
    Submission(AssistantError),

    #[error("failed to start run: {0}")]
    RunStart(AssistantError),

    #[error("failed to fetch run status: {0}")]
    RunPoll(String),

    #[error("failed to submit tool outputs: {0}")]
    ToolOutputSubmission(String),

    #[error("run ended with status {status}: {detail}")]
    RunFailed { status: RunStatus, detail: String },

    #[error("run abandoned after {polls} polls ({}ms)", elapsed.as_millis())]
    RunTimeout { polls: u32, elapsed: Duration },

    #[error("tool {tool} ({call_id}) failed: {message}")]
    ToolExecution {
        call_id: String,
        tool: String,
        message: String,
    },

    #[error("failed to fetch reply: {0}")]
    ReplyFetch(String),

    #[error("run completed without a text reply")]
    EmptyReply,

    #[error("turn cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Persistence(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TurnError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            TurnError::Validation(_) => ErrorCategory::Validation,
            TurnError::NotFound(_) => ErrorCategory::NotFound,
            TurnError::ConversationInactive(_) => ErrorCategory::Inactive,
            TurnError::ContextCreation(_)
            | TurnError::Submission(_)
            | TurnError::RunStart(_)
            | TurnError::RunPoll(_)
            | TurnError::ToolOutputSubmission(_)
            | TurnError::RunFailed { .. }
            | TurnError::RunTimeout { .. }
            | TurnError::ToolExecution { .. }
            | TurnError::ReplyFetch(_)
            | TurnError::EmptyReply => ErrorCategory::Processing,
            TurnError::Persistence(_) | TurnError::Internal(_) => ErrorCategory::Internal,
            TurnError::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Stable machine-readable name, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            TurnError::Validation(_) => "validation",
            TurnError::NotFound(_) => "not_found",
            TurnError::ConversationInactive(_) => "conversation_inactive",
            TurnError::ContextCreation(_) => "context_creation",
            TurnError::Submission(_) => "submission",
            TurnError::RunStart(_) => "run_start",
            TurnError::RunPoll(_) => "run_poll",
            TurnError::ToolOutputSubmission(_) => "tool_output_submission",
            TurnError::RunFailed { .. } => "run_failed",
            TurnError::RunTimeout { .. } => "run_timeout",
            TurnError::ToolExecution { .. } => "tool_execution",
            TurnError::ReplyFetch(_) => "reply_fetch",
            TurnError::EmptyReply => "empty_reply",
            TurnError::Cancelled => "cancelled",
            TurnError::Persistence(_) => "persistence",
            TurnError::Internal(_) => "internal",
        }
    }
}

impl From<ToolError> for TurnError {
    fn from(e: ToolError) -> Self {
        TurnError::ToolExecution {
            call_id: e.call_id,
            tool: e.tool,
            message: e.message,
        }
    }
}
