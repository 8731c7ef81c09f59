//! Run state types

use crate::assistant::{RunStatus, ToolCall};
use crate::config::PollPolicy;
use serde::{Deserialize, Serialize};

/// Immutable facts about the run being driven
#[derive(Debug, Clone)]
pub struct RunContext {
    pub conversation_id: String,
    pub thread_id: String,
    pub run_id: String,
    pub policy: PollPolicy,
}

impl RunContext {
    pub fn new(
        conversation_id: impl Into<String>,
        thread_id: impl Into<String>,
        run_id: impl Into<String>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            policy,
        }
    }
}

/// Why a run was abandoned locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunFault {
    /// Status could not be fetched, retries exhausted or not retryable
    Fetch { message: String },
    /// A tool side effect failed; no outputs were submitted
    ToolExecution {
        call_id: String,
        tool: String,
        message: String,
    },
    /// The engine rejected the tool outputs
    Submission { message: String },
}

/// Run orchestration state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunState {
    /// Run has been requested but not yet observed
    #[default]
    Starting,

    /// Waiting on the next status fetch
    Polling {
        /// Status fetches completed so far
        polls: u32,
        /// Consecutive failed fetches
        retries: u32,
    },

    /// Run paused for tool outputs, side effects in progress
    Dispatching { polls: u32, calls: Vec<ToolCall> },

    /// Tool outputs handed to the engine, awaiting its answer
    Submitting { polls: u32, call_ids: Vec<String> },

    /// Run finished successfully (terminal)
    Completed,

    /// Run reached a failure status on the engine (terminal)
    Failed { status: RunStatus, detail: String },

    /// Poll budget or deadline exhausted (terminal)
    TimedOut { polls: u32 },

    /// Abandoned because of a local or transport fault (terminal)
    Aborted { fault: RunFault },

    /// Stopped by a cancellation signal (terminal)
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed
                | RunState::Failed { .. }
                | RunState::TimedOut { .. }
                | RunState::Aborted { .. }
                | RunState::Cancelled
        )
    }

    /// Status fetches performed before reaching this state
    pub fn polls(&self) -> u32 {
        match self {
            RunState::Polling { polls, .. }
            | RunState::Dispatching { polls, .. }
            | RunState::Submitting { polls, .. }
            | RunState::TimedOut { polls } => *polls,
            _ => 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RunState::Starting => "starting",
            RunState::Polling { .. } => "polling",
            RunState::Dispatching { .. } => "dispatching",
            RunState::Submitting { .. } => "submitting",
            RunState::Completed => "completed",
            RunState::Failed { .. } => "failed",
            RunState::TimedOut { .. } => "timed_out",
            RunState::Aborted { .. } => "aborted",
            RunState::Cancelled => "cancelled",
        }
    }
}
