//! Events that can occur while a run is driven

use crate::assistant::{RunSnapshot, ToolOutput};
use std::time::Duration;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    /// The engine accepted the run request
    RunCreated { snapshot: RunSnapshot },

    // Polling events
    RunFetched { snapshot: RunSnapshot },
    FetchFailed {
        message: String,
        retryable: bool,
        retry_after: Option<Duration>,
    },

    // Tool events
    ToolsDispatched { outputs: Vec<ToolOutput> },
    ToolFailed {
        call_id: String,
        tool: String,
        message: String,
    },
    OutputsSubmitted { snapshot: RunSnapshot },
    SubmitFailed { message: String },

    // Control events
    DeadlineExceeded,
    Cancel,
}
