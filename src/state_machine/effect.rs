//! Effects produced by state transitions

use crate::assistant::{ToolCall, ToolOutput};
use std::time::Duration;

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Wait `delay`, then fetch the run status
    FetchRun { delay: Duration },

    /// Run the side effects for a paused run, in order
    DispatchTools { calls: Vec<ToolCall> },

    /// Hand the outputs of the current batch to the engine
    SubmitToolOutputs { outputs: Vec<ToolOutput> },
}

impl Effect {
    pub fn fetch_now() -> Self {
        Effect::FetchRun {
            delay: Duration::ZERO,
        }
    }

    pub fn dispatch(calls: Vec<ToolCall>) -> Self {
        Effect::DispatchTools { calls }
    }
}
