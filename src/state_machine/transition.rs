//! Pure state transition function

use super::{Effect, Event, RunContext, RunFault, RunState};
use crate::assistant::{RunSnapshot, RunStatus, ToolOutput};
use std::time::Duration;
use thiserror::Error;

/// Upper bound for a single fetch retry delay
const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: RunState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: RunState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Run already finished ({0})")]
    AlreadyTerminal(&'static str),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs, with no I/O.
/// Every non-terminal state produced here carries exactly one effect.
pub fn transition(
    state: &RunState,
    context: &RunContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    if state.is_terminal() {
        return Err(TransitionError::AlreadyTerminal(state.name()));
    }

    let policy = &context.policy;

    match (state, event) {
        // ============================================================
        // Control events win from any live state
        // ============================================================
        (_, Event::Cancel) => Ok(TransitionResult::new(RunState::Cancelled)),

        (state, Event::DeadlineExceeded) => Ok(TransitionResult::new(RunState::TimedOut {
            polls: state.polls(),
        })),

        // ============================================================
        // Run start
        // ============================================================
        (RunState::Starting, Event::RunCreated { snapshot }) => {
            if let Some(terminal) = terminal_for(&snapshot) {
                return Ok(TransitionResult::new(terminal));
            }
            // First fetch is immediate
            Ok(
                TransitionResult::new(RunState::Polling { polls: 0, retries: 0 })
                    .with_effect(Effect::fetch_now()),
            )
        }

        // ============================================================
        // Polling
        // ============================================================
        (RunState::Polling { polls, .. }, Event::RunFetched { snapshot }) => {
            let polls = polls.saturating_add(1);

            if let Some(terminal) = terminal_for(&snapshot) {
                return Ok(TransitionResult::new(terminal));
            }

            if snapshot.status == RunStatus::RequiresAction {
                if snapshot.pending_calls.is_empty() {
                    return Ok(TransitionResult::new(RunState::Failed {
                        status: RunStatus::RequiresAction,
                        detail: "no pending tool calls".to_string(),
                    }));
                }
                let calls = snapshot.pending_calls;
                return Ok(TransitionResult::new(RunState::Dispatching {
                    polls,
                    calls: calls.clone(),
                })
                .with_effect(Effect::dispatch(calls)));
            }

            Ok(keep_polling(polls, policy.max_polls, policy.interval))
        }

        (
            RunState::Polling { polls, retries },
            Event::FetchFailed {
                message,
                retryable,
                retry_after,
            },
        ) => {
            if retryable && *retries < policy.fetch_retries {
                let attempt = retries + 1;
                let delay = retry_delay(policy.interval, attempt).max(retry_after.unwrap_or_default());
                Ok(TransitionResult::new(RunState::Polling {
                    polls: *polls,
                    retries: attempt,
                })
                .with_effect(Effect::FetchRun { delay }))
            } else {
                let message = if retryable {
                    format!("Failed after {} attempts: {message}", retries + 1)
                } else {
                    message
                };
                Ok(TransitionResult::new(RunState::Aborted {
                    fault: RunFault::Fetch { message },
                }))
            }
        }

        // ============================================================
        // Tool dispatch
        // ============================================================
        (RunState::Dispatching { polls, calls }, Event::ToolsDispatched { outputs }) => {
            if !outputs_match_calls(calls, &outputs) {
                return Ok(TransitionResult::new(RunState::Aborted {
                    fault: RunFault::ToolExecution {
                        call_id: String::new(),
                        tool: String::new(),
                        message: format!(
                            "{} outputs do not answer {} pending calls in order",
                            outputs.len(),
                            calls.len()
                        ),
                    },
                }));
            }
            Ok(TransitionResult::new(RunState::Submitting {
                polls: *polls,
                call_ids: calls.iter().map(|c| c.id.clone()).collect(),
            })
            .with_effect(Effect::SubmitToolOutputs { outputs }))
        }

        (
            RunState::Dispatching { .. },
            Event::ToolFailed {
                call_id,
                tool,
                message,
            },
        ) => Ok(TransitionResult::new(RunState::Aborted {
            fault: RunFault::ToolExecution {
                call_id,
                tool,
                message,
            },
        })),

        // ============================================================
        // Output submission
        // ============================================================
        (RunState::Submitting { polls, .. }, Event::OutputsSubmitted { snapshot }) => {
            // Submission may finish the run outright; anything else is
            // confirmed by a fresh fetch so a batch is never dispatched twice.
            if let Some(terminal) = terminal_for(&snapshot) {
                return Ok(TransitionResult::new(terminal));
            }
            Ok(keep_polling(*polls, policy.max_polls, policy.interval))
        }

        (RunState::Submitting { .. }, Event::SubmitFailed { message }) => {
            Ok(TransitionResult::new(RunState::Aborted {
                fault: RunFault::Submission { message },
            }))
        }

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{event:?} in state {}",
            state.name()
        ))),
    }
}

fn keep_polling(polls: u32, max_polls: u32, interval: Duration) -> TransitionResult {
    if polls >= max_polls {
        TransitionResult::new(RunState::TimedOut { polls })
    } else {
        TransitionResult::new(RunState::Polling { polls, retries: 0 })
            .with_effect(Effect::FetchRun { delay: interval })
    }
}

/// Terminal state for a snapshot, if its status is terminal
fn terminal_for(snapshot: &RunSnapshot) -> Option<RunState> {
    match snapshot.status {
        RunStatus::Completed => Some(RunState::Completed),
        status if status.is_terminal() => Some(RunState::Failed {
            status,
            detail: snapshot.failure_detail(),
        }),
        _ => None,
    }
}

fn outputs_match_calls(calls: &[crate::assistant::ToolCall], outputs: &[ToolOutput]) -> bool {
    calls.len() == outputs.len()
        && calls
            .iter()
            .zip(outputs)
            .all(|(call, output)| call.id == output.call_id)
}

/// Exponential backoff from the poll interval: 2x, 4x, 8x...
pub fn retry_delay(interval: Duration, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.min(16);
    interval.saturating_mul(factor).min(MAX_RETRY_DELAY)
}
