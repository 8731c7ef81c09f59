//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::*;
use crate::assistant::{RunSnapshot, RunStatus, ToolCall, ToolOutput};
use crate::config::PollPolicy;
use proptest::prelude::*;
use std::time::Duration;

fn context(max_polls: u32, fetch_retries: u32) -> RunContext {
    RunContext::new(
        "test-conv",
        "thread-1",
        "run-1",
        PollPolicy {
            interval: Duration::from_millis(10),
            max_polls,
            max_duration: Duration::from_secs(60),
            fetch_retries,
        },
    )
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_status() -> impl Strategy<Value = RunStatus> {
    prop_oneof![
        Just(RunStatus::Queued),
        Just(RunStatus::InProgress),
        Just(RunStatus::RequiresAction),
        Just(RunStatus::Cancelling),
        Just(RunStatus::Completed),
        Just(RunStatus::Failed),
        Just(RunStatus::Expired),
        Just(RunStatus::Cancelled),
        Just(RunStatus::Incomplete),
    ]
}

fn arb_non_terminal_status() -> impl Strategy<Value = RunStatus> {
    prop_oneof![
        Just(RunStatus::Queued),
        Just(RunStatus::InProgress),
        Just(RunStatus::Cancelling),
    ]
}

fn arb_calls() -> impl Strategy<Value = Vec<ToolCall>> {
    prop::collection::vec(
        ("call_[a-z0-9]{6}", "[a-z_]{3,10}", "\\{\"[a-z]{1,5}\":\"[a-z ]{0,10}\"\\}"),
        0..4,
    )
    .prop_map(|items| {
        items
            .into_iter()
            .enumerate()
            .map(|(i, (id, name, args))| ToolCall::new(format!("{id}{i}"), name, args))
            .collect()
    })
}

fn arb_snapshot() -> impl Strategy<Value = RunSnapshot> {
    (arb_status(), arb_calls()).prop_map(|(status, calls)| {
        let snapshot = RunSnapshot::new("run-1", status);
        if status == RunStatus::RequiresAction {
            snapshot.with_calls(calls)
        } else {
            snapshot
        }
    })
}

fn arb_live_state() -> impl Strategy<Value = RunState> {
    prop_oneof![
        Just(RunState::Starting),
        (0u32..10, 0u32..3).prop_map(|(polls, retries)| RunState::Polling { polls, retries }),
        (1u32..10, arb_calls())
            .prop_filter("needs calls", |(_, calls)| !calls.is_empty())
            .prop_map(|(polls, calls)| RunState::Dispatching { polls, calls }),
        (1u32..10).prop_map(|polls| RunState::Submitting {
            polls,
            call_ids: vec!["call-1".to_string()],
        }),
    ]
}

fn arb_terminal_state() -> impl Strategy<Value = RunState> {
    prop_oneof![
        Just(RunState::Completed),
        Just(RunState::Cancelled),
        (0u32..10).prop_map(|polls| RunState::TimedOut { polls }),
        Just(RunState::Failed {
            status: RunStatus::Expired,
            detail: "expired".to_string()
        }),
        Just(RunState::Aborted {
            fault: RunFault::Submission {
                message: "rejected".to_string()
            }
        }),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        arb_snapshot().prop_map(|snapshot| Event::RunCreated { snapshot }),
        arb_snapshot().prop_map(|snapshot| Event::RunFetched { snapshot }),
        arb_snapshot().prop_map(|snapshot| Event::OutputsSubmitted { snapshot }),
        (any::<bool>(), "[a-z ]{1,20}").prop_map(|(retryable, message)| Event::FetchFailed {
            message,
            retryable,
            retry_after: None,
        }),
        "[a-z ]{1,20}".prop_map(|message| Event::SubmitFailed { message }),
        Just(Event::DeadlineExceeded),
        Just(Event::Cancel),
    ]
}

/// Simulate a remote engine answering every fetch with the next status
fn drive(statuses: &[RunStatus], ctx: &RunContext) -> (RunState, u32) {
    let mut state = RunState::Starting;
    let mut fetches = 0u32;
    let mut script = statuses.iter().copied();

    let result = transition(
        &state,
        ctx,
        Event::RunCreated {
            snapshot: RunSnapshot::new("run-1", RunStatus::Queued),
        },
    )
    .unwrap();
    state = result.new_state;
    let mut effects = result.effects;

    while let Some(effect) = effects.pop() {
        let event = match effect {
            Effect::FetchRun { .. } => {
                fetches += 1;
                let status = script.next().unwrap_or(RunStatus::InProgress);
                let snapshot = if status == RunStatus::RequiresAction {
                    RunSnapshot::new("run-1", status)
                        .with_calls(vec![ToolCall::new(format!("call-{fetches}"), "save_plan", "{}")])
                } else {
                    RunSnapshot::new("run-1", status)
                };
                Event::RunFetched { snapshot }
            }
            Effect::DispatchTools { calls } => Event::ToolsDispatched {
                outputs: calls.iter().map(|c| ToolOutput::new(&c.id, "ok")).collect(),
            },
            Effect::SubmitToolOutputs { .. } => Event::OutputsSubmitted {
                snapshot: RunSnapshot::new("run-1", RunStatus::Queued),
            },
        };
        let result = transition(&state, ctx, event).unwrap();
        state = result.new_state;
        effects = result.effects;
    }

    (state, fetches)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Live states yield exactly one effect; terminal results yield none
    #[test]
    fn prop_effect_cardinality(state in arb_live_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, &context(5, 2), event) {
            if result.new_state.is_terminal() {
                prop_assert!(result.effects.is_empty());
            } else {
                prop_assert_eq!(result.effects.len(), 1);
            }
        }
    }

    /// Nothing moves a finished run
    #[test]
    fn prop_terminal_states_absorb(state in arb_terminal_state(), event in arb_event()) {
        let result = transition(&state, &context(5, 2), event);
        prop_assert!(matches!(result, Err(TransitionError::AlreadyTerminal(_))));
    }

    /// Cancellation always wins over whatever the run was doing
    #[test]
    fn prop_cancel_from_live_state(state in arb_live_state()) {
        let result = transition(&state, &context(5, 2), Event::Cancel).unwrap();
        prop_assert_eq!(result.new_state, RunState::Cancelled);
    }

    /// Terminal engine statuses end the run on the fetch that observed them
    #[test]
    fn prop_terminal_status_ends_polling(polls in 0u32..4, status in arb_status()) {
        prop_assume!(status.is_terminal());
        let result = transition(
            &RunState::Polling { polls, retries: 0 },
            &context(5, 2),
            Event::RunFetched { snapshot: RunSnapshot::new("run-1", status) },
        )
        .unwrap();
        prop_assert!(result.new_state.is_terminal());
        prop_assert_eq!(result.new_state == RunState::Completed, status == RunStatus::Completed);
    }

    /// A run that never finishes is abandoned after at most `max_polls` fetches
    #[test]
    fn prop_polling_is_bounded(
        max_polls in 1u32..30,
        statuses in prop::collection::vec(
            prop_oneof![arb_non_terminal_status(), Just(RunStatus::RequiresAction)],
            0..40,
        ),
    ) {
        let (state, fetches) = drive(&statuses, &context(max_polls, 2));
        prop_assert!(fetches <= max_polls);
        prop_assert_eq!(state, RunState::TimedOut { polls: max_polls });
    }

    /// Fetch retries never exceed the configured budget
    #[test]
    fn prop_fetch_retries_bounded(fetch_retries in 0u32..5, failures in 1u32..10) {
        let ctx = context(50, fetch_retries);
        let mut state = RunState::Polling { polls: 1, retries: 0 };
        let mut attempts = 0u32;
        for _ in 0..failures {
            if state.is_terminal() {
                break;
            }
            attempts += 1;
            state = transition(&state, &ctx, Event::FetchFailed {
                message: "reset".to_string(),
                retryable: true,
                retry_after: None,
            })
            .unwrap()
            .new_state;
        }
        prop_assert!(attempts <= fetch_retries + 1);
        if failures > fetch_retries {
            let is_fetch_abort = matches!(state, RunState::Aborted { fault: RunFault::Fetch { .. } });
            prop_assert!(is_fetch_abort);
        }
    }

    /// Dispatch effects carry the pending calls in their original order
    #[test]
    fn prop_dispatch_preserves_order(calls in arb_calls()) {
        prop_assume!(!calls.is_empty());
        let result = transition(
            &RunState::Polling { polls: 0, retries: 0 },
            &context(5, 2),
            Event::RunFetched {
                snapshot: RunSnapshot::new("run-1", RunStatus::RequiresAction).with_calls(calls.clone()),
            },
        )
        .unwrap();
        prop_assert_eq!(result.effects, vec![Effect::DispatchTools { calls }]);
    }
}
