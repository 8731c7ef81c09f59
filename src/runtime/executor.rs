//! Remote turn orchestrator
//!
//! Drives one user turn through the remote engine: provision the context,
//! submit the utterance, start a run, then feed run observations through the
//! pure state machine and perform the effects it asks for until the run is
//! terminal. Every remote call races the cancellation token and the
//! orchestration deadline.

use super::error::TurnError;
use super::finalizer::finalize;
use super::provisioner::ensure_context;
use super::traits::Storage;
use crate::assistant::{AssistantService, MessageRole, RunSnapshot, ThreadMessage};
use crate::config::PollPolicy;
use crate::db::{Conversation, Message};
use crate::state_machine::{
    retry_delay, transition, Effect, Event, RunContext, RunFault, RunState,
};
use crate::tools::{ToolContext, ToolRegistry};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Only the most recent message is needed for the reply
const REPLY_FETCH_LIMIT: u32 = 1;

/// Why an in-flight step was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Cancelled,
    Deadline,
}

impl Interrupt {
    fn into_error(self, polls: u32, started: Instant) -> TurnError {
        match self {
            Interrupt::Cancelled => TurnError::Cancelled,
            Interrupt::Deadline => TurnError::RunTimeout {
                polls,
                elapsed: started.elapsed(),
            },
        }
    }
}

/// Run `fut` unless cancellation or the deadline comes first
async fn guard<F: Future>(
    cancel: &CancellationToken,
    deadline: Instant,
    fut: F,
) -> Result<F::Output, Interrupt> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Interrupt::Cancelled),
        () = tokio::time::sleep_until(deadline) => Err(Interrupt::Deadline),
        output = fut => Ok(output),
    }
}

/// Orchestrates single turns against the remote engine
pub struct TurnOrchestrator<S: ?Sized, A: ?Sized> {
    storage: Arc<S>,
    assistant: Arc<A>,
    tools: Arc<ToolRegistry>,
    assistant_id: String,
    policy: PollPolicy,
}

impl<S, A> TurnOrchestrator<S, A>
where
    S: Storage + ?Sized + 'static,
    A: AssistantService + ?Sized + 'static,
{
    pub fn new(
        storage: Arc<S>,
        assistant: Arc<A>,
        tools: Arc<ToolRegistry>,
        assistant_id: impl Into<String>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            storage,
            assistant,
            tools,
            assistant_id: assistant_id.into(),
            policy,
        }
    }

    fn deadline(&self, started: Instant) -> Instant {
        // Absurd configured durations saturate instead of overflowing
        started
            .checked_add(self.policy.max_duration)
            .unwrap_or_else(|| started + Duration::from_secs(60 * 60 * 24 * 365))
    }

    /// Process one user turn, returning the persisted assistant turn
    ///
    /// No assistant turn is written unless the run completed with a text
    /// reply. The conversation's context id is recorded on `conversation`
    /// when one is provisioned.
    pub async fn process_turn(
        &self,
        conversation: &mut Conversation,
        user_turn: &Message,
        cancel: &CancellationToken,
    ) -> Result<Message, TurnError> {
        if !conversation.active {
            return Err(TurnError::ConversationInactive(conversation.id.clone()));
        }

        let started = Instant::now();
        let deadline = self.deadline(started);

        let thread_id = guard(
            cancel,
            deadline,
            ensure_context(&*self.storage, &*self.assistant, conversation),
        )
        .await
        .map_err(|i| i.into_error(0, started))??;

        guard(
            cancel,
            deadline,
            self.assistant
                .add_message(&thread_id, MessageRole::User, &user_turn.content),
        )
        .await
        .map_err(|i| i.into_error(0, started))?
        .map_err(TurnError::Submission)?;

        let run = guard(
            cancel,
            deadline,
            self.assistant.create_run(&thread_id, &self.assistant_id),
        )
        .await
        .map_err(|i| i.into_error(0, started))?
        .map_err(TurnError::RunStart)?;

        tracing::info!(
            conv_id = %conversation.id,
            thread_id = %thread_id,
            run_id = %run.id,
            status = %run.status,
            "Run started"
        );

        let ctx = RunContext::new(&conversation.id, &thread_id, &run.id, self.policy);
        let outcome = self.drive(&ctx, run, cancel, deadline).await?;
        let polls = outcome.polls();

        tracing::info!(
            conv_id = %conversation.id,
            run_id = %ctx.run_id,
            outcome = outcome.name(),
            polls,
            duration_ms = %started.elapsed().as_millis(),
            "Run finished"
        );

        if let Some(error) = outcome_error(outcome, started) {
            return Err(error);
        }

        let reply = self.fetch_reply(&thread_id, cancel, started, polls).await?;
        finalize(&*self.storage, conversation, &reply).await
    }

    /// Feed observations through the state machine until it is terminal
    async fn drive(
        &self,
        ctx: &RunContext,
        created: RunSnapshot,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<RunState, TurnError> {
        let mut state = RunState::Starting;
        let mut event = Event::RunCreated { snapshot: created };

        loop {
            let result = transition(&state, ctx, event)
                .map_err(|e| TurnError::RunPoll(format!("state machine rejected event: {e}")))?;

            if result.new_state.name() != state.name() {
                tracing::debug!(
                    conv_id = %ctx.conversation_id,
                    run_id = %ctx.run_id,
                    from = state.name(),
                    to = result.new_state.name(),
                    "Run state changed"
                );
            }
            state = result.new_state;

            if state.is_terminal() {
                return Ok(state);
            }
            let Some(effect) = result.effects.into_iter().next() else {
                return Ok(state);
            };

            event = match guard(cancel, deadline, self.execute_effect(ctx, effect)).await {
                Ok(event) => event,
                Err(Interrupt::Cancelled) => {
                    tracing::info!(conv_id = %ctx.conversation_id, run_id = %ctx.run_id, "Run cancelled locally");
                    Event::Cancel
                }
                Err(Interrupt::Deadline) => {
                    tracing::warn!(conv_id = %ctx.conversation_id, run_id = %ctx.run_id, "Run deadline exceeded");
                    Event::DeadlineExceeded
                }
            };
        }
    }

    /// Perform one effect and report what happened as an event
    async fn execute_effect(&self, ctx: &RunContext, effect: Effect) -> Event {
        match effect {
            Effect::FetchRun { delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                match self
                    .assistant
                    .retrieve_run(&ctx.thread_id, &ctx.run_id)
                    .await
                {
                    Ok(snapshot) => Event::RunFetched { snapshot },
                    Err(e) => Event::FetchFailed {
                        retryable: e.kind.is_retryable(),
                        retry_after: e.retry_after,
                        message: e.message,
                    },
                }
            }

            Effect::DispatchTools { calls } => {
                let tool_ctx = ToolContext {
                    conversation_id: &ctx.conversation_id,
                    store: &self.storage,
                };
                match self.tools.dispatch(&tool_ctx, &calls).await {
                    Ok(outputs) => Event::ToolsDispatched { outputs },
                    Err(e) => Event::ToolFailed {
                        call_id: e.call_id,
                        tool: e.tool,
                        message: e.message,
                    },
                }
            }

            Effect::SubmitToolOutputs { outputs } => {
                match self
                    .assistant
                    .submit_tool_outputs(&ctx.thread_id, &ctx.run_id, &outputs)
                    .await
                {
                    Ok(snapshot) => Event::OutputsSubmitted { snapshot },
                    Err(e) => Event::SubmitFailed { message: e.message },
                }
            }
        }
    }

    /// Read the latest message of a finished run, retrying transient faults
    async fn fetch_reply(
        &self,
        thread_id: &str,
        cancel: &CancellationToken,
        started: Instant,
        polls: u32,
    ) -> Result<String, TurnError> {
        let deadline = self.deadline(started);
        let mut attempt = 0u32;

        loop {
            let result = guard(
                cancel,
                deadline,
                self.assistant.list_messages(thread_id, REPLY_FETCH_LIMIT),
            )
            .await
            .map_err(|i| i.into_error(polls, started))?;

            match result {
                Ok(messages) => {
                    return messages
                        .first()
                        .and_then(ThreadMessage::joined_text)
                        .ok_or(TurnError::EmptyReply);
                }
                Err(e) if e.kind.is_retryable() && attempt < self.policy.fetch_retries => {
                    attempt += 1;
                    let delay = retry_delay(self.policy.interval, attempt)
                        .max(e.retry_after.unwrap_or_default());
                    tracing::warn!(
                        thread_id = %thread_id,
                        attempt,
                        delay_ms = %delay.as_millis(),
                        error = %e,
                        "Reply fetch failed, retrying"
                    );
                    guard(cancel, deadline, tokio::time::sleep(delay))
                        .await
                        .map_err(|i| i.into_error(polls, started))?;
                }
                Err(e) => return Err(TurnError::ReplyFetch(e.message)),
            }
        }
    }
}

/// Error for a terminal run state, `None` when the run completed
fn outcome_error(outcome: RunState, started: Instant) -> Option<TurnError> {
    match outcome {
        RunState::Completed => None,
        RunState::Failed { status, detail } => Some(TurnError::RunFailed { status, detail }),
        RunState::TimedOut { polls } => Some(TurnError::RunTimeout {
            polls,
            elapsed: started.elapsed(),
        }),
        RunState::Aborted { fault } => Some(match fault {
            RunFault::Fetch { message } => TurnError::RunPoll(message),
            RunFault::ToolExecution {
                call_id,
                tool,
                message,
            } => TurnError::ToolExecution {
                call_id,
                tool,
                message,
            },
            RunFault::Submission { message } => TurnError::ToolOutputSubmission(message),
        }),
        RunState::Cancelled => Some(TurnError::Cancelled),
        other => Some(TurnError::RunPoll(format!(
            "run stopped in non-terminal state {}",
            other.name()
        ))),
    }
}
