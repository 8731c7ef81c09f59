//! Turn processing runtime
//!
//! `TurnService` admits user turns: it validates input, resolves the
//! conversation for its owner, records the pending user turn, serializes
//! orchestrations per conversation and tags the user turn with the outcome.

mod error;
mod executor;
mod finalizer;
mod provisioner;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use error::{ErrorCategory, TurnError};
pub use executor::TurnOrchestrator;
pub use traits::*;

use crate::assistant::AssistantService;
use crate::config::PollPolicy;
use crate::db::{Conversation, Message, MessageStatus, NewMessage, Role};
use crate::tools::ToolRegistry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

/// Type alias for the production service behind trait objects
pub type ProductionTurnService = TurnService<dyn Storage, dyn AssistantService>;

/// Both turns of a successful exchange
#[derive(Debug, Clone)]
pub struct TurnExchange {
    pub user: Message,
    pub assistant: Message,
}

/// Per-conversation admission locks
///
/// Entries are weak so idle conversations do not accumulate.
#[derive(Default)]
struct ConversationLocks {
    locks: Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl ConversationLocks {
    async fn acquire(&self, conv_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap();
            locks.retain(|_, weak| weak.strong_count() > 0);
            if let Some(existing) = locks.get(conv_id).and_then(Weak::upgrade) {
                existing
            } else {
                let created = Arc::new(tokio::sync::Mutex::new(()));
                locks.insert(conv_id.to_string(), Arc::downgrade(&created));
                created
            }
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        let mut locks = self.locks.lock().unwrap();
        locks.retain(|_, weak| weak.strong_count() > 0);
        locks.len()
    }
}

/// State shared with detached turn tasks
struct TurnCore<S: ?Sized, A: ?Sized> {
    storage: Arc<S>,
    orchestrator: TurnOrchestrator<S, A>,
    locks: ConversationLocks,
}

impl<S, A> TurnCore<S, A>
where
    S: Storage + ?Sized + 'static,
    A: AssistantService + ?Sized + 'static,
{
    async fn run_turn(
        &self,
        owner_id: &str,
        conv_id: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnExchange, TurnError> {
        // Held until the orchestration finishes so two turns never share a
        // remote context mid-run
        let _admission = self.locks.acquire(conv_id).await;

        let mut conversation = self.lookup(owner_id, conv_id).await?;
        if !conversation.active {
            return Err(TurnError::ConversationInactive(conv_id.to_string()));
        }

        let mut user_turn = self
            .storage
            .add_message(&NewMessage::user(conv_id, content))
            .await
            .map_err(TurnError::Persistence)?;

        let outcome = self
            .orchestrator
            .process_turn(&mut conversation, &user_turn, cancel)
            .await;

        match outcome {
            Ok(assistant) => {
                // The reply is already stored, so the exchange is reported
                // even when the user turn cannot be tagged
                match self.settle(&user_turn, MessageStatus::Completed).await {
                    Ok(()) => user_turn.status = MessageStatus::Completed,
                    Err(e) => {
                        tracing::error!(conv_id = %conv_id, message_id = %user_turn.id, error = %e, "Failed to mark user turn completed");
                    }
                }
                tracing::info!(conv_id = %conv_id, message_id = %assistant.id, "Turn completed");
                Ok(TurnExchange {
                    user: user_turn,
                    assistant,
                })
            }
            Err(error) => {
                tracing::warn!(
                    conv_id = %conv_id,
                    kind = error.kind(),
                    error = %error,
                    "Turn failed"
                );
                if let Err(e) = self.settle(&user_turn, MessageStatus::Failed).await {
                    // The orchestration error is the one worth reporting
                    tracing::error!(conv_id = %conv_id, message_id = %user_turn.id, error = %e, "Failed to mark user turn failed");
                }
                Err(error)
            }
        }
    }

    async fn lookup(&self, owner_id: &str, conv_id: &str) -> Result<Conversation, TurnError> {
        self.storage
            .get_conversation(owner_id, conv_id)
            .await
            .map_err(TurnError::Persistence)?
            .ok_or_else(|| TurnError::NotFound(conv_id.to_string()))
    }

    async fn settle(&self, turn: &Message, status: MessageStatus) -> Result<(), String> {
        let updated = self.storage.update_message_status(&turn.id, status).await?;
        if !updated {
            tracing::warn!(message_id = %turn.id, status = %status, "User turn was no longer pending");
        }
        Ok(())
    }
}

/// Entry point for chat turns
pub struct TurnService<S: ?Sized, A: ?Sized> {
    core: Arc<TurnCore<S, A>>,
    /// Root of every orchestration's cancellation token
    shutdown: CancellationToken,
}

impl<S, A> TurnService<S, A>
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
        let core = TurnCore {
            orchestrator: TurnOrchestrator::new(
                Arc::clone(&storage),
                assistant,
                tools,
                assistant_id,
                policy,
            ),
            storage,
            locks: ConversationLocks::default(),
        };
        Self {
            core: Arc::new(core),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop all in-flight orchestrations; they report `Cancelled`
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Process a user turn and return it together with the assistant's reply
    ///
    /// Admitted turns run on their own task: dropping the returned future
    /// detaches the caller, but the turn still runs to a settled state.
    pub async fn submit_turn(
        &self,
        owner_id: &str,
        conv_id: &str,
        content: &str,
        role: Option<&str>,
    ) -> Result<TurnExchange, TurnError> {
        let role = role.unwrap_or(Role::User.as_str());
        if role != Role::User.as_str() {
            return Err(TurnError::Validation(format!("unsupported role: {role}")));
        }
        if content.trim().is_empty() {
            return Err(TurnError::Validation(
                "content must not be empty".to_string(),
            ));
        }

        let core = Arc::clone(&self.core);
        let cancel = self.shutdown.child_token();
        let owner_id = owner_id.to_string();
        let conv_id = conv_id.to_string();
        let content = content.to_string();
        let task = tokio::spawn(async move {
            core.run_turn(&owner_id, &conv_id, &content, &cancel).await
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Turn task did not finish");
                Err(TurnError::Internal(format!("turn task failed: {e}")))
            }
        }
    }

    /// Transcript of a conversation in creation order
    pub async fn list_turns(&self, owner_id: &str, conv_id: &str) -> Result<Vec<Message>, TurnError> {
        let conversation = self.core.lookup(owner_id, conv_id).await?;
        if !conversation.active {
            return Err(TurnError::ConversationInactive(conv_id.to_string()));
        }
        self.core
            .storage
            .get_messages(conv_id)
            .await
            .map_err(TurnError::Persistence)
    }
}
