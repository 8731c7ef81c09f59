//! Execution context provisioning
//!
//! A conversation gets exactly one remote thread for its whole life. The id
//! is created lazily on the first turn and written back with a targeted
//! update that refuses to overwrite an existing id.

use super::error::TurnError;
use super::traits::ConversationStore;
use crate::assistant::AssistantService;
use crate::db::Conversation;

/// Return the conversation's context id, creating and recording one if unset
///
/// The in-memory record is updated as well, so repeated calls during one
/// turn never create a second context.
pub async fn ensure_context<S, A>(
    store: &S,
    assistant: &A,
    conversation: &mut Conversation,
) -> Result<String, TurnError>
where
    S: ConversationStore + ?Sized,
    A: AssistantService + ?Sized,
{
    if let Some(existing) = conversation.context_id() {
        return Ok(existing.to_string());
    }

    let context_id = assistant
        .create_thread()
        .await
        .map_err(TurnError::ContextCreation)?;

    let recorded = store
        .set_execution_context_id(&conversation.id, &context_id)
        .await
        .map_err(TurnError::Persistence)?;

    if !recorded {
        // Vanished, deactivated or raced by another writer; never reassign
        return Err(TurnError::Persistence(format!(
            "conversation {} was not updated with context {context_id}",
            conversation.id
        )));
    }

    tracing::info!(conv_id = %conversation.id, thread_id = %context_id, "Provisioned execution context");
    conversation.execution_context_id = Some(context_id.clone());
    Ok(context_id)
}
