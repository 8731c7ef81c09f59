//! Assistant turn persistence

use super::error::TurnError;
use super::traits::MessageStore;
use crate::db::{Conversation, Message, NewMessage};

/// Persist the assistant's reply as a completed turn
///
/// A failure here loses the computed reply; the remote run cannot be reused
/// so the caller has to resubmit the whole turn.
pub async fn finalize<S>(
    store: &S,
    conversation: &Conversation,
    text: &str,
) -> Result<Message, TurnError>
where
    S: MessageStore + ?Sized,
{
    let message = store
        .add_message(&NewMessage::assistant(&conversation.id, text))
        .await
        .map_err(TurnError::Persistence)?;

    tracing::debug!(conv_id = %conversation.id, message_id = %message.id, "Persisted assistant turn");
    Ok(message)
}
