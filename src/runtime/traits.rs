//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the orchestrator with mock implementations.

use crate::db::{Conversation, Database, DbError, Message, MessageStatus, NewMessage};
use async_trait::async_trait;
use std::sync::Arc;

/// Storage for chat turns
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a turn, assigning it an id and transcript position
    async fn add_message(&self, message: &NewMessage) -> Result<Message, String>;

    /// Move a pending turn to a final status. `false` if it was not pending.
    async fn update_message_status(
        &self,
        message_id: &str,
        status: MessageStatus,
    ) -> Result<bool, String>;

    /// Transcript of a conversation in creation order
    async fn get_messages(&self, conv_id: &str) -> Result<Vec<Message>, String>;
}

/// Storage for conversation records
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Active conversation owned by `owner_id`, if any
    async fn get_conversation(
        &self,
        owner_id: &str,
        conv_id: &str,
    ) -> Result<Option<Conversation>, String>;

    /// Record the execution context id if none is set. `false` if nothing changed.
    async fn set_execution_context_id(&self, conv_id: &str, context_id: &str)
        -> Result<bool, String>;

    /// Replace only the structured content blob. `false` if the row is gone.
    async fn update_structured_content(&self, conv_id: &str, content: &str)
        -> Result<bool, String>;
}

/// Combined storage trait for convenience
pub trait Storage: MessageStore + ConversationStore {}
impl<T: MessageStore + ConversationStore> Storage for T {}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: MessageStore + ?Sized> MessageStore for Arc<T> {
    async fn add_message(&self, message: &NewMessage) -> Result<Message, String> {
        (**self).add_message(message).await
    }

    async fn update_message_status(
        &self,
        message_id: &str,
        status: MessageStatus,
    ) -> Result<bool, String> {
        (**self).update_message_status(message_id, status).await
    }

    async fn get_messages(&self, conv_id: &str) -> Result<Vec<Message>, String> {
        (**self).get_messages(conv_id).await
    }
}

#[async_trait]
impl<T: ConversationStore + ?Sized> ConversationStore for Arc<T> {
    async fn get_conversation(
        &self,
        owner_id: &str,
        conv_id: &str,
    ) -> Result<Option<Conversation>, String> {
        (**self).get_conversation(owner_id, conv_id).await
    }

    async fn set_execution_context_id(
        &self,
        conv_id: &str,
        context_id: &str,
    ) -> Result<bool, String> {
        (**self).set_execution_context_id(conv_id, context_id).await
    }

    async fn update_structured_content(
        &self,
        conv_id: &str,
        content: &str,
    ) -> Result<bool, String> {
        (**self).update_structured_content(conv_id, content).await
    }
}

// ============================================================================
// Production Adapter
// ============================================================================

/// Adapter to use Database as Storage
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[allow(dead_code)] // Useful for tests
    pub fn inner(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl MessageStore for DatabaseStorage {
    async fn add_message(&self, message: &NewMessage) -> Result<Message, String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.db.add_message(&id, message).map_err(|e| e.to_string())
    }

    async fn update_message_status(
        &self,
        message_id: &str,
        status: MessageStatus,
    ) -> Result<bool, String> {
        self.db
            .update_message_status(message_id, status)
            .map_err(|e| e.to_string())
    }

    async fn get_messages(&self, conv_id: &str) -> Result<Vec<Message>, String> {
        self.db.get_messages(conv_id).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ConversationStore for DatabaseStorage {
    async fn get_conversation(
        &self,
        owner_id: &str,
        conv_id: &str,
    ) -> Result<Option<Conversation>, String> {
        match self.db.get_conversation_for_owner(owner_id, conv_id) {
            Ok(conv) => Ok(Some(conv)),
            Err(DbError::ConversationNotFound(_)) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn set_execution_context_id(
        &self,
        conv_id: &str,
        context_id: &str,
    ) -> Result<bool, String> {
        self.db
            .set_execution_context_id(conv_id, context_id)
            .map_err(|e| e.to_string())
    }

    async fn update_structured_content(
        &self,
        conv_id: &str,
        content: &str,
    ) -> Result<bool, String> {
        self.db
            .update_structured_content(conv_id, content)
            .map_err(|e| e.to_string())
    }
}
