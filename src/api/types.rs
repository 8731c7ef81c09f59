//! API request and response types

use crate::db::{Message, MessageStatus, Role};
use serde::{Deserialize, Serialize};

/// Layout of `created_at` in turn views
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Request to submit a chat turn
#[derive(Debug, Deserialize)]
pub struct SubmitTurnRequest {
    #[serde(default)]
    pub content: String,
    /// Defaults to `user`; nothing else is accepted
    #[serde(default)]
    pub role: Option<String>,
}

/// A turn as presented to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnView {
    pub id: String,
    pub content: String,
    pub role: Role,
    pub status: MessageStatus,
    pub created_at: String,
}

impl From<&Message> for TurnView {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            content: message.content.clone(),
            role: message.role,
            status: message.status,
            created_at: message.created_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// Response with a conversation's transcript
#[derive(Debug, Serialize, Deserialize)]
pub struct TurnListResponse {
    pub messages: Vec<TurnView>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
