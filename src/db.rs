//! Database module
//!
//! Provides persistence for conversations and their turns. Every write to a
//! conversation row is a targeted single-column update keyed by id.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("Message not found: {0}")]
    MessageNotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

const CONVERSATION_COLUMNS: &str = "id, owner_id, name, status, active, execution_context_id, content, created_at, updated_at";
const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sequence_id, role, content, status, created_at, updated_at";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Conversation Operations ====================

    /// Create a new conversation with an empty structured-content document
    #[allow(dead_code)] // Conversations are managed outside the chat service
    pub fn create_conversation(
        &self,
        id: &str,
        owner_id: &str,
        name: &str,
        status: ConversationStatus,
    ) -> DbResult<Conversation> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO conversations (id, owner_id, name, status, active, execution_context_id, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, NULL, '{}', ?5, ?5)",
            params![id, owner_id, name, status.as_str(), now.to_rfc3339()],
        )?;

        Ok(Conversation {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            status,
            active: true,
            execution_context_id: None,
            content: "{}".to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Get an active conversation owned by `owner_id`
    ///
    /// Missing, foreign and deactivated conversations are indistinguishable.
    pub fn get_conversation_for_owner(&self, owner_id: &str, id: &str) -> DbResult<Conversation> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE id = ?1 AND owner_id = ?2 AND active = 1"
        ))?;

        stmt.query_row(params![id, owner_id], parse_conversation_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    DbError::ConversationNotFound(id.to_string())
                }
                other => DbError::Sqlite(other),
            })
    }

    /// Get conversation by ID regardless of owner or activation
    #[allow(dead_code)] // Used in tests
    pub fn get_conversation(&self, id: &str) -> DbResult<Conversation> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"
        ))?;

        stmt.query_row(params![id], parse_conversation_row)
            .optional()?
            .ok_or_else(|| DbError::ConversationNotFound(id.to_string()))
    }

    /// Record the execution context id, at most once per conversation.
    ///
    /// Returns `false` when no row was updated: the conversation vanished, was
    /// deactivated, or already carries a context id.
    pub fn set_execution_context_id(&self, id: &str, context_id: &str) -> DbResult<bool> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let updated = conn.execute(
            "UPDATE conversations SET execution_context_id = ?1, updated_at = ?2
             WHERE id = ?3 AND active = 1
               AND (execution_context_id IS NULL OR execution_context_id = '')",
            params![context_id, now.to_rfc3339(), id],
        )?;

        Ok(updated > 0)
    }

    /// Replace the structured-content document. Returns `false` if no row matched.
    pub fn update_structured_content(&self, id: &str, content: &str) -> DbResult<bool> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let updated = conn.execute(
            "UPDATE conversations SET content = ?1, updated_at = ?2 WHERE id = ?3 AND active = 1",
            params![content, now.to_rfc3339(), id],
        )?;

        Ok(updated > 0)
    }

    /// Activate or deactivate a conversation
    #[allow(dead_code)] // Conversations are managed outside the chat service
    pub fn set_active(&self, id: &str, active: bool) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let updated = conn.execute(
            "UPDATE conversations SET active = ?1, updated_at = ?2 WHERE id = ?3",
            params![active, now.to_rfc3339(), id],
        )?;

        if updated == 0 {
            return Err(DbError::ConversationNotFound(id.to_string()));
        }
        Ok(())
    }

    // ==================== Message Operations ====================

    /// Append a turn to a conversation's transcript
    pub fn add_message(&self, message_id: &str, new: &NewMessage) -> DbResult<Message> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        // Get next sequence ID
        let sequence_id: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence_id), 0) + 1 FROM messages WHERE conversation_id = ?1",
            params![new.conversation_id],
            |row| row.get(0),
        )?;

        conn.execute(
            "INSERT INTO messages (id, conversation_id, sequence_id, role, content, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                message_id,
                new.conversation_id,
                sequence_id,
                new.role.as_str(),
                new.content,
                new.status.as_str(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(Message {
            id: message_id.to_string(),
            conversation_id: new.conversation_id.clone(),
            sequence_id,
            role: new.role,
            content: new.content.clone(),
            status: new.status,
            created_at: now,
            updated_at: now,
        })
    }

    /// Move a pending turn to `status`. Returns `false` if the turn is not pending.
    pub fn update_message_status(&self, message_id: &str, status: MessageStatus) -> DbResult<bool> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let updated = conn.execute(
            "UPDATE messages SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'pending'",
            params![status.as_str(), now.to_rfc3339(), message_id],
        )?;

        if updated == 0 {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM messages WHERE id = ?1)",
                params![message_id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(DbError::MessageNotFound(message_id.to_string()));
            }
        }
        Ok(updated > 0)
    }

    /// Get the transcript of a conversation in creation order
    pub fn get_messages(&self, conversation_id: &str) -> DbResult<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1 ORDER BY sequence_id ASC"
        ))?;

        let rows = stmt.query_map(params![conversation_id], parse_message_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Get a single turn by id
    #[allow(dead_code)] // Used in tests
    pub fn get_message(&self, message_id: &str) -> DbResult<Message> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"
        ))?;

        stmt.query_row(params![message_id], parse_message_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    DbError::MessageNotFound(message_id.to_string())
                }
                other => DbError::Sqlite(other),
            })
    }
}

fn parse_conversation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        status: ConversationStatus::parse(&row.get::<_, String>(3)?),
        active: row.get(4)?,
        execution_context_id: row.get(5)?,
        content: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        updated_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

/// Parse a message row from the database
fn parse_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let role = match row.get::<_, String>(3)?.as_str() {
        "assistant" => Role::Assistant,
        _ => Role::User,
    };

    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sequence_id: row.get(2)?,
        role,
        content: row.get(4)?,
        status: MessageStatus::parse(&row.get::<_, String>(5)?),
        created_at: parse_datetime(&row.get::<_, String>(6)?),
        updated_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
