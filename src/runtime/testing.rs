//! Mock implementations for testing
//!
//! These mocks enable orchestration tests without a database or network.

use super::traits::{ConversationStore, MessageStore};
use crate::assistant::{
    AssistantError, AssistantService, MessageRole, RunSnapshot, RunStatus, ThreadMessage,
    ToolOutput,
};
use crate::db::{Conversation, ConversationStatus, Message, MessageStatus, NewMessage};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

type SubmitHook = Box<dyn Fn() -> Option<String> + Send + Sync>;

// ============================================================================
// Mock Assistant
// ============================================================================

/// Scripted remote engine
///
/// Run fetches pop queued snapshots and report `in_progress` once the queue
/// is empty. Every call is recorded by operation name.
pub struct MockAssistant {
    runs: Mutex<VecDeque<Result<RunSnapshot, AssistantError>>>,
    submits: Mutex<VecDeque<RunSnapshot>>,
    replies: Mutex<VecDeque<Result<Vec<ThreadMessage>, AssistantError>>>,
    failures: Mutex<HashMap<&'static str, AssistantError>>,
    default_reply: Mutex<String>,
    fetch_delay: Mutex<Duration>,
    next_thread: Mutex<u32>,
    calls: Mutex<Vec<&'static str>>,
    added: Mutex<Vec<(String, String)>>,
    submitted: Mutex<Vec<Vec<ToolOutput>>>,
    submit_hook: Mutex<Option<SubmitHook>>,
    observations: Mutex<Vec<Option<String>>>,
}

impl Default for MockAssistant {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAssistant {
    pub fn new() -> Self {
        Self {
            runs: Mutex::new(VecDeque::new()),
            submits: Mutex::new(VecDeque::new()),
            replies: Mutex::new(VecDeque::new()),
            failures: Mutex::new(HashMap::new()),
            default_reply: Mutex::new("reply".to_string()),
            fetch_delay: Mutex::new(Duration::ZERO),
            next_thread: Mutex::new(1),
            calls: Mutex::new(Vec::new()),
            added: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            submit_hook: Mutex::new(None),
            observations: Mutex::new(Vec::new()),
        }
    }

    /// Queue the snapshot returned by the next status fetch
    pub fn queue_run(&self, snapshot: RunSnapshot) {
        self.runs.lock().unwrap().push_back(Ok(snapshot));
    }

    /// Queue a failed status fetch
    pub fn queue_run_error(&self, error: AssistantError) {
        self.runs.lock().unwrap().push_back(Err(error));
    }

    /// Queue the snapshot returned by the next output submission
    pub fn queue_submit(&self, snapshot: RunSnapshot) {
        self.submits.lock().unwrap().push_back(snapshot);
    }

    /// Queue the result of the next message listing
    pub fn queue_reply(&self, reply: Result<Vec<ThreadMessage>, AssistantError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Text returned by message listings once the queue is empty
    pub fn set_reply(&self, text: impl Into<String>) {
        *self.default_reply.lock().unwrap() = text.into();
    }

    /// Fail the next call to `operation`
    pub fn fail_next(&self, operation: &'static str, error: AssistantError) {
        self.failures.lock().unwrap().insert(operation, error);
    }

    /// Slow down every status fetch; the call is recorded after the delay
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    /// Run `hook` on every submission, recording what it returns
    pub fn on_submit(&self, hook: impl Fn() -> Option<String> + Send + Sync + 'static) {
        *self.submit_hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == operation)
            .count()
    }

    /// `(thread_id, content)` of every appended message
    pub fn added_messages(&self) -> Vec<(String, String)> {
        self.added.lock().unwrap().clone()
    }

    pub fn submitted_outputs(&self) -> Vec<Vec<ToolOutput>> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn submit_observations(&self) -> Vec<Option<String>> {
        self.observations.lock().unwrap().clone()
    }

    fn record(&self, operation: &'static str) -> Result<(), AssistantError> {
        self.calls.lock().unwrap().push(operation);
        match self.failures.lock().unwrap().remove(operation) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AssistantService for MockAssistant {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        self.record("create_thread")?;
        let mut next = self.next_thread.lock().unwrap();
        let id = format!("thread-{next}");
        *next += 1;
        Ok(id)
    }

    async fn add_message(
        &self,
        thread_id: &str,
        _role: MessageRole,
        content: &str,
    ) -> Result<(), AssistantError> {
        self.record("add_message")?;
        self.added
            .lock()
            .unwrap()
            .push((thread_id.to_string(), content.to_string()));
        Ok(())
    }

    async fn create_run(
        &self,
        _thread_id: &str,
        _assistant_id: &str,
    ) -> Result<RunSnapshot, AssistantError> {
        self.record("create_run")?;
        Ok(RunSnapshot::new("run-1", RunStatus::Queued))
    }

    async fn retrieve_run(
        &self,
        _thread_id: &str,
        run_id: &str,
    ) -> Result<RunSnapshot, AssistantError> {
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.record("retrieve_run")?;
        self.runs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RunSnapshot::new(run_id, RunStatus::InProgress)))
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunSnapshot, AssistantError> {
        self.record("submit_tool_outputs")?;
        if let Some(hook) = self.submit_hook.lock().unwrap().as_ref() {
            self.observations.lock().unwrap().push(hook());
        }
        self.submitted.lock().unwrap().push(outputs.to_vec());
        Ok(self
            .submits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| RunSnapshot::new(run_id, RunStatus::Queued)))
    }

    async fn list_messages(
        &self,
        _thread_id: &str,
        _limit: u32,
    ) -> Result<Vec<ThreadMessage>, AssistantError> {
        self.record("list_messages")?;
        let queued = self.replies.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| {
            let text = self.default_reply.lock().unwrap().clone();
            Ok(vec![ThreadMessage::assistant("msg-latest", text)])
        })
    }
}

// ============================================================================
// In-Memory Storage
// ============================================================================

/// In-memory storage for testing
///
/// Mirrors the database's filtering: lookups and targeted updates only see
/// active conversations.
#[derive(Default)]
pub struct InMemoryStorage {
    conversations: Mutex<HashMap<String, Conversation>>,
    messages: Mutex<HashMap<String, Vec<Message>>>,
    next_msg_id: Mutex<u64>,
    content_failure: Mutex<Option<String>>,
    message_failure: Mutex<Option<String>>,
    status_failure: Mutex<Option<String>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an active draft conversation with no context id
    pub fn insert_conversation(&self, owner_id: &str, conv_id: &str) -> Conversation {
        let now = Utc::now();
        let conv = Conversation {
            id: conv_id.to_string(),
            owner_id: owner_id.to_string(),
            name: format!("Plan {conv_id}"),
            status: ConversationStatus::Draft,
            active: true,
            execution_context_id: None,
            content: "{}".to_string(),
            created_at: now,
            updated_at: now,
        };
        self.conversations
            .lock()
            .unwrap()
            .insert(conv_id.to_string(), conv.clone());
        conv
    }

    pub fn deactivate(&self, conv_id: &str) {
        if let Some(conv) = self.conversations.lock().unwrap().get_mut(conv_id) {
            conv.active = false;
        }
    }

    pub fn set_context(&self, conv_id: &str, context_id: &str) {
        if let Some(conv) = self.conversations.lock().unwrap().get_mut(conv_id) {
            conv.execution_context_id = Some(context_id.to_string());
        }
    }

    pub fn content_of(&self, conv_id: &str) -> Option<String> {
        self.conversations
            .lock()
            .unwrap()
            .get(conv_id)
            .map(|c| c.content.clone())
    }

    pub fn context_of(&self, conv_id: &str) -> Option<String> {
        self.conversations
            .lock()
            .unwrap()
            .get(conv_id)
            .and_then(|c| c.context_id().map(String::from))
    }

    /// Every turn of a conversation, in order
    pub fn messages(&self, conv_id: &str) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap()
            .get(conv_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Make structured content updates fail with `message`
    pub fn fail_content_updates(&self, message: &str) {
        *self.content_failure.lock().unwrap() = Some(message.to_string());
    }

    /// Make message inserts fail with `message`
    pub fn fail_message_writes(&self, message: &str) {
        *self.message_failure.lock().unwrap() = Some(message.to_string());
    }

    /// Make message status updates fail with `message`
    pub fn fail_status_updates(&self, message: &str) {
        *self.status_failure.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl MessageStore for InMemoryStorage {
    async fn add_message(&self, message: &NewMessage) -> Result<Message, String> {
        if let Some(error) = self.message_failure.lock().unwrap().clone() {
            return Err(error);
        }

        let mut next = self.next_msg_id.lock().unwrap();
        *next += 1;
        let now = Utc::now();
        let mut messages = self.messages.lock().unwrap();
        let transcript = messages.entry(message.conversation_id.clone()).or_default();
        let stored = Message {
            id: format!("msg-{next}"),
            conversation_id: message.conversation_id.clone(),
            sequence_id: i64::try_from(transcript.len()).unwrap_or(i64::MAX) + 1,
            role: message.role,
            content: message.content.clone(),
            status: message.status,
            created_at: now,
            updated_at: now,
        };
        transcript.push(stored.clone());
        Ok(stored)
    }

    async fn update_message_status(
        &self,
        message_id: &str,
        status: MessageStatus,
    ) -> Result<bool, String> {
        if let Some(error) = self.status_failure.lock().unwrap().clone() {
            return Err(error);
        }

        let mut messages = self.messages.lock().unwrap();
        let found = messages
            .values_mut()
            .flat_map(|transcript| transcript.iter_mut())
            .find(|m| m.id == message_id)
            .ok_or_else(|| format!("Message not found: {message_id}"))?;

        if !found.status.can_transition_to(status) {
            return Ok(false);
        }
        found.status = status;
        found.updated_at = Utc::now();
        Ok(true)
    }

    async fn get_messages(&self, conv_id: &str) -> Result<Vec<Message>, String> {
        Ok(self.messages(conv_id))
    }
}

#[async_trait]
impl ConversationStore for InMemoryStorage {
    async fn get_conversation(
        &self,
        owner_id: &str,
        conv_id: &str,
    ) -> Result<Option<Conversation>, String> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .get(conv_id)
            .filter(|c| c.owner_id == owner_id && c.active)
            .cloned())
    }

    async fn set_execution_context_id(
        &self,
        conv_id: &str,
        context_id: &str,
    ) -> Result<bool, String> {
        let mut conversations = self.conversations.lock().unwrap();
        match conversations.get_mut(conv_id) {
            Some(conv) if conv.active && conv.context_id().is_none() => {
                conv.execution_context_id = Some(context_id.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_structured_content(
        &self,
        conv_id: &str,
        content: &str,
    ) -> Result<bool, String> {
        if let Some(error) = self.content_failure.lock().unwrap().clone() {
            return Err(error);
        }
        let mut conversations = self.conversations.lock().unwrap();
        match conversations.get_mut(conv_id) {
            Some(conv) if conv.active => {
                conv.content = content.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
