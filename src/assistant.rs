//! Remote assistant engine abstraction
//!
//! The engine is an opaque, polling-based remote procedure: execution
//! contexts (threads) hold the transcript, runs compute over them and may
//! pause to request tool outputs.

mod error;
mod openai;
mod types;

pub use error::{AssistantError, AssistantErrorKind};
pub use openai::OpenAIAssistantService;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Common interface for assistant engines
#[async_trait]
pub trait AssistantService: Send + Sync {
    /// Create a new execution context, returning its id
    async fn create_thread(&self) -> Result<String, AssistantError>;

    /// Append a message to an execution context
    async fn add_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), AssistantError>;

    /// Start a run bound to an assistant configuration
    async fn create_run(&self, thread_id: &str, assistant_id: &str)
        -> Result<RunSnapshot, AssistantError>;

    /// Fetch the current state of a run
    async fn retrieve_run(&self, thread_id: &str, run_id: &str)
        -> Result<RunSnapshot, AssistantError>;

    /// Answer the pending tool calls of a paused run
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunSnapshot, AssistantError>;

    /// Most recent messages of a context, newest first
    async fn list_messages(
        &self,
        thread_id: &str,
        limit: u32,
    ) -> Result<Vec<ThreadMessage>, AssistantError>;
}

#[async_trait]
impl<T: AssistantService + ?Sized> AssistantService for Arc<T> {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        (**self).create_thread().await
    }

    async fn add_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), AssistantError> {
        (**self).add_message(thread_id, role, content).await
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<RunSnapshot, AssistantError> {
        (**self).create_run(thread_id, assistant_id).await
    }

    async fn retrieve_run(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<RunSnapshot, AssistantError> {
        (**self).retrieve_run(thread_id, run_id).await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunSnapshot, AssistantError> {
        (**self).submit_tool_outputs(thread_id, run_id, outputs).await
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        limit: u32,
    ) -> Result<Vec<ThreadMessage>, AssistantError> {
        (**self).list_messages(thread_id, limit).await
    }
}

/// Logging wrapper for assistant engines
pub struct LoggingService {
    inner: Arc<dyn AssistantService>,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn AssistantService>) -> Self {
        Self { inner }
    }

    fn log<T>(operation: &str, thread_id: &str, start: Instant, result: &Result<T, AssistantError>) {
        let duration = start.elapsed();
        match result {
            Ok(_) => {
                tracing::debug!(
                    operation,
                    thread_id,
                    duration_ms = %duration.as_millis(),
                    "Assistant call completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    operation,
                    thread_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Assistant call failed"
                );
            }
        }
    }
}

#[async_trait]
impl AssistantService for LoggingService {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        let start = Instant::now();
        let result = self.inner.create_thread().await;
        let thread_id = result.as_deref().unwrap_or("-");
        Self::log("create_thread", thread_id, start, &result);
        result
    }

    async fn add_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), AssistantError> {
        let start = Instant::now();
        let result = self.inner.add_message(thread_id, role, content).await;
        Self::log("add_message", thread_id, start, &result);
        result
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<RunSnapshot, AssistantError> {
        let start = Instant::now();
        let result = self.inner.create_run(thread_id, assistant_id).await;
        Self::log("create_run", thread_id, start, &result);
        result
    }

    async fn retrieve_run(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<RunSnapshot, AssistantError> {
        let start = Instant::now();
        let result = self.inner.retrieve_run(thread_id, run_id).await;
        Self::log("retrieve_run", thread_id, start, &result);
        result
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunSnapshot, AssistantError> {
        let start = Instant::now();
        let result = self
            .inner
            .submit_tool_outputs(thread_id, run_id, outputs)
            .await;
        Self::log("submit_tool_outputs", thread_id, start, &result);
        result
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        limit: u32,
    ) -> Result<Vec<ThreadMessage>, AssistantError> {
        let start = Instant::now();
        let result = self.inner.list_messages(thread_id, limit).await;
        Self::log("list_messages", thread_id, start, &result);
        result
    }
}
