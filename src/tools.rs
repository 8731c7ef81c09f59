//! Tool-call dispatch
//!
//! A paused run lists the callbacks it needs answered. Each callback name
//! maps to a registered handler; names nobody registered fall through to
//! a default acknowledgment so the remote toolset can evolve on its own.

mod save_plan;

pub use save_plan::SavePlanTool;

use crate::assistant::{ToolCall, ToolOutput};
use crate::runtime::ConversationStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Output sent back for calls that need no real answer
pub const ACKNOWLEDGMENT: &str = "ok";

/// Tool name the plan handler is registered under
pub const SAVE_PLAN: &str = "save_plan";

/// Older assistant configurations still call the plan tool by this name
pub const SAVE_PLAN_LEGACY: &str = "save_pdi";

/// Per-call context handed to tool handlers
pub struct ToolContext<'a> {
    /// The conversation the run belongs to
    pub conversation_id: &'a str,
    pub store: &'a dyn ConversationStore,
}

/// A local side effect the remote run can request
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Perform the side effect, returning the text to hand back to the run
    async fn handle(&self, call: &ToolCall, ctx: &ToolContext<'_>) -> Result<String, String>;
}

/// A side effect failed; the batch is abandoned
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("tool {tool} ({call_id}) failed: {message}")]
pub struct ToolError {
    pub call_id: String,
    pub tool: String,
    pub message: String,
}

/// Acknowledges calls that have no registered handler
pub struct AcknowledgeTool;

#[async_trait]
impl ToolHandler for AcknowledgeTool {
    fn name(&self) -> &'static str {
        "acknowledge"
    }

    async fn handle(&self, call: &ToolCall, ctx: &ToolContext<'_>) -> Result<String, String> {
        tracing::warn!(
            conv_id = %ctx.conversation_id,
            tool = %call.name,
            call_id = %call.id,
            "Unknown tool requested, acknowledging without side effects"
        );
        Ok(ACKNOWLEDGMENT.to_string())
    }
}

/// Name → handler table with an explicit default
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    fallback: Arc<dyn ToolHandler>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

impl ToolRegistry {
    /// Registry with no handlers; every call is acknowledged
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(AcknowledgeTool),
        }
    }

    /// Handlers the production assistant uses
    pub fn standard() -> Self {
        let save_plan: Arc<dyn ToolHandler> = Arc::new(SavePlanTool);
        let mut registry = Self::empty();
        registry.register_as(SAVE_PLAN, Arc::clone(&save_plan));
        registry.register_as(SAVE_PLAN_LEGACY, save_plan);
        registry
    }

    /// Register a handler under its own name
    #[cfg(test)]
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.name().to_string();
        self.handlers.insert(name, handler);
    }

    /// Register a handler under an explicit callback name
    pub fn register_as(&mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    #[allow(dead_code)] // Used in tests
    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    fn handler_for(&self, name: &str) -> &Arc<dyn ToolHandler> {
        self.handlers.get(name).unwrap_or(&self.fallback)
    }

    /// Answer one pause worth of calls
    ///
    /// Produces one output per call, in call order. Stops at the first
    /// failing side effect without running the rest. A call id repeated
    /// within the batch runs its side effect once and reuses the answer.
    pub async fn dispatch(
        &self,
        ctx: &ToolContext<'_>,
        calls: &[ToolCall],
    ) -> Result<Vec<ToolOutput>, ToolError> {
        let mut answered: HashMap<&str, String> = HashMap::new();
        let mut outputs = Vec::with_capacity(calls.len());

        for call in calls {
            if let Some(output) = answered.get(call.id.as_str()) {
                outputs.push(ToolOutput::new(&call.id, output.clone()));
                continue;
            }

            let handler = self.handler_for(&call.name);
            tracing::debug!(
                conv_id = %ctx.conversation_id,
                tool = %call.name,
                call_id = %call.id,
                "Dispatching tool call"
            );

            let output = handler.handle(call, ctx).await.map_err(|message| ToolError {
                call_id: call.id.clone(),
                tool: call.name.clone(),
                message,
            })?;

            answered.insert(call.id.as_str(), output.clone());
            outputs.push(ToolOutput::new(&call.id, output));
        }

        Ok(outputs)
    }
}
