//! Plan persistence tool
//!
//! Stores the call's argument payload verbatim as the conversation's
//! structured content. Only that field is touched.

use super::{ToolContext, ToolHandler, ACKNOWLEDGMENT, SAVE_PLAN};
use crate::assistant::ToolCall;
use async_trait::async_trait;

pub struct SavePlanTool;

#[async_trait]
impl ToolHandler for SavePlanTool {
    fn name(&self) -> &'static str {
        SAVE_PLAN
    }

    async fn handle(&self, call: &ToolCall, ctx: &ToolContext<'_>) -> Result<String, String> {
        let updated = ctx
            .store
            .update_structured_content(ctx.conversation_id, &call.arguments)
            .await?;

        if !updated {
            return Err(format!(
                "conversation {} not found while saving plan",
                ctx.conversation_id
            ));
        }

        tracing::info!(
            conv_id = %ctx.conversation_id,
            call_id = %call.id,
            bytes = call.arguments.len(),
            "Saved structured plan content"
        );
        Ok(ACKNOWLEDGMENT.to_string())
    }
}
