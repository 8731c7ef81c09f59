//! `OpenAI` Assistants (v2) implementation

use super::types::{
    MessageRole, RunError, RunSnapshot, RunStatus, ThreadMessage, ToolCall, ToolOutput,
};
use super::{AssistantError, AssistantService};
use crate::config::AssistantConfig;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const BETA_HEADER: &str = "assistants=v2";

/// Assistants API client
pub struct OpenAIAssistantService {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIAssistantService {
    pub fn new(config: &AssistantConfig) -> Result<Self, AssistantError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AssistantError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("OpenAI-Beta", BETA_HEADER)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AssistantError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AssistantError::network(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                AssistantError::network(format!("Connection failed: {e}"))
            } else {
                AssistantError::unknown(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .text()
            .await
            .map_err(|e| AssistantError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map_or(body, |resp| resp.error.message);
            let mut error = AssistantError::from_status(status.as_u16(), &message);
            if let Some(delay) = retry_after {
                error = error.with_retry_after(delay);
            }
            return Err(error);
        }

        serde_json::from_str(&body).map_err(|e| {
            AssistantError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })
    }

    fn normalize_run(run: ApiRun) -> RunSnapshot {
        let pending_calls = run
            .required_action
            .and_then(|action| action.submit_tool_outputs)
            .map(|submit| {
                submit
                    .tool_calls
                    .into_iter()
                    .map(|call| match call.function {
                        Some(f) => ToolCall::new(call.id, f.name, f.arguments),
                        // Non-function calls still need an answer
                        None => ToolCall::new(call.id, call.r#type, String::new()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        RunSnapshot {
            id: run.id,
            status: run.status,
            pending_calls,
            last_error: run.last_error.map(|e| RunError {
                code: e.code,
                message: e.message,
            }),
        }
    }

    fn normalize_message(message: ApiMessage) -> ThreadMessage {
        let role = if message.role == "user" {
            MessageRole::User
        } else {
            MessageRole::Assistant
        };
        let text = message
            .content
            .into_iter()
            .filter(|part| part.r#type == "text")
            .filter_map(|part| part.text.map(|t| t.value))
            .collect();

        ThreadMessage {
            id: message.id,
            role,
            text,
        }
    }
}

#[async_trait]
impl AssistantService for OpenAIAssistantService {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        let thread: ApiThread = self
            .send(self.request(Method::POST, "/threads").json(&serde_json::json!({})))
            .await?;
        Ok(thread.id)
    }

    async fn add_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), AssistantError> {
        let body = CreateMessageRequest {
            role: role.as_str(),
            content,
        };
        let _: ApiMessage = self
            .send(
                self.request(Method::POST, &format!("/threads/{thread_id}/messages"))
                    .json(&body),
            )
            .await?;
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<RunSnapshot, AssistantError> {
        let run: ApiRun = self
            .send(
                self.request(Method::POST, &format!("/threads/{thread_id}/runs"))
                    .json(&CreateRunRequest { assistant_id }),
            )
            .await?;
        Ok(Self::normalize_run(run))
    }

    async fn retrieve_run(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<RunSnapshot, AssistantError> {
        let run: ApiRun = self
            .send(self.request(Method::GET, &format!("/threads/{thread_id}/runs/{run_id}")))
            .await?;
        Ok(Self::normalize_run(run))
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunSnapshot, AssistantError> {
        let body = SubmitToolOutputsRequest {
            tool_outputs: outputs
                .iter()
                .map(|o| ApiToolOutput {
                    tool_call_id: &o.call_id,
                    output: &o.output,
                })
                .collect(),
        };
        let run: ApiRun = self
            .send(
                self.request(
                    Method::POST,
                    &format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
                )
                .json(&body),
            )
            .await?;
        Ok(Self::normalize_run(run))
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        limit: u32,
    ) -> Result<Vec<ThreadMessage>, AssistantError> {
        let list: ApiList<ApiMessage> = self
            .send(
                self.request(Method::GET, &format!("/threads/{thread_id}/messages"))
                    .query(&[("limit", limit.to_string()), ("order", "desc".to_string())]),
            )
            .await?;
        Ok(list.data.into_iter().map(Self::normalize_message).collect())
    }
}

// Assistants API types

#[derive(Debug, Serialize)]
struct CreateMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

#[derive(Debug, Serialize)]
struct SubmitToolOutputsRequest<'a> {
    tool_outputs: Vec<ApiToolOutput<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiToolOutput<'a> {
    tool_call_id: &'a str,
    output: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiThread {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiRun {
    id: String,
    status: RunStatus,
    #[serde(default)]
    required_action: Option<ApiRequiredAction>,
    #[serde(default)]
    last_error: Option<ApiRunError>,
}

#[derive(Debug, Deserialize)]
struct ApiRequiredAction {
    #[serde(default)]
    submit_tool_outputs: Option<ApiSubmitToolOutputs>,
}

#[derive(Debug, Deserialize)]
struct ApiSubmitToolOutputs {
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    #[serde(default)]
    function: Option<ApiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiRunError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    id: String,
    role: String,
    #[serde(default)]
    content: Vec<ApiContentPart>,
}

#[derive(Debug, Deserialize)]
struct ApiContentPart {
    r#type: String,
    #[serde(default)]
    text: Option<ApiText>,
}

#[derive(Debug, Deserialize)]
struct ApiText {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}
