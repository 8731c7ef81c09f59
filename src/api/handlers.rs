//! HTTP request handlers

use super::types::{ErrorResponse, SubmitTurnRequest, TurnListResponse, TurnView};
use super::AppState;
use crate::runtime::{ErrorCategory, TurnError};
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

/// Header carrying the authenticated user id, set by the upstream auth layer
pub const OWNER_HEADER: &str = "x-user-id";

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/pdis/:id/chat", get(list_turns).post(submit_turn))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn submit_turn(
    State(state): State<AppState>,
    Path(conv_id): Path<String>,
    OwnerId(owner_id): OwnerId,
    body: Result<Json<SubmitTurnRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Vec<TurnView>>), AppError> {
    let Json(request) = body.map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?;

    let exchange = state
        .turns
        .submit_turn(&owner_id, &conv_id, &request.content, request.role.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(vec![
            TurnView::from(&exchange.user),
            TurnView::from(&exchange.assistant),
        ]),
    ))
}

async fn list_turns(
    State(state): State<AppState>,
    Path(conv_id): Path<String>,
    OwnerId(owner_id): OwnerId,
) -> Result<Json<TurnListResponse>, AppError> {
    let turns = state.turns.list_turns(&owner_id, &conv_id).await?;
    Ok(Json(TurnListResponse {
        messages: turns.iter().map(TurnView::from).collect(),
    }))
}

// ============================================================
// Owner identity
// ============================================================

/// Authenticated owner of the request
pub struct OwnerId(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for OwnerId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| OwnerId(value.to_string()))
            .ok_or_else(|| AppError::Unauthorized("User is not authenticated".to_string()))
    }
}

// ============================================================
// Error handling
// ============================================================

pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Internal(String),
    ServiceUnavailable(String),
}

impl From<TurnError> for AppError {
    fn from(error: TurnError) -> Self {
        match error.category() {
            ErrorCategory::Validation => AppError::BadRequest(error.to_string()),
            ErrorCategory::NotFound => AppError::NotFound("Conversation not found".to_string()),
            ErrorCategory::Inactive => {
                AppError::BadRequest("Conversation is not active".to_string())
            }
            ErrorCategory::Processing => {
                tracing::error!(kind = error.kind(), error = %error, "Turn processing failed");
                AppError::Internal("Failed to process message".to_string())
            }
            ErrorCategory::Internal => {
                tracing::error!(kind = error.kind(), error = %error, "Internal failure");
                AppError::Internal("Internal error".to_string())
            }
            ErrorCategory::Cancelled => {
                AppError::ServiceUnavailable("Server is shutting down".to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
