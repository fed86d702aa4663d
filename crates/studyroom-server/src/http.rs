//! HTTP surface.
//!
//! - `GET /health`: liveness plus connection and room counts
//! - `GET /ws`: WebSocket upgrade into the chat gateway
//! - `GET /api/chat/{groupId}`: room history (bearer auth)
//! - `DELETE /api/chat/{messageId}`: delete own message (bearer auth), then
//!   broadcast `messageDeleted` to the room like the socket path does

use axum::{
    Json, Router,
    extract::{Path, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use studyroom_proto::{ChatMessage, MessageId, RoomId, UserId};
use thiserror::Error;

use crate::{AppState, gateway_error::GatewayError, socket, storage::MessageStore};

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests
    pub status: String,
    /// Live WebSocket sessions
    pub connections: usize,
    /// Non-empty rooms
    pub rooms: usize,
}

/// Errors returned by REST handlers as `{"error": "..."}`.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing, malformed, or rejected bearer token.
    #[error("invalid or missing token")]
    Unauthorized,

    /// Authenticated but not allowed (not the sender).
    #[error("{0}")]
    Forbidden(String),

    /// Referenced message does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Malformed path parameter.
    #[error("{0}")]
    BadRequest(String),

    /// Storage failure; details are logged, not returned.
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidToken => Self::Unauthorized,
            GatewayError::NotSender { .. } | GatewayError::Session(_) => {
                Self::Forbidden(err.to_string())
            },
            GatewayError::MessageNotFound(_) => Self::NotFound(err.to_string()),
            GatewayError::InvalidPayload(_) | GatewayError::Protocol(_) => {
                Self::BadRequest(err.to_string())
            },
            other => {
                tracing::error!(error = %other, "request failed");
                Self::Internal
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

/// Build the router over shared state.
pub fn router<S: MessageStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health::<S>))
        .route("/ws", get(ws_handler::<S>))
        .route("/api/chat/{id}", get(chat_history::<S>).delete(delete_message::<S>))
        .with_state(state)
}

/// GET /health
async fn health<S: MessageStore>(State(state): State<AppState<S>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        connections: state.gateway.connection_count().await,
        rooms: state.gateway.room_count().await,
    })
}

/// GET /ws
async fn ws_handler<S: MessageStore>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |upgraded| socket::run_socket(upgraded, state))
}

/// GET /api/chat/{groupId}
async fn chat_history<S: MessageStore>(
    State(state): State<AppState<S>>,
    Path(group_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let user_id = authorize(&state, &headers)?;

    let room_id = RoomId::new(group_id);
    if room_id.is_empty() {
        return Err(ApiError::BadRequest("groupId must not be empty".to_string()));
    }

    let history = state.gateway.room_history(&room_id).await?;
    tracing::debug!(%user_id, %room_id, count = history.len(), "history fetched");

    Ok(Json(history))
}

/// DELETE /api/chat/{messageId}
async fn delete_message<S: MessageStore>(
    State(state): State<AppState<S>>,
    Path(message_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = authorize(&state, &headers)?;

    let message_id: MessageId = message_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid message id: {message_id}")))?;

    let actions = state.gateway.delete_message_as(&user_id, message_id).await?;
    state.dispatcher.execute(actions).await;

    Ok(Json(serde_json::json!({ "message": "Message deleted successfully" })))
}

/// Extract and verify the `Authorization: Bearer <token>` header.
fn authorize<S: MessageStore>(
    state: &AppState<S>,
    headers: &HeaderMap,
) -> Result<UserId, ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(ApiError::Unauthorized)?;

    Ok(state.gateway.verify_token(token)?)
}
