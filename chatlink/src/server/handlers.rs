//! REST handlers and the API error mapping.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use chatlink_proto::message::{self, MessageId, MessageRecord, MessageStatus};
use chatlink_proto::status::{ConnectionState, ConnectionStatusEvent, HealthSnapshot};

use super::AppState;
use crate::connection::ConnectionError;
use crate::session::SessionConnector;
use crate::tracker::TrackerError;

/// `POST /v1/messages` request body.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Destination identifier on the chat network.
    pub recipient: String,
    /// Message body (non-empty, at most 64 KB).
    pub body: String,
    /// Client-supplied id for idempotent retries; generated when absent.
    #[serde(default)]
    pub id: Option<MessageId>,
}

/// `POST /v1/messages` response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    /// Whether the message was handed to the gateway.
    pub accepted: bool,
    /// The id the message is tracked under.
    pub id: MessageId,
    /// Why the message was not accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `POST /v1/connection/restart` request body.
#[derive(Debug, Deserialize)]
pub struct RestartRequest {
    /// Tear down a live session too.
    #[serde(default)]
    pub force: bool,
    /// Recorded in the logs and the resulting status message.
    #[serde(default = "default_restart_reason")]
    pub reason: String,
}

fn default_restart_reason() -> String {
    "api request".to_string()
}

/// `POST /v1/connection/restart` response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct RestartResponse {
    /// Whether the restart ran.
    pub accepted: bool,
    /// Connection state after the restart settled.
    pub state: ConnectionState,
    /// Human-readable description of the new state.
    pub message: String,
}

/// Uniform error body for non-2xx responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Short, client-safe reason.
    pub error: String,
}

/// API-level error with its HTTP mapping.
///
/// Client-correctable conditions map to 4xx with a concrete reason;
/// upstream and internal faults map to 5xx with a generic message so no
/// internal diagnostics leak.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request failed validation.
    #[error(transparent)]
    Validation(#[from] message::ValidationError),

    /// Path parameter was not a valid message id.
    #[error("invalid message id")]
    InvalidId,

    /// Tracker rejected the operation.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// Connection manager rejected or failed the operation.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl ApiError {
    /// The HTTP status and client-facing reason for this error.
    fn status_and_reason(&self) -> (StatusCode, String) {
        match self {
            Self::Validation(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            Self::InvalidId => (StatusCode::BAD_REQUEST, "invalid message id".to_string()),
            Self::Tracker(TrackerError::DuplicateMessageId(id)) => (
                StatusCode::CONFLICT,
                format!("duplicate message id: {id}"),
            ),
            Self::Tracker(TrackerError::UnknownMessageId(_)) => (
                StatusCode::NOT_FOUND,
                "unknown message id".to_string(),
            ),
            Self::Connection(e @ (ConnectionError::NotConnected
            | ConnectionError::RestartRejected)) => (StatusCode::CONFLICT, e.to_string()),
            Self::Connection(ConnectionError::SettleTimeout) => (
                StatusCode::GATEWAY_TIMEOUT,
                "connection did not settle in time".to_string(),
            ),
            // Acquisition and session faults: no internal diagnostics leaked.
            Self::Connection(_) => (
                StatusCode::BAD_GATEWAY,
                "upstream session failure".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_reason();
        (status, Json(ErrorBody { error })).into_response()
    }
}

/// `POST /v1/messages` — validate, track as `Pending`, write to the session.
///
/// A `202` means the frame reached the gateway; the record stays `Pending`
/// until the gateway acknowledges it (receipts then advance it to `Sent`,
/// `Delivered`, `Read`). A failed session write marks the record `Failed`
/// and reports `accepted: false`.
pub async fn send_message<C: SessionConnector + 'static>(
    State(state): State<Arc<AppState<C>>>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Response, ApiError> {
    message::validate_outbound(&req.recipient, &req.body)?;

    let id = req.id.unwrap_or_default();
    state.tracker.record(id, &req.recipient)?;

    match state.manager.send(id, &req.recipient, &req.body).await {
        Ok(()) => {
            tracing::debug!(id = %id, recipient = %req.recipient, "message handed to gateway");
            Ok((
                StatusCode::ACCEPTED,
                Json(SendMessageResponse {
                    accepted: true,
                    id,
                    reason: None,
                }),
            )
                .into_response())
        }
        Err(e) => {
            tracing::warn!(id = %id, err = %e, "message send failed");
            let _ = state
                .tracker
                .update_status(id, MessageStatus::Failed, Some(e.to_string()));
            let (status, reason) = ApiError::Connection(e).status_and_reason();
            Ok((
                status,
                Json(SendMessageResponse {
                    accepted: false,
                    id,
                    reason: Some(reason),
                }),
            )
                .into_response())
        }
    }
}

/// `GET /v1/messages/{id}` — the tracked delivery record.
pub async fn get_message<C: SessionConnector + 'static>(
    State(state): State<Arc<AppState<C>>>,
    Path(id): Path<String>,
) -> Result<Json<MessageRecord>, ApiError> {
    let id: MessageId = id.parse().map_err(|_| ApiError::InvalidId)?;
    state
        .tracker
        .get(id)
        .map(Json)
        .ok_or(ApiError::Tracker(TrackerError::UnknownMessageId(id)))
}

/// `GET /v1/connection` — the current status event (info present iff
/// connected).
pub async fn get_connection<C: SessionConnector + 'static>(
    State(state): State<Arc<AppState<C>>>,
) -> Json<ConnectionStatusEvent> {
    Json(state.manager.status())
}

/// `POST /v1/connection/restart` — operator restart. May legitimately take
/// the settle delay plus connect time to respond.
pub async fn restart_connection<C: SessionConnector + 'static>(
    State(state): State<Arc<AppState<C>>>,
    Json(req): Json<RestartRequest>,
) -> Result<Json<RestartResponse>, ApiError> {
    let new_state = state.manager.restart(req.force, &req.reason).await?;
    Ok(Json(RestartResponse {
        accepted: true,
        state: new_state,
        message: new_state.describe().to_string(),
    }))
}

/// `GET /v1/health` — health snapshot computed on demand (does not run a
/// check and never restarts anything).
pub async fn get_health<C: SessionConnector + 'static>(
    State(state): State<Arc<AppState<C>>>,
) -> Json<HealthSnapshot> {
    Json(HealthSnapshot::observe(state.manager.state()))
}
