//! HTTP/WebSocket service layer.
//!
//! Exposes the connection manager, message tracker, and broadcaster over a
//! small axum API:
//!
//! - `POST /v1/messages` — submit a message
//! - `GET  /v1/messages/{id}` — delivery status of a tracked message
//! - `GET  /v1/connection` — current connection status
//! - `POST /v1/connection/restart` — operator restart
//! - `GET  /v1/connection/watch` — WebSocket stream of status events
//! - `GET  /v1/health` — health snapshot computed on demand
//! - `GET  /v1/health/watch` — WebSocket stream of health observations

pub mod handlers;
pub mod watch;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::sync::mpsc;

use crate::broadcast::StatusBroadcaster;
use crate::connection::ConnectionManager;
use crate::session::{Receipt, SessionConnector};
use crate::tracker::MessageTracker;

/// Shared service state handed to every handler.
pub struct AppState<C: SessionConnector> {
    /// The supervised connection.
    pub manager: Arc<ConnectionManager<C>>,
    /// Delivery records for submitted messages.
    pub tracker: Arc<MessageTracker>,
    /// Fan-out hub backing the watch endpoints.
    pub broadcaster: Arc<StatusBroadcaster>,
}

/// Builds the API router over the given state.
pub fn router<C: SessionConnector + 'static>(state: Arc<AppState<C>>) -> Router {
    Router::new()
        .route("/v1/messages", post(handlers::send_message::<C>))
        .route("/v1/messages/{id}", get(handlers::get_message::<C>))
        .route("/v1/connection", get(handlers::get_connection::<C>))
        .route(
            "/v1/connection/restart",
            post(handlers::restart_connection::<C>),
        )
        .route("/v1/connection/watch", get(watch::watch_connection::<C>))
        .route("/v1/health", get(handlers::get_health::<C>))
        .route("/v1/health/watch", get(watch::watch_health::<C>))
        .with_state(state)
}

/// Starts the API server on the given address and returns the bound address
/// and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server<C: SessionConnector + 'static>(
    addr: &str,
    state: Arc<AppState<C>>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Drains the manager's receipt channel into the tracker.
///
/// Delivery confirmation is asynchronous: receipts arrive here long after
/// the originating send returned. Receipts for untracked ids (evicted or
/// never ours) are logged and dropped.
pub fn spawn_receipt_loop(
    tracker: Arc<MessageTracker>,
    mut receipts: mpsc::Receiver<Receipt>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(receipt) = receipts.recv().await {
            if let Err(e) = tracker.update_status(receipt.id, receipt.status, receipt.detail) {
                tracing::warn!(err = %e, "receipt for untracked message");
            }
        }
        tracing::debug!("receipt loop exiting");
    })
}
