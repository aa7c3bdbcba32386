//! WebSocket watch endpoints.
//!
//! Each accepted socket gets its own broadcaster subscription: the first
//! frame is the current state snapshot (for the status stream), then live
//! events follow as JSON text frames. A client disconnecting tears down
//! only its own subscription.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde::Serialize;

use super::AppState;
use crate::broadcast::Subscription;
use crate::session::SessionConnector;

/// `GET /v1/connection/watch` — stream of connection status events.
pub async fn watch_connection<C: SessionConnector + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<C>>>,
) -> impl IntoResponse {
    let subscription = state.broadcaster.subscribe_status();
    ws.on_upgrade(move |socket| stream_events(socket, subscription))
}

/// `GET /v1/health/watch` — stream of health observations. Yields nothing
/// until the first health check has run.
pub async fn watch_health<C: SessionConnector + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<C>>>,
) -> impl IntoResponse {
    let subscription = state.broadcaster.subscribe_health();
    ws.on_upgrade(move |socket| stream_events(socket, subscription))
}

/// Forwards subscription events to the socket as JSON text frames until
/// either side goes away.
async fn stream_events<T: Serialize + Clone>(mut socket: WebSocket, mut sub: Subscription<T>) {
    while let Some(event) = sub.next().await {
        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(err = %e, "failed to serialize watch event");
                continue;
            }
        };
        if socket.send(Message::Text(text.into())).await.is_err() {
            // Client disconnected; drop this subscription only.
            break;
        }
    }
    tracing::debug!("watch stream closed");
}
