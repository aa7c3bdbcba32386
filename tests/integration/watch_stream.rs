// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::needless_continue,
    clippy::match_same_arms,
    clippy::doc_markdown,
    clippy::manual_let_else,
    clippy::future_not_send,
    clippy::redundant_pub_crate,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for the WebSocket watch endpoints.
//!
//! Runs the full API server over a scripted session and connects real
//! WebSocket clients:
//! - `/v1/connection/watch` sends the current status first, then live events
//! - a subscriber joining mid-stream still starts from the current state
//! - `/v1/health/watch` streams health observations once checks run
//! - one client disconnecting does not disturb another

use std::sync::Arc;
use std::time::Duration;

use chatlink::broadcast::StatusBroadcaster;
use chatlink::connection::{ConnectionManager, ReconnectPolicy};
use chatlink::health::HealthMonitor;
use chatlink::server::{self, AppState};
use chatlink::session::scripted::{ScriptedConnector, SessionDriver};
use chatlink::session::CloseReason;
use chatlink::tracker::MessageTracker;
use chatlink_proto::status::{ConnectionState, ConnectionStatusEvent, HealthSnapshot};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        connect_timeout: Duration::from_secs(2),
        reconnect_backoff: Duration::from_millis(20),
        max_reconnect_attempts: 2,
        settle_delay: Duration::from_millis(10),
    }
}

struct TestService {
    manager: Arc<ConnectionManager<ScriptedConnector>>,
    broadcaster: Arc<StatusBroadcaster>,
    drivers: mpsc::UnboundedReceiver<SessionDriver>,
    addr: std::net::SocketAddr,
}

/// Boot the whole service on an OS-assigned port.
async fn start_service() -> TestService {
    let (connector, drivers) = ScriptedConnector::new();
    let broadcaster = Arc::new(StatusBroadcaster::new(64));
    let (manager, receipts) =
        ConnectionManager::new(connector, fast_policy(), Arc::clone(&broadcaster));
    let tracker = Arc::new(MessageTracker::default());
    let _receipt_loop = server::spawn_receipt_loop(Arc::clone(&tracker), receipts);

    let state = Arc::new(AppState {
        manager: Arc::clone(&manager),
        tracker,
        broadcaster: Arc::clone(&broadcaster),
    });
    let (addr, _handle) = server::start_server("127.0.0.1:0", state)
        .await
        .expect("failed to start API server");

    TestService {
        manager,
        broadcaster,
        drivers,
        addr,
    }
}

type WsClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect_watch(addr: std::net::SocketAddr, path: &str) -> WsClient {
    let (client, _response) = tokio_tungstenite::connect_async(format!("ws://{addr}{path}"))
        .await
        .expect("watch connect failed");
    client
}

/// Read the next JSON text frame and deserialize it. Panics on timeout.
async fn next_json<T: serde::de::DeserializeOwned>(client: &mut WsClient) -> T {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let msg = tokio::time::timeout_at(deadline, client.next())
            .await
            .expect("timed out waiting for watch frame")
            .expect("watch stream ended")
            .expect("watch stream error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).expect("bad JSON frame"),
            // Skip control frames.
            _ => continue,
        }
    }
}

#[tokio::test]
async fn connection_watch_sends_current_state_first() {
    let service = start_service().await;

    // Not started yet: the first frame is the Disconnected snapshot.
    let mut client = connect_watch(service.addr, "/v1/connection/watch").await;
    let first: ConnectionStatusEvent = next_json(&mut client).await;
    assert_eq!(first.state, ConnectionState::Disconnected);
    assert!(first.info.is_none());

    // Start the connection and observe the live transitions in order.
    service.manager.start().await.unwrap();
    let second: ConnectionStatusEvent = next_json(&mut client).await;
    assert_eq!(second.state, ConnectionState::Connecting);
    let third: ConnectionStatusEvent = next_json(&mut client).await;
    assert_eq!(third.state, ConnectionState::Connected);
    assert_eq!(third.info.unwrap().identity, "test@chat");
}

#[tokio::test]
async fn late_subscriber_starts_from_current_state() {
    let mut service = start_service().await;
    service.manager.start().await.unwrap();
    let driver = service.drivers.recv().await.unwrap();

    // Join after the connection settled.
    let mut client = connect_watch(service.addr, "/v1/connection/watch").await;
    let first: ConnectionStatusEvent = next_json(&mut client).await;
    assert_eq!(first.state, ConnectionState::Connected);

    // A later transition still arrives live.
    driver.close(CloseReason::Lost(1006)).await;
    let next: ConnectionStatusEvent = next_json(&mut client).await;
    assert_eq!(next.state, ConnectionState::Reconnecting);
}

#[tokio::test]
async fn health_watch_streams_observations() {
    let service = start_service().await;
    service.manager.start().await.unwrap();

    let mut client = connect_watch(service.addr, "/v1/health/watch").await;

    let monitor = HealthMonitor::new(Arc::clone(&service.broadcaster));
    let periodic = monitor.start_periodic(Arc::clone(&service.manager), Duration::from_millis(30));

    let snapshot: HealthSnapshot = next_json(&mut client).await;
    assert!(snapshot.is_healthy);
    assert_eq!(snapshot.state, ConnectionState::Connected);

    periodic.stop().await;
}

#[tokio::test]
async fn one_client_disconnecting_does_not_disturb_another() {
    let mut service = start_service().await;
    service.manager.start().await.unwrap();
    let driver = service.drivers.recv().await.unwrap();

    let mut keeper = connect_watch(service.addr, "/v1/connection/watch").await;
    let quitter = connect_watch(service.addr, "/v1/connection/watch").await;

    let first: ConnectionStatusEvent = next_json(&mut keeper).await;
    assert_eq!(first.state, ConnectionState::Connected);

    drop(quitter);
    tokio::time::sleep(Duration::from_millis(50)).await;

    driver.close(CloseReason::Lost(1006)).await;
    let next: ConnectionStatusEvent = next_json(&mut keeper).await;
    assert_eq!(next.state, ConnectionState::Reconnecting);
}
