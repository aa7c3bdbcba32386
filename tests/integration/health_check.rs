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

//! Integration tests for periodic health supervision.
//!
//! - the periodic task heals a stuck connection without operator input
//! - health observations stream through the broadcaster
//! - a healthy connection is never restarted
//! - stopping the periodic task stops the checks

use std::sync::Arc;
use std::time::Duration;

use chatlink::broadcast::StatusBroadcaster;
use chatlink::connection::{ConnectionManager, ReconnectPolicy};
use chatlink::health::HealthMonitor;
use chatlink::session::scripted::{ScriptedConnector, SessionDriver};
use chatlink::session::CloseReason;
use chatlink_proto::status::ConnectionState;
use tokio::sync::mpsc;

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        connect_timeout: Duration::from_secs(2),
        reconnect_backoff: Duration::from_millis(20),
        max_reconnect_attempts: 1,
        settle_delay: Duration::from_millis(10),
    }
}

fn make_manager() -> (
    Arc<ConnectionManager<ScriptedConnector>>,
    mpsc::UnboundedReceiver<SessionDriver>,
    Arc<StatusBroadcaster>,
) {
    let (connector, drivers) = ScriptedConnector::new();
    let broadcaster = Arc::new(StatusBroadcaster::new(64));
    let (manager, _receipts) =
        ConnectionManager::new(connector, fast_policy(), Arc::clone(&broadcaster));
    (manager, drivers, broadcaster)
}

async fn wait_for_state(
    manager: &Arc<ConnectionManager<ScriptedConnector>>,
    state: ConnectionState,
) {
    let mut rx = manager.watch_status();
    tokio::time::timeout(Duration::from_secs(3), rx.wait_for(|s| s.state == state))
        .await
        .expect("timed out waiting for state")
        .expect("status watch closed");
}

#[tokio::test]
async fn periodic_task_heals_a_stuck_connection() {
    let (manager, mut drivers, broadcaster) = make_manager();
    manager.start().await.unwrap();
    let driver = drivers.recv().await.unwrap();

    // Exhaust the single reconnect attempt so the manager gets stuck in
    // Error, the state only a restart leaves.
    manager.connector().refuse_next("gateway down");
    driver.close(CloseReason::Lost(1006)).await;
    wait_for_state(&manager, ConnectionState::Error).await;

    let monitor = HealthMonitor::new(Arc::clone(&broadcaster));
    let periodic = monitor.start_periodic(Arc::clone(&manager), Duration::from_millis(50));

    wait_for_state(&manager, ConnectionState::Connected).await;
    periodic.stop().await;

    let snapshot = broadcaster.latest_health().unwrap();
    assert!(snapshot.is_healthy);
}

#[tokio::test]
async fn health_observations_stream_through_the_broadcaster() {
    let (manager, _drivers, broadcaster) = make_manager();
    manager.start().await.unwrap();

    let mut sub = broadcaster.subscribe_health();

    let monitor = HealthMonitor::new(Arc::clone(&broadcaster));
    let periodic = monitor.start_periodic(Arc::clone(&manager), Duration::from_millis(30));

    // At least two observations arrive, all healthy.
    for _ in 0..2 {
        let snapshot = tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .expect("timed out waiting for health snapshot")
            .expect("health stream closed");
        assert!(snapshot.is_healthy);
        assert!(!snapshot.requires_restart);
        assert_eq!(snapshot.state, ConnectionState::Connected);
    }

    periodic.stop().await;
}

#[tokio::test]
async fn healthy_connection_is_never_restarted() {
    let (manager, mut drivers, broadcaster) = make_manager();
    manager.start().await.unwrap();
    let driver = drivers.recv().await.unwrap();

    let monitor = HealthMonitor::new(Arc::clone(&broadcaster));
    let periodic = monitor.start_periodic(Arc::clone(&manager), Duration::from_millis(20));

    // Several check periods pass; the session is left alone.
    tokio::time::sleep(Duration::from_millis(150)).await;
    periodic.stop().await;

    assert!(!driver.ended());
    assert_eq!(manager.connector().connect_count(), 1);
    assert!(drivers.try_recv().is_err());
}

#[tokio::test]
async fn stop_halts_the_checks() {
    let (manager, _drivers, broadcaster) = make_manager();
    manager.start().await.unwrap();

    let monitor = HealthMonitor::new(Arc::clone(&broadcaster));
    let periodic = monitor.start_periodic(Arc::clone(&manager), Duration::from_millis(20));

    // Let a few checks run, then stop.
    tokio::time::sleep(Duration::from_millis(100)).await;
    periodic.stop().await;

    // No further observations arrive after stop returns.
    let mut sub = broadcaster.subscribe_health();
    let _initial = sub.next().await; // snapshot of the last check
    let next = tokio::time::timeout(Duration::from_millis(150), sub.next()).await;
    assert!(next.is_err(), "health check ran after stop");
}
