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

//! Integration tests for restart semantics.
//!
//! - an unforced restart is rejected while the connection is live
//! - a forced restart ends the old session and opens a new one
//! - a restart recovers a LoggedOut connection without force
//! - a restart cancels the old session's automatic reconnection
//! - a restart whose acquisition fails lands in Error

use std::sync::Arc;
use std::time::Duration;

use chatlink::broadcast::StatusBroadcaster;
use chatlink::connection::{ConnectionError, ConnectionManager, ReconnectPolicy};
use chatlink::session::scripted::{ScriptedConnector, SessionDriver};
use chatlink::session::CloseReason;
use chatlink_proto::message::MessageId;
use chatlink_proto::status::ConnectionState;
use tokio::sync::mpsc;

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        connect_timeout: Duration::from_secs(2),
        reconnect_backoff: Duration::from_millis(50),
        max_reconnect_attempts: 3,
        settle_delay: Duration::from_millis(20),
    }
}

fn make_manager() -> (
    Arc<ConnectionManager<ScriptedConnector>>,
    mpsc::UnboundedReceiver<SessionDriver>,
) {
    let (connector, drivers) = ScriptedConnector::new();
    let broadcaster = Arc::new(StatusBroadcaster::new(64));
    let (manager, _receipts) = ConnectionManager::new(connector, fast_policy(), broadcaster);
    (manager, drivers)
}

async fn wait_for_state(
    manager: &Arc<ConnectionManager<ScriptedConnector>>,
    state: ConnectionState,
) {
    let mut rx = manager.watch_status();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.state == state))
        .await
        .expect("timed out waiting for state")
        .expect("status watch closed");
}

#[tokio::test]
async fn unforced_restart_is_rejected_while_connected() {
    let (manager, mut drivers) = make_manager();
    manager.start().await.unwrap();
    let driver = drivers.recv().await.unwrap();

    let result = manager.restart(false, "test").await;
    assert!(matches!(result, Err(ConnectionError::RestartRejected)));

    // The live session was untouched.
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert!(!driver.ended());
}

#[tokio::test]
async fn forced_restart_replaces_a_live_session() {
    let (connector, mut drivers) = ScriptedConnector::new();
    let broadcaster = Arc::new(StatusBroadcaster::new(64));
    let (manager, _receipts) =
        ConnectionManager::new(connector, fast_policy(), Arc::clone(&broadcaster));
    manager.start().await.unwrap();
    let old_driver = drivers.recv().await.unwrap();

    let mut sub = broadcaster.subscribe_status();
    assert_eq!(sub.next().await.unwrap().state, ConnectionState::Connected);

    let state = manager.restart(true, "operator request").await.unwrap();
    assert_eq!(state, ConnectionState::Connected);
    assert!(old_driver.ended());

    // The teardown is observable: never Connected -> Connected directly.
    let mut observed = Vec::new();
    while observed.last() != Some(&ConnectionState::Connected) {
        observed.push(sub.next().await.unwrap().state);
    }
    assert_eq!(
        observed,
        vec![
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected
        ]
    );

    // Sends go to the new session.
    let new_driver = drivers.recv().await.unwrap();
    let id = MessageId::new();
    manager.send(id, "bob", "after restart").await.unwrap();
    assert_eq!(new_driver.sent().len(), 1);
    assert_eq!(new_driver.sent()[0].id, id);
    assert!(old_driver.sent().is_empty());
}

#[tokio::test]
async fn restart_recovers_a_logged_out_connection() {
    let (manager, mut drivers) = make_manager();
    manager.start().await.unwrap();
    let driver = drivers.recv().await.unwrap();

    driver.close(CloseReason::LoggedOut).await;
    wait_for_state(&manager, ConnectionState::LoggedOut).await;

    // No force needed once the session is gone.
    let state = manager.restart(false, "re-login").await.unwrap();
    assert_eq!(state, ConnectionState::Connected);
    assert!(drivers.recv().await.is_some());
}

#[tokio::test]
async fn restart_cancels_pending_reconnection() {
    // A very long backoff parks the supervisor in its reconnect delay, so
    // the restart always lands while the automatic reconnection is pending.
    let (connector, mut drivers) = ScriptedConnector::new();
    let broadcaster = Arc::new(StatusBroadcaster::new(64));
    let policy = ReconnectPolicy {
        reconnect_backoff: Duration::from_secs(60),
        settle_delay: Duration::from_millis(20),
        ..fast_policy()
    };
    let (manager, _receipts) = ConnectionManager::new(connector, policy, broadcaster);

    manager.start().await.unwrap();
    let driver = drivers.recv().await.unwrap();

    driver.close(CloseReason::Lost(1006)).await;
    wait_for_state(&manager, ConnectionState::Reconnecting).await;

    let state = manager.restart(false, "operator impatience").await.unwrap();
    assert_eq!(state, ConnectionState::Connected);

    // Only the initial connect and the restart's connect happened; the
    // aborted supervisor never opens a competing session.
    assert_eq!(manager.connector().connect_count(), 2);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(manager.connector().connect_count(), 2);
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn failed_restart_lands_in_error() {
    let (manager, _drivers) = make_manager();
    manager.connector().refuse_next("gateway down");

    let result = manager.restart(false, "from cold").await;
    assert!(matches!(result, Err(ConnectionError::Acquisition(_))));
    assert_eq!(manager.state(), ConnectionState::Error);

    // A later restart can still succeed.
    let state = manager.restart(false, "retry").await.unwrap();
    assert_eq!(state, ConnectionState::Connected);
}
