//! Connection lifecycle supervision.
//!
//! [`ConnectionManager`] owns at most one live gateway session and a
//! supervise task that consumes the session's event feed. Session loss
//! triggers bounded reconnection with a fixed backoff, except when the
//! remote side invalidated the session (logged out or replaced by another
//! device) — those are terminal until an explicit restart.
//!
//! Every state change goes through one serialization point, so the watch
//! cell and the broadcaster observe the same total order of transitions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use chatlink_proto::message::MessageId;
use chatlink_proto::status::{ConnectionInfo, ConnectionState, ConnectionStatusEvent};

use crate::broadcast::StatusBroadcaster;
use crate::session::{
    CloseReason, Receipt, SessionConnector, SessionError, SessionEvent, SessionHandle,
};

/// Buffer size for the receipt channel handed to the service wiring.
const RECEIPT_BUFFER: usize = 256;

/// Tuning for session acquisition and reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// How long `start`/`restart` wait for the connection to settle.
    pub connect_timeout: Duration,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_backoff: Duration,
    /// Reconnect attempts before giving up with `Error`.
    pub max_reconnect_attempts: u32,
    /// Pause between ending the old session and starting a new one.
    pub settle_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            reconnect_backoff: Duration::from_secs(5),
            max_reconnect_attempts: 10,
            settle_delay: Duration::from_secs(3),
        }
    }
}

/// Errors surfaced by connection-manager operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// An operation requiring a live session was attempted without one.
    #[error("not connected to the chat network")]
    NotConnected,

    /// A restart was requested while connected without `force`.
    #[error("connected; restarting a live session requires force")]
    RestartRejected,

    /// A new session could not be acquired.
    #[error("session acquisition failed: {0}")]
    Acquisition(#[source] SessionError),

    /// The live session reported an error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The connection did not settle within the configured timeout.
    #[error("timed out waiting for the connection to settle")]
    SettleTimeout,
}

/// The supervise task for the current session epoch, when one is running.
struct LifecycleSlot {
    supervisor: Option<JoinHandle<()>>,
}

/// Owns the single gateway session and supervises its lifecycle.
///
/// Constructed with [`ConnectionManager::new`], which also returns the
/// receiver for delivery receipts (wired into the message tracker by the
/// service layer).
pub struct ConnectionManager<C: SessionConnector> {
    connector: C,
    policy: ReconnectPolicy,
    broadcaster: Arc<StatusBroadcaster>,
    /// Current status; the single source of truth for reads and for
    /// waiters blocking on a settled state.
    status_tx: watch::Sender<ConnectionStatusEvent>,
    /// Serializes transitions so the watch cell and broadcaster agree on
    /// event order.
    transition_gate: parking_lot::Mutex<()>,
    /// Serializes start/restart/shutdown. Never held across send().
    lifecycle: Mutex<LifecycleSlot>,
    /// The live session handle. Separate from the lifecycle lock so sends
    /// never wait behind a restart's settle delay.
    handle_cell: parking_lot::RwLock<Option<Arc<C::Handle>>>,
    receipt_tx: mpsc::Sender<Receipt>,
}

impl<C: SessionConnector + 'static> ConnectionManager<C> {
    /// Creates a manager in `Disconnected` state.
    ///
    /// The returned receiver carries delivery receipts from all sessions
    /// this manager will ever own.
    #[must_use]
    pub fn new(
        connector: C,
        policy: ReconnectPolicy,
        broadcaster: Arc<StatusBroadcaster>,
    ) -> (Arc<Self>, mpsc::Receiver<Receipt>) {
        let initial = ConnectionStatusEvent::new(
            ConnectionState::Disconnected,
            None,
            ConnectionState::Disconnected.describe(),
        );
        broadcaster.publish_status(initial.clone());
        let (status_tx, _) = watch::channel(initial);
        let (receipt_tx, receipt_rx) = mpsc::channel(RECEIPT_BUFFER);

        let manager = Arc::new(Self {
            connector,
            policy,
            broadcaster,
            status_tx,
            transition_gate: parking_lot::Mutex::new(()),
            lifecycle: Mutex::new(LifecycleSlot { supervisor: None }),
            handle_cell: parking_lot::RwLock::new(None),
            receipt_tx,
        });
        (manager, receipt_rx)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.status_tx.borrow().state
    }

    /// Current status event (state, identity, message).
    pub fn status(&self) -> ConnectionStatusEvent {
        self.status_tx.borrow().clone()
    }

    /// A watch receiver over status changes, for waiters that need a
    /// specific state rather than the event stream.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatusEvent> {
        self.status_tx.subscribe()
    }

    /// The policy this manager was built with.
    pub const fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// The connector this manager acquires sessions from.
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Start the connection.
    ///
    /// Idempotent: already `Connected` returns immediately; an acquisition
    /// already in flight is awaited instead of starting a second one.
    /// Otherwise acquires a session, spawns the supervise task, and waits
    /// (bounded by `connect_timeout`) for the state to settle.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Acquisition`] if the session cannot be opened.
    /// - [`ConnectionError::SettleTimeout`] if the state does not settle
    ///   in time.
    pub async fn start(self: &Arc<Self>) -> Result<ConnectionState, ConnectionError> {
        {
            let mut slot = self.lifecycle.lock().await;
            let current = self.state();
            if current == ConnectionState::Connected {
                return Ok(current);
            }
            let supervising = slot
                .supervisor
                .as_ref()
                .is_some_and(|task| !task.is_finished());
            let in_flight = supervising
                && matches!(
                    current,
                    ConnectionState::Connecting | ConnectionState::Reconnecting
                );
            if !in_flight {
                self.acquire(&mut slot).await?;
            }
        }
        self.await_settled().await
    }

    /// Send a message over the live session.
    ///
    /// Fails fast when not connected; no queueing, no retry. Success means
    /// the frame was written to the gateway — delivery confirmation arrives
    /// later through the receipt channel.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::NotConnected`] when there is no live session.
    /// - [`ConnectionError::Session`] when the session write fails.
    pub async fn send(
        &self,
        id: MessageId,
        recipient: &str,
        body: &str,
    ) -> Result<(), ConnectionError> {
        if self.state() != ConnectionState::Connected {
            return Err(ConnectionError::NotConnected);
        }
        let handle = self
            .handle_cell
            .read()
            .clone()
            .ok_or(ConnectionError::NotConnected)?;
        handle
            .send(id, recipient, body)
            .await
            .map_err(ConnectionError::Session)
    }

    /// Tear down the current session and start a new one.
    ///
    /// Rejected while `Connected` unless `force` is set. This is the only
    /// path that deliberately ends a session: the supervise task is aborted
    /// first so its automatic reconnection cannot race the restart.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::RestartRejected`] when connected and not forced.
    /// - [`ConnectionError::Acquisition`] / [`ConnectionError::SettleTimeout`]
    ///   as for [`Self::start`].
    pub async fn restart(
        self: &Arc<Self>,
        force: bool,
        reason: &str,
    ) -> Result<ConnectionState, ConnectionError> {
        let mut slot = self.lifecycle.lock().await;
        if self.state() == ConnectionState::Connected && !force {
            return Err(ConnectionError::RestartRejected);
        }
        tracing::info!(force, reason, "restarting connection");

        if let Some(task) = slot.supervisor.take() {
            task.abort();
        }
        let handle = self.handle_cell.write().take();
        if let Some(handle) = handle {
            handle.end().await;
        }
        self.transition(
            ConnectionState::Disconnected,
            None,
            format!("restarting: {reason}"),
        );

        // Let the gateway observe the close before a new Hello arrives.
        tokio::time::sleep(self.policy.settle_delay).await;

        self.acquire(&mut slot).await?;
        drop(slot);
        self.await_settled().await
    }

    /// Graceful teardown for process exit. Ends the session without
    /// starting a new one.
    pub async fn shutdown(&self) {
        let mut slot = self.lifecycle.lock().await;
        if let Some(task) = slot.supervisor.take() {
            task.abort();
        }
        let handle = self.handle_cell.write().take();
        if let Some(handle) = handle {
            handle.end().await;
        }
        if self.state() != ConnectionState::Disconnected {
            self.transition(ConnectionState::Disconnected, None, "service shutting down");
        }
    }

    /// Acquire a session and hand its feed to a fresh supervise task.
    /// Caller holds the lifecycle lock.
    async fn acquire(self: &Arc<Self>, slot: &mut LifecycleSlot) -> Result<(), ConnectionError> {
        self.transition(
            ConnectionState::Connecting,
            None,
            ConnectionState::Connecting.describe(),
        );
        match self.connector.connect().await {
            Ok((handle, feed)) => {
                *self.handle_cell.write() = Some(Arc::new(handle));
                if let Some(old) = slot.supervisor.take() {
                    old.abort();
                }
                let manager = Arc::clone(self);
                slot.supervisor = Some(tokio::spawn(async move {
                    manager.supervise(feed).await;
                }));
                Ok(())
            }
            Err(e) => {
                *self.handle_cell.write() = None;
                self.transition(
                    ConnectionState::Error,
                    None,
                    format!("session acquisition failed: {e}"),
                );
                Err(ConnectionError::Acquisition(e))
            }
        }
    }

    /// Wait (bounded) until the state is no longer transitional.
    async fn await_settled(&self) -> Result<ConnectionState, ConnectionError> {
        let mut rx = self.status_tx.subscribe();
        let settled = tokio::time::timeout(
            self.policy.connect_timeout,
            rx.wait_for(|status| {
                matches!(
                    status.state,
                    ConnectionState::Connected
                        | ConnectionState::Disconnected
                        | ConnectionState::LoggedOut
                        | ConnectionState::Error
                )
            }),
        )
        .await
        .map_err(|_| ConnectionError::SettleTimeout)?
        .map_err(|_| ConnectionError::NotConnected)?;
        Ok(settled.state)
    }

    /// Consume the session event feed until supervision ends.
    ///
    /// Runs as its own task per session epoch; a successful reconnect swaps
    /// in the new session's feed and the loop continues. Exits on remote
    /// invalidation, reconnect exhaustion, or abort by restart/shutdown.
    async fn supervise(self: Arc<Self>, mut feed: mpsc::Receiver<SessionEvent>) {
        loop {
            match feed.recv().await {
                Some(SessionEvent::Connecting) => {
                    tracing::debug!("session handshake in progress");
                }
                Some(SessionEvent::Open(info)) => {
                    self.transition(
                        ConnectionState::Connected,
                        Some(info),
                        ConnectionState::Connected.describe(),
                    );
                }
                Some(SessionEvent::PairingRequired { code }) => {
                    tracing::warn!(
                        code = %code,
                        "pairing required; enter this code on an authenticated device"
                    );
                }
                Some(SessionEvent::Receipt(receipt)) => {
                    if let Err(e) = self.receipt_tx.try_send(receipt) {
                        tracing::warn!(err = %e, "dropping delivery receipt");
                    }
                }
                Some(SessionEvent::Closed(reason)) => {
                    if !self.handle_closure(reason, &mut feed).await {
                        return;
                    }
                }
                None => {
                    // Feed dropped without a close event; treat as unclean loss.
                    if !self
                        .handle_closure(CloseReason::Lost(1006), &mut feed)
                        .await
                    {
                        return;
                    }
                }
            }
        }
    }

    /// React to a session ending. Returns `false` when supervision is over.
    async fn handle_closure(
        self: &Arc<Self>,
        reason: CloseReason,
        feed: &mut mpsc::Receiver<SessionEvent>,
    ) -> bool {
        *self.handle_cell.write() = None;

        if reason.is_remote_invalidation() {
            self.transition(
                ConnectionState::LoggedOut,
                None,
                format!("session ended: {reason}"),
            );
            return false;
        }

        let max = self.policy.max_reconnect_attempts;
        for attempt in 1..=max {
            self.transition(
                ConnectionState::Reconnecting,
                None,
                format!("{reason}; reconnecting (attempt {attempt}/{max})"),
            );
            tokio::time::sleep(self.policy.reconnect_backoff).await;
            match self.connector.connect().await {
                Ok((handle, new_feed)) => {
                    *self.handle_cell.write() = Some(Arc::new(handle));
                    *feed = new_feed;
                    return true;
                }
                Err(e) => {
                    tracing::warn!(attempt, max, err = %e, "reconnect attempt failed");
                }
            }
        }

        self.transition(
            ConnectionState::Error,
            None,
            "reconnect attempts exhausted",
        );
        false
    }

    /// The single serialization point for state changes.
    fn transition(
        &self,
        state: ConnectionState,
        info: Option<ConnectionInfo>,
        message: impl Into<String>,
    ) {
        let event = ConnectionStatusEvent::new(state, info, message);
        tracing::info!(state = %event.state, "{}", event.message);
        let _gate = self.transition_gate.lock();
        self.status_tx.send_replace(event.clone());
        self.broadcaster.publish_status(event);
    }
}
