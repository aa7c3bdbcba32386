//! Fan-out of connection-status and health events to subscribers.
//!
//! Built on [`tokio::sync::broadcast`] with a bounded buffer: producers
//! never block, and a slow subscriber loses the oldest buffered events
//! rather than stalling anyone else. Subscriptions to the status stream
//! always yield the current state first, so a subscriber joining mid-stream
//! starts from a consistent snapshot.

use parking_lot::RwLock;
use tokio::sync::broadcast;

use chatlink_proto::status::{ConnectionStatusEvent, HealthSnapshot};

/// Fan-out hub for status and health events.
pub struct StatusBroadcaster {
    status_tx: broadcast::Sender<ConnectionStatusEvent>,
    latest_status: RwLock<Option<ConnectionStatusEvent>>,
    health_tx: broadcast::Sender<HealthSnapshot>,
    latest_health: RwLock<Option<HealthSnapshot>>,
}

impl StatusBroadcaster {
    /// Creates a broadcaster whose per-subscriber buffer holds `capacity`
    /// events before the oldest are dropped.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (status_tx, _) = broadcast::channel(capacity.max(1));
        let (health_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            status_tx,
            latest_status: RwLock::new(None),
            health_tx,
            latest_health: RwLock::new(None),
        }
    }

    /// Publish a connection status event. Never blocks; having no
    /// subscribers is not an error.
    pub fn publish_status(&self, event: ConnectionStatusEvent) {
        // The write lock is held across the send so a concurrent subscribe
        // sees this event either as its initial snapshot or on the channel,
        // never both and never neither.
        let mut latest = self.latest_status.write();
        *latest = Some(event.clone());
        let _ = self.status_tx.send(event);
    }

    /// Publish a health observation.
    pub fn publish_health(&self, snapshot: HealthSnapshot) {
        let mut latest = self.latest_health.write();
        *latest = Some(snapshot.clone());
        let _ = self.health_tx.send(snapshot);
    }

    /// The most recently published status event, if any.
    #[must_use]
    pub fn latest_status(&self) -> Option<ConnectionStatusEvent> {
        self.latest_status.read().clone()
    }

    /// The most recently published health observation, if any.
    #[must_use]
    pub fn latest_health(&self) -> Option<HealthSnapshot> {
        self.latest_health.read().clone()
    }

    /// Subscribe to connection status events.
    ///
    /// The first item yielded is the current state (when one has been
    /// published), then live events follow.
    #[must_use]
    pub fn subscribe_status(&self) -> Subscription<ConnectionStatusEvent> {
        let latest = self.latest_status.read();
        Subscription {
            initial: latest.clone(),
            rx: self.status_tx.subscribe(),
        }
    }

    /// Subscribe to health observations.
    ///
    /// Yields the latest completed check first (nothing before the first
    /// check has run), then live observations.
    #[must_use]
    pub fn subscribe_health(&self) -> Subscription<HealthSnapshot> {
        let latest = self.latest_health.read();
        Subscription {
            initial: latest.clone(),
            rx: self.health_tx.subscribe(),
        }
    }
}

/// One subscriber's view of a broadcast stream.
///
/// Dropping the subscription ends it; other subscribers and the producer
/// are unaffected.
pub struct Subscription<T: Clone> {
    initial: Option<T>,
    rx: broadcast::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    /// Next event, or `None` once the producer is gone.
    ///
    /// When this subscriber falls behind the buffer, the oldest events are
    /// skipped (with a warning) and delivery resumes from the newest
    /// retained event.
    pub async fn next(&mut self) -> Option<T> {
        if let Some(event) = self.initial.take() {
            return Some(event);
        }
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber lagging, dropped oldest events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
