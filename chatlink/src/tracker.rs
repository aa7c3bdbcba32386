//! Delivery tracking for outbound messages.
//!
//! [`MessageTracker`] is a bounded concurrent map from message id to
//! [`MessageRecord`]. Status updates arrive from two sides (the send path
//! and asynchronous gateway receipts) in no guaranteed order, so the map
//! enforces the forward-only status ordering: a late lower-ranked update is
//! logged and ignored rather than applied.

use std::collections::HashMap;

use parking_lot::RwLock;

use chatlink_proto::message::{MessageId, MessageRecord, MessageStatus, Timestamp};

/// Default retention capacity.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Errors surfaced by tracker operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    /// A record with this id already exists.
    #[error("duplicate message id: {0}")]
    DuplicateMessageId(MessageId),

    /// No record with this id is tracked.
    #[error("unknown message id: {0}")]
    UnknownMessageId(MessageId),
}

/// Bounded concurrent store of message delivery records.
pub struct MessageTracker {
    records: RwLock<HashMap<MessageId, MessageRecord>>,
    capacity: usize,
}

impl Default for MessageTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MessageTracker {
    /// Creates a tracker retaining at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Start tracking a message in `Pending` status.
    ///
    /// At capacity, the oldest record in a terminal status is evicted to
    /// make room; if nothing terminal exists, the oldest record overall
    /// goes.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::DuplicateMessageId`] if the id is already
    /// tracked.
    pub fn record(&self, id: MessageId, recipient: &str) -> Result<MessageRecord, TrackerError> {
        let mut records = self.records.write();
        if records.contains_key(&id) {
            return Err(TrackerError::DuplicateMessageId(id));
        }
        if records.len() >= self.capacity {
            evict_one(&mut records);
        }
        let record = MessageRecord::new(id, recipient);
        records.insert(id, record.clone());
        Ok(record)
    }

    /// Apply a status update, enforcing the forward-only ordering.
    ///
    /// Out-of-order updates (a status at or below the current rank, or any
    /// update to a terminal record) are logged and ignored; the unchanged
    /// record is returned. `detail` replaces the stored detail only when
    /// the update is applied.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::UnknownMessageId`] if the id is not tracked.
    pub fn update_status(
        &self,
        id: MessageId,
        status: MessageStatus,
        detail: Option<String>,
    ) -> Result<MessageRecord, TrackerError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .ok_or(TrackerError::UnknownMessageId(id))?;

        if record.status.can_transition(status) {
            tracing::debug!(id = %id, from = %record.status, to = %status, "message status updated");
            record.status = status;
            if detail.is_some() {
                record.detail = detail;
            }
            record.updated_at = Timestamp::now();
        } else {
            tracing::warn!(
                id = %id,
                current = %record.status,
                attempted = %status,
                "ignoring out-of-order status update"
            );
        }
        Ok(record.clone())
    }

    /// Look up a tracked message.
    #[must_use]
    pub fn get(&self, id: MessageId) -> Option<MessageRecord> {
        self.records.read().get(&id).cloned()
    }

    /// Number of tracked records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether no records are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

/// Remove one record to make room: the oldest terminal record, or the
/// oldest record overall when none is terminal.
fn evict_one(records: &mut HashMap<MessageId, MessageRecord>) {
    let victim = records
        .values()
        .filter(|r| r.status.is_terminal())
        .min_by_key(|r| r.submitted_at)
        .or_else(|| records.values().min_by_key(|r| r.submitted_at))
        .map(|r| r.id);
    if let Some(id) = victim {
        records.remove(&id);
        tracing::debug!(id = %id, "evicted tracked message at capacity");
    }
}
