//! Message identity, validation, and delivery-status tracking types.
//!
//! A message submitted through the service is tracked as a [`MessageRecord`]
//! whose [`MessageStatus`] only ever moves forward: `Pending → Sent →
//! Delivered → Read`, with `Failed` reachable from any non-terminal status.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed message body size in bytes (64 KB).
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Unique identifier for a message, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new time-ordered message identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `MessageId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Delivery lifecycle of a tracked message.
///
/// Statuses are ordered; a record's status never moves to a lower rank.
/// `Read` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Accepted by the service, not yet acknowledged by the gateway.
    Pending,
    /// Acknowledged by the gateway, awaiting delivery confirmation.
    Sent,
    /// Delivery confirmed by the recipient's device.
    Delivered,
    /// Read confirmation received.
    Read,
    /// Sending or delivery failed; see the record's `detail`.
    Failed,
}

impl MessageStatus {
    /// Position of this status in the forward-only ordering.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
            Self::Failed => 4,
        }
    }

    /// Whether this status admits no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Read | Self::Failed)
    }

    /// Whether a transition from `self` to `next` is allowed.
    ///
    /// Forward moves along `Pending → Sent → Delivered → Read` are allowed,
    /// plus `Failed` from any non-terminal status. Everything else (including
    /// repeating the current status) is a regression to be ignored.
    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed => true,
            _ => next.rank() > self.rank(),
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Sent => write!(f, "sent"),
            Self::Delivered => write!(f, "delivered"),
            Self::Read => write!(f, "read"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A tracked outbound message and its current delivery state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Unique identifier for this message.
    pub id: MessageId,
    /// Destination identifier on the chat network.
    pub recipient: String,
    /// Current delivery status.
    pub status: MessageStatus,
    /// Failure reason or gateway-provided detail, when any.
    pub detail: Option<String>,
    /// When the message was accepted by the service.
    pub submitted_at: Timestamp,
    /// When the status last changed.
    pub updated_at: Timestamp,
}

impl MessageRecord {
    /// Creates a new record in `Pending` status.
    #[must_use]
    pub fn new(id: MessageId, recipient: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            recipient: recipient.into(),
            status: MessageStatus::Pending,
            detail: None,
            submitted_at: now,
            updated_at: now,
        }
    }
}

/// Error returned when an outbound message fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Recipient identifier is empty.
    #[error("recipient is empty")]
    EmptyRecipient,
    /// Message body is empty.
    #[error("message body is empty")]
    EmptyBody,
    /// Message body exceeds the maximum allowed size.
    #[error("message body too large ({size} bytes, max {max} bytes)")]
    BodyTooLarge {
        /// Actual size of the body in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

/// Validates an outbound message before it is recorded and sent.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the recipient or body is empty, or if
/// the body exceeds [`MAX_BODY_SIZE`].
pub const fn validate_outbound(recipient: &str, body: &str) -> Result<(), ValidationError> {
    if recipient.is_empty() {
        return Err(ValidationError::EmptyRecipient);
    }
    if body.is_empty() {
        return Err(ValidationError::EmptyBody);
    }
    if body.len() > MAX_BODY_SIZE {
        return Err(ValidationError::BodyTooLarge {
            size: body.len(),
            max: MAX_BODY_SIZE,
        });
    }
    Ok(())
}
