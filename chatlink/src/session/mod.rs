//! Session layer abstraction for `ChatLink`.
//!
//! Defines the [`SessionConnector`] / [`SessionHandle`] traits that the
//! connection manager consumes. Concrete implementations:
//! - [`ws::WsConnector`] — production WebSocket session to the chat gateway
//! - [`scripted::ScriptedConnector`] — in-process programmable double for tests

pub mod scripted;
pub mod ws;

use tokio::sync::mpsc;

use chatlink_proto::codec::CodecError;
use chatlink_proto::gateway::{CLOSE_LOGGED_OUT, CLOSE_REPLACED};
use chatlink_proto::message::{MessageId, MessageStatus};
use chatlink_proto::status::ConnectionInfo;

/// Errors that can occur while acquiring or using a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session with the gateway has been closed.
    #[error("session closed")]
    ConnectionClosed,

    /// The operation timed out before completing.
    #[error("session operation timed out")]
    Timeout,

    /// The gateway refused to open a session.
    #[error("gateway rejected session: {0}")]
    Rejected(String),

    /// A wire frame could not be encoded or decoded.
    #[error("gateway codec error: {0}")]
    Codec(#[from] CodecError),

    /// An underlying I/O error occurred.
    #[error("session I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a session ended, derived from the gateway's close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Credentials invalidated; the registration is gone.
    LoggedOut,
    /// Another device took over the session.
    Replaced,
    /// Transient loss (network fault, gateway restart, unclean close).
    Lost(u16),
}

impl CloseReason {
    /// Maps a gateway close code to a close reason.
    #[must_use]
    pub const fn from_code(code: u16) -> Self {
        match code {
            CLOSE_LOGGED_OUT => Self::LoggedOut,
            CLOSE_REPLACED => Self::Replaced,
            other => Self::Lost(other),
        }
    }

    /// Whether the remote side invalidated this device's session.
    ///
    /// Invalidation means reconnecting with the same credentials cannot
    /// succeed, so the supervisor must not attempt it.
    #[must_use]
    pub const fn is_remote_invalidation(self) -> bool {
        matches!(self, Self::LoggedOut | Self::Replaced)
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoggedOut => write!(f, "logged out"),
            Self::Replaced => write!(f, "session replaced by another device"),
            Self::Lost(code) => write!(f, "connection lost (code {code})"),
        }
    }
}

/// An asynchronous delivery confirmation for a tracked message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// The message being confirmed.
    pub id: MessageId,
    /// The status this confirmation advances the message to.
    pub status: MessageStatus,
    /// Gateway-provided detail (failure reasons, mostly).
    pub detail: Option<String>,
}

/// Events pushed by a live session to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Handshake in progress (informational).
    Connecting,
    /// The session is open and authenticated.
    Open(ConnectionInfo),
    /// The registration is unpaired; pairing must be completed out-of-band.
    PairingRequired {
        /// Code to present on an already-authenticated device.
        code: String,
    },
    /// A delivery confirmation for a previously sent message.
    Receipt(Receipt),
    /// The session ended.
    Closed(CloseReason),
}

/// Factory for sessions with the chat gateway.
///
/// Each successful `connect` yields a fresh session handle plus the event
/// feed for that session. The feed always reports the session's end with a
/// [`SessionEvent::Closed`] (or by closing the channel).
pub trait SessionConnector: Send + Sync {
    /// The session handle type produced by this connector.
    type Handle: SessionHandle + 'static;

    /// Acquire a new session.
    ///
    /// Resolves once the session is established and authenticated. The
    /// returned receiver carries all subsequent events for this session.
    fn connect(
        &self,
    ) -> impl std::future::Future<
        Output = Result<(Self::Handle, mpsc::Receiver<SessionEvent>), SessionError>,
    > + Send;
}

/// A live session with the chat gateway.
pub trait SessionHandle: Send + Sync {
    /// Send a message to a recipient on the chat network.
    ///
    /// Returns `Ok(())` when the frame has been written to the gateway.
    /// This is NOT a delivery guarantee — acknowledgment and delivery
    /// confirmations arrive later as [`SessionEvent::Receipt`] events.
    fn send(
        &self,
        id: MessageId,
        recipient: &str,
        body: &str,
    ) -> impl std::future::Future<Output = Result<(), SessionError>> + Send;

    /// End the session gracefully. Idempotent.
    fn end(&self) -> impl std::future::Future<Output = ()> + Send;
}
