//! Wire frames for the upstream chat gateway.
//!
//! The gateway connection is a WebSocket carrying postcard-encoded
//! [`GatewayFrame`] values as binary messages. The chat protocol proper
//! (encryption, device pairing, media) lives behind the gateway; these
//! frames are the opaque envelope the bridge speaks.

use serde::{Deserialize, Serialize};

use crate::message::{MessageId, MessageStatus};

/// Close code sent when the account's credentials were invalidated.
pub const CLOSE_LOGGED_OUT: u16 = 401;

/// Close code sent when another device took over the session.
pub const CLOSE_REPLACED: u16 = 440;

/// Close code sent when the gateway wants the client to reconnect.
pub const CLOSE_RESTART_REQUIRED: u16 = 515;

/// Kind of delivery confirmation pushed by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptKind {
    /// The recipient's device received the message.
    Delivered,
    /// The recipient read the message.
    Read,
}

impl ReceiptKind {
    /// The tracked status this receipt maps to.
    #[must_use]
    pub const fn as_status(self) -> MessageStatus {
        match self {
            Self::Delivered => MessageStatus::Delivered,
            Self::Read => MessageStatus::Read,
        }
    }
}

/// A single frame on the gateway WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayFrame {
    /// Client → gateway: open a session for a device registration.
    Hello {
        /// Label of the device registration to resume.
        device_label: String,
        /// Credential for the registration, when one is held.
        auth_token: Option<String>,
    },
    /// Gateway → client: the registration is unpaired; complete pairing
    /// out-of-band with this code.
    Challenge {
        /// Pairing code to present on an already-authenticated device.
        code: String,
    },
    /// Gateway → client: session is open and authenticated.
    Welcome {
        /// The account identity the session is bound to.
        identity: String,
        /// Device label confirmed by the gateway.
        device_label: String,
    },
    /// Client → gateway: deliver a message.
    Send {
        /// Client-assigned message identifier, echoed in acknowledgments.
        id: MessageId,
        /// Destination identifier on the chat network.
        recipient: String,
        /// Message body.
        body: String,
    },
    /// Gateway → client: the `Send` with this id was accepted.
    SendAck {
        /// The acknowledged message.
        id: MessageId,
    },
    /// Gateway → client: the `Send` with this id was rejected.
    SendErr {
        /// The rejected message.
        id: MessageId,
        /// Why the gateway rejected it.
        reason: String,
    },
    /// Gateway → client: asynchronous delivery confirmation.
    Receipt {
        /// The confirmed message.
        id: MessageId,
        /// Delivered or read.
        kind: ReceiptKind,
    },
    /// Gateway → client: the session is being closed deliberately.
    /// Sent before the WebSocket close handshake so the client learns the
    /// cause even when close frames are mangled by intermediaries.
    Bye {
        /// Close code (401 logged out, 440 replaced, other values are
        /// transient).
        code: u16,
        /// Human-readable cause.
        reason: String,
    },
}
