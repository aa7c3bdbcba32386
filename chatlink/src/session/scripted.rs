//! In-process session double for tests.
//!
//! [`ScriptedConnector`] hands out [`ScriptedSession`]s according to a
//! programmable plan. Each successful connect also emits a [`SessionDriver`]
//! through a side channel; tests use the driver to inject events (closures,
//! receipts) and to inspect what the session was asked to send.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use chatlink_proto::message::{MessageId, MessageStatus, Timestamp};
use chatlink_proto::status::ConnectionInfo;

use super::{CloseReason, Receipt, SessionConnector, SessionError, SessionEvent, SessionHandle};

/// A message handed to [`ScriptedSession::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Client-assigned message identifier.
    pub id: MessageId,
    /// Destination identifier.
    pub recipient: String,
    /// Message body.
    pub body: String,
}

/// What the next `connect` call should do.
enum ConnectPlan {
    /// Succeed with this session identity.
    Open(ConnectionInfo),
    /// Fail with [`SessionError::Rejected`] and this reason.
    Refuse(String),
}

/// Programmable session factory.
///
/// With an empty plan every `connect` succeeds with a default identity,
/// which keeps happy-path tests short. Queue [`Self::refuse_next`] /
/// [`Self::open_next_with`] entries to script specific outcomes.
pub struct ScriptedConnector {
    plan: Mutex<VecDeque<ConnectPlan>>,
    default_info: ConnectionInfo,
    drivers: mpsc::UnboundedSender<SessionDriver>,
    connect_count: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    /// Creates a connector and the receiver for per-session drivers.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionDriver>) {
        let (drivers, driver_rx) = mpsc::unbounded_channel();
        let connector = Self {
            plan: Mutex::new(VecDeque::new()),
            default_info: ConnectionInfo {
                identity: "test@chat".to_string(),
                device_label: "scripted".to_string(),
                is_authenticated: true,
                connected_since: Timestamp::now(),
            },
            drivers,
            connect_count: Arc::new(AtomicUsize::new(0)),
        };
        (connector, driver_rx)
    }

    /// Queue a connect failure.
    pub fn refuse_next(&self, reason: impl Into<String>) {
        self.plan
            .lock()
            .push_back(ConnectPlan::Refuse(reason.into()));
    }

    /// Queue a connect success with a specific session identity.
    pub fn open_next_with(&self, info: ConnectionInfo) {
        self.plan.lock().push_back(ConnectPlan::Open(info));
    }

    /// How many times `connect` has been called.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::Relaxed)
    }
}

impl SessionConnector for ScriptedConnector {
    type Handle = ScriptedSession;

    async fn connect(
        &self,
    ) -> Result<(ScriptedSession, mpsc::Receiver<SessionEvent>), SessionError> {
        self.connect_count.fetch_add(1, Ordering::Relaxed);

        let next = self.plan.lock().pop_front();
        if let Some(ConnectPlan::Refuse(reason)) = next {
            return Err(SessionError::Rejected(reason));
        }
        let info = match next {
            Some(ConnectPlan::Open(info)) => info,
            _ => self.default_info.clone(),
        };

        let (tx, rx) = mpsc::channel(64);
        // Pre-buffer the handshake events the way a real session would
        // deliver them.
        let _ = tx.send(SessionEvent::Connecting).await;
        let _ = tx.send(SessionEvent::Open(info)).await;

        let sent = Arc::new(Mutex::new(Vec::new()));
        let ended = Arc::new(AtomicBool::new(false));
        let fail_sends = Arc::new(AtomicBool::new(false));

        let driver = SessionDriver {
            events: tx,
            sent: Arc::clone(&sent),
            ended: Arc::clone(&ended),
            fail_sends: Arc::clone(&fail_sends),
        };
        // Test not holding the driver receiver is fine — drivers are then
        // simply dropped.
        let _ = self.drivers.send(driver);

        Ok((
            ScriptedSession {
                sent,
                ended,
                fail_sends,
            },
            rx,
        ))
    }
}

/// Test-side handle for one scripted session.
pub struct SessionDriver {
    events: mpsc::Sender<SessionEvent>,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    ended: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
}

impl SessionDriver {
    /// Inject a session closure with the given reason.
    pub async fn close(&self, reason: CloseReason) {
        let _ = self.events.send(SessionEvent::Closed(reason)).await;
    }

    /// Inject a delivery confirmation.
    pub async fn receipt(&self, id: MessageId, status: MessageStatus, detail: Option<&str>) {
        let _ = self
            .events
            .send(SessionEvent::Receipt(Receipt {
                id,
                status,
                detail: detail.map(ToOwned::to_owned),
            }))
            .await;
    }

    /// Inject an arbitrary session event.
    pub async fn inject(&self, event: SessionEvent) {
        let _ = self.events.send(event).await;
    }

    /// Everything the session was asked to send so far.
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    /// Whether `end()` has been called on the session.
    #[must_use]
    pub fn ended(&self) -> bool {
        self.ended.load(Ordering::Relaxed)
    }

    /// Make subsequent `send` calls fail with an I/O error.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Relaxed);
    }
}

/// The session handle produced by [`ScriptedConnector`].
pub struct ScriptedSession {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    ended: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
}

impl SessionHandle for ScriptedSession {
    async fn send(&self, id: MessageId, recipient: &str, body: &str) -> Result<(), SessionError> {
        if self.ended.load(Ordering::Relaxed) {
            return Err(SessionError::ConnectionClosed);
        }
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(SessionError::Io(std::io::Error::other(
                "scripted send failure",
            )));
        }
        self.sent.lock().push(OutboundMessage {
            id,
            recipient: recipient.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn end(&self) {
        self.ended.store(true, Ordering::Relaxed);
    }
}
