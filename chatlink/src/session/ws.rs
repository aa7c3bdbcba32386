//! WebSocket session with the chat gateway.
//!
//! Implements [`SessionConnector`] / [`SessionHandle`] over a WebSocket
//! connection speaking postcard-encoded [`GatewayFrame`]s. The gateway never
//! exposes the chat protocol proper — only the opaque framing this module
//! speaks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use chatlink_proto::codec;
use chatlink_proto::gateway::GatewayFrame;
use chatlink_proto::message::{MessageId, MessageStatus, Timestamp};
use chatlink_proto::status::ConnectionInfo;

use super::{CloseReason, Receipt, SessionConnector, SessionError, SessionEvent, SessionHandle};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Timeout for establishing the WebSocket connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the `Hello`/`Welcome` handshake after the socket is up.
const WELCOME_TIMEOUT: Duration = Duration::from_secs(5);

/// Connector that opens authenticated gateway sessions over WebSocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    /// The gateway URL (ws:// or wss://).
    gateway_url: String,
    /// Device registration label sent in the `Hello` frame.
    device_label: String,
    /// Credential for the registration, when one is held.
    auth_token: Option<String>,
}

impl WsConnector {
    /// Creates a connector for the given gateway and device registration.
    #[must_use]
    pub fn new(
        gateway_url: impl Into<String>,
        device_label: impl Into<String>,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            device_label: device_label.into(),
            auth_token,
        }
    }

    /// Return the gateway URL this connector targets.
    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }
}

/// A live WebSocket session with the gateway.
///
/// Created via [`WsConnector::connect`], which performs the handshake and
/// spawns a background reader task feeding the session's event channel.
#[derive(Debug)]
pub struct WsSession {
    /// Write half of the WebSocket connection (shared for concurrent sends).
    ws_sender: Arc<Mutex<WsSender>>,
    /// Whether the WebSocket connection is still up.
    connected: Arc<AtomicBool>,
    /// Handle to the background reader task (kept alive for the session's lifetime).
    _reader_handle: tokio::task::JoinHandle<()>,
}

impl SessionConnector for WsConnector {
    type Handle = WsSession;

    /// Connect to the gateway and open an authenticated session.
    ///
    /// Performs the following steps:
    /// 1. Establishes a WebSocket connection to the gateway (10s timeout)
    /// 2. Sends a `Hello` frame with the device label and credential
    /// 3. Waits for `Welcome` (5s timeout), buffering any `Challenge` pushes
    ///    as [`SessionEvent::PairingRequired`]
    /// 4. Spawns a background reader task feeding the event channel
    ///
    /// # Errors
    ///
    /// - [`SessionError::Timeout`] if connection or handshake times out.
    /// - [`SessionError::Rejected`] if the gateway answers with `Bye`.
    /// - [`SessionError::ConnectionClosed`] if the socket closes mid-handshake.
    /// - [`SessionError::Io`] for network and protocol-level failures.
    async fn connect(&self) -> Result<(WsSession, mpsc::Receiver<SessionEvent>), SessionError> {
        let (ws_stream, _response) =
            tokio::time::timeout(CONNECT_TIMEOUT, connect_async(&self.gateway_url))
                .await
                .map_err(|_| {
                    tracing::warn!(url = %self.gateway_url, "gateway WebSocket connect timed out");
                    SessionError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url = %self.gateway_url, err = %e, "gateway WebSocket connect failed");
                    map_ws_connect_error(&e)
                })?;

        let (mut ws_sender, mut ws_reader) = ws_stream.split();

        let hello = GatewayFrame::Hello {
            device_label: self.device_label.clone(),
            auth_token: self.auth_token.clone(),
        };
        let hello_bytes = codec::encode(&hello)?;
        ws_sender
            .send(Message::Binary(hello_bytes.into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "failed to send Hello frame");
                SessionError::Io(std::io::Error::other(format!("failed to send Hello: {e}")))
            })?;

        // Events observed during the handshake (pairing challenges) are
        // buffered on the channel before the receiver is handed out.
        let (tx, rx) = mpsc::channel(256);

        let info = wait_for_welcome(&mut ws_reader, &tx, &self.device_label).await?;
        tracing::info!(
            identity = %info.identity,
            device_label = %info.device_label,
            "gateway session open"
        );
        if tx.send(SessionEvent::Open(info)).await.is_err() {
            return Err(SessionError::ConnectionClosed);
        }

        let connected = Arc::new(AtomicBool::new(true));
        let reader_connected = Arc::clone(&connected);
        let reader_handle = tokio::spawn(reader_loop(ws_reader, tx, reader_connected));

        Ok((
            WsSession {
                ws_sender: Arc::new(Mutex::new(ws_sender)),
                connected,
                _reader_handle: reader_handle,
            },
            rx,
        ))
    }
}

impl SessionHandle for WsSession {
    /// Send a message frame to the gateway.
    ///
    /// Resolves when the frame is written to the socket. Acknowledgment
    /// (`SendAck`/`SendErr`) arrives later on the event feed.
    ///
    /// # Errors
    ///
    /// - [`SessionError::ConnectionClosed`] if the session is down.
    /// - [`SessionError::Codec`] if the frame cannot be encoded.
    async fn send(&self, id: MessageId, recipient: &str, body: &str) -> Result<(), SessionError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(SessionError::ConnectionClosed);
        }

        let frame = GatewayFrame::Send {
            id,
            recipient: recipient.to_string(),
            body: body.to_string(),
        };
        let bytes = codec::encode(&frame)?;

        let mut sender = self.ws_sender.lock().await;
        sender
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "gateway send failed");
                self.connected.store(false, Ordering::Relaxed);
                SessionError::ConnectionClosed
            })?;

        Ok(())
    }

    /// End the session with a WebSocket close handshake. Idempotent.
    async fn end(&self) {
        if self.connected.swap(false, Ordering::Relaxed) {
            let mut sender = self.ws_sender.lock().await;
            if sender.send(Message::Close(None)).await.is_err() {
                tracing::debug!("close frame send failed, socket already gone");
            }
        }
    }
}

/// Drives the handshake after `Hello` until a `Welcome` arrives.
///
/// `Challenge` frames seen while waiting are buffered on the event channel
/// as [`SessionEvent::PairingRequired`] so the consumer can surface them.
async fn wait_for_welcome(
    ws_reader: &mut WsReader,
    tx: &mpsc::Sender<SessionEvent>,
    device_label: &str,
) -> Result<ConnectionInfo, SessionError> {
    let deadline = tokio::time::Instant::now() + WELCOME_TIMEOUT;

    loop {
        let frame = tokio::time::timeout_at(deadline, ws_reader.next())
            .await
            .map_err(|_| {
                tracing::warn!(device_label, "gateway Welcome timed out");
                SessionError::Timeout
            })?;

        match frame {
            Some(Ok(Message::Binary(data))) => match codec::decode(&data)? {
                GatewayFrame::Welcome {
                    identity,
                    device_label,
                } => {
                    return Ok(ConnectionInfo {
                        identity,
                        device_label,
                        is_authenticated: true,
                        connected_since: Timestamp::now(),
                    });
                }
                GatewayFrame::Challenge { code } => {
                    tracing::warn!(code = %code, "gateway requires pairing");
                    if tx.try_send(SessionEvent::PairingRequired { code }).is_err() {
                        tracing::warn!("event buffer full, dropping pairing challenge");
                    }
                }
                GatewayFrame::Bye { code, reason } => {
                    tracing::warn!(code, reason = %reason, "gateway refused session");
                    return Err(SessionError::Rejected(format!("{reason} (code {code})")));
                }
                other => {
                    tracing::warn!(?other, "unexpected frame during handshake");
                }
            },
            Some(Ok(Message::Close(_))) => {
                tracing::warn!("gateway closed connection during handshake");
                return Err(SessionError::ConnectionClosed);
            }
            Some(Ok(_)) => {
                // Ignore ping/pong/text frames.
            }
            Some(Err(e)) => {
                tracing::warn!(err = %e, "WebSocket error during handshake");
                return Err(SessionError::Io(std::io::Error::other(format!(
                    "WebSocket error during handshake: {e}"
                ))));
            }
            None => {
                tracing::warn!("gateway WebSocket stream ended during handshake");
                return Err(SessionError::ConnectionClosed);
            }
        }
    }
}

/// Background task that reads gateway frames and dispatches session events.
///
/// Acknowledgments and receipts become [`SessionEvent::Receipt`]; a `Bye`
/// frame records the close cause so the final [`SessionEvent::Closed`]
/// carries it even if the WebSocket close frame is lost. Malformed frames
/// are logged and skipped — the task does not disconnect on bad data.
async fn reader_loop(
    mut ws_reader: WsReader,
    tx: mpsc::Sender<SessionEvent>,
    connected: Arc<AtomicBool>,
) {
    let mut close_reason: Option<CloseReason> = None;

    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => {
                let receipt = match codec::decode(&data) {
                    Ok(GatewayFrame::SendAck { id }) => Some(Receipt {
                        id,
                        status: MessageStatus::Sent,
                        detail: None,
                    }),
                    Ok(GatewayFrame::SendErr { id, reason }) => Some(Receipt {
                        id,
                        status: MessageStatus::Failed,
                        detail: Some(reason),
                    }),
                    Ok(GatewayFrame::Receipt { id, kind }) => Some(Receipt {
                        id,
                        status: kind.as_status(),
                        detail: None,
                    }),
                    Ok(GatewayFrame::Bye { code, reason }) => {
                        tracing::info!(code, reason = %reason, "gateway closing session");
                        close_reason = Some(CloseReason::from_code(code));
                        None
                    }
                    Ok(other) => {
                        tracing::debug!(?other, "unexpected gateway frame");
                        None
                    }
                    Err(e) => {
                        tracing::warn!(err = %e, "malformed gateway frame, skipping");
                        None
                    }
                };
                if let Some(receipt) = receipt
                    && tx.send(SessionEvent::Receipt(receipt)).await.is_err()
                {
                    // Receiver dropped — session was discarded, exit.
                    break;
                }
            }
            Ok(Message::Close(frame)) => {
                if close_reason.is_none() {
                    close_reason = frame.map(|f| CloseReason::from_code(u16::from(f.code)));
                }
                tracing::info!("gateway WebSocket closed");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Text(_) | Message::Frame(_)) => {
                // Ignore control and non-binary frames.
            }
            Err(e) => {
                tracing::warn!(err = %e, "gateway WebSocket read error");
                break;
            }
        }
    }

    connected.store(false, Ordering::Relaxed);
    let reason = close_reason.unwrap_or(CloseReason::Lost(1006));
    let _ = tx.send(SessionEvent::Closed(reason)).await;
    tracing::info!(reason = %reason, "gateway reader task exiting");
}

/// Map a `tokio_tungstenite` connection error to a [`SessionError`].
fn map_ws_connect_error(err: &tokio_tungstenite::tungstenite::Error) -> SessionError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => SessionError::Io(std::io::Error::new(
            io_err.kind(),
            format!("gateway connect failed: {io_err}"),
        )),
        WsError::Tls(_) => {
            SessionError::Io(std::io::Error::other(format!("TLS error: {err}")))
        }
        WsError::Http(response) => SessionError::Rejected(format!(
            "gateway HTTP error: status {}",
            response.status()
        )),
        other => SessionError::Io(std::io::Error::other(format!(
            "gateway connection error: {other}"
        ))),
    }
}
