//! Connection-status and health types.
//!
//! The service owns a single session with the chat network; its observable
//! state is one of six [`ConnectionState`] values. Every transition is
//! published as a [`ConnectionStatusEvent`]. Health is a derived view:
//! [`HealthState::classify`] partitions connection states into those that
//! are fine (or converging on their own) and those that need a restart.

use serde::{Deserialize, Serialize};

use crate::message::Timestamp;

/// Observable state of the session with the chat network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session; nothing in progress.
    Disconnected,
    /// Initial session acquisition in progress.
    Connecting,
    /// Live, authenticated session.
    Connected,
    /// Session lost; automatic reacquisition in progress.
    Reconnecting,
    /// Credentials invalidated by the remote side. Terminal until an
    /// explicit restart.
    LoggedOut,
    /// Supervision gave up (reconnect attempts exhausted or a fault the
    /// supervisor cannot recover from).
    Error,
}

impl ConnectionState {
    /// Human-readable description used as the default transition message.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Disconnected => "not connected to the chat network",
            Self::Connecting => "connecting to the chat network",
            Self::Connected => "connected to the chat network",
            Self::Reconnecting => "connection lost, reconnecting",
            Self::LoggedOut => "logged out by the chat network",
            Self::Error => "connection supervision failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::LoggedOut => write!(f, "logged_out"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Identity details of a live session. Present if and only if the
/// connection state is [`ConnectionState::Connected`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// The account identity on the chat network.
    pub identity: String,
    /// Label of the device registration backing this session.
    pub device_label: String,
    /// Whether the gateway confirmed authentication.
    pub is_authenticated: bool,
    /// When the current session was established.
    pub connected_since: Timestamp,
}

/// A single connection state transition, as published to subscribers and
/// returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatusEvent {
    /// State after the transition.
    pub state: ConnectionState,
    /// Session identity, present iff `state` is `Connected`.
    pub info: Option<ConnectionInfo>,
    /// Human-readable description of the transition.
    pub message: String,
    /// When the transition happened.
    pub timestamp: Timestamp,
}

impl ConnectionStatusEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(
        state: ConnectionState,
        info: Option<ConnectionInfo>,
        message: impl Into<String>,
    ) -> Self {
        debug_assert_eq!(info.is_some(), state == ConnectionState::Connected);
        Self {
            state,
            info,
            message: message.into(),
            timestamp: Timestamp::now(),
        }
    }
}

/// Health classification derived from the connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Connected, or converging without intervention.
    Healthy,
    /// Stuck; an operator-equivalent restart is warranted.
    RequiresRestart,
    /// Unclassifiable; no action taken.
    Unknown,
}

impl HealthState {
    /// Partitions connection states into health classes.
    ///
    /// `Connecting` and `Reconnecting` are healthy: the supervisor is
    /// already converging and a restart would only interfere.
    #[must_use]
    pub const fn classify(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connected
            | ConnectionState::Connecting
            | ConnectionState::Reconnecting => Self::Healthy,
            ConnectionState::Disconnected
            | ConnectionState::Error
            | ConnectionState::LoggedOut => Self::RequiresRestart,
        }
    }
}

/// Point-in-time health observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Connection state at the time of observation.
    pub state: ConnectionState,
    /// Whether the state is classified as needing a restart.
    pub requires_restart: bool,
    /// Whether the state is classified as healthy.
    pub is_healthy: bool,
    /// When the observation was made.
    pub observed_at: Timestamp,
}

impl HealthSnapshot {
    /// Observes the given connection state at the current instant.
    #[must_use]
    pub fn observe(state: ConnectionState) -> Self {
        let class = HealthState::classify(state);
        Self {
            state,
            requires_restart: class == HealthState::RequiresRestart,
            is_healthy: class == HealthState::Healthy,
            observed_at: Timestamp::now(),
        }
    }
}
