//! Connection health monitoring.
//!
//! The monitor never repairs anything itself: it classifies the current
//! connection state and, when the state is stuck, asks the manager for an
//! ordinary restart — the same operation an operator would invoke. States
//! the supervisor is already converging on (`Connecting`, `Reconnecting`)
//! are left alone.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use chatlink_proto::status::{ConnectionState, HealthSnapshot, HealthState};

use crate::broadcast::StatusBroadcaster;
use crate::connection::ConnectionManager;
use crate::session::SessionConnector;

/// What a health check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthAction {
    /// The state was healthy (or unclassifiable); nothing was done.
    None,
    /// The state required a restart and the restart succeeded.
    Restarted,
    /// The state required a restart and the restart failed.
    RestartFailed,
}

/// Outcome of a single health check. Never an error: failures are data.
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    /// What the check did.
    pub action: HealthAction,
    /// Connection state before the check.
    pub previous_state: ConnectionState,
    /// Connection state after the check (and any restart it performed).
    pub current_state: ConnectionState,
    /// Error description when the action was [`HealthAction::RestartFailed`].
    pub error: Option<String>,
}

/// Classifies connection health and restarts stuck sessions.
pub struct HealthMonitor {
    broadcaster: Arc<StatusBroadcaster>,
}

impl HealthMonitor {
    /// Creates a monitor publishing observations to the given broadcaster.
    #[must_use]
    pub const fn new(broadcaster: Arc<StatusBroadcaster>) -> Self {
        Self { broadcaster }
    }

    /// Run one health check.
    ///
    /// On a state classified as requiring a restart, calls
    /// `restart(force = false)` exactly once. The classification partition
    /// guarantees that path is never taken while connected, so the
    /// unforced restart cannot be rejected. Publishes a [`HealthSnapshot`]
    /// for the post-check state either way.
    pub async fn check_once<C>(&self, manager: &Arc<ConnectionManager<C>>) -> HealthCheckResult
    where
        C: SessionConnector + 'static,
    {
        let previous_state = manager.state();
        let (action, error) = match HealthState::classify(previous_state) {
            HealthState::Healthy | HealthState::Unknown => (HealthAction::None, None),
            HealthState::RequiresRestart => {
                tracing::warn!(state = %previous_state, "connection unhealthy, restarting");
                match manager.restart(false, "health check").await {
                    Ok(new_state) => {
                        tracing::info!(state = %new_state, "health restart complete");
                        (HealthAction::Restarted, None)
                    }
                    Err(e) => {
                        tracing::error!(err = %e, "health restart failed");
                        (HealthAction::RestartFailed, Some(e.to_string()))
                    }
                }
            }
        };

        let current_state = manager.state();
        self.broadcaster
            .publish_health(HealthSnapshot::observe(current_state));

        HealthCheckResult {
            action,
            previous_state,
            current_state,
            error,
        }
    }

    /// Run checks forever at `period`, starting with an immediate one.
    ///
    /// Checks never overlap: a slow check (a restart takes at least the
    /// settle delay) simply delays the next tick. Consumes the monitor;
    /// the returned handle is the only way to stop it.
    pub fn start_periodic<C>(
        self,
        manager: Arc<ConnectionManager<C>>,
        period: Duration,
    ) -> PeriodicHealth
    where
        C: SessionConnector + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        let result = self.check_once(&manager).await;
                        tracing::debug!(
                            action = ?result.action,
                            state = %result.current_state,
                            "periodic health check complete"
                        );
                    }
                }
            }
            tracing::debug!("health monitor stopped");
        });
        PeriodicHealth {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running periodic health task.
pub struct PeriodicHealth {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PeriodicHealth {
    /// Stop the periodic task and wait for it to finish.
    ///
    /// An in-flight check completes first; no check starts after this
    /// returns.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if self.task.await.is_err() {
            tracing::warn!("health monitor task panicked");
        }
    }
}
