//! `ChatLink` — supervised chat-network bridge.
//!
//! Holds one long-lived session to a chat-network gateway, supervises its
//! lifecycle, and exposes messaging, status, and health over a local HTTP
//! API. Configuration via CLI flags, environment variables, or config file
//! (`~/.config/chatlink/config.toml`).
//!
//! ```bash
//! # Run with defaults (binds 0.0.0.0:9100)
//! cargo run --bin chatlink
//!
//! # Point at a gateway
//! cargo run --bin chatlink -- --gateway-url wss://gw.example/v1/session \
//!     --device-label office-bridge
//!
//! # Or via environment variables
//! CHATLINK_GATEWAY_URL=wss://gw.example/v1/session cargo run --bin chatlink
//! ```

use std::sync::Arc;

use clap::Parser;

use chatlink::broadcast::StatusBroadcaster;
use chatlink::config::{ChatlinkCliArgs, ChatlinkConfig};
use chatlink::connection::ConnectionManager;
use chatlink::health::HealthMonitor;
use chatlink::server::{self, AppState};
use chatlink::session::ws::WsConnector;
use chatlink::tracker::MessageTracker;

#[tokio::main]
async fn main() {
    let cli = ChatlinkCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match ChatlinkConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr,
        gateway = %config.gateway_url,
        "starting chatlink bridge"
    );

    let broadcaster = Arc::new(StatusBroadcaster::new(config.broadcast_capacity));
    let connector = WsConnector::new(
        config.gateway_url.as_str(),
        config.device_label.as_str(),
        config.auth_token.clone(),
    );
    let (manager, receipts) = ConnectionManager::new(
        connector,
        config.reconnect_policy(),
        Arc::clone(&broadcaster),
    );
    let tracker = Arc::new(MessageTracker::new(config.tracker_capacity));
    let receipt_loop = server::spawn_receipt_loop(Arc::clone(&tracker), receipts);

    // First connect. A failure here is not fatal: the periodic health check
    // will keep retrying the restart path.
    if let Err(e) = manager.start().await {
        tracing::warn!(err = %e, "initial connect failed, health monitor will retry");
    }

    let monitor = HealthMonitor::new(Arc::clone(&broadcaster));
    let periodic = monitor.start_periodic(Arc::clone(&manager), config.health_interval);

    let state = Arc::new(AppState {
        manager: Arc::clone(&manager),
        tracker,
        broadcaster,
    });

    let server_handle = match server::start_server(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "API server listening");
            handle
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start API server");
            std::process::exit(1);
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }

    tracing::info!("shutting down");
    periodic.stop().await;
    manager.shutdown().await;
    server_handle.abort();
    receipt_loop.abort();
    tracing::info!("chatlink exiting");
}
