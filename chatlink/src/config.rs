//! Configuration system for the `ChatLink` bridge.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/chatlink/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;
use std::time::Duration;

use crate::connection::ReconnectPolicy;

/// Errors that can occur when loading bridge configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the bridge.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChatlinkConfigFile {
    server: ServerFileConfig,
    gateway: GatewayFileConfig,
    supervisor: SupervisorFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
}

/// `[gateway]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct GatewayFileConfig {
    url: Option<String>,
    device_label: Option<String>,
    auth_token: Option<String>,
}

/// `[supervisor]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SupervisorFileConfig {
    connect_timeout_secs: Option<u64>,
    reconnect_backoff_secs: Option<u64>,
    max_reconnect_attempts: Option<u32>,
    settle_delay_secs: Option<u64>,
    health_interval_secs: Option<u64>,
    broadcast_capacity: Option<usize>,
    tracker_capacity: Option<usize>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the bridge.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "ChatLink supervised chat-network bridge")]
pub struct ChatlinkCliArgs {
    /// Address to bind the API server to.
    #[arg(short, long, env = "CHATLINK_ADDR")]
    pub bind: Option<String>,

    /// WebSocket URL of the chat-network gateway.
    #[arg(short, long, env = "CHATLINK_GATEWAY_URL")]
    pub gateway_url: Option<String>,

    /// Device label announced to the gateway.
    #[arg(long, env = "CHATLINK_DEVICE_LABEL")]
    pub device_label: Option<String>,

    /// Authentication token presented to the gateway.
    #[arg(long, env = "CHATLINK_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Path to config file (default: `~/.config/chatlink/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "CHATLINK_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved bridge configuration.
#[derive(Debug, Clone)]
pub struct ChatlinkConfig {
    /// Address to bind the API server to (e.g., `0.0.0.0:9100`).
    pub bind_addr: String,
    /// WebSocket URL of the chat-network gateway.
    pub gateway_url: String,
    /// Device label announced during the session handshake.
    pub device_label: String,
    /// Optional authentication token for the handshake.
    pub auth_token: Option<String>,
    /// How long a session acquisition may take before it is abandoned.
    pub connect_timeout: Duration,
    /// Pause between automatic reconnect attempts.
    pub reconnect_backoff: Duration,
    /// Automatic reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Pause between tearing a session down and acquiring a new one.
    pub settle_delay: Duration,
    /// Interval between periodic health checks.
    pub health_interval: Duration,
    /// Per-subscriber buffer of the status broadcaster.
    pub broadcast_capacity: usize,
    /// Maximum number of tracked message records.
    pub tracker_capacity: usize,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for ChatlinkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9100".to_string(),
            gateway_url: "wss://gateway.chatlink.example/v1/session".to_string(),
            device_label: "chatlink-bridge".to_string(),
            auth_token: None,
            connect_timeout: Duration::from_secs(20),
            reconnect_backoff: Duration::from_secs(5),
            max_reconnect_attempts: 10,
            settle_delay: Duration::from_secs(3),
            health_interval: Duration::from_secs(30),
            broadcast_capacity: 64,
            tracker_capacity: 10_000,
            log_level: "info".to_string(),
        }
    }
}

impl ChatlinkConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &ChatlinkCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// The reconnect policy carried by this configuration.
    #[must_use]
    pub const fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            connect_timeout: self.connect_timeout,
            reconnect_backoff: self.reconnect_backoff,
            max_reconnect_attempts: self.max_reconnect_attempts,
            settle_delay: self.settle_delay,
        }
    }

    /// Resolve a `ChatlinkConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &ChatlinkCliArgs, file: &ChatlinkConfigFile) -> Self {
        let defaults = Self::default();
        let sup = &file.supervisor;

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            gateway_url: cli
                .gateway_url
                .clone()
                .or_else(|| file.gateway.url.clone())
                .unwrap_or(defaults.gateway_url),
            device_label: cli
                .device_label
                .clone()
                .or_else(|| file.gateway.device_label.clone())
                .unwrap_or(defaults.device_label),
            auth_token: cli.auth_token.clone().or_else(|| file.gateway.auth_token.clone()),
            connect_timeout: sup
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            reconnect_backoff: sup
                .reconnect_backoff_secs
                .map_or(defaults.reconnect_backoff, Duration::from_secs),
            max_reconnect_attempts: sup
                .max_reconnect_attempts
                .unwrap_or(defaults.max_reconnect_attempts),
            settle_delay: sup
                .settle_delay_secs
                .map_or(defaults.settle_delay, Duration::from_secs),
            health_interval: sup
                .health_interval_secs
                .map_or(defaults.health_interval, Duration::from_secs),
            broadcast_capacity: sup
                .broadcast_capacity
                .unwrap_or(defaults.broadcast_capacity),
            tracker_capacity: sup.tracker_capacity.unwrap_or(defaults.tracker_capacity),
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file for the bridge.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<ChatlinkConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ChatlinkConfigFile::default());
        };
        config_dir.join("chatlink").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ChatlinkConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
