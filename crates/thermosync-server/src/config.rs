//! Server configuration.
//!
//! Configuration is layered, later sources overriding earlier ones:
//! - Built-in defaults
//! - A TOML file: `$THERMOSYNC_CONFIG`, else the first of `thermosync.toml`,
//!   `/etc/thermosync/thermosync.toml`, `~/.config/thermosync/thermosync.toml`
//! - Environment variables (`THERMOSYNC_PORT`, `THERMOSYNC_LIMITS__MAX_CONNECTIONS`, ...)

use anyhow::{Context, Result};
use ::config::builder::DefaultState;
use ::config::{ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thermosync_core::HubConfig;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "THERMOSYNC_CONFIG";

const ENV_PREFIX: &str = "THERMOSYNC";

const CONFIG_PATHS: [&str; 3] = [
    "thermosync.toml",
    "/etc/thermosync/thermosync.toml",
    "~/.config/thermosync/thermosync.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Broadcast tuning.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Broadcast channel and fan-out configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Messages queued before submitters have to wait.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// How long a connection waits for queue space before its message is
    /// dropped, in milliseconds.
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_ms: u64,

    /// How long one write may take before the connection is dropped, in
    /// milliseconds.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,

    /// Disconnect clients that send undecodable frames.
    #[serde(default)]
    pub close_on_malformed: bool,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_connections() -> usize {
    100_000
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_channel_capacity() -> usize {
    thermosync_core::broadcast::DEFAULT_CHANNEL_CAPACITY
}

fn default_submit_timeout() -> u64 {
    1_000
}

fn default_write_timeout() -> u64 {
    5_000
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            broadcast: BroadcastConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            submit_timeout_ms: default_submit_timeout(),
            write_timeout_ms: default_write_timeout(),
            close_on_malformed: false,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, with
    /// environment overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// environment override has the wrong type.
    pub fn load() -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = find_config_file() {
            tracing::info!("Loading config from {}", path.display());
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        Self::build(builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        ))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a valid socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Hub settings derived from this configuration.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            channel_capacity: self.broadcast.channel_capacity,
            submit_timeout: Duration::from_millis(self.broadcast.submit_timeout_ms),
            write_timeout: Duration::from_millis(self.broadcast.write_timeout_ms),
            max_connections: self.limits.max_connections,
            close_on_malformed: self.broadcast.close_on_malformed,
            ..HubConfig::default()
        }
    }
}

fn find_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(shellexpand::tilde(&path).as_ref()));
    }

    CONFIG_PATHS
        .iter()
        .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml_str: &str) -> Result<Config> {
        Config::build(
            ::config::Config::builder().add_source(File::from_str(toml_str, FileFormat::Toml)),
        )
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.transport.websocket_path, "/ws");
        assert!(!config.broadcast.close_on_malformed);
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 3000);

        let bad = Config {
            host: "not a host".into(),
            ..Config::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [limits]
            max_connections = 50000

            [broadcast]
            write_timeout_ms = 250
            close_on_malformed = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.limits.max_connections, 50000);
        assert_eq!(config.limits.max_message_size, 64 * 1024);
        assert_eq!(config.broadcast.write_timeout_ms, 250);
        assert!(config.broadcast.close_on_malformed);
    }

    #[test]
    fn test_layered_sources() {
        let config = from_toml(
            r#"
            port = 4000

            [metrics]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.host, "127.0.0.1");
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.port, 9090);
    }

    #[test]
    fn test_empty_sources_give_defaults() {
        let config = from_toml("").unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.broadcast.channel_capacity, 1024);
    }

    #[test]
    fn test_invalid_type_is_rejected() {
        assert!(from_toml(r#"port = "eighty""#).is_err());
    }

    #[test]
    fn test_hub_config() {
        let mut config = Config::default();
        config.broadcast.submit_timeout_ms = 20;
        config.broadcast.channel_capacity = 8;
        config.limits.max_connections = 3;

        let hub = config.hub_config();
        assert_eq!(hub.submit_timeout, Duration::from_millis(20));
        assert_eq!(hub.write_timeout, Duration::from_secs(5));
        assert_eq!(hub.channel_capacity, 8);
        assert_eq!(hub.max_connections, 3);
    }
}
