//! Configuration module for the depth ladder feed

use serde::Deserialize;
use std::path::Path;

use crate::error::Result;
use crate::orderbook::DepthPolicy;
use crate::parser::Product;

/// Environment variable naming an optional config file
pub const CONFIG_FILE_VAR: &str = "FEED_CONFIG_FILE";

/// Prefix of environment overrides, e.g. `FEED_VISIBLE_ROWS=20`
pub const ENV_PREFIX: &str = "FEED";

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// WebSocket endpoint of the book feed
    pub ws_endpoint: String,

    /// Product subscribed on startup
    pub product: Product,

    /// Rows per side that get a depth bar
    pub visible_rows: usize,

    /// Whether depth is normalized across both sides or per side
    pub depth_policy: DepthPolicy,

    /// Processing tick driving the sequencer and publication
    pub tick_interval_ms: u64,

    /// Queued updates applied per tick
    pub updates_per_tick: usize,

    /// Queue bound before a resync is forced
    pub max_pending_updates: usize,

    /// IPC socket path for publishing data
    pub ipc_socket_path: String,

    /// Ping the feed after this long without any frame
    pub keepalive_interval_ms: u64,

    /// Reconnect when no frame arrives this long after the last one
    pub recv_timeout_ms: u64,

    /// Reconnection settings
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,

    /// Port of the health/metrics/book HTTP server
    pub health_port: u16,

    /// Health check interval in seconds
    pub health_check_interval_secs: u64,
}

impl Config {
    /// Load configuration: defaults, then `FEED_CONFIG_FILE` if set, then
    /// `FEED_*` environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let file = std::env::var(CONFIG_FILE_VAR).ok();
        Ok(Self::build(file.as_deref().map(Path::new))?)
    }

    /// Load configuration from a file on top of the defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::build(Some(path))
    }

    fn build(file: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("ws_endpoint", defaults.ws_endpoint)?
            .set_default("product", defaults.product.as_str())?
            .set_default("visible_rows", defaults.visible_rows as i64)?
            .set_default("depth_policy", "combined")?
            .set_default("tick_interval_ms", defaults.tick_interval_ms as i64)?
            .set_default("updates_per_tick", defaults.updates_per_tick as i64)?
            .set_default("max_pending_updates", defaults.max_pending_updates as i64)?
            .set_default("ipc_socket_path", defaults.ipc_socket_path)?
            .set_default("keepalive_interval_ms", defaults.keepalive_interval_ms as i64)?
            .set_default("recv_timeout_ms", defaults.recv_timeout_ms as i64)?
            .set_default("reconnect_delay_ms", defaults.reconnect_delay_ms as i64)?
            .set_default("max_reconnect_attempts", defaults.max_reconnect_attempts as i64)?
            .set_default("health_port", defaults.health_port as i64)?
            .set_default(
                "health_check_interval_secs",
                defaults.health_check_interval_secs as i64,
            )?;

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_endpoint: "wss://www.cryptofacilities.com/ws/v1".to_string(),
            product: Product::XbtUsd,
            visible_rows: 25,
            depth_policy: DepthPolicy::Combined,
            tick_interval_ms: 100,
            updates_per_tick: 64,
            max_pending_updates: crate::sequencer::DEFAULT_MAX_PENDING,
            ipc_socket_path: "/tmp/depth-ladder.sock".to_string(),
            keepalive_interval_ms: 30_000,
            recv_timeout_ms: 45_000,
            reconnect_delay_ms: 1000,
            max_reconnect_attempts: 10,
            health_port: 9090,
            health_check_interval_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
product = "PI_ETHUSD"
visible_rows = 12
depth_policy = "per_side"
max_pending_updates = 256
recv_timeout_ms = 60000
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.product, Product::EthUsd);
        assert_eq!(config.visible_rows, 12);
        assert_eq!(config.depth_policy, DepthPolicy::PerSide);
        assert_eq!(config.max_pending_updates, 256);
        assert_eq!(config.recv_timeout_ms, 60_000);
        assert_eq!(config.keepalive_interval_ms, 30_000);
        assert_eq!(config.tick_interval_ms, 100);
        assert_eq!(config.ws_endpoint, "wss://www.cryptofacilities.com/ws/v1");
    }

    #[test]
    fn test_unknown_product_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, r#"product = "PI_DOGEUSD""#).unwrap();

        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::from_file(&dir.path().join("absent.toml")).is_err());
    }
}
