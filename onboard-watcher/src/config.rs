use anyhow::{Context, Result};
use onboard_connector::SyncConfig;
use onboard_logger::LogConfig;
use serde::Deserialize;
use std::time::Duration;

/// The top-level configuration for the watcher binary.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct WatcherConfig {
    #[serde(default)]
    pub connector: SyncConfig,
    #[serde(default)]
    pub watcher: WatcherSpecificConfig,
}

/// Settings that are unique to the watcher binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct WatcherSpecificConfig {
    /// JSON-RPC endpoint of the node whose accounts are watched.
    pub node_url: String,
    /// Label the node wallet is registered under.
    pub label: String,
    pub poll_interval_secs: u64,
    pub log: LogConfig,
}

impl WatcherSpecificConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Default for WatcherSpecificConfig {
    fn default() -> Self {
        Self {
            node_url: "http://127.0.0.1:8545".to_string(),
            label: "node".to_string(),
            poll_interval_secs: 4,
            log: LogConfig {
                level: "info".to_string(),
                ..Default::default()
            },
        }
    }
}

/// Loads the watcher configuration from a TOML file, with `ONBOARD__`-prefixed environment
/// variables taking precedence (e.g. `ONBOARD__WATCHER__LABEL`).
pub fn load_config(path: &str) -> Result<WatcherConfig> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix("ONBOARD").separator("__"));

    let settings: WatcherConfig = builder
        .build()
        .context(format!("Failed to build configuration from '{}'", path))?
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    Ok(settings)
}
