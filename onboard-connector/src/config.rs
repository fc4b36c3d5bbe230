use crate::types::{normalize_chain_id, Chain};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The top-level configuration for the `onboard-connector` library.
///
/// This struct aggregates the supported chains, the notification settings and internal channel
/// sizes. It is typically deserialized from a configuration file and passed to
/// [`SyncEngine::builder`](crate::workers::SyncEngine::builder).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SyncConfig {
    /// The chains the application supports. Wallet chains outside this list are tracked, but
    /// nothing is resolved for them.
    #[serde(default)]
    pub chains: Vec<Chain>,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub channels: ChannelConfig,
}

/// Settings for the transaction-notification backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct NotifyConfig {
    /// Whether accounts are subscribed to the backend at all.
    pub enabled: bool,
    /// How long the backend keeps an old-chain subscription alive after a chain switch, so
    /// transactions already in flight are still reported.
    pub unsubscribe_grace_secs: u64,
}

/// Defines capacities for the channels within the connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ChannelConfig {
    /// The buffer capacity of the per-label disconnect broadcast channel.
    pub disconnect_broadcast_buffer: usize,
}

impl SyncConfig {
    /// Returns a copy with every configured chain id normalised to lowercase hex.
    pub fn normalized(mut self) -> Self {
        for chain in &mut self.chains {
            chain.id = normalize_chain_id(&chain.id);
        }
        self
    }
}

impl NotifyConfig {
    pub fn unsubscribe_grace(&self) -> Duration {
        Duration::from_secs(self.unsubscribe_grace_secs)
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            unsubscribe_grace_secs: 60,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            disconnect_broadcast_buffer: 64,
        }
    }
}
