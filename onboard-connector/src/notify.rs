//! # Notification Subscription Manager
//!
//! Keeps an external transaction-notification backend subscribed to the `(address, chain)` pairs
//! of connected wallets. Every backend failure is treated as "not supported for this network":
//! it is logged at debug level and otherwise ignored.

use crate::config::NotifyConfig;
use crate::types::{Address, ChainId};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Account,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub id: Address,
    pub chain_id: ChainId,
    pub kind: SubscriptionKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribeRequest {
    pub id: Address,
    pub chain_id: ChainId,
    /// How long the backend keeps the subscription alive before dropping it. `None` drops it
    /// immediately.
    pub timeout: Option<Duration>,
}

/// A transaction-notification backend client.
#[async_trait]
pub trait NotifyBackend: Send + Sync {
    async fn subscribe(&self, request: SubscribeRequest) -> anyhow::Result<()>;
    async fn unsubscribe(&self, request: UnsubscribeRequest) -> anyhow::Result<()>;
}

/// The lifetime a subscription belongs to, usually one wallet session.
#[async_trait]
pub trait SubscriptionScope: Send + Sync {
    /// Runs `record` if the scope is still live, without racing the scope's end. Returns `false`
    /// if the scope had already ended.
    async fn record_if_live(&self, record: &(dyn Fn() + Send + Sync)) -> bool;
}

/// A scope that never ends.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unscoped;

#[async_trait]
impl SubscriptionScope for Unscoped {
    async fn record_if_live(&self, record: &(dyn Fn() + Send + Sync)) -> bool {
        record();
        true
    }
}

pub struct NotificationManager {
    backend: Option<Arc<dyn NotifyBackend>>,
    enabled: bool,
    grace: Duration,
    active: DashMap<String, HashSet<(Address, ChainId)>>,
}

impl NotificationManager {
    pub fn new(config: &NotifyConfig, backend: Option<Arc<dyn NotifyBackend>>) -> Self {
        Self {
            backend,
            enabled: config.enabled,
            grace: config.unsubscribe_grace(),
            active: DashMap::new(),
        }
    }

    /// `true` when notifications are enabled and a backend is configured.
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.backend.is_some()
    }

    fn backend(&self) -> Option<&Arc<dyn NotifyBackend>> {
        self.backend.as_ref().filter(|_| self.enabled)
    }

    pub async fn subscribe(&self, label: &str, address: &str, chain_id: &str) {
        self.subscribe_scoped(&Unscoped, label, address, chain_id)
            .await;
    }

    /// Subscribes an address and records it under `label`, unless `scope` ended while the backend
    /// call was in flight. In that case the backend subscription is dropped again right away.
    pub async fn subscribe_scoped(
        &self,
        scope: &dyn SubscriptionScope,
        label: &str,
        address: &str,
        chain_id: &str,
    ) {
        let Some(backend) = self.backend() else {
            return;
        };
        let request = SubscribeRequest {
            id: address.to_string(),
            chain_id: chain_id.to_string(),
            kind: SubscriptionKind::Account,
        };
        if let Err(e) = backend.subscribe(request).await {
            tracing::debug!(label, address, chain_id, "Notification subscribe failed: {}", e);
            return;
        }

        let record = || {
            self.active
                .entry(label.to_string())
                .or_default()
                .insert((address.to_string(), chain_id.to_string()));
        };
        if scope.record_if_live(&record).await {
            return;
        }

        tracing::debug!(label, address, chain_id, "Subscription outlived its session, dropping it");
        // A newer session under the same label may hold the same pair.
        if self.is_active(label, address, chain_id) {
            return;
        }
        let request = UnsubscribeRequest {
            id: address.to_string(),
            chain_id: chain_id.to_string(),
            timeout: None,
        };
        if let Err(e) = backend.unsubscribe(request).await {
            tracing::debug!(label, address, chain_id, "Notification unsubscribe failed: {}", e);
        }
    }

    fn is_active(&self, label: &str, address: &str, chain_id: &str) -> bool {
        self.active.get(label).is_some_and(|active| {
            active.contains(&(address.to_string(), chain_id.to_string()))
        })
    }

    pub async fn unsubscribe(
        &self,
        label: &str,
        address: &str,
        chain_id: &str,
        timeout: Option<Duration>,
    ) {
        let Some(backend) = self.backend() else {
            return;
        };
        if let Some(mut active) = self.active.get_mut(label) {
            active.remove(&(address.to_string(), chain_id.to_string()));
        }
        let request = UnsubscribeRequest {
            id: address.to_string(),
            chain_id: chain_id.to_string(),
            timeout,
        };
        if let Err(e) = backend.unsubscribe(request).await {
            tracing::debug!(label, address, chain_id, "Notification unsubscribe failed: {}", e);
        }
    }

    /// Moves every address from `old_chain` to `new_chain`. The old subscriptions are kept alive
    /// for the configured grace period so transactions already in flight are still reported.
    pub async fn switch_chain(
        &self,
        scope: &dyn SubscriptionScope,
        label: &str,
        addresses: &[Address],
        old_chain: &str,
        new_chain: &str,
    ) {
        if !self.is_enabled() {
            return;
        }
        for address in addresses {
            self.unsubscribe(label, address, old_chain, Some(self.grace))
                .await;
        }
        for address in addresses {
            self.subscribe_scoped(scope, label, address, new_chain)
                .await;
        }
    }

    /// Drops every subscription of a label immediately.
    pub async fn release(&self, label: &str) {
        let Some((_, active)) = self.active.remove(label) else {
            return;
        };
        for (address, chain_id) in active {
            self.unsubscribe(label, &address, &chain_id, None).await;
        }
    }

    /// The subscriptions currently held for a label.
    pub fn active_for(&self, label: &str) -> Vec<(Address, ChainId)> {
        let mut active: Vec<_> = self
            .active
            .get(label)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        active.sort();
        active
    }
}
