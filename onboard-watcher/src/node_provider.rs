//! An EIP-1193 provider backed by a node's JSON-RPC endpoint.
//!
//! Nodes do not push `accountsChanged`/`chainChanged`, so the provider polls `eth_accounts` and
//! `eth_chainId` and fires the registered handlers when either differs from the last poll.

use async_trait::async_trait;
use dashmap::DashMap;
use onboard_connector::provider::{ListenerId, ProviderEventKind, ProviderListener};
use onboard_connector::registry::RpcClient;
use onboard_connector::types::{normalize_chain_id, Address, ChainId};
use onboard_connector::{Eip1193Provider, ProviderError};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct NodeProvider {
    rpc: Arc<RpcClient>,
    listeners: DashMap<ListenerId, (ProviderEventKind, ProviderListener)>,
    next_id: AtomicU64,
    poller: Mutex<Option<JoinHandle<()>>>,
}

/// The last values seen by the poller.
#[derive(Debug, Default)]
struct NodeSnapshot {
    accounts: Option<Vec<Address>>,
    chain_id: Option<ChainId>,
}

impl NodeSnapshot {
    /// Records a poll result and returns the notifications it implies. The first poll only sets
    /// the baseline.
    fn observe(&mut self, accounts: Vec<Address>, chain_id: ChainId) -> Vec<(ProviderEventKind, Value)> {
        let mut events = Vec::new();
        let chain_id = normalize_chain_id(&chain_id);

        if self.chain_id.as_ref().is_some_and(|last| *last != chain_id) {
            events.push((ProviderEventKind::ChainChanged, json!(chain_id)));
        }
        if self.accounts.as_ref().is_some_and(|last| *last != accounts) {
            events.push((ProviderEventKind::AccountsChanged, json!(accounts)));
        }

        self.chain_id = Some(chain_id);
        self.accounts = Some(accounts);
        events
    }
}

impl NodeProvider {
    pub fn new(rpc: Arc<RpcClient>) -> Arc<Self> {
        Arc::new(Self {
            rpc,
            listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
            poller: Mutex::new(None),
        })
    }

    /// Starts polling the node. The poller stops on [`disconnect`](Eip1193Provider::disconnect)
    /// or when the provider is dropped.
    pub fn start_polling(self: &Arc<Self>, interval: Duration) {
        let provider: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut snapshot = NodeSnapshot::default();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(provider) = provider.upgrade() else {
                    break;
                };
                provider.poll_once(&mut snapshot).await;
            }
        });

        let previous = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    async fn poll_once(&self, snapshot: &mut NodeSnapshot) {
        let (accounts, chain_id) = tokio::join!(
            self.rpc.call("eth_accounts", json!([])),
            self.rpc.call("eth_chainId", json!([]))
        );
        let polled = accounts.and_then(|accounts| {
            let accounts: Vec<Address> = serde_json::from_value(accounts)
                .map_err(|e| ProviderError::InvalidResponse(format!("eth_accounts: {}", e)))?;
            let chain_id = chain_id?
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ProviderError::InvalidResponse("eth_chainId: not a string".into()))?;
            Ok((accounts, chain_id))
        });

        match polled {
            Ok((accounts, chain_id)) => {
                for (kind, payload) in snapshot.observe(accounts, chain_id) {
                    tracing::debug!(node = %self.rpc.url(), event = kind.as_str(), "Node state changed");
                    self.emit(kind, payload);
                }
            }
            Err(e) => tracing::warn!(node = %self.rpc.url(), "Failed to poll node: {}", e),
        }
    }

    fn emit(&self, kind: ProviderEventKind, payload: Value) {
        let handlers: Vec<ProviderListener> = self
            .listeners
            .iter()
            .filter(|entry| entry.value().0 == kind)
            .map(|entry| entry.value().1.clone())
            .collect();
        for handler in handlers {
            handler(payload.clone());
        }
    }
}

#[async_trait]
impl Eip1193Provider for NodeProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        match method {
            // Node accounts are already unlocked; there is nothing to ask for.
            "eth_requestAccounts" => self.rpc.call("eth_accounts", params).await,
            m if m.starts_with("wallet_") => Err(ProviderError::Unsupported(m.to_string())),
            _ => self.rpc.call(method, params).await,
        }
    }

    fn on(&self, event: ProviderEventKind, listener: ProviderListener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, (event, listener));
        id
    }

    fn remove_listener(&self, _event: ProviderEventKind, id: ListenerId) {
        self.listeners.remove(&id);
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        if let Some(poller) = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            poller.abort();
            tracing::debug!(node = %self.rpc.url(), "Node polling stopped");
        }
        Ok(())
    }
}
