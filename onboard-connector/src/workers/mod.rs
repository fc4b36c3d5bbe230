//! # Sync Engine & Wallet Workers
//!
//! [`SyncEngine`] is the public entry point. It registers wallet connections and owns the shared
//! context every per-wallet worker runs against.
//!
//! ## Core Components
//!
//! - [`SyncEngine`]: a clonable handle for connecting, disconnecting and driving wallets.
//! - [`SyncEngineBuilder`]: wires configuration and the optional collaborators (name resolvers,
//!   token balances, notification backend).
//! - `WalletWorker`: one task per connection. It consumes the connection's event bridge and
//!   reconciles each event against the store, in order.
//! - `Session`: the per-connection generation counter and cancel token. Enrichment results are
//!   merged only while their generation is current and the session is alive.

mod session;
mod wallet;

pub use session::{CancelReason, CancelToken};

use crate::client::{self, SignMessage};
use crate::config::SyncConfig;
use crate::dispatcher::DisconnectBus;
use crate::error::{SyncError, SyncResult};
use crate::listener::WalletListener;
use crate::notify::{NotificationManager, NotifyBackend};
use crate::provider::{Eip1193Provider, SubstrateProvider, WalletProvider, UNRECOGNIZED_CHAIN};
use crate::registry::ProviderRegistry;
use crate::resolvers::{
    valid_ens_chain, Enricher, Enrichment, EnrichmentRequest, NameResolver, RpcEnsResolver,
    RpcTokenBalances, TokenBalanceSource,
};
use crate::store::Store;
use crate::types::{
    normalize_chain_id, same_address, Account, Address, ConnectedChain, Namespace, WalletState,
};
use dashmap::DashMap;
use futures::future::join_all;
use session::Session;
use std::sync::Arc;
use tokio::task::JoinHandle;
use wallet::WalletWorker;

/// Dependencies shared by the engine and every wallet worker.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub store: Arc<Store>,
    pub enricher: Enricher,
    pub notify: Arc<NotificationManager>,
    pub sessions: Arc<DashMap<String, Arc<Session>>>,
    pub bus: DisconnectBus,
}

impl WorkerContext {
    /// Resolves derived data for `targets` in the background and merges it if `generation` is
    /// still current when the results arrive.
    fn spawn_enrichment(
        &self,
        session: Arc<Session>,
        generation: u64,
        wallet: &WalletState,
        targets: Vec<Account>,
    ) {
        if targets.is_empty() {
            return;
        }

        let state = self.store.get();
        let active = wallet.active_chain();
        let chain = active
            .and_then(|connected| state.chain(wallet.namespace(), &connected.id))
            .cloned();
        let ens_chain = active
            .and_then(|connected| valid_ens_chain(&connected.id))
            .and_then(|id| state.chain(Namespace::Evm, id))
            .cloned();

        let requests: Vec<EnrichmentRequest> = targets
            .into_iter()
            .map(|account| EnrichmentRequest {
                address: account.address,
                provider: wallet.provider.clone(),
                chain: chain.clone(),
                ens_chain: ens_chain.clone(),
                cached_ens: account.ens,
                cached_uns: account.uns,
            })
            .collect();

        // Each account resolves in its own task; a panic loses only that account's result.
        let tasks: Vec<(Address, JoinHandle<Enrichment>)> = requests
            .into_iter()
            .map(|request| {
                let enricher = self.enricher.clone();
                let address = request.address.clone();
                (address, tokio::spawn(async move { enricher.enrich(&request).await }))
            })
            .collect();

        let ctx = self.clone();
        tokio::spawn(async move {
            let (addresses, handles): (Vec<Address>, Vec<_>) = tasks.into_iter().unzip();
            let results = join_all(handles).await;
            let merged = addresses
                .into_iter()
                .zip(results)
                .map(|(address, result)| {
                    let enrichment = result.unwrap_or_else(|e| {
                        tracing::error!(label = %session.label, %address, "Enrichment task failed: {}", e);
                        Enrichment::default()
                    });
                    (address, enrichment)
                })
                .collect();
            ctx.merge(&session, generation, merged).await;
        });
    }

    async fn merge(&self, session: &Session, generation: u64, results: Vec<(Address, Enrichment)>) {
        let state = session.state.lock().await;
        if state.torn_down || session.is_cancelled() || state.generation != generation {
            tracing::debug!(
                label = %session.label,
                generation,
                current = state.generation,
                "Discarding stale enrichment"
            );
            return;
        }
        for (address, enrichment) in results {
            if let Err(e) = self
                .store
                .update_account(&session.label, &address, enrichment.into_update())
            {
                tracing::error!(label = %session.label, %address, "Failed to merge enrichment: {}", e);
            }
        }
    }

    /// Ends a session: removes the wallet and its notification subscriptions, unless a newer
    /// connection with the same label has already replaced it. Idempotent.
    async fn teardown(&self, session: &Arc<Session>) {
        {
            let mut state = session.state.lock().await;
            if state.torn_down {
                return;
            }
            state.torn_down = true;
        }
        session.cancel(CancelReason::Disconnected);

        let current = self
            .sessions
            .remove_if(session.label.as_str(), |_, registered| {
                Arc::ptr_eq(registered, session)
            })
            .is_some();
        if !current {
            tracing::debug!(label = %session.label, "Replaced session torn down");
            return;
        }

        self.store.remove_wallet(&session.label);
        self.notify.release(&session.label).await;
        tracing::info!(label = %session.label, "Wallet disconnected");
    }
}

/// Builds a [`SyncEngine`].
pub struct SyncEngineBuilder {
    config: SyncConfig,
    registry: Option<Arc<ProviderRegistry>>,
    ens: Option<Arc<dyn NameResolver>>,
    uns: Option<Arc<dyn NameResolver>>,
    tokens: Option<Arc<dyn TokenBalanceSource>>,
    notify: Option<Arc<dyn NotifyBackend>>,
}

impl SyncEngineBuilder {
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares an existing provider registry instead of creating one.
    pub fn with_registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_ens_resolver(mut self, resolver: Arc<dyn NameResolver>) -> Self {
        self.ens = Some(resolver);
        self
    }

    pub fn with_uns_resolver(mut self, resolver: Arc<dyn NameResolver>) -> Self {
        self.uns = Some(resolver);
        self
    }

    pub fn with_token_source(mut self, source: Arc<dyn TokenBalanceSource>) -> Self {
        self.tokens = Some(source);
        self
    }

    pub fn with_notify_backend(mut self, backend: Arc<dyn NotifyBackend>) -> Self {
        self.notify = Some(backend);
        self
    }

    /// Builds the engine. ENS and secondary-token lookups default to JSON-RPC through the
    /// registry; UNS is only resolved when a resolver is given.
    pub fn build(self) -> SyncResult<SyncEngine> {
        let config = self.config.normalized();
        let registry = match self.registry {
            Some(registry) => registry,
            None => Arc::new(ProviderRegistry::new()?),
        };

        let ens = self
            .ens
            .unwrap_or_else(|| Arc::new(RpcEnsResolver::new(registry.clone())) as Arc<dyn NameResolver>);
        let tokens = self
            .tokens
            .unwrap_or_else(|| {
                Arc::new(RpcTokenBalances::new(registry.clone())) as Arc<dyn TokenBalanceSource>
            });

        let notify = Arc::new(NotificationManager::new(&config.notify, self.notify));
        let store = Arc::new(Store::new(config.chains.clone(), notify.is_enabled()));

        tracing::info!(
            chains = config.chains.len(),
            notify = notify.is_enabled(),
            "Sync engine ready"
        );

        Ok(SyncEngine {
            ctx: WorkerContext {
                store,
                enricher: Enricher::new(Some(ens), self.uns, Some(tokens)),
                notify,
                sessions: Arc::new(DashMap::new()),
                bus: DisconnectBus::new(config.channels.disconnect_broadcast_buffer),
            },
            registry,
        })
    }
}

/// A clonable handle to the wallet synchronization engine.
#[derive(Clone)]
pub struct SyncEngine {
    ctx: WorkerContext,
    registry: Arc<ProviderRegistry>,
}

impl SyncEngine {
    pub fn builder() -> SyncEngineBuilder {
        SyncEngineBuilder {
            config: SyncConfig::default(),
            registry: None,
            ens: None,
            uns: None,
            tokens: None,
            notify: None,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.ctx.store
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn notifications(&self) -> &Arc<NotificationManager> {
        &self.ctx.notify
    }

    /// The per-label disconnect channel. Emitting a label here disconnects that wallet.
    pub fn disconnect_bus(&self) -> &DisconnectBus {
        &self.ctx.bus
    }

    /// Registers a wallet whose connect handshake already succeeded.
    ///
    /// A wallet already connected under `label` is replaced. The new wallet's event bridge is
    /// attached, its accounts are subscribed to notifications and a first enrichment runs in the
    /// background. Returns the registered wallet as first written to the store.
    pub async fn connect_wallet(
        &self,
        label: &str,
        provider: WalletProvider,
        chain_id: &str,
        accounts: Vec<Address>,
    ) -> SyncResult<WalletState> {
        if accounts.is_empty() {
            return Err(SyncError::NoAccounts(label.to_string()));
        }
        let mut unique: Vec<Address> = Vec::with_capacity(accounts.len());
        for address in accounts {
            if !unique.iter().any(|existing| same_address(existing, &address)) {
                unique.push(address);
            }
        }

        let namespace = provider.namespace();
        let chain_id = match namespace {
            Namespace::Evm => normalize_chain_id(chain_id),
            Namespace::Substrate => chain_id.to_string(),
        };
        let wallet = WalletState {
            label: label.to_string(),
            provider: provider.clone(),
            chains: vec![ConnectedChain {
                namespace,
                id: chain_id.clone(),
            }],
            accounts: unique.iter().cloned().map(Account::blank).collect(),
        };

        let session = Session::new(label, unique.iter().map(String::as_str));
        if let Some(previous) = self.ctx.sessions.insert(label.to_string(), session.clone()) {
            tracing::info!(%label, "Replacing existing connection");
            // Waits out any write the old worker is in the middle of.
            let mut state = previous.state.lock().await;
            state.torn_down = true;
            previous.cancel(CancelReason::Replaced);
        }
        self.ctx.store.add_wallet(wallet.clone());

        let listener = WalletListener::attach(
            label,
            &provider,
            session.token(),
            self.ctx.bus.subscribe(label),
        );
        let worker = WalletWorker::new(self.ctx.clone(), session, provider, listener);
        tokio::spawn(worker.run());

        tracing::info!(%label, %namespace, %chain_id, accounts = wallet.accounts.len(), "Wallet connected");
        Ok(wallet)
    }

    /// Connects an EVM wallet: requests its accounts and chain, then registers it.
    pub async fn connect_evm(
        &self,
        label: &str,
        provider: Arc<dyn Eip1193Provider>,
    ) -> SyncResult<WalletState> {
        let accounts = client::request_accounts(provider.as_ref()).await?;
        let chain_id = client::get_chain_id(provider.as_ref()).await?;
        self.connect_wallet(label, WalletProvider::Evm(provider), &chain_id, accounts)
            .await
    }

    /// Connects a substrate extension on the given network.
    pub async fn connect_substrate(
        &self,
        label: &str,
        provider: Arc<dyn SubstrateProvider>,
        chain_id: &str,
    ) -> SyncResult<WalletState> {
        let accounts = client::enable(provider.as_ref()).await?;
        self.connect_wallet(label, WalletProvider::Substrate(provider), chain_id, accounts)
            .await
    }

    /// Disconnects a wallet. The wallet is gone from the store when this returns.
    pub async fn disconnect_wallet(&self, label: &str) -> SyncResult<()> {
        let session = self
            .ctx
            .sessions
            .get(label)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SyncError::WalletNotFound(label.to_string()))?;
        self.ctx.teardown(&session).await;
        self.ctx.bus.emit(label);
        Ok(())
    }

    /// Disconnects every wallet.
    pub async fn reset(&self) {
        let labels: Vec<String> = self
            .ctx
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for label in labels {
            if let Err(e) = self.disconnect_wallet(&label).await {
                tracing::debug!(%label, "Skipping reset of wallet: {}", e);
            }
        }
        self.ctx.store.clear_wallets();
    }

    /// Asks the wallet to switch to a configured chain, adding the chain to the wallet first if
    /// the wallet does not know it. The store follows once the wallet reports the change.
    pub async fn set_chain(&self, label: &str, chain_id: &str) -> SyncResult<()> {
        let wallet = self.wallet(label)?;
        let provider = wallet
            .provider
            .as_evm()
            .ok_or_else(|| SyncError::Unsupported {
                label: label.to_string(),
                namespace: wallet.namespace(),
                operation: "wallet_switchEthereumChain",
            })?;
        let chain_id = normalize_chain_id(chain_id);

        match client::switch_chain(provider.as_ref(), &chain_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some(UNRECOGNIZED_CHAIN) => {
                let chain = self
                    .ctx
                    .store
                    .get()
                    .chain(Namespace::Evm, &chain_id)
                    .cloned()
                    .ok_or_else(|| SyncError::UnknownChain(chain_id.clone()))?;
                tracing::info!(%label, %chain_id, "Adding chain to wallet");
                client::add_chain(provider.as_ref(), &chain).await?;
                client::switch_chain(provider.as_ref(), &chain_id).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Signs a message with the wallet's primary account.
    pub async fn sign_message(&self, label: &str, message: SignMessage) -> SyncResult<String> {
        client::sign_message(&self.wallet(label)?, message).await
    }

    fn wallet(&self, label: &str) -> SyncResult<WalletState> {
        self.ctx
            .store
            .wallet(label)
            .ok_or_else(|| SyncError::WalletNotFound(label.to_string()))
    }
}
