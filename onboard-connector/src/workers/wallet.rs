use crate::client;
use crate::events::WalletEventData;
use crate::listener::WalletListener;
use crate::provider::WalletProvider;
use crate::store::WalletUpdate;
use crate::types::{same_address, same_chain, Account, Address, ChainId, ConnectedChain, WalletState};
use crate::workers::session::{address_key, Session};
use crate::workers::WorkerContext;
use std::sync::Arc;

/// Reconciles the events of one wallet connection against the store.
///
/// Events are handled strictly in the order the bridge delivered them. The structural part of each
/// reconciliation (account order, active chain, invalidated fields) is written before the next
/// event is taken; enrichment runs in the background and is merged only if no later event has
/// bumped the session generation in the meantime.
pub(crate) struct WalletWorker {
    ctx: WorkerContext,
    session: Arc<Session>,
    provider: WalletProvider,
    listener: WalletListener,
}

impl WalletWorker {
    pub fn new(
        ctx: WorkerContext,
        session: Arc<Session>,
        provider: WalletProvider,
        listener: WalletListener,
    ) -> Self {
        Self {
            ctx,
            session,
            provider,
            listener,
        }
    }

    pub async fn run(mut self) {
        let label = self.session.label.clone();
        tracing::info!(%label, namespace = %self.provider.namespace(), "Wallet worker started");

        self.on_connected().await;

        while let Some(event) = self.listener.next_event().await {
            match event.data {
                WalletEventData::AccountsChanged(addresses) => {
                    self.on_accounts_changed(addresses).await
                }
                WalletEventData::ChainChanged(chain_id) => self.on_chain_changed(chain_id).await,
                WalletEventData::Disconnected => break,
            }
        }

        self.ctx.teardown(&self.session).await;
        tracing::info!(%label, "Wallet worker stopped");
    }

    async fn on_connected(&self) {
        let label = &self.session.label;
        let (generation, wallet) = {
            let state = self.session.state.lock().await;
            if state.torn_down || self.session.is_cancelled() {
                return;
            }
            let Some(wallet) = self.ctx.store.wallet(label) else {
                return;
            };
            (state.generation, wallet)
        };

        self.ctx
            .spawn_enrichment(self.session.clone(), generation, &wallet, wallet.accounts.clone());

        if let Some(chain) = wallet.active_chain() {
            for account in &wallet.accounts {
                self.ctx
                    .notify
                    .subscribe_scoped(self.session.as_ref(), label, &account.address, &chain.id)
                    .await;
            }
        }
    }

    async fn on_accounts_changed(&self, addresses: Vec<Address>) {
        let label = &self.session.label;
        let Some(primary) = addresses.first().cloned() else {
            // Locked wallets and revoked apps report an empty account list.
            tracing::info!(%label, "Wallet reported no accounts, disconnecting");
            self.ctx.teardown(&self.session).await;
            return;
        };

        let permitted = self.permitted_accounts().await;

        let (generation, wallet, targets, subscribe_on) = {
            let mut state = self.session.state.lock().await;
            if state.torn_down || self.session.is_cancelled() {
                return;
            }
            let Some(wallet) = self.ctx.store.wallet(label) else {
                tracing::error!(%label, "Wallet missing from store during account sync");
                return;
            };

            let (matched, rest): (Vec<Account>, Vec<Account>) = wallet
                .accounts
                .iter()
                .cloned()
                .partition(|account| same_address(&account.address, &primary));
            let rest = rest.into_iter().filter(|account| match &permitted {
                Some(permitted) => permitted
                    .iter()
                    .any(|address| same_address(address, &account.address)),
                None => true,
            });

            let mut accounts = vec![matched
                .into_iter()
                .next()
                .unwrap_or_else(|| Account::blank(primary.clone()))];
            accounts.extend(rest);

            state.generation += 1;
            let update = WalletUpdate {
                accounts: Some(accounts.clone()),
                ..Default::default()
            };
            if let Err(e) = self.ctx.store.update_wallet(label, update) {
                tracing::error!(%label, "Failed to write accounts: {}", e);
                return;
            }

            // The primary is always re-resolved (balances move); others only if still blank.
            let targets: Vec<Account> = accounts
                .iter()
                .enumerate()
                .filter(|(index, account)| *index == 0 || account.is_unresolved())
                .map(|(_, account)| account.clone())
                .collect();
            let subscribe_on = if state.seen.insert(address_key(&primary)) {
                wallet.active_chain().map(|chain| chain.id.clone())
            } else {
                None
            };

            (
                state.generation,
                WalletState { accounts, ..wallet },
                targets,
                subscribe_on,
            )
        };

        tracing::debug!(%label, address = %primary, generation, "Accounts reconciled");
        self.ctx
            .spawn_enrichment(self.session.clone(), generation, &wallet, targets);

        if let Some(chain_id) = subscribe_on {
            self.ctx
                .notify
                .subscribe_scoped(self.session.as_ref(), label, &primary, &chain_id)
                .await;
        }
    }

    async fn on_chain_changed(&self, chain_id: ChainId) {
        let label = &self.session.label;

        let (generation, wallet, old_chain) = {
            let mut state = self.session.state.lock().await;
            if state.torn_down || self.session.is_cancelled() {
                return;
            }
            let Some(wallet) = self.ctx.store.wallet(label) else {
                tracing::error!(%label, "Wallet missing from store during chain sync");
                return;
            };

            let old_chain = wallet.active_chain().map(|chain| chain.id.clone());
            if old_chain
                .as_deref()
                .is_some_and(|current| same_chain(current, &chain_id))
            {
                tracing::trace!(%label, %chain_id, "Ignoring duplicate chain change");
                return;
            }

            state.generation += 1;
            let chains = vec![ConnectedChain {
                namespace: wallet.namespace(),
                id: chain_id.clone(),
            }];
            let accounts: Vec<Account> = wallet
                .accounts
                .iter()
                .map(|account| Account::blank(account.address.clone()))
                .collect();
            let update = WalletUpdate {
                chains: Some(chains.clone()),
                accounts: Some(accounts.clone()),
            };
            if let Err(e) = self.ctx.store.update_wallet(label, update) {
                tracing::error!(%label, "Failed to write chain change: {}", e);
                return;
            }

            (
                state.generation,
                WalletState {
                    chains,
                    accounts,
                    ..wallet
                },
                old_chain,
            )
        };

        tracing::info!(%label, %chain_id, generation, "Wallet switched chain");
        self.ctx.spawn_enrichment(
            self.session.clone(),
            generation,
            &wallet,
            wallet.accounts.clone(),
        );

        if let Some(old_chain) = old_chain {
            let addresses: Vec<Address> = wallet
                .accounts
                .iter()
                .map(|account| account.address.clone())
                .collect();
            self.ctx
                .notify
                .switch_chain(self.session.as_ref(), label, &addresses, &old_chain, &chain_id)
                .await;
        }
    }

    /// The accounts the wallet still grants the app, or `None` when unknown.
    async fn permitted_accounts(&self) -> Option<Vec<Address>> {
        let provider = self.provider.as_evm()?;
        match client::get_permissions(provider.as_ref()).await {
            Ok(permissions) => client::permitted_accounts(&permissions),
            Err(e) => {
                tracing::warn!(label = %self.session.label, "Failed to sync permitted accounts: {}", e);
                None
            }
        }
    }
}
