//! # Store
//!
//! The single source of truth for connected wallets, their accounts and active chains.
//!
//! Readers take immutable snapshots with [`Store::get`] or follow a keyed change stream with
//! [`Store::select`]. Mutation is crate-private: only the synchronization workers write, and
//! only through the two shallow-merge entry points [`Store::update_wallet`] and
//! [`Store::update_account`] (plus wallet registration and removal).

use crate::error::{SyncError, SyncResult};
use crate::types::{
    same_address, same_chain, Account, Balances, Chain, ConnectedChain, NameRecord,
    SecondaryTokenBalance, WalletState,
};
use futures::Stream;
use std::sync::Arc;
use tokio::sync::watch;

/// A complete, immutable view of the engine's state.
#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub wallets: Vec<WalletState>,
    pub chains: Vec<Chain>,
    pub notify_enabled: bool,
}

impl AppState {
    pub fn wallet(&self, label: &str) -> Option<&WalletState> {
        self.wallets.iter().find(|wallet| wallet.label == label)
    }

    /// Looks up a configured chain of the given namespace by id.
    pub fn chain(&self, namespace: crate::types::Namespace, id: &str) -> Option<&Chain> {
        self.chains
            .iter()
            .find(|chain| chain.namespace == namespace && same_chain(&chain.id, id))
    }
}

/// The keys [`Store::select`] can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKey {
    Wallets,
    Chains,
    Notify,
}

/// One keyed slice of [`AppState`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreSlice {
    Wallets(Vec<WalletState>),
    Chains(Vec<Chain>),
    Notify(bool),
}

impl StoreSlice {
    fn from_state(key: StoreKey, state: &AppState) -> Self {
        match key {
            StoreKey::Wallets => StoreSlice::Wallets(state.wallets.clone()),
            StoreKey::Chains => StoreSlice::Chains(state.chains.clone()),
            StoreKey::Notify => StoreSlice::Notify(state.notify_enabled),
        }
    }
}

/// A partial update of a wallet's structural fields. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct WalletUpdate {
    pub chains: Option<Vec<ConnectedChain>>,
    pub accounts: Option<Vec<Account>>,
}

/// A partial update of an account's derived fields. `None` leaves a field untouched,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub ens: Option<Option<NameRecord>>,
    pub uns: Option<Option<NameRecord>>,
    pub balance: Option<Option<Balances>>,
    pub secondary_tokens: Option<Option<Vec<SecondaryTokenBalance>>>,
}

impl AccountUpdate {
    fn apply(self, account: &mut Account) {
        if let Some(ens) = self.ens {
            account.ens = ens;
        }
        if let Some(uns) = self.uns {
            account.uns = uns;
        }
        if let Some(balance) = self.balance {
            account.balance = balance;
        }
        if let Some(secondary_tokens) = self.secondary_tokens {
            account.secondary_tokens = secondary_tokens;
        }
    }
}

#[derive(Debug)]
pub struct Store {
    state: watch::Sender<Arc<AppState>>,
}

impl Store {
    pub fn new(chains: Vec<Chain>, notify_enabled: bool) -> Self {
        let (state, _) = watch::channel(Arc::new(AppState {
            wallets: Vec::new(),
            chains,
            notify_enabled,
        }));
        Self { state }
    }

    /// Returns an immutable snapshot of the current state.
    pub fn get(&self) -> Arc<AppState> {
        self.state.borrow().clone()
    }

    /// Returns a snapshot of one wallet.
    pub fn wallet(&self, label: &str) -> Option<WalletState> {
        self.state.borrow().wallet(label).cloned()
    }

    /// Returns a receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppState>> {
        self.state.subscribe()
    }

    /// Returns a stream of the selected slice. The current value is yielded first; afterwards a
    /// value is yielded only when the slice actually changed.
    pub fn select(&self, key: StoreKey) -> impl Stream<Item = StoreSlice> + Send + 'static {
        let rx = self.state.subscribe();
        futures::stream::unfold((rx, None::<StoreSlice>), move |(mut rx, last)| async move {
            loop {
                let slice = {
                    let state = rx.borrow_and_update();
                    StoreSlice::from_state(key, &state)
                };
                if last.as_ref() != Some(&slice) {
                    return Some((slice.clone(), (rx, Some(slice))));
                }
                if rx.changed().await.is_err() {
                    return None;
                }
            }
        })
    }

    /// Registers a wallet, replacing any wallet with the same label.
    pub(crate) fn add_wallet(&self, wallet: WalletState) {
        self.state.send_modify(|state| {
            let state = Arc::make_mut(state);
            state.wallets.retain(|existing| existing.label != wallet.label);
            state.wallets.push(wallet);
        });
    }

    /// Removes a wallet. Returns `false` if no wallet had that label.
    pub(crate) fn remove_wallet(&self, label: &str) -> bool {
        self.state.send_if_modified(|state| {
            if state.wallet(label).is_none() {
                return false;
            }
            Arc::make_mut(state)
                .wallets
                .retain(|wallet| wallet.label != label);
            true
        })
    }

    /// Removes every wallet.
    pub(crate) fn clear_wallets(&self) {
        self.state.send_if_modified(|state| {
            if state.wallets.is_empty() {
                return false;
            }
            Arc::make_mut(state).wallets.clear();
            true
        });
    }

    /// Shallow-merges `update` into the wallet with the given label.
    pub(crate) fn update_wallet(&self, label: &str, update: WalletUpdate) -> SyncResult<()> {
        let mut result = Err(SyncError::WalletNotFound(label.to_string()));
        self.state.send_if_modified(|state| {
            let Some(index) = state.wallets.iter().position(|w| w.label == label) else {
                return false;
            };
            let wallet = &mut Arc::make_mut(state).wallets[index];
            if let Some(chains) = update.chains {
                wallet.chains = chains;
            }
            if let Some(accounts) = update.accounts {
                wallet.accounts = accounts;
            }
            result = Ok(());
            true
        });
        result
    }

    /// Shallow-merges `update` into one account of the wallet with the given label.
    pub(crate) fn update_account(
        &self,
        label: &str,
        address: &str,
        update: AccountUpdate,
    ) -> SyncResult<()> {
        let mut result = Err(SyncError::WalletNotFound(label.to_string()));
        self.state.send_if_modified(|state| {
            let Some(wallet_index) = state.wallets.iter().position(|w| w.label == label) else {
                return false;
            };
            let Some(account_index) = state.wallets[wallet_index]
                .accounts
                .iter()
                .position(|account| same_address(&account.address, address))
            else {
                result = Err(SyncError::AccountNotFound {
                    label: label.to_string(),
                    address: address.to_string(),
                });
                return false;
            };
            let account =
                &mut Arc::make_mut(state).wallets[wallet_index].accounts[account_index];
            update.apply(account);
            result = Ok(());
            true
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{SignRawPayload, SubstrateAccount, SubstrateProvider, WalletProvider};
    use crate::provider::ProviderError;
    use crate::types::Namespace;
    use async_trait::async_trait;
    use futures::StreamExt;

    struct NullExtension;

    #[async_trait]
    impl SubstrateProvider for NullExtension {
        async fn enable(&self) -> Result<Vec<SubstrateAccount>, ProviderError> {
            Ok(Vec::new())
        }

        async fn sign_raw(&self, _payload: SignRawPayload) -> Result<String, ProviderError> {
            Err(ProviderError::Unsupported("signRaw".into()))
        }
    }

    fn wallet(label: &str, addresses: &[&str]) -> WalletState {
        WalletState {
            label: label.to_string(),
            provider: WalletProvider::Substrate(Arc::new(NullExtension)),
            chains: vec![ConnectedChain {
                namespace: Namespace::Substrate,
                id: "polkadot".to_string(),
            }],
            accounts: addresses.iter().map(|a| Account::blank(*a)).collect(),
        }
    }

    #[test]
    fn update_of_unknown_wallet_is_an_error() {
        let store = Store::new(Vec::new(), false);
        let err = store
            .update_wallet("missing", WalletUpdate::default())
            .unwrap_err();
        assert_eq!(err, SyncError::WalletNotFound("missing".into()));

        store.add_wallet(wallet("W", &["a"]));
        let err = store
            .update_account("W", "b", AccountUpdate::default())
            .unwrap_err();
        assert!(matches!(err, SyncError::AccountNotFound { .. }));
    }

    #[test]
    fn account_update_merges_only_given_fields() {
        let store = Store::new(Vec::new(), false);
        store.add_wallet(wallet("W", &["a", "b"]));

        let balance = Balances::from([("DOT".to_string(), "1.0".to_string())]);
        store
            .update_account(
                "W",
                "b",
                AccountUpdate {
                    balance: Some(Some(balance.clone())),
                    ..Default::default()
                },
            )
            .unwrap();

        let snapshot = store.wallet("W").unwrap();
        assert_eq!(snapshot.accounts[0], Account::blank("a"));
        assert_eq!(snapshot.accounts[1].balance, Some(balance));
        assert!(snapshot.accounts[1].ens.is_none());
    }

    #[test]
    fn adding_a_wallet_with_an_existing_label_replaces_it() {
        let store = Store::new(Vec::new(), false);
        store.add_wallet(wallet("W", &["a"]));
        store.add_wallet(wallet("W", &["b"]));

        let state = store.get();
        assert_eq!(state.wallets.len(), 1);
        assert_eq!(state.wallets[0].accounts[0].address, "b");
        assert!(store.remove_wallet("W"));
        assert!(!store.remove_wallet("W"));
    }

    #[tokio::test]
    async fn select_yields_only_changes_of_the_selected_key() {
        let store = Store::new(Vec::new(), true);
        let mut notify = Box::pin(store.select(StoreKey::Notify));
        let mut wallets = Box::pin(store.select(StoreKey::Wallets));

        assert_eq!(notify.next().await, Some(StoreSlice::Notify(true)));
        assert_eq!(wallets.next().await, Some(StoreSlice::Wallets(Vec::new())));

        store.add_wallet(wallet("W", &["a"]));

        match wallets.next().await {
            Some(StoreSlice::Wallets(list)) => assert_eq!(list[0].label, "W"),
            other => panic!("unexpected slice: {:?}", other),
        }
        let pending =
            tokio::time::timeout(std::time::Duration::from_millis(20), notify.next()).await;
        assert!(pending.is_err(), "notify slice did not change");
    }
}
