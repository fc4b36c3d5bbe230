#![allow(dead_code)]

use async_trait::async_trait;
use onboard_connector::notify::{NotifyBackend, SubscribeRequest, UnsubscribeRequest};
use onboard_connector::provider::{
    ListenerId, ProviderEventKind, ProviderListener, SignRawPayload, SubstrateAccount,
};
use onboard_connector::resolvers::{NameResolver, TokenBalanceSource};
use onboard_connector::types::{NameRecord, TokenConfig};
use onboard_connector::{
    Chain, Eip1193Provider, Namespace, ProviderError, SubstrateProvider, SyncConfig, SyncEngine,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

pub const A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
pub const C: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

/// 1 ether in wei, as returned by `eth_getBalance`.
pub const ONE_ETHER: &str = "0xde0b6b3a7640000";

pub const THREE_ETHER: &str = "0x29a2241af62c0000";

pub fn chain(id: &str, token: &str, label: &str) -> Chain {
    Chain {
        namespace: Namespace::Evm,
        id: id.to_string(),
        token: token.to_string(),
        label: label.to_string(),
        rpc_url: format!("https://rpc.invalid/{}", id),
        public_rpc_url: None,
        block_explorer_url: None,
        secondary_tokens: Vec::new(),
    }
}

pub fn chains() -> Vec<Chain> {
    let mut mainnet = chain("0x1", "ETH", "Ethereum Mainnet");
    mainnet.secondary_tokens.push(TokenConfig {
        name: "USDC".to_string(),
        address: "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48".to_string(),
        icon: None,
        decimals: 6,
    });
    let mut polkadot = chain("polkadot", "DOT", "Polkadot");
    polkadot.namespace = Namespace::Substrate;
    vec![
        mainnet,
        chain("0x89", "MATIC", "Polygon"),
        chain("0xaa36a7", "SepoliaETH", "Sepolia"),
        polkadot,
    ]
}

/// An in-memory EIP-1193 wallet.
#[derive(Default)]
pub struct MockProvider {
    listeners: Mutex<HashMap<ListenerId, (ProviderEventKind, ProviderListener)>>,
    next_id: AtomicU64,
    /// Simulates a provider that ignores `removeListener`.
    pub ignore_remove: AtomicBool,
    pub accounts: Mutex<Vec<String>>,
    pub chain_id: Mutex<String>,
    balances: Mutex<HashMap<String, Result<String, ProviderError>>>,
    balance_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    pub balance_started: AtomicUsize,
    pub balance_completed: AtomicUsize,
    pub permissions: Mutex<Option<Result<Value, ProviderError>>>,
    pub switch_errors: Mutex<VecDeque<ProviderError>>,
    pub sign_error: Mutex<Option<ProviderError>>,
    pub requests: Mutex<Vec<(String, Value)>>,
    pub disconnects: AtomicUsize,
}

impl MockProvider {
    pub fn new(accounts: &[&str], chain_id: &str) -> Arc<Self> {
        let provider = Self::default();
        *provider.accounts.lock().unwrap() = accounts.iter().map(|a| a.to_string()).collect();
        *provider.chain_id.lock().unwrap() = chain_id.to_string();
        Arc::new(provider)
    }

    pub fn set_balance(&self, address: &str, wei: &str) {
        self.balances
            .lock()
            .unwrap()
            .insert(address.to_lowercase(), Ok(wei.to_string()));
    }

    pub fn fail_balance(&self, address: &str) {
        self.balances.lock().unwrap().insert(
            address.to_lowercase(),
            Err(ProviderError::Rpc {
                code: -32000,
                message: "header not found".to_string(),
            }),
        );
    }

    /// Holds the next `eth_getBalance` call until the returned sender fires.
    pub fn gate_next_balance(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.balance_gates.lock().unwrap().push_back(rx);
        tx
    }

    /// Fires a native provider notification at every registered handler of that kind.
    pub fn emit(&self, kind: ProviderEventKind, payload: Value) {
        let handlers: Vec<ProviderListener> = self
            .listeners
            .lock()
            .unwrap()
            .values()
            .filter(|(registered, _)| *registered == kind)
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(payload.clone());
        }
    }

    pub fn emit_accounts(&self, accounts: &[&str]) {
        self.emit(ProviderEventKind::AccountsChanged, json!(accounts));
    }

    pub fn emit_chain(&self, chain_id: &str) {
        self.emit(ProviderEventKind::ChainChanged, json!(chain_id));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn requested(&self, method: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    pub fn methods(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }
}

#[async_trait]
impl Eip1193Provider for MockProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.requests
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));

        match method {
            "eth_requestAccounts" | "eth_accounts" => Ok(json!(*self.accounts.lock().unwrap())),
            "eth_chainId" => Ok(json!(*self.chain_id.lock().unwrap())),
            "eth_getBalance" => {
                self.balance_started.fetch_add(1, Ordering::SeqCst);
                let gate = self.balance_gates.lock().unwrap().pop_front();
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                let address = params[0].as_str().unwrap_or_default().to_lowercase();
                let result = self
                    .balances
                    .lock()
                    .unwrap()
                    .get(&address)
                    .cloned()
                    .unwrap_or_else(|| Ok("0x0".to_string()));
                self.balance_completed.fetch_add(1, Ordering::SeqCst);
                result.map(Value::String)
            }
            "wallet_getPermissions" => self
                .permissions
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Ok(json!([]))),
            "wallet_switchEthereumChain" => match self.switch_errors.lock().unwrap().pop_front() {
                Some(error) => Err(error),
                None => Ok(Value::Null),
            },
            "wallet_addEthereumChain" => Ok(Value::Null),
            "eth_sign" | "personal_sign" | "eth_signTypedData" | "eth_signTypedData_v4" => {
                match self.sign_error.lock().unwrap().clone() {
                    Some(error) => Err(error),
                    None => Ok(json!("0x5167")),
                }
            }
            other => Err(ProviderError::Unsupported(other.to_string())),
        }
    }

    fn on(&self, event: ProviderEventKind, listener: ProviderListener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().insert(id, (event, listener));
        id
    }

    fn remove_listener(&self, _event: ProviderEventKind, id: ListenerId) {
        if !self.ignore_remove.load(Ordering::SeqCst) {
            self.listeners.lock().unwrap().remove(&id);
        }
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// An in-memory substrate extension.
pub struct MockExtension {
    pub accounts: Vec<String>,
    pub signed: Mutex<Vec<SignRawPayload>>,
}

impl MockExtension {
    pub fn new(accounts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            accounts: accounts.iter().map(|a| a.to_string()).collect(),
            signed: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SubstrateProvider for MockExtension {
    async fn enable(&self) -> Result<Vec<SubstrateAccount>, ProviderError> {
        Ok(self
            .accounts
            .iter()
            .map(|address| SubstrateAccount {
                address: address.clone(),
                name: None,
            })
            .collect())
    }

    async fn sign_raw(&self, payload: SignRawPayload) -> Result<String, ProviderError> {
        self.signed.lock().unwrap().push(payload);
        Ok("0x5167".to_string())
    }
}

/// A name resolver answering `<first four hex digits>.<suffix>` and counting its calls.
pub struct CountingResolver {
    suffix: &'static str,
    pub calls: AtomicUsize,
}

impl CountingResolver {
    pub fn new(suffix: &'static str) -> Arc<Self> {
        Arc::new(Self {
            suffix,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn name_for(&self, address: &str) -> String {
        format!("{}.{}", &address[2..6], self.suffix)
    }
}

#[async_trait]
impl NameResolver for CountingResolver {
    async fn resolve(&self, address: &str, _chain: &Chain) -> anyhow::Result<Option<NameRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(NameRecord {
            name: self.name_for(address),
            avatar: None,
            content_hash: None,
        }))
    }
}

pub struct FixedTokens;

#[async_trait]
impl TokenBalanceSource for FixedTokens {
    async fn balance_of(&self, _owner: &str, _token: &TokenConfig, _chain: &Chain) -> anyhow::Result<String> {
        Ok("5.0".to_string())
    }
}

/// A notification backend that records every call in order, as each call completes.
#[derive(Default)]
pub struct RecordingNotify {
    pub calls: Mutex<Vec<String>>,
    subscribe_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    pub subscribe_started: AtomicUsize,
}

impl RecordingNotify {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Holds the next `subscribe` call until the returned sender fires.
    pub fn gate_next_subscribe(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.subscribe_gates.lock().unwrap().push_back(rx);
        tx
    }
}

#[async_trait]
impl NotifyBackend for RecordingNotify {
    async fn subscribe(&self, request: SubscribeRequest) -> anyhow::Result<()> {
        self.subscribe_started.fetch_add(1, Ordering::SeqCst);
        let gate = self.subscribe_gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.calls
            .lock()
            .unwrap()
            .push(format!("sub {} {}", request.id, request.chain_id));
        Ok(())
    }

    async fn unsubscribe(&self, request: UnsubscribeRequest) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!(
            "unsub {} {} {:?}",
            request.id, request.chain_id, request.timeout
        ));
        Ok(())
    }
}

/// A name resolver that panics for one address and answers like [`CountingResolver`] otherwise.
pub struct PanicsFor(pub &'static str);

#[async_trait]
impl NameResolver for PanicsFor {
    async fn resolve(&self, address: &str, _chain: &Chain) -> anyhow::Result<Option<NameRecord>> {
        if address.eq_ignore_ascii_case(self.0) {
            panic!("resolver crashed on {}", address);
        }
        Ok(Some(NameRecord {
            name: format!("{}.eth", &address[2..6]),
            avatar: None,
            content_hash: None,
        }))
    }
}

pub struct Harness {
    pub engine: SyncEngine,
    pub ens: Arc<CountingResolver>,
    pub uns: Arc<CountingResolver>,
    pub notify: Arc<RecordingNotify>,
}

pub fn harness(notify_enabled: bool) -> Harness {
    let ens = CountingResolver::new("eth");
    let uns = CountingResolver::new("crypto");
    let notify = Arc::new(RecordingNotify::default());

    let mut config = SyncConfig {
        chains: chains(),
        ..Default::default()
    };
    config.notify.enabled = notify_enabled;

    let engine = SyncEngine::builder()
        .with_config(config)
        .with_ens_resolver(ens.clone())
        .with_uns_resolver(uns.clone())
        .with_token_source(Arc::new(FixedTokens))
        .with_notify_backend(notify.clone())
        .build()
        .unwrap();

    Harness {
        engine,
        ens,
        uns,
        notify,
    }
}

/// An engine without notifications whose ENS lookups go through `ens`.
pub fn engine_with_ens(ens: Arc<dyn NameResolver>) -> SyncEngine {
    SyncEngine::builder()
        .with_config(SyncConfig {
            chains: chains(),
            ..Default::default()
        })
        .with_ens_resolver(ens)
        .with_uns_resolver(CountingResolver::new("crypto"))
        .with_token_source(Arc::new(FixedTokens))
        .build()
        .unwrap()
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

/// Lets spawned tasks run to completion when nothing observable is expected to change.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
