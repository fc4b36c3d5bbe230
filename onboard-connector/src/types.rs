//! Domain records held by the [`Store`](crate::store::Store): chains, wallets and accounts.

use crate::provider::WalletProvider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A wallet address as reported by the provider (`0x`-prefixed hex for EVM, SS58 for substrate).
pub type Address = String;

/// A chain identifier, normalised to lowercase `0x`-prefixed hex for EVM chains.
pub type ChainId = String;

/// Token balances keyed by token symbol, e.g. `{"ETH": "1.5"}`.
pub type Balances = BTreeMap<String, String>;

/// The family of a chain, and by extension the capability set of a wallet connected to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    #[default]
    Evm,
    Substrate,
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Namespace::Evm => write!(f, "evm"),
            Namespace::Substrate => write!(f, "substrate"),
        }
    }
}

/// A supported chain. Part of process-wide configuration; never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Chain {
    #[serde(default)]
    pub namespace: Namespace,
    pub id: ChainId,
    pub token: String,
    pub label: String,
    pub rpc_url: String,
    /// RPC URL handed to wallets in `wallet_addEthereumChain`, when it differs from `rpc_url`.
    #[serde(default)]
    pub public_rpc_url: Option<String>,
    #[serde(default)]
    pub block_explorer_url: Option<String>,
    /// ERC-20 tokens whose balances are resolved alongside the native balance.
    #[serde(default)]
    pub secondary_tokens: Vec<TokenConfig>,
}

/// A secondary (ERC-20) token tracked for every account on a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TokenConfig {
    pub name: String,
    pub address: Address,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default = "default_token_decimals")]
    pub decimals: u8,
}

fn default_token_decimals() -> u8 {
    18
}

/// The chain a wallet is currently connected to. Only `namespace` and `id` are tracked per wallet;
/// the rest of the chain's data is looked up in the configured chain list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedChain {
    pub namespace: Namespace,
    pub id: ChainId,
}

/// A resolved name-service record (ENS, or a provider-specific UNS profile).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRecord {
    pub name: String,
    pub avatar: Option<String>,
    pub content_hash: Option<String>,
}

/// The balance of one configured secondary token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryTokenBalance {
    pub name: String,
    pub balance: String,
    pub icon: Option<String>,
}

/// One address exposed by a wallet, with its derived data.
///
/// The derived fields are eventually consistent with `(address, active chain)`; they are `None`
/// while unresolved, after a chain switch, or when resolution failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub ens: Option<NameRecord>,
    pub uns: Option<NameRecord>,
    pub balance: Option<Balances>,
    pub secondary_tokens: Option<Vec<SecondaryTokenBalance>>,
}

impl Account {
    /// An account with no derived data yet.
    pub fn blank(address: impl Into<Address>) -> Self {
        Self {
            address: address.into(),
            ens: None,
            uns: None,
            balance: None,
            secondary_tokens: None,
        }
    }

    /// `true` when none of the derived fields has been resolved.
    pub fn is_unresolved(&self) -> bool {
        self.ens.is_none()
            && self.uns.is_none()
            && self.balance.is_none()
            && self.secondary_tokens.is_none()
    }
}

/// A connected wallet. `label` is the stable identity used for routing and store updates.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletState {
    pub label: String,
    pub provider: WalletProvider,
    /// Element 0 is the active chain.
    pub chains: Vec<ConnectedChain>,
    /// Element 0 is the address most recently reported as primary.
    pub accounts: Vec<Account>,
}

impl WalletState {
    pub fn namespace(&self) -> Namespace {
        self.provider.namespace()
    }

    pub fn active_chain(&self) -> Option<&ConnectedChain> {
        self.chains.first()
    }

    pub fn primary_account(&self) -> Option<&Account> {
        self.accounts.first()
    }

    pub fn account(&self, address: &str) -> Option<&Account> {
        self.accounts
            .iter()
            .find(|account| same_address(&account.address, address))
    }
}

/// Compares two addresses. EVM hex addresses compare case-insensitively (checksum casing is
/// presentation only); anything else compares exactly.
pub fn same_address(a: &str, b: &str) -> bool {
    if a.starts_with("0x") && b.starts_with("0x") {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

/// `true` for a syntactically valid EVM address (`0x` followed by 40 hex digits).
pub fn is_evm_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Normalises a chain id to lowercase `0x`-prefixed hex. Decimal ids are converted; ids that are
/// neither (e.g. substrate network names) are returned unchanged.
pub fn normalize_chain_id(id: &str) -> ChainId {
    let trimmed = id.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return match u64::from_str_radix(hex, 16) {
            Ok(value) => format!("0x{:x}", value),
            Err(_) => format!("0x{}", hex.to_lowercase()),
        };
    }
    match trimmed.parse::<u64>() {
        Ok(value) => format!("0x{:x}", value),
        Err(_) => trimmed.to_string(),
    }
}

/// Compares two chain ids after normalisation.
pub fn same_chain(a: &str, b: &str) -> bool {
    normalize_chain_id(a) == normalize_chain_id(b)
}
