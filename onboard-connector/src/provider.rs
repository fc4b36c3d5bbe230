//! # Wallet Provider Capabilities
//!
//! The engine never talks to a wallet SDK directly. It consumes one of two small capability sets,
//! selected by the wallet's namespace:
//!
//! - [`Eip1193Provider`]: JSON-RPC `request`, plus `on`/`remove_listener` for the native
//!   `accountsChanged` and `chainChanged` notifications, and an optional `disconnect`.
//! - [`SubstrateProvider`]: `enable` and `sign_raw`. Substrate wallets never report account or
//!   chain changes on their own.
//!
//! [`WalletProvider`] is the tagged union the rest of the crate dispatches on.

use crate::types::{Address, Namespace};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// EIP-1193 error code for a request the user rejected.
pub const USER_REJECTED_REQUEST: i64 = 4001;
/// EIP-1193 error code for a chain the wallet does not know yet.
pub const UNRECOGNIZED_CHAIN: i64 = 4902;

/// Identifies a listener registered with [`Eip1193Provider::on`].
pub type ListenerId = u64;

/// A native provider notification handler. Receives the raw event payload.
pub type ProviderListener = Arc<dyn Fn(Value) + Send + Sync>;

/// The provider notifications the engine subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderEventKind {
    AccountsChanged,
    ChainChanged,
}

impl ProviderEventKind {
    /// The EIP-1193 event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderEventKind::AccountsChanged => "accountsChanged",
            ProviderEventKind::ChainChanged => "chainChanged",
        }
    }
}

/// Failures reported by a wallet provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Method not supported: {0}")]
    Unsupported(String),
}

impl ProviderError {
    /// The EIP-1193 error code, if the provider reported one.
    pub fn code(&self) -> Option<i64> {
        match self {
            ProviderError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// The EIP-1193 capability set of an EVM wallet.
#[async_trait]
pub trait Eip1193Provider: Send + Sync {
    /// Performs a JSON-RPC request against the wallet.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    /// Registers a handler for a native notification and returns its id.
    fn on(&self, event: ProviderEventKind, listener: ProviderListener) -> ListenerId;

    /// Removes a handler previously registered with [`on`](Self::on).
    fn remove_listener(&self, event: ProviderEventKind, id: ListenerId);

    /// Closes the wallet session. Providers without a session to close keep the default.
    async fn disconnect(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// An account exposed by a substrate extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstrateAccount {
    pub address: Address,
    #[serde(default)]
    pub name: Option<String>,
}

/// Payload for [`SubstrateProvider::sign_raw`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRawPayload {
    pub address: Address,
    pub data: String,
    /// Either `"bytes"` or `"payload"`.
    #[serde(rename = "type")]
    pub kind: String,
}

/// The capability set of a substrate extension wallet.
#[async_trait]
pub trait SubstrateProvider: Send + Sync {
    /// Asks the extension for access and returns the exposed accounts.
    async fn enable(&self) -> Result<Vec<SubstrateAccount>, ProviderError>;

    /// Signs raw data and returns the signature.
    async fn sign_raw(&self, payload: SignRawPayload) -> Result<String, ProviderError>;
}

/// A wallet's provider handle, tagged by capability set.
#[derive(Clone)]
pub enum WalletProvider {
    Evm(Arc<dyn Eip1193Provider>),
    Substrate(Arc<dyn SubstrateProvider>),
}

impl WalletProvider {
    pub fn namespace(&self) -> Namespace {
        match self {
            WalletProvider::Evm(_) => Namespace::Evm,
            WalletProvider::Substrate(_) => Namespace::Substrate,
        }
    }

    pub fn as_evm(&self) -> Option<&Arc<dyn Eip1193Provider>> {
        match self {
            WalletProvider::Evm(provider) => Some(provider),
            WalletProvider::Substrate(_) => None,
        }
    }

    fn handle_ptr(&self) -> *const () {
        match self {
            WalletProvider::Evm(provider) => Arc::as_ptr(provider) as *const (),
            WalletProvider::Substrate(provider) => Arc::as_ptr(provider) as *const (),
        }
    }
}

/// Two handles are equal when they point at the same provider instance.
impl PartialEq for WalletProvider {
    fn eq(&self, other: &Self) -> bool {
        self.namespace() == other.namespace() && self.handle_ptr() == other.handle_ptr()
    }
}

impl std::fmt::Debug for WalletProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WalletProvider")
            .field(&self.namespace())
            .field(&self.handle_ptr())
            .finish()
    }
}
