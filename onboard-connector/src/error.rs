use crate::provider::ProviderError;
use crate::types::Namespace;
use thiserror::Error;

/// Errors surfaced by the synchronization engine to its callers.
///
/// Enrichment and notification failures never appear here; they are logged and absorbed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Wallet '{0}' is not connected")]
    WalletNotFound(String),

    #[error("Account {address} is not part of wallet '{label}'")]
    AccountNotFound { label: String, address: String },

    #[error("Wallet '{0}' has no accounts")]
    NoAccounts(String),

    #[error("Chain {0} is not configured")]
    UnknownChain(String),

    #[error("{operation} is not supported by {namespace} wallet '{label}'")]
    Unsupported {
        label: String,
        namespace: Namespace,
        operation: &'static str,
    },

    #[error("Provider request failed: {0}")]
    Provider(#[from] ProviderError),
}

pub type SyncResult<T> = Result<T, SyncError>;
