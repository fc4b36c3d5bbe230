//! # Direct Provider Requests
//!
//! Thin wrappers over the wallet provider calls an application makes outside of reconciliation:
//! account and chain queries, chain switching, permissions and message signing.
//!
//! Unlike the enrichment path, every failure here is returned to the caller. The caller needs to
//! know that a signature or a chain switch did not happen.

use crate::error::{SyncError, SyncResult};
use crate::events::{parse_accounts, parse_chain_id};
use crate::provider::{
    Eip1193Provider, ProviderError, SignRawPayload, SubstrateProvider, WalletProvider,
};
use crate::types::{Address, Chain, ChainId, Namespace, WalletState};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One entry of a `wallet_getPermissions` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletPermission {
    pub parent_capability: String,
    #[serde(default)]
    pub caveats: Vec<PermissionCaveat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionCaveat {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
}

/// A message-signing request. EVM variants sign with the wallet's primary account.
#[derive(Debug, Clone, PartialEq)]
pub enum SignMessage {
    EthSign { message: String },
    PersonalSign { message: String },
    TypedData(Value),
    TypedDataV4(Value),
    /// Substrate `signRaw` over hex-encoded bytes.
    SubstrateRaw { data: String },
}

impl SignMessage {
    fn namespace(&self) -> Namespace {
        match self {
            SignMessage::SubstrateRaw { .. } => Namespace::Substrate,
            _ => Namespace::Evm,
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            SignMessage::EthSign { .. } => "eth_sign",
            SignMessage::PersonalSign { .. } => "personal_sign",
            SignMessage::TypedData(_) => "eth_signTypedData",
            SignMessage::TypedDataV4(_) => "eth_signTypedData_v4",
            SignMessage::SubstrateRaw { .. } => "signRaw",
        }
    }
}

fn invalid(method: &str, e: impl std::fmt::Display) -> ProviderError {
    ProviderError::InvalidResponse(format!("{}: {}", method, e))
}

/// `eth_requestAccounts`: asks the wallet to expose its accounts, primary first.
pub async fn request_accounts(provider: &dyn Eip1193Provider) -> Result<Vec<Address>, ProviderError> {
    let accounts = provider.request("eth_requestAccounts", json!([])).await?;
    parse_accounts(&accounts).map_err(|e| invalid("eth_requestAccounts", e))
}

/// `eth_selectAccounts`: asks the wallet to let the user pick which accounts to expose.
pub async fn select_accounts(provider: &dyn Eip1193Provider) -> Result<Vec<Address>, ProviderError> {
    let accounts = provider.request("eth_selectAccounts", json!([])).await?;
    parse_accounts(&accounts).map_err(|e| invalid("eth_selectAccounts", e))
}

/// `eth_chainId`, normalised.
pub async fn get_chain_id(provider: &dyn Eip1193Provider) -> Result<ChainId, ProviderError> {
    let chain_id = provider.request("eth_chainId", json!([])).await?;
    parse_chain_id(&chain_id).map_err(|e| invalid("eth_chainId", e))
}

pub async fn switch_chain(provider: &dyn Eip1193Provider, chain_id: &str) -> Result<(), ProviderError> {
    provider
        .request("wallet_switchEthereumChain", json!([{ "chainId": chain_id }]))
        .await?;
    Ok(())
}

fn chain_params(chain: &Chain, rpc_url: &str) -> Value {
    let mut params = json!({
        "chainId": chain.id,
        "chainName": chain.label,
        "nativeCurrency": {
            "name": chain.label,
            "symbol": chain.token,
            "decimals": 18,
        },
        "rpcUrls": [rpc_url],
    });
    if let Some(explorer) = &chain.block_explorer_url {
        params["blockExplorerUrls"] = json!([explorer]);
    }
    params
}

/// `wallet_addEthereumChain` for a configured chain. Wallets are handed the chain's public RPC
/// URL when one is configured.
pub async fn add_chain(provider: &dyn Eip1193Provider, chain: &Chain) -> Result<(), ProviderError> {
    let rpc_url = chain.public_rpc_url.as_deref().unwrap_or(&chain.rpc_url);
    provider
        .request("wallet_addEthereumChain", json!([chain_params(chain, rpc_url)]))
        .await?;
    Ok(())
}

/// Re-adds a known chain with a different RPC URL.
pub async fn update_chain_rpc(
    provider: &dyn Eip1193Provider,
    chain: &Chain,
    rpc_url: &str,
) -> Result<(), ProviderError> {
    provider
        .request("wallet_addEthereumChain", json!([chain_params(chain, rpc_url)]))
        .await?;
    Ok(())
}

pub async fn get_permissions(
    provider: &dyn Eip1193Provider,
) -> Result<Vec<WalletPermission>, ProviderError> {
    let permissions = provider.request("wallet_getPermissions", json!([])).await?;
    match permissions {
        Value::Array(_) => {
            serde_json::from_value(permissions).map_err(|e| invalid("wallet_getPermissions", e))
        }
        // Some wallets answer with nothing at all.
        _ => Ok(Vec::new()),
    }
}

/// The accounts the `eth_accounts` permission restricts the app to, if the wallet reports them.
pub fn permitted_accounts(permissions: &[WalletPermission]) -> Option<Vec<Address>> {
    let caveat = permissions
        .iter()
        .find(|permission| permission.parent_capability == "eth_accounts")?
        .caveats
        .iter()
        .find(|caveat| caveat.kind == "restrictReturnedAccounts")?;
    parse_accounts(&caveat.value).ok()
}

/// Substrate `enable`: returns the addresses the extension exposes.
pub async fn enable(provider: &dyn SubstrateProvider) -> Result<Vec<Address>, ProviderError> {
    Ok(provider
        .enable()
        .await?
        .into_iter()
        .map(|account| account.address)
        .collect())
}

/// Signs a message with the wallet's primary account and returns the signature.
pub async fn sign_message(wallet: &WalletState, message: SignMessage) -> SyncResult<String> {
    if message.namespace() != wallet.namespace() {
        return Err(SyncError::Unsupported {
            label: wallet.label.clone(),
            namespace: wallet.namespace(),
            operation: message.operation(),
        });
    }
    let signer = wallet
        .primary_account()
        .map(|account| account.address.clone())
        .ok_or_else(|| SyncError::NoAccounts(wallet.label.clone()))?;

    let signature = match (&wallet.provider, message) {
        (WalletProvider::Substrate(provider), SignMessage::SubstrateRaw { data }) => {
            return Ok(provider
                .sign_raw(SignRawPayload {
                    address: signer,
                    data,
                    kind: "bytes".to_string(),
                })
                .await?);
        }
        (WalletProvider::Evm(provider), SignMessage::EthSign { message }) => {
            provider.request("eth_sign", json!([signer, message])).await?
        }
        (WalletProvider::Evm(provider), SignMessage::PersonalSign { message }) => {
            provider
                .request("personal_sign", json!([message, signer]))
                .await?
        }
        (WalletProvider::Evm(provider), SignMessage::TypedData(data)) => {
            provider
                .request("eth_signTypedData", json!([signer, data]))
                .await?
        }
        (WalletProvider::Evm(provider), SignMessage::TypedDataV4(data)) => {
            provider
                .request("eth_signTypedData_v4", json!([signer, data]))
                .await?
        }
        (provider, message) => {
            return Err(SyncError::Unsupported {
                label: wallet.label.clone(),
                namespace: provider.namespace(),
                operation: message.operation(),
            });
        }
    };

    signature
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SyncError::Provider(invalid("signature", signature)))
}
