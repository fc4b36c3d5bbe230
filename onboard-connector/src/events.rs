use crate::types::{normalize_chain_id, Address, ChainId};
use anyhow::{anyhow, Result};
use serde_json::Value;

/// A normalized wallet signal, routed by wallet label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletEvent {
    pub label: String,
    pub data: WalletEventData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEventData {
    /// The wallet's exposed accounts, primary first. Empty when the wallet was locked or the app
    /// was revoked.
    AccountsChanged(Vec<Address>),
    ChainChanged(ChainId),
    /// Terminal. Nothing is delivered for the label afterwards.
    Disconnected,
}

/// Parses an `accountsChanged` payload. `null` is read as an empty list.
pub fn parse_accounts(payload: &Value) -> Result<Vec<Address>> {
    match payload {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| anyhow!("account entry is not a string: {}", item))
            })
            .collect(),
        other => Err(anyhow!("accountsChanged payload is not a list: {}", other)),
    }
}

/// Parses a `chainChanged` payload into a normalized chain id. Providers send hex strings, but
/// decimal strings and plain numbers are seen in the wild.
pub fn parse_chain_id(payload: &Value) -> Result<ChainId> {
    match payload {
        Value::String(id) if !id.trim().is_empty() => Ok(normalize_chain_id(id)),
        Value::Number(n) => n
            .as_u64()
            .map(|id| format!("0x{:x}", id))
            .ok_or_else(|| anyhow!("chain id is not a positive integer: {}", n)),
        other => Err(anyhow!("chainChanged payload is not a chain id: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_account_lists() {
        assert_eq!(parse_accounts(&json!(["0xa", "0xb"])).unwrap(), vec!["0xa", "0xb"]);
        assert!(parse_accounts(&json!(null)).unwrap().is_empty());
        assert!(parse_accounts(&json!([1])).is_err());
        assert!(parse_accounts(&json!("0xa")).is_err());
    }

    #[test]
    fn parses_chain_ids_in_every_shape() {
        assert_eq!(parse_chain_id(&json!("0x89")).unwrap(), "0x89");
        assert_eq!(parse_chain_id(&json!("0X89")).unwrap(), "0x89");
        assert_eq!(parse_chain_id(&json!("137")).unwrap(), "0x89");
        assert_eq!(parse_chain_id(&json!(137)).unwrap(), "0x89");
        assert!(parse_chain_id(&json!("")).is_err());
        assert!(parse_chain_id(&json!({})).is_err());
    }
}
