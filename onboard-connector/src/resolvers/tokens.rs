use super::abi::{self, Token};
use super::TokenBalanceSource;
use crate::registry::ProviderRegistry;
use crate::types::{Chain, TokenConfig};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Reads ERC-20 balances with `balanceOf(address)` through the chain's RPC endpoint.
pub struct RpcTokenBalances {
    registry: Arc<ProviderRegistry>,
}

impl RpcTokenBalances {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl TokenBalanceSource for RpcTokenBalances {
    async fn balance_of(&self, owner: &str, token: &TokenConfig, chain: &Chain) -> Result<String> {
        let client = self.registry.client_for(chain);
        let data = abi::encode_call("balanceOf(address)", &[Token::Address(owner.to_string())])?;
        let raw = abi::decode_uint(&client.eth_call(&token.address, &data).await?)?;
        Ok(abi::format_units(raw, token.decimals))
    }
}
