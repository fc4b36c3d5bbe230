//! ENS reverse resolution over plain JSON-RPC.

use super::abi::{self, Token};
use super::NameResolver;
use crate::registry::{ProviderRegistry, RpcClient};
use crate::types::{normalize_chain_id, Chain, NameRecord};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// The ENS registry, deployed at the same address on mainnet and the public testnets.
pub const ENS_REGISTRY: &str = "0x00000000000C2E074eC69A0dFb2997BA6C7d2e1e";

/// Maps a chain to the chain whose ENS deployment serves it, if any.
pub fn valid_ens_chain(chain_id: &str) -> Option<&'static str> {
    match normalize_chain_id(chain_id).as_str() {
        "0x1" | "0x89" | "0xa" | "0xa4b1" | "0xa4ba" | "0x144" => Some("0x1"),
        "0x5" => Some("0x5"),
        "0xaa36a7" => Some("0xaa36a7"),
        _ => None,
    }
}

/// The EIP-137 namehash of a dot-separated name.
pub fn namehash(name: &str) -> [u8; 32] {
    let mut node = [0u8; 32];
    if name.is_empty() {
        return node;
    }
    for label in name.rsplit('.') {
        let label_hash = abi::keccak256(label.as_bytes());
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(&node);
        buf[32..].copy_from_slice(&label_hash);
        node = abi::keccak256(&buf);
    }
    node
}

fn reverse_name(address: &str) -> String {
    format!(
        "{}.addr.reverse",
        address.trim_start_matches("0x").to_lowercase()
    )
}

/// Resolves the primary ENS name of an address through the chain's RPC endpoint.
///
/// The reverse record is only trusted when the name resolves forward to the same address.
pub struct RpcEnsResolver {
    registry: Arc<ProviderRegistry>,
}

impl RpcEnsResolver {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    async fn resolver_of(client: &RpcClient, node: [u8; 32]) -> Result<Option<String>> {
        let data = abi::encode_call("resolver(bytes32)", &[Token::Word(node)])?;
        let resolver = abi::decode_address(&client.eth_call(ENS_REGISTRY, &data).await?)?;
        Ok((!abi::is_zero_address(&resolver)).then_some(resolver))
    }

    async fn avatar(client: &RpcClient, resolver: &str, node: [u8; 32]) -> Result<Option<String>> {
        let data = abi::encode_call(
            "text(bytes32,string)",
            &[Token::Word(node), Token::Str("avatar".to_string())],
        )?;
        let avatar = abi::decode_string(&client.eth_call(resolver, &data).await?)?;
        Ok((!avatar.is_empty()).then_some(avatar))
    }

    async fn content_hash(
        client: &RpcClient,
        resolver: &str,
        node: [u8; 32],
    ) -> Result<Option<String>> {
        let data = abi::encode_call("contenthash(bytes32)", &[Token::Word(node)])?;
        let hash = abi::decode_bytes(&client.eth_call(resolver, &data).await?)?;
        Ok((!hash.is_empty()).then(|| format!("0x{}", hex::encode(hash))))
    }
}

#[async_trait]
impl NameResolver for RpcEnsResolver {
    async fn resolve(&self, address: &str, chain: &Chain) -> Result<Option<NameRecord>> {
        let client = self.registry.client_for(chain);

        let reverse_node = namehash(&reverse_name(address));
        let Some(reverse_resolver) = Self::resolver_of(&client, reverse_node).await? else {
            return Ok(None);
        };
        let data = abi::encode_call("name(bytes32)", &[Token::Word(reverse_node)])?;
        let name = abi::decode_string(&client.eth_call(&reverse_resolver, &data).await?)?;
        if name.is_empty() {
            return Ok(None);
        }

        let node = namehash(&name);
        let Some(resolver) = Self::resolver_of(&client, node).await? else {
            return Ok(None);
        };
        let data = abi::encode_call("addr(bytes32)", &[Token::Word(node)])?;
        let forward = abi::decode_address(&client.eth_call(&resolver, &data).await?)?;
        if !forward.eq_ignore_ascii_case(address) {
            tracing::debug!(%address, %name, "ENS reverse record does not resolve back to the address");
            return Ok(None);
        }

        // Text records and content hashes are optional; a resolver without them is not an error.
        let avatar = Self::avatar(&client, &resolver, node).await.unwrap_or_else(|e| {
            tracing::debug!(%name, "No ENS avatar: {}", e);
            None
        });
        let content_hash = Self::content_hash(&client, &resolver, node)
            .await
            .unwrap_or_else(|e| {
                tracing::debug!(%name, "No ENS content hash: {}", e);
                None
            });

        Ok(Some(NameRecord {
            name,
            avatar,
            content_hash,
        }))
    }
}
