//! # Enrichment Pipeline
//!
//! Resolves the derived data of one account on one chain: native balance, ENS and UNS name
//! records, and secondary-token balances. The four resolutions run concurrently and each one
//! fails independently; a failure is logged and yields `None` for that field only.

pub mod abi;
pub mod ens;
pub mod tokens;

use crate::provider::WalletProvider;
use crate::store::AccountUpdate;
use crate::types::{
    is_evm_address, Address, Balances, Chain, NameRecord, SecondaryTokenBalance, TokenConfig,
};
use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

pub use ens::{valid_ens_chain, RpcEnsResolver};
pub use tokens::RpcTokenBalances;

/// Resolves an address to a name-service record on a chain.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve(&self, address: &str, chain: &Chain) -> Result<Option<NameRecord>>;
}

/// Reads the balance of one secondary token, already formatted with the token's decimals.
#[async_trait]
pub trait TokenBalanceSource: Send + Sync {
    async fn balance_of(&self, owner: &str, token: &TokenConfig, chain: &Chain) -> Result<String>;
}

/// Everything the pipeline needs to enrich one account.
#[derive(Debug, Clone)]
pub struct EnrichmentRequest {
    pub address: Address,
    pub provider: WalletProvider,
    /// The wallet's active chain, when it is a configured chain.
    pub chain: Option<Chain>,
    /// The configured chain serving ENS for the active chain, if any.
    pub ens_chain: Option<Chain>,
    pub cached_ens: Option<NameRecord>,
    pub cached_uns: Option<NameRecord>,
}

/// The joined outcome of one enrichment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub balance: Option<Balances>,
    pub ens: Option<NameRecord>,
    pub uns: Option<NameRecord>,
    pub secondary_tokens: Option<Vec<SecondaryTokenBalance>>,
}

impl Enrichment {
    /// An update that overwrites all four derived fields.
    pub fn into_update(self) -> AccountUpdate {
        AccountUpdate {
            ens: Some(self.ens),
            uns: Some(self.uns),
            balance: Some(self.balance),
            secondary_tokens: Some(self.secondary_tokens),
        }
    }
}

#[derive(Clone, Default)]
pub struct Enricher {
    ens: Option<Arc<dyn NameResolver>>,
    uns: Option<Arc<dyn NameResolver>>,
    tokens: Option<Arc<dyn TokenBalanceSource>>,
}

impl Enricher {
    pub fn new(
        ens: Option<Arc<dyn NameResolver>>,
        uns: Option<Arc<dyn NameResolver>>,
        tokens: Option<Arc<dyn TokenBalanceSource>>,
    ) -> Self {
        Self { ens, uns, tokens }
    }

    pub async fn enrich(&self, request: &EnrichmentRequest) -> Enrichment {
        let (balance, ens, uns, secondary_tokens) = tokio::join!(
            self.balance(request),
            self.ens(request),
            self.uns(request),
            self.secondary_tokens(request),
        );
        Enrichment {
            balance,
            ens,
            uns,
            secondary_tokens,
        }
    }

    async fn balance(&self, request: &EnrichmentRequest) -> Option<Balances> {
        let chain = request.chain.as_ref()?;
        // Substrate extensions expose no balance query.
        let provider = request.provider.as_evm()?;

        let raw = match provider
            .request(
                "eth_getBalance",
                serde_json::json!([request.address, "latest"]),
            )
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(address = %request.address, chain_id = %chain.id, "Balance lookup failed: {}", e);
                return None;
            }
        };

        match raw.as_str().map(abi::parse_quantity) {
            Some(Ok(wei)) => Some(Balances::from([(
                chain.token.clone(),
                abi::format_units(wei, 18),
            )])),
            Some(Err(e)) => {
                tracing::warn!(address = %request.address, chain_id = %chain.id, "Balance lookup failed: {}", e);
                None
            }
            None => {
                tracing::warn!(address = %request.address, chain_id = %chain.id, "Balance lookup returned {}", raw);
                None
            }
        }
    }

    async fn ens(&self, request: &EnrichmentRequest) -> Option<NameRecord> {
        if let Some(cached) = &request.cached_ens {
            return Some(cached.clone());
        }
        let (resolver, chain) = (self.ens.as_ref()?, request.ens_chain.as_ref()?);
        resolve_name(resolver.as_ref(), "ENS", &request.address, chain).await
    }

    async fn uns(&self, request: &EnrichmentRequest) -> Option<NameRecord> {
        if let Some(cached) = &request.cached_uns {
            return Some(cached.clone());
        }
        if !is_evm_address(&request.address) {
            return None;
        }
        let (resolver, chain) = (self.uns.as_ref()?, request.chain.as_ref()?);
        resolve_name(resolver.as_ref(), "UNS", &request.address, chain).await
    }

    async fn secondary_tokens(
        &self,
        request: &EnrichmentRequest,
    ) -> Option<Vec<SecondaryTokenBalance>> {
        let chain = request.chain.as_ref()?;
        let source = self.tokens.as_ref()?;
        if chain.secondary_tokens.is_empty() {
            return None;
        }

        let lookups = chain.secondary_tokens.iter().map(|token| async move {
            match source.balance_of(&request.address, token, chain).await {
                Ok(balance) => Some(SecondaryTokenBalance {
                    name: token.name.clone(),
                    balance,
                    icon: token.icon.clone(),
                }),
                Err(e) => {
                    tracing::warn!(address = %request.address, token = %token.name, "Token balance lookup failed: {}", e);
                    None
                }
            }
        });
        Some(join_all(lookups).await.into_iter().flatten().collect())
    }
}

async fn resolve_name(
    resolver: &dyn NameResolver,
    service: &str,
    address: &str,
    chain: &Chain,
) -> Option<NameRecord> {
    match resolver.resolve(address, chain).await {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(%address, chain_id = %chain.id, "{} resolution failed: {}", service, e);
            None
        }
    }
}
