//! # Provider Registry
//!
//! Read-only JSON-RPC handles to the configured chains, created on first use and shared for the
//! life of the process. One handle exists per RPC URL; concurrent first requests for the same URL
//! all receive the same handle.

use crate::provider::ProviderError;
use crate::types::Chain;
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// A JSON-RPC client bound to one node URL.
#[derive(Debug)]
pub struct RpcClient {
    http: Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Performs a JSON-RPC call and returns its `result`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ProviderError::Transport(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = body.error {
            return Err(ProviderError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        // A JSON `null` result is legal (e.g. an unknown transaction) and is passed through.
        Ok(body.result.unwrap_or(Value::Null))
    }

    /// Performs a read-only `eth_call` against `to` and returns the raw return data.
    pub async fn eth_call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let params = serde_json::json!([
            { "to": to, "data": format!("0x{}", hex::encode(data)) },
            "latest"
        ]);
        let result = self.call("eth_call", params).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| ProviderError::InvalidResponse(format!("eth_call returned {}", result)))?;
        hex::decode(raw.trim_start_matches("0x"))
            .map_err(|e| ProviderError::InvalidResponse(format!("eth_call returned bad hex: {}", e)))
    }
}

/// Process-wide cache of [`RpcClient`] handles, keyed by RPC URL.
#[derive(Debug)]
pub struct ProviderRegistry {
    http: Client,
    clients: DashMap<String, Arc<RpcClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(http))
    }

    pub fn with_client(http: Client) -> Self {
        Self {
            http,
            clients: DashMap::new(),
        }
    }

    /// Returns the shared handle for `chain`'s RPC URL, creating it on first use.
    pub fn client_for(&self, chain: &Chain) -> Arc<RpcClient> {
        self.client_for_url(&chain.rpc_url)
    }

    pub fn client_for_url(&self, url: &str) -> Arc<RpcClient> {
        if let Some(existing) = self.clients.get(url) {
            return existing.clone();
        }
        self.clients
            .entry(url.to_string())
            .or_insert_with(|| {
                tracing::debug!("Creating RPC client for {}", url);
                Arc::new(RpcClient::new(self.http.clone(), url))
            })
            .clone()
    }

    /// The number of distinct handles created so far.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
