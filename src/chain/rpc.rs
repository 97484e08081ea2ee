//! JSON-RPC chain client with timeout and endpoint failover.
//!
//! # Responsibilities
//! - Speak JSON-RPC over HTTP to the chain gateway
//! - Apply a per-call timeout and fail over across configured endpoints
//! - Surface pool rejections as [`ChainError::Rejected`] without failing over
//!
//! # Design Decisions
//! - Transport failures and timeouts move on to the next endpoint; a JSON-RPC
//!   error object is the chain's verdict and is returned immediately
//! - Submission is never retried on another endpoint after the request was
//!   sent, since the first node may already have accepted it

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::timeout;
use url::Url;

use crate::chain::client::ChainClient;
use crate::chain::types::{
    Block, BlockHash, CallRequest, CapacityCall, CapacityLedger, ChainConfig, ChainError,
    ChainResult, Extrinsic, RawEvent, SignedExtrinsic, TxHash,
};

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl RpcErrorObject {
    // Pool errors carry the detailed reason in `data`.
    fn into_error(self) -> ChainError {
        let message = match self.data {
            Some(Value::String(detail)) if !detail.is_empty() => {
                format!("{}: {}", self.message, detail)
            }
            _ => self.message,
        };
        ChainError::Rejected {
            code: self.code,
            message,
        }
    }
}

/// How far a request got before failing.
enum Attempt {
    /// Never reached the node; safe to try another endpoint.
    Unsent(String),
    /// The node may have received it.
    Sent(String),
}

/// Chain gateway client wrapper with failover support.
pub struct RpcChainClient {
    http: reqwest::Client,
    /// Primary endpoint followed by failovers.
    endpoints: Vec<Url>,
    timeout_duration: Duration,
    next_id: AtomicU64,
}

impl RpcChainClient {
    /// Create a new chain client.
    ///
    /// Invalid failover URLs are skipped with a warning; an invalid primary
    /// URL is an error.
    pub fn new(config: &ChainConfig) -> ChainResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);

        let primary: Url = config.rpc_url.parse().map_err(|e| {
            ChainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        let mut endpoints = vec![primary];

        for url_str in &config.failover_urls {
            match url_str.parse() {
                Ok(url) => endpoints.push(url),
                Err(_) => tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL"),
            }
        }

        let http = reqwest::Client::builder()
            .timeout(timeout_duration)
            .build()
            .map_err(|e| ChainError::Rpc(format!("Failed to build HTTP client: {}", e)))?;

        tracing::info!(
            rpc_url = %config.rpc_url,
            failovers = endpoints.len() - 1,
            "Chain client initialized"
        );

        Ok(Self {
            http,
            endpoints,
            timeout_duration,
            next_id: AtomicU64::new(1),
        })
    }

    /// Call `method`, failing over across endpoints on transport errors.
    async fn call<R: DeserializeOwned>(&self, method: &'static str, params: Value) -> ChainResult<R> {
        self.call_with(method, params, true).await
    }

    async fn call_with<R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
        failover_after_send: bool,
    ) -> ChainResult<R> {
        let mut last_error = String::new();

        for (i, endpoint) in self.endpoints.iter().enumerate() {
            let body = json!({
                "jsonrpc": "2.0",
                "id": self.next_id.fetch_add(1, Ordering::Relaxed),
                "method": method,
                "params": params,
            });

            let response = match timeout(self.timeout_duration, self.send(endpoint, &body)).await {
                Ok(Ok(response)) => response,
                Ok(Err(Attempt::Unsent(e))) => {
                    tracing::warn!(provider_idx = i, method, error = %e, "RPC error, trying next provider");
                    last_error = e;
                    continue;
                }
                Ok(Err(Attempt::Sent(e))) if failover_after_send => {
                    tracing::warn!(provider_idx = i, method, error = %e, "RPC error, trying next provider");
                    last_error = e;
                    continue;
                }
                Ok(Err(Attempt::Sent(e))) => return Err(ChainError::Rpc(e)),
                Err(_) if failover_after_send => {
                    tracing::warn!(provider_idx = i, method, "RPC timeout, trying next provider");
                    last_error = "timeout".to_string();
                    continue;
                }
                Err(_) => return Err(ChainError::Timeout(self.timeout_duration.as_secs())),
            };

            if let Some(error) = response.error {
                return Err(error.into_error());
            }
            let result = response.result.unwrap_or(Value::Null);
            return serde_json::from_value(result)
                .map_err(|e| ChainError::Decode(format!("{} returned unexpected shape: {}", method, e)));
        }

        Err(ChainError::Rpc(format!(
            "All RPC providers failed for {}: {}",
            method, last_error
        )))
    }

    async fn send(&self, endpoint: &Url, body: &Value) -> Result<RpcResponse, Attempt> {
        let response = self
            .http
            .post(endpoint.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    Attempt::Unsent(e.to_string())
                } else {
                    Attempt::Sent(e.to_string())
                }
            })?;

        let status = response.status();
        let parsed = response.json::<RpcResponse>().await;
        match parsed {
            Ok(rpc) if rpc.error.is_some() || status.is_success() => Ok(rpc),
            Ok(_) | Err(_) => Err(Attempt::Sent(format!("HTTP {} from {}", status, endpoint))),
        }
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn finalized_block_hash(&self) -> ChainResult<BlockHash> {
        self.call("chain_getFinalizedHead", json!([])).await
    }

    async fn block(&self, hash: BlockHash) -> ChainResult<Block> {
        let block: Option<Block> = self.call("chain_getBlock", json!([hash])).await?;
        block.ok_or_else(|| ChainError::BlockNotFound(hash.to_string()))
    }

    async fn block_hash(&self, number: u64) -> ChainResult<Option<BlockHash>> {
        self.call("chain_getBlockHash", json!([number])).await
    }

    async fn events(&self, hash: BlockHash) -> ChainResult<Vec<RawEvent>> {
        self.call("state_getEvents", json!([hash])).await
    }

    async fn account_nonce(&self, account: Address) -> ChainResult<u64> {
        self.call("system_accountNextIndex", json!([account])).await
    }

    async fn capacity_ledger(&self, provider_id: u64) -> ChainResult<CapacityLedger> {
        self.call("capacity_getLedger", json!([provider_id])).await
    }

    async fn build_extrinsic(&self, request: &CallRequest) -> ChainResult<Extrinsic> {
        self.call("tx_buildCall", json!([request])).await
    }

    async fn wrap_with_capacity_payment(&self, call: CapacityCall) -> ChainResult<Extrinsic> {
        self.call("tx_wrapWithCapacity", json!([call])).await
    }

    async fn submit(&self, extrinsic: &SignedExtrinsic) -> ChainResult<TxHash> {
        self.call_with("author_submitExtrinsic", json!([extrinsic]), false)
            .await
    }
}

impl std::fmt::Debug for RpcChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChainClient")
            .field("endpoints", &self.endpoints.len())
            .field("timeout_secs", &self.timeout_duration.as_secs())
            .finish()
    }
}
