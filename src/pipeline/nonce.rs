//! Provider account nonce sequencing.

use std::future::Future;
use std::sync::Arc;

use alloy::primitives::Address;
use tokio::sync::Mutex;

use crate::chain::client::ChainClient;
use crate::chain::types::{ChainError, ChainResult};
use crate::observability::metrics;

/// Hands out the provider account's nonces, one caller at a time.
///
/// The cached value is the next nonce to issue. It is fetched from the chain
/// on first use and again after [`NonceSequencer::invalidate`].
pub struct NonceSequencer {
    chain: Arc<dyn ChainClient>,
    account: Address,
    next: Mutex<Option<u64>>,
}

impl NonceSequencer {
    pub fn new(chain: Arc<dyn ChainClient>, account: Address) -> Self {
        Self {
            chain,
            account,
            next: Mutex::new(None),
        }
    }

    /// Next nonce. Concurrent callers are serialized; a failed chain read is
    /// returned as-is and nothing is issued.
    pub async fn next(&self) -> ChainResult<u64> {
        let mut next = self.next.lock().await;
        let nonce = match *next {
            Some(nonce) => nonce,
            None => {
                let nonce = self.chain.account_nonce(self.account).await?;
                tracing::debug!(account = %self.account, nonce, "Fetched account nonce");
                nonce
            }
        };
        *next = Some(nonce + 1);
        Ok(nonce)
    }

    /// Issue the next nonce to `use_nonce`. If it fails the nonce was never
    /// consumed, so the cache is dropped rather than left one ahead.
    pub async fn with_next<T, E, F, Fut>(&self, use_nonce: F) -> Result<T, E>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ChainError>,
    {
        let nonce = self.next().await?;
        match use_nonce(nonce).await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.invalidate().await;
                Err(e)
            }
        }
    }

    /// Drop the cached value; the next call re-reads the chain.
    pub async fn invalidate(&self) {
        *self.next.lock().await = None;
        metrics::record_nonce_resync();
        tracing::info!(account = %self.account, "Nonce cache invalidated");
    }
}
