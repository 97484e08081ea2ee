//! Resumable forward walk over finalized blocks.
//!
//! Each pass starts after the persisted cursor (or at the current finalized
//! head on first run), visits at most `max_blocks_per_pass` blocks in order,
//! and advances the cursor after every visited block so a restart resumes
//! where the last pass stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::chain::client::ChainClient;
use crate::chain::types::{Block, ChainResult, RawEvent};
use crate::store::{last_seen_block_key, StateStore};

/// Called once per finalized block, in block order.
#[async_trait]
pub trait BlockVisitor: Send + Sync {
    async fn visit(&self, block: &Block, events: &[RawEvent]) -> ChainResult<()>;
}

/// What one pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanReport {
    /// Another pass was still running; nothing was visited.
    pub skipped: bool,
    pub visited: u64,
    /// Cursor after the pass.
    pub last_seen: Option<u64>,
}

pub struct BlockScanner {
    name: String,
    chain: Arc<dyn ChainClient>,
    store: StateStore,
    max_blocks_per_pass: u64,
    in_progress: AtomicBool,
}

/// Clears the in-progress flag however the pass ends.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BlockScanner {
    pub fn new(
        name: impl Into<String>,
        chain: Arc<dyn ChainClient>,
        store: StateStore,
        max_blocks_per_pass: u64,
    ) -> Self {
        Self {
            name: name.into(),
            chain,
            store,
            max_blocks_per_pass: max_blocks_per_pass.max(1),
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Persisted cursor, if any pass has visited a block.
    pub fn last_seen(&self) -> Option<u64> {
        self.store
            .get(&last_seen_block_key(&self.name))
            .map(|n| n as u64)
    }

    pub async fn scan(&self, visitor: &dyn BlockVisitor) -> ChainResult<ScanReport> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(scanner = %self.name, "Previous scan still running, skipping");
            return Ok(ScanReport {
                skipped: true,
                visited: 0,
                last_seen: self.last_seen(),
            });
        }
        let _guard = PassGuard(&self.in_progress);

        let finalized_hash = self.chain.finalized_block_hash().await?;
        let finalized = self.chain.block(finalized_hash).await?.number;

        let start = match self.last_seen() {
            Some(last) => last + 1,
            None => finalized,
        };
        if start > finalized {
            return Ok(ScanReport {
                skipped: false,
                visited: 0,
                last_seen: self.last_seen(),
            });
        }
        let end = finalized.min(start + self.max_blocks_per_pass - 1);

        let key = last_seen_block_key(&self.name);
        let mut visited = 0;
        for number in start..=end {
            let Some(hash) = self.chain.block_hash(number).await? else {
                break;
            };
            let block = self.chain.block(hash).await?;
            let events = self.chain.events(hash).await?;
            visitor.visit(&block, &events).await?;
            self.store.set(&key, number as u128, None);
            visited += 1;
        }

        if visited > 0 {
            tracing::debug!(
                scanner = %self.name,
                from = start,
                to = start + visited - 1,
                finalized,
                "Scan pass complete"
            );
        }
        Ok(ScanReport {
            skipped: false,
            visited,
            last_seen: self.last_seen(),
        })
    }
}

/// Publishes the finalized height as a gauge.
pub struct FinalityTracker;

#[async_trait]
impl BlockVisitor for FinalityTracker {
    async fn visit(&self, block: &Block, events: &[RawEvent]) -> ChainResult<()> {
        crate::observability::metrics::record_finalized_block(block.number);
        tracing::trace!(
            block_number = block.number,
            extrinsics = block.extrinsics.len(),
            events = events.len(),
            "Finalized block"
        );
        Ok(())
    }
}
