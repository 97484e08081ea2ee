//! The chain collaborator contract.

use alloy::primitives::Address;
use async_trait::async_trait;

use crate::chain::types::{
    Block, BlockHash, CallRequest, CapacityCall, CapacityLedger, ChainResult, Extrinsic,
    RawEvent, SignedExtrinsic, TxHash,
};

/// Everything the pipeline needs from the remote chain.
///
/// Implementations must be safe to share between workers; every method is a
/// suspension point.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Hash of the latest finalized block.
    async fn finalized_block_hash(&self) -> ChainResult<BlockHash>;

    /// Block header number and extrinsic hashes for `hash`.
    async fn block(&self, hash: BlockHash) -> ChainResult<Block>;

    /// Canonical block hash at `number`, or `None` beyond the chain head.
    async fn block_hash(&self, number: u64) -> ChainResult<Option<BlockHash>>;

    /// Every event emitted in the block.
    async fn events(&self, hash: BlockHash) -> ChainResult<Vec<RawEvent>>;

    /// Next unused nonce for `account`, including pool transactions.
    async fn account_nonce(&self, account: Address) -> ChainResult<u64>;

    async fn capacity_ledger(&self, provider_id: u64) -> ChainResult<CapacityLedger>;

    /// Encode a call.
    async fn build_extrinsic(&self, request: &CallRequest) -> ChainResult<Extrinsic>;

    /// Wrap calls so their fees are paid from the provider's capacity.
    async fn wrap_with_capacity_payment(&self, call: CapacityCall) -> ChainResult<Extrinsic>;

    /// Hand a signed extrinsic to the transaction pool. Returns once the pool
    /// accepts it, not when it is included.
    async fn submit(&self, extrinsic: &SignedExtrinsic) -> ChainResult<TxHash>;
}
