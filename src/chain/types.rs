//! Chain-specific types and error definitions.

use alloy::primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export ChainConfig from config module to avoid duplication
pub use crate::config::schema::ChainConfig;

/// Hash of a block.
pub type BlockHash = B256;

/// Hash of a submitted extrinsic.
pub type TxHash = B256;

/// Errors that can occur during chain operations.
#[derive(Debug, Error)]
pub enum ChainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// The requested block does not exist on the connected node.
    #[error("Block not found: {0}")]
    BlockNotFound(String),

    /// The transaction pool refused the extrinsic.
    #[error("{code}: {message}")]
    Rejected { code: i64, message: String },

    /// A chain response could not be interpreted.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid provider key or signing failure.
    #[error("Signer error: {0}")]
    Signer(String),
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Why the transaction pool refused a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The provider cannot pay the capacity fee right now.
    InsufficientCapacity,
    /// The nonce was already used or is behind the account's next index.
    StaleNonce,
    /// Anything else; never recoverable by waiting.
    Other,
}

impl ChainError {
    /// Classify a pool rejection. Returns `None` for transport-level failures,
    /// where the chain never gave a verdict.
    pub fn rejection(&self) -> Option<Rejection> {
        let ChainError::Rejected { code, message } = self else {
            return None;
        };
        let message = message.to_ascii_lowercase();
        let kind = match *code {
            1010 if message.contains("inability to pay some fees") => {
                Rejection::InsufficientCapacity
            }
            1010 if message.contains("outdated") || message.contains("stale") => {
                Rejection::StaleNonce
            }
            1014 => Rejection::StaleNonce,
            _ => Rejection::Other,
        };
        Some(kind)
    }
}

/// A block as seen by the pipeline: its height and the hashes of the
/// extrinsics it contains, in inclusion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub number: u64,
    pub hash: BlockHash,
    pub extrinsics: Vec<TxHash>,
}

impl Block {
    /// Position of an extrinsic within the block.
    pub fn extrinsic_index(&self, tx_hash: &TxHash) -> Option<u32> {
        self.extrinsics
            .iter()
            .position(|h| h == tx_hash)
            .map(|i| i as u32)
    }
}

/// Snapshot of the provider's capacity ledger and the current epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityLedger {
    /// Capacity the provider can still spend this epoch.
    pub remaining: u128,
    /// Total capacity issued to the provider through staking.
    pub total_issued: u128,
    /// First block of the current epoch.
    pub epoch_start: u64,
    /// Epoch length in blocks.
    pub epoch_length: u64,
    pub current_epoch: u64,
    pub current_block: u64,
}

impl CapacityLedger {
    pub fn next_epoch_start(&self) -> u64 {
        self.epoch_start.saturating_add(self.epoch_length)
    }

    pub fn blocks_until_next_epoch(&self) -> u64 {
        self.next_epoch_start().saturating_sub(self.current_block)
    }
}

/// When, within a block, an event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Initialization,
    ApplyExtrinsic(u32),
    Finalization,
}

/// An event as delivered by the chain, before classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub phase: Phase,
    pub pallet: String,
    pub method: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// A call the chain client knows how to encode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "camelCase")]
pub enum CallRequest {
    /// `handles.claim_handle`
    #[serde(rename_all = "camelCase")]
    ClaimHandle {
        msa_owner_key: String,
        proof: Bytes,
        base_handle: String,
        expiration: u64,
    },
    /// `handles.change_handle`
    #[serde(rename_all = "camelCase")]
    ChangeHandle {
        msa_owner_key: String,
        proof: Bytes,
        base_handle: String,
        expiration: u64,
    },
    /// `msa.add_public_key_to_msa`
    #[serde(rename_all = "camelCase")]
    AddPublicKeyToMsa {
        msa_owner_key: String,
        msa_owner_proof: Bytes,
        new_key_owner_proof: Bytes,
        msa_id: u64,
        new_public_key: String,
        expiration: u64,
    },
    /// A call the intake layer already SCALE-encoded.
    Encoded { encoded: Bytes },
}

/// An encoded, unsigned call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extrinsic(pub Bytes);

/// The capacity fee-payment envelope to wrap calls in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "envelope", content = "calls", rename_all = "camelCase")]
pub enum CapacityCall {
    /// `frequency_tx_payment.pay_with_capacity`
    Single(Extrinsic),
    /// `frequency_tx_payment.pay_with_capacity_batch_all`
    BatchAll(Vec<Extrinsic>),
}

/// A fully signed extrinsic ready for the transaction pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedExtrinsic {
    pub call: Extrinsic,
    pub nonce: u64,
    pub signer: Address,
    pub signature: Bytes,
}
