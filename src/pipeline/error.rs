//! Pipeline error taxonomy and its retry classification.

use thiserror::Error;

use crate::chain::events::{DispatchError, ModuleErrorKind};
use crate::chain::types::{ChainError, TxHash};
use crate::queue::{JobFailure, RetryPolicy};

/// Errors raised while publishing or confirming a request.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A chain read failed; usually transient.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The pool refused the extrinsic because capacity ran out.
    #[error("Capacity exhausted: {0}")]
    CapacityExhausted(String),

    /// The pool refused the extrinsic for a reason waiting will not fix.
    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),

    /// The submit call failed after the request left; the extrinsic may be
    /// in the pool. Never resubmitted.
    #[error("Submission outcome unknown: {0}")]
    SubmissionOutcomeUnknown(String),

    #[error("Nonce still stale after {attempts} resyncs: {message}")]
    NonceDesync { attempts: u32, message: String },

    /// Finality has not yet reached the end of the scan window.
    #[error("Transaction {tx_hash} not yet finalized (scanned through block {scanned_to})")]
    NotYetFinalized { tx_hash: TxHash, scanned_to: u64 },

    #[error("Transaction {tx_hash} not observed within {window} blocks")]
    NotFound { tx_hash: TxHash, window: u64 },

    #[error("Transaction {tx_hash} failed on chain: {error}")]
    OnChainFailure {
        tx_hash: TxHash,
        error: DispatchError,
        module_error: Option<ModuleErrorKind>,
    },

    #[error("Transaction {tx_hash} succeeded without a {expected} event")]
    MissingResultEvent {
        tx_hash: TxHash,
        expected: &'static str,
    },

    /// Result events contradict each other or the request.
    #[error("Transaction {tx_hash} result mismatch: {reason}")]
    ResultMismatch { tx_hash: TxHash, reason: String },
}

impl PipelineError {
    /// How the queue should treat a job that failed with this error.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            PipelineError::Chain(e) => match e {
                ChainError::Rpc(_) | ChainError::Timeout(_) | ChainError::BlockNotFound(_) => {
                    RetryPolicy::Backoff
                }
                ChainError::Rejected { .. } | ChainError::Decode(_) | ChainError::Signer(_) => {
                    RetryPolicy::Never
                }
            },
            PipelineError::CapacityExhausted(_) => RetryPolicy::OnCapacityRefill,
            PipelineError::NotYetFinalized { .. } => RetryPolicy::Backoff,
            PipelineError::SubmissionRejected(_)
            | PipelineError::SubmissionOutcomeUnknown(_)
            | PipelineError::NonceDesync { .. }
            | PipelineError::NotFound { .. }
            | PipelineError::OnChainFailure { .. }
            | PipelineError::MissingResultEvent { .. }
            | PipelineError::ResultMismatch { .. } => RetryPolicy::Never,
        }
    }
}

impl From<&PipelineError> for JobFailure {
    fn from(err: &PipelineError) -> Self {
        JobFailure::new(err.to_string(), err.retry_policy())
    }
}

/// Synchronous rejections at intake.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Request is for provider {actual}, this relay serves provider {expected}")]
    ProviderMismatch { expected: u64, actual: u64 },

    #[error("Handle must not be empty")]
    EmptyHandle,

    #[error("Signup must contain at least one call")]
    EmptySignup,

    #[error("Request could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),
}
