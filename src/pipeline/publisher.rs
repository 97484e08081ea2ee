//! Transaction publishing.
//!
//! # Data Flow
//! ```text
//! PublishJob
//!     → build kind-specific call(s)
//!     → wrap in capacity payment (single or batch_all)
//!     → nonce → sign → submit
//!     → ConfirmationJob (delayed one block)
//!     → admission re-check, whatever happened above
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::chain::client::ChainClient;
use crate::chain::signer::ProviderSigner;
use crate::chain::types::{CallRequest, CapacityCall, Extrinsic, Rejection, TxHash};
use crate::pipeline::admission::AdmissionController;
use crate::pipeline::error::PipelineError;
use crate::pipeline::nonce::NonceSequencer;
use crate::pipeline::types::{AccountChangeRequest, ConfirmationJob, PublishJob, RequestPayload};
use crate::queue::{AddOutcome, Job, JobFailure, JobHandler, JobQueue};

/// Publishes one request per job and hands it to the confirmation queue.
pub struct TransactionPublisher {
    chain: Arc<dyn ChainClient>,
    signer: ProviderSigner,
    nonce: Arc<NonceSequencer>,
    admission: Arc<AdmissionController>,
    confirm_queue: Arc<JobQueue<ConfirmationJob>>,
    block_interval: Duration,
    nonce_resync_attempts: u32,
}

impl TransactionPublisher {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        signer: ProviderSigner,
        nonce: Arc<NonceSequencer>,
        admission: Arc<AdmissionController>,
        confirm_queue: Arc<JobQueue<ConfirmationJob>>,
        block_interval: Duration,
        nonce_resync_attempts: u32,
    ) -> Self {
        Self {
            chain,
            signer,
            nonce,
            admission,
            confirm_queue,
            block_interval,
            nonce_resync_attempts,
        }
    }

    /// Submit the job's extrinsic and schedule its confirmation.
    pub async fn publish(&self, job: &PublishJob) -> Result<TxHash, PipelineError> {
        let call = self.build_call(&job.request).await?;
        let extrinsic = self.chain.wrap_with_capacity_payment(call).await?;

        // The scan starts from the head finalized before submission.
        let last_finalized_block_hash = self.chain.finalized_block_hash().await?;
        let epoch = self
            .chain
            .capacity_ledger(job.provider_id)
            .await?
            .current_epoch;

        let (tx_hash, nonce) = self.sign_and_submit(extrinsic, &job.reference_id).await?;
        tracing::info!(
            reference_id = %job.reference_id,
            kind = %job.request.kind(),
            tx_hash = %tx_hash,
            nonce,
            epoch,
            "Extrinsic submitted"
        );

        let confirmation = ConfirmationJob {
            reference_id: job.reference_id.clone(),
            tx_hash,
            epoch,
            last_finalized_block_hash,
            request: job.request.clone(),
        };
        if let AddOutcome::Existing(state) =
            self.confirm_queue
                .add(&job.reference_id, confirmation, self.block_interval)
        {
            tracing::warn!(
                reference_id = %job.reference_id,
                state = ?state,
                "Confirmation already tracked for this reference"
            );
        }
        Ok(tx_hash)
    }

    async fn build_call(&self, request: &AccountChangeRequest) -> Result<CapacityCall, PipelineError> {
        let call = match &request.payload {
            RequestPayload::CreateHandle {
                base_handle,
                expiration,
            } => CallRequest::ClaimHandle {
                msa_owner_key: request.account_id.clone(),
                proof: request.proof.clone(),
                base_handle: base_handle.clone(),
                expiration: *expiration,
            },
            RequestPayload::ChangeHandle {
                base_handle,
                expiration,
            } => CallRequest::ChangeHandle {
                msa_owner_key: request.account_id.clone(),
                proof: request.proof.clone(),
                base_handle: base_handle.clone(),
                expiration: *expiration,
            },
            RequestPayload::AddKey {
                msa_id,
                new_public_key,
                new_key_owner_proof,
                expiration,
            } => CallRequest::AddPublicKeyToMsa {
                msa_owner_key: request.account_id.clone(),
                msa_owner_proof: request.proof.clone(),
                new_key_owner_proof: new_key_owner_proof.clone(),
                msa_id: *msa_id,
                new_public_key: new_public_key.clone(),
                expiration: *expiration,
            },
            RequestPayload::SiwfSignup { calls } => {
                let mut batch = Vec::with_capacity(calls.len());
                for encoded in calls {
                    let request = CallRequest::Encoded {
                        encoded: encoded.clone(),
                    };
                    batch.push(self.chain.build_extrinsic(&request).await?);
                }
                return Ok(CapacityCall::BatchAll(batch));
            }
        };
        Ok(CapacityCall::Single(self.chain.build_extrinsic(&call).await?))
    }

    /// Sign at the next nonce and submit, resyncing the nonce on stale-nonce
    /// rejections.
    async fn sign_and_submit(
        &self,
        extrinsic: Extrinsic,
        reference_id: &str,
    ) -> Result<(TxHash, u64), PipelineError> {
        let mut resyncs = 0;
        loop {
            let signed = self
                .nonce
                .with_next(|nonce| self.signer.sign(extrinsic.clone(), nonce))
                .await?;
            let nonce = signed.nonce;

            let err = match self.chain.submit(&signed).await {
                Ok(tx_hash) => return Ok((tx_hash, nonce)),
                Err(err) => err,
            };

            // Whatever went wrong, the pool no longer agrees with our cache.
            self.nonce.invalidate().await;

            match err.rejection() {
                Some(Rejection::StaleNonce) if resyncs < self.nonce_resync_attempts => {
                    resyncs += 1;
                    tracing::warn!(reference_id, nonce, resyncs, error = %err, "Stale nonce, resubmitting");
                }
                Some(Rejection::StaleNonce) => {
                    return Err(PipelineError::NonceDesync {
                        attempts: resyncs,
                        message: err.to_string(),
                    })
                }
                Some(Rejection::InsufficientCapacity) => {
                    tracing::warn!(reference_id, nonce, error = %err, "Submission refused for capacity");
                    return Err(PipelineError::CapacityExhausted(err.to_string()));
                }
                Some(Rejection::Other) => {
                    tracing::error!(reference_id, nonce, error = %err, "Submission rejected");
                    return Err(PipelineError::SubmissionRejected(err.to_string()));
                }
                None => {
                    tracing::error!(reference_id, nonce, error = %err, "Submission outcome unknown");
                    return Err(PipelineError::SubmissionOutcomeUnknown(err.to_string()));
                }
            }
        }
    }
}

#[async_trait]
impl JobHandler<PublishJob> for TransactionPublisher {
    async fn handle(&self, job: &Job<PublishJob>) -> Result<(), JobFailure> {
        let result = self.publish(&job.data).await;

        let capacity_rejected = matches!(result, Err(PipelineError::CapacityExhausted(_)));
        if let Err(e) = self.admission.check_after_job(capacity_rejected).await {
            tracing::warn!(reference_id = %job.id, error = %e, "Capacity check after publish failed");
        }

        result.map(|_| ()).map_err(|e| JobFailure::from(&e))
    }
}
