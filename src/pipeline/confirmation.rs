//! Confirmation of submitted extrinsics.
//!
//! # Responsibilities
//! - Walk finalized blocks from the head seen at submission, bounded by the
//!   scan window, looking for the extrinsic
//! - Classify the extrinsic's own events into success or on-chain failure
//! - Record capacity withdrawn (success and failure alike)
//! - Build the outcome notification and hand it to the sink
//!
//! # Design Decisions
//! - Only events whose phase is `ApplyExtrinsic(index)` of the target
//!   extrinsic are considered; other extrinsics in the block are ignored
//! - Not found before finality covers the whole window is transient; not
//!   found after it is terminal
//! - Every on-chain module error is terminal; unknown ones are logged loudly

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::chain::client::ChainClient;
use crate::chain::events::{DispatchError, EventKind};
use crate::chain::types::{Block, ChainResult, Phase};
use crate::pipeline::admission::AdmissionController;
use crate::pipeline::error::PipelineError;
use crate::pipeline::notifier::OutcomeSink;
use crate::pipeline::types::{ConfirmationJob, OutcomeDetails, OutcomeNotification, RequestKind};
use crate::queue::{Job, JobFailure, JobHandler};

/// Where the extrinsic was found.
struct Inclusion {
    block: Block,
    index: u32,
}

pub struct ConfirmationScanner {
    chain: Arc<dyn ChainClient>,
    admission: Arc<AdmissionController>,
    sink: Arc<dyn OutcomeSink>,
    scan_window_blocks: u64,
    block_interval: Duration,
}

impl ConfirmationScanner {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        admission: Arc<AdmissionController>,
        sink: Arc<dyn OutcomeSink>,
        scan_window_blocks: u64,
        block_interval: Duration,
    ) -> Self {
        Self {
            chain,
            admission,
            sink,
            scan_window_blocks: scan_window_blocks.max(1),
            block_interval,
        }
    }

    /// Resolve a submitted extrinsic. On success the notification has been
    /// handed to the sink (delivery failures are logged, not returned).
    pub async fn confirm(&self, job: &ConfirmationJob) -> Result<OutcomeNotification, PipelineError> {
        let Some(inclusion) = self.find(job).await? else {
            return Err(PipelineError::NotFound {
                tx_hash: job.tx_hash,
                window: self.scan_window_blocks,
            });
        };

        let events = self.chain.events(inclusion.block.hash).await?;
        // Only the target extrinsic's events, withdrawals included. Summing
        // every withdrawal in the block would count a block shared by two
        // relay extrinsics twice, once per confirmation.
        let kinds = events
            .iter()
            .filter(|e| e.phase == Phase::ApplyExtrinsic(inclusion.index))
            .map(EventKind::decode)
            .collect::<ChainResult<Vec<_>>>()?;

        let withdrawn: u128 = kinds
            .iter()
            .filter_map(|k| match k {
                EventKind::CapacityWithdrawn { amount, .. } => Some(*amount),
                _ => None,
            })
            .sum();
        if withdrawn > 0 {
            if let Err(e) = self.admission.record_capacity_usage(job.epoch, withdrawn).await {
                tracing::warn!(
                    reference_id = %job.reference_id,
                    epoch = job.epoch,
                    amount = withdrawn,
                    error = %e,
                    "Failed to record capacity usage"
                );
            }
        }

        if let Some(error) = kinds.iter().find_map(|k| match k {
            EventKind::ExtrinsicFailed(error) => Some(error.clone()),
            _ => None,
        }) {
            return Err(self.on_chain_failure(job, &inclusion, error));
        }

        if !kinds.contains(&EventKind::ExtrinsicSuccess) {
            return Err(PipelineError::MissingResultEvent {
                tx_hash: job.tx_hash,
                expected: "ExtrinsicSuccess",
            });
        }

        let notification = build_notification(job, &kinds)?;
        tracing::info!(
            reference_id = %job.reference_id,
            tx_hash = %job.tx_hash,
            block_number = inclusion.block.number,
            msa_id = notification.msa_id,
            "Transaction confirmed"
        );

        if let Err(e) = self.sink.deliver(&notification).await {
            tracing::error!(reference_id = %job.reference_id, error = %e, "Outcome notification dropped");
        }
        Ok(notification)
    }

    /// Scan forward from the submission-time finalized head. `Ok(None)` only
    /// when the whole window is finalized and the extrinsic is absent.
    async fn find(&self, job: &ConfirmationJob) -> Result<Option<Inclusion>, PipelineError> {
        let start = self.chain.block(job.last_finalized_block_hash).await?.number;
        let finalized_hash = self.chain.finalized_block_hash().await?;
        let finalized = self.chain.block(finalized_hash).await?.number;

        let window_end = start.saturating_add(self.scan_window_blocks - 1);
        let end = finalized.min(window_end);

        for number in start..=end {
            let Some(hash) = self.chain.block_hash(number).await? else {
                break;
            };
            let block = self.chain.block(hash).await?;
            if let Some(index) = block.extrinsic_index(&job.tx_hash) {
                tracing::debug!(
                    reference_id = %job.reference_id,
                    block_number = number,
                    index,
                    "Found extrinsic"
                );
                return Ok(Some(Inclusion { block, index }));
            }
        }

        if finalized < window_end {
            return Err(PipelineError::NotYetFinalized {
                tx_hash: job.tx_hash,
                scanned_to: end,
            });
        }
        tracing::error!(
            reference_id = %job.reference_id,
            tx_hash = %job.tx_hash,
            from = start,
            to = end,
            "Transaction not observed within scan window"
        );
        Ok(None)
    }

    fn on_chain_failure(
        &self,
        job: &ConfirmationJob,
        inclusion: &Inclusion,
        error: DispatchError,
    ) -> PipelineError {
        let module_error = error.module_error();
        match &module_error {
            Some(kind) if kind.is_known_terminal() => tracing::warn!(
                reference_id = %job.reference_id,
                block_number = inclusion.block.number,
                error = %error,
                "Transaction failed on chain"
            ),
            _ => tracing::error!(
                reference_id = %job.reference_id,
                block_number = inclusion.block.number,
                error = %error,
                "Transaction failed on chain with an unrecognized error"
            ),
        }
        PipelineError::OnChainFailure {
            tx_hash: job.tx_hash,
            error,
            module_error,
        }
    }
}

fn build_notification(
    job: &ConfirmationJob,
    kinds: &[EventKind],
) -> Result<OutcomeNotification, PipelineError> {
    let tx_hash = job.tx_hash;
    let kind = job.request.kind();
    let missing = |expected: &'static str| PipelineError::MissingResultEvent { tx_hash, expected };

    let claimed = kinds.iter().find_map(|k| match k {
        EventKind::HandleClaimed { msa_id, handle } => Some((*msa_id, handle.clone())),
        _ => None,
    });

    let (msa_id, details) = match kind {
        RequestKind::CreateHandle | RequestKind::ChangeHandle => {
            let (msa_id, handle) = claimed.ok_or_else(|| missing("HandleClaimed"))?;
            (msa_id, OutcomeDetails::Handle { handle })
        }
        RequestKind::AddKey => {
            let (msa_id, key) = kinds
                .iter()
                .find_map(|k| match k {
                    EventKind::PublicKeyAdded { msa_id, key } => Some((*msa_id, key.clone())),
                    _ => None,
                })
                .ok_or_else(|| missing("PublicKeyAdded"))?;
            (msa_id, OutcomeDetails::PublicKey { new_public_key: key })
        }
        RequestKind::SiwfSignup => {
            let (msa_id, account_id) = kinds
                .iter()
                .find_map(|k| match k {
                    EventKind::MsaCreated { msa_id, key } => Some((*msa_id, key.clone())),
                    _ => None,
                })
                .ok_or_else(|| missing("MsaCreated"))?;
            let (provider_id, delegator_id) = kinds
                .iter()
                .find_map(|k| match k {
                    EventKind::DelegationGranted {
                        provider_id,
                        delegator_id,
                    } => Some((*provider_id, *delegator_id)),
                    _ => None,
                })
                .ok_or_else(|| missing("DelegationGranted"))?;
            if delegator_id != msa_id || provider_id != job.request.provider_id {
                return Err(PipelineError::ResultMismatch {
                    tx_hash,
                    reason: format!(
                        "delegation {} -> {} does not match created msa {} and provider {}",
                        delegator_id, provider_id, msa_id, job.request.provider_id
                    ),
                });
            }
            let handle = claimed.map(|(_, handle)| handle);
            (msa_id, OutcomeDetails::Signup { account_id, handle })
        }
    };

    Ok(OutcomeNotification {
        transaction_type: kind,
        provider_id: job.request.provider_id,
        reference_id: job.reference_id.clone(),
        msa_id,
        details,
    })
}

#[async_trait]
impl JobHandler<ConfirmationJob> for ConfirmationScanner {
    async fn handle(&self, job: &Job<ConfirmationJob>) -> Result<(), JobFailure> {
        match self.confirm(&job.data).await {
            Ok(_) => Ok(()),
            Err(e @ PipelineError::NotYetFinalized { .. }) => {
                tracing::debug!(reference_id = %job.id, error = %e, "Waiting for finality");
                Err(JobFailure::from(&e).with_retry_after(self.block_interval))
            }
            Err(e) => Err(JobFailure::from(&e)),
        }
    }
}
