//! Request intake: synchronous checks and idempotent enqueue.

use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::error::IntakeError;
use crate::pipeline::types::{AccountChangeRequest, PublishJob, RequestPayload};
use crate::queue::{AddOutcome, JobQueue};

/// Accepts requests into the publish queue.
#[derive(Clone)]
pub struct IntakeService {
    provider_id: u64,
    publish_queue: Arc<JobQueue<PublishJob>>,
}

impl IntakeService {
    pub fn new(provider_id: u64, publish_queue: Arc<JobQueue<PublishJob>>) -> Self {
        Self {
            provider_id,
            publish_queue,
        }
    }

    /// Enqueue `request` and return its reference id. Re-submitting an
    /// identical request returns the same id without enqueuing twice.
    pub fn enqueue_publish(&self, request: AccountChangeRequest) -> Result<String, IntakeError> {
        self.validate(&request)?;

        let reference_id = request.reference_id()?;
        let job = PublishJob {
            reference_id: reference_id.clone(),
            provider_id: request.provider_id,
            request,
        };
        let kind = job.request.kind();

        match self.publish_queue.add(&reference_id, job, Duration::ZERO) {
            AddOutcome::Added => {
                tracing::info!(reference_id = %reference_id, kind = %kind, "Request accepted");
            }
            AddOutcome::Existing(state) => {
                tracing::info!(
                    reference_id = %reference_id,
                    state = ?state,
                    "Duplicate request, returning existing reference"
                );
            }
        }
        Ok(reference_id)
    }

    fn validate(&self, request: &AccountChangeRequest) -> Result<(), IntakeError> {
        if request.provider_id != self.provider_id {
            return Err(IntakeError::ProviderMismatch {
                expected: self.provider_id,
                actual: request.provider_id,
            });
        }
        match &request.payload {
            RequestPayload::CreateHandle { base_handle, .. }
            | RequestPayload::ChangeHandle { base_handle, .. }
                if base_handle.trim().is_empty() =>
            {
                Err(IntakeError::EmptyHandle)
            }
            RequestPayload::SiwfSignup { calls } if calls.is_empty() => Err(IntakeError::EmptySignup),
            _ => Ok(()),
        }
    }
}
