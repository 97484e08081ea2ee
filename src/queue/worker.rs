//! Worker pool pulling jobs from a [`JobQueue`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::queue::job::{Job, JobFailure, RetryPolicy};
use crate::queue::queue::JobQueue;
use crate::resilience::Backoff;

/// Processes one job to completion.
#[async_trait]
pub trait JobHandler<T>: Send + Sync {
    async fn handle(&self, job: &Job<T>) -> Result<(), JobFailure>;
}

/// Pool sizing and transient-retry settings.
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    pub concurrency: usize,
    /// Attempts allowed for [`RetryPolicy::Backoff`] failures, first included.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

/// Spawn `options.concurrency` workers. Each stops taking jobs once shutdown
/// is triggered but finishes the job it holds.
pub fn spawn_workers<T>(
    queue: Arc<JobQueue<T>>,
    handler: Arc<dyn JobHandler<T>>,
    options: WorkerOptions,
    shutdown: &Shutdown,
) -> Vec<JoinHandle<()>>
where
    T: Clone + Send + Sync + 'static,
{
    (0..options.concurrency.max(1))
        .map(|worker_id| {
            let queue = queue.clone();
            let handler = handler.clone();
            let mut signal = shutdown.subscribe();
            tokio::spawn(async move {
                tracing::debug!(queue = queue.name(), worker_id, "Worker started");
                loop {
                    let job = tokio::select! {
                        biased;
                        _ = signal.recv() => break,
                        job = queue.next() => job,
                    };
                    run_job(&queue, handler.as_ref(), &options, job).await;
                }
                tracing::debug!(queue = queue.name(), worker_id, "Worker stopped");
            })
        })
        .collect()
}

async fn run_job<T: Clone>(
    queue: &JobQueue<T>,
    handler: &dyn JobHandler<T>,
    options: &WorkerOptions,
    job: Job<T>,
) {
    let name = queue.name();
    match handler.handle(&job).await {
        Ok(()) => {
            queue.complete(&job.id);
            metrics::record_job(name, "completed");
            tracing::debug!(queue = name, job_id = %job.id, "Job completed");
        }
        Err(failure) => {
            let attempt = job.attempts + 1;
            if failure.policy == RetryPolicy::Backoff && attempt < options.max_attempts {
                let delay = failure
                    .retry_after
                    .unwrap_or_else(|| options.backoff.delay(attempt));
                queue.requeue(&job.id, delay);
                metrics::record_job(name, "retried");
                tracing::warn!(
                    queue = name,
                    job_id = %job.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %failure.reason,
                    "Job failed, retrying with backoff"
                );
            } else {
                tracing::error!(
                    queue = name,
                    job_id = %job.id,
                    attempt,
                    policy = ?failure.policy,
                    reason = %failure.reason,
                    "Job failed"
                );
                queue.fail(&job.id, failure);
                metrics::record_job(name, "failed");
            }
        }
    }
    queue.record_depth();
}
