//! Startup orchestration.
//!
//! # Responsibilities
//! - Build queues, scheduler, nonce sequencer and admission controller from
//!   configuration and the injected collaborators
//! - Run the initial capacity check before any publish worker starts
//! - Start publish and confirmation workers plus the housekeeping ticker
//! - Tear everything down in order on [`Relay::stop`]
//!
//! # Design Decisions
//! - Collaborators (chain client, signer, outcome sink, store) are passed in,
//!   so tests run the full pipeline against in-memory doubles
//! - The confirmation queue allows one extra attempt per block of the scan
//!   window, since each not-yet-finalized pass consumes one

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::api::AppState;
use crate::chain::client::ChainClient;
use crate::chain::scanner::{BlockScanner, FinalityTracker};
use crate::chain::signer::ProviderSigner;
use crate::config::RelayConfig;
use crate::lifecycle::Shutdown;
use crate::pipeline::{
    AdmissionController, AdmissionSettings, ConfirmationJob, ConfirmationScanner, IntakeService,
    NonceSequencer, OutcomeSink, PublishJob, Scheduler, TokioScheduler, TransactionPublisher,
};
use crate::queue::{spawn_workers, JobQueue, WorkerOptions};
use crate::resilience::Backoff;
use crate::store::{StateStore, StoreError};

/// A running pipeline.
pub struct Relay {
    pub intake: IntakeService,
    pub publish_queue: Arc<JobQueue<PublishJob>>,
    pub confirm_queue: Arc<JobQueue<ConfirmationJob>>,
    pub admission: Arc<AdmissionController>,
    pub scheduler: Arc<TokioScheduler>,
    pub store: StateStore,
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl Relay {
    pub async fn start(
        config: &RelayConfig,
        chain: Arc<dyn ChainClient>,
        signer: ProviderSigner,
        sink: Arc<dyn OutcomeSink>,
        store: StateStore,
    ) -> Self {
        let block_interval = Duration::from_secs(config.chain.block_interval_secs);
        let shutdown = Shutdown::new();

        let publish_queue = Arc::new(JobQueue::new("publish"));
        let confirm_queue = Arc::new(JobQueue::new("confirm"));
        let scheduler = Arc::new(TokioScheduler::new());

        let admission = AdmissionController::new(
            chain.clone(),
            store.clone(),
            publish_queue.clone(),
            scheduler.clone(),
            AdmissionSettings {
                provider_id: config.provider.provider_id,
                limit: config.capacity.limit,
                block_interval,
            },
        );
        match admission.check_capacity().await {
            Ok(state) => tracing::info!(state = ?state, "Initial capacity check complete"),
            Err(e) => tracing::warn!(error = %e, "Initial capacity check failed, starting unpaused"),
        }

        let nonce = Arc::new(NonceSequencer::new(chain.clone(), signer.address()));
        let publisher = Arc::new(TransactionPublisher::new(
            chain.clone(),
            signer,
            nonce,
            admission.clone(),
            confirm_queue.clone(),
            block_interval,
            config.chain.nonce_resync_attempts,
        ));
        let confirmer = Arc::new(ConfirmationScanner::new(
            chain.clone(),
            admission.clone(),
            sink,
            config.chain.scan_window_blocks,
            block_interval,
        ));

        let backoff = Backoff::new(config.queues.base_delay_ms, config.queues.max_delay_ms);
        let window_attempts = u32::try_from(config.chain.scan_window_blocks).unwrap_or(u32::MAX);

        let mut tasks = spawn_workers(
            publish_queue.clone(),
            publisher,
            WorkerOptions {
                concurrency: config.queues.publish_concurrency,
                max_attempts: config.queues.max_attempts,
                backoff,
            },
            &shutdown,
        );
        tasks.extend(spawn_workers(
            confirm_queue.clone(),
            confirmer,
            WorkerOptions {
                concurrency: config.queues.confirm_concurrency,
                max_attempts: config.queues.max_attempts.saturating_add(window_attempts),
                backoff,
            },
            &shutdown,
        ));

        let finality = BlockScanner::new(
            "finality",
            chain,
            store.clone(),
            config.chain.scan_window_blocks,
        );
        tasks.push(spawn_housekeeping(
            finality,
            store.clone(),
            publish_queue.clone(),
            confirm_queue.clone(),
            Duration::from_secs(config.queues.completed_retention_secs),
            block_interval,
            &shutdown,
        ));

        tracing::info!(
            provider_id = config.provider.provider_id,
            publish_workers = config.queues.publish_concurrency,
            confirm_workers = config.queues.confirm_concurrency,
            "Relay pipeline started"
        );

        Self {
            intake: IntakeService::new(config.provider.provider_id, publish_queue.clone()),
            publish_queue,
            confirm_queue,
            admission,
            scheduler,
            store,
            shutdown,
            tasks,
        }
    }

    pub fn app_state(&self, api_key: &str) -> AppState {
        AppState {
            intake: self.intake.clone(),
            publish_queue: self.publish_queue.clone(),
            confirm_queue: self.confirm_queue.clone(),
            admission: self.admission.clone(),
            api_key: Arc::from(api_key),
        }
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Stop taking jobs, wait for in-flight ones, cancel timers, and write
    /// the state snapshot.
    pub async fn stop(self) -> Result<(), StoreError> {
        self.shutdown.trigger();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
        self.admission.shutdown();
        self.scheduler.cancel_all();
        self.store.save_to_file()?;
        tracing::info!("Relay pipeline stopped");
        Ok(())
    }
}

/// Once per block: advance the finality cursor, drop expired counters and
/// completed ids, and publish queue depths.
fn spawn_housekeeping(
    scanner: BlockScanner,
    store: StateStore,
    publish_queue: Arc<JobQueue<PublishJob>>,
    confirm_queue: Arc<JobQueue<ConfirmationJob>>,
    completed_retention: Duration,
    period: Duration,
    shutdown: &Shutdown,
) -> JoinHandle<()> {
    let mut signal = shutdown.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = signal.recv() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = scanner.scan(&FinalityTracker).await {
                tracing::debug!(scanner = scanner.name(), error = %e, "Finality scan failed");
            }
            let purged = store.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Purged expired state entries");
            }
            for (queue, purged) in [
                (publish_queue.name(), publish_queue.purge_completed(completed_retention)),
                (confirm_queue.name(), confirm_queue.purge_completed(completed_retention)),
            ] {
                if purged > 0 {
                    tracing::debug!(queue, purged, "Forgot completed job ids");
                }
            }
            publish_queue.record_depth();
            confirm_queue.record_depth();
        }
    })
}
