//! Capacity admission control.
//!
//! # Responsibilities
//! - Decide after every publish job (and once at startup) whether the
//!   provider may keep spending capacity this epoch
//! - Pause the publish queue and arm a wake-up timer for the next epoch when
//!   it may not
//! - On resume, re-drive publish jobs that failed for lack of capacity
//! - Own the per-epoch capacity usage counter
//!
//! # Design Decisions
//! - At most one wake-up timer is outstanding; re-arming cancels the old one
//! - Checks are serialized so two workers never race a pause against a resume
//! - A failed check while paused re-arms one block later instead of leaving
//!   the queue paused with no timer
//! - After [`AdmissionController::shutdown`] no timer is armed again, even by
//!   a wake-up check that was already running

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;

use crate::chain::client::ChainClient;
use crate::chain::types::{CapacityLedger, ChainResult};
use crate::config::CapacityLimit;
use crate::observability::metrics;
use crate::pipeline::scheduler::{Scheduler, TimerHandle};
use crate::pipeline::types::PublishJob;
use crate::queue::{JobQueue, RetryPolicy};
use crate::store::{epoch_capacity_key, StateStore};

/// Whether publish jobs are being handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdmissionState {
    Running,
    Paused,
}

/// Point-in-time view for the admin API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionSnapshot {
    pub state: AdmissionState,
    pub timer_armed: bool,
    pub limit: CapacityLimit,
    pub last_ledger: Option<CapacityLedger>,
    pub used_this_epoch: Option<u128>,
}

struct Status {
    state: AdmissionState,
    timer: Option<TimerHandle>,
    last_ledger: Option<CapacityLedger>,
    stopped: bool,
}

/// Static inputs of the controller.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionSettings {
    pub provider_id: u64,
    pub limit: CapacityLimit,
    pub block_interval: Duration,
}

pub struct AdmissionController {
    me: Weak<AdmissionController>,
    chain: Arc<dyn ChainClient>,
    store: StateStore,
    publish_queue: Arc<JobQueue<PublishJob>>,
    scheduler: Arc<dyn Scheduler>,
    settings: AdmissionSettings,
    status: Mutex<Status>,
    check_lock: tokio::sync::Mutex<()>,
}

impl AdmissionController {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: StateStore,
        publish_queue: Arc<JobQueue<PublishJob>>,
        scheduler: Arc<dyn Scheduler>,
        settings: AdmissionSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            chain,
            store,
            publish_queue,
            scheduler,
            settings,
            status: Mutex::new(Status {
                state: AdmissionState::Running,
                timer: None,
                last_ledger: None,
                stopped: false,
            }),
            check_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> AdmissionState {
        self.status().state
    }

    /// Re-evaluate capacity from the chain ledger and the usage counter.
    pub async fn check_capacity(&self) -> ChainResult<AdmissionState> {
        self.evaluate(false).await
    }

    /// Check run after a publish job. `capacity_rejected` is true when the
    /// pool just refused that job for lack of capacity, which counts as
    /// exhausted whatever the ledger says.
    pub async fn check_after_job(&self, capacity_rejected: bool) -> ChainResult<AdmissionState> {
        self.evaluate(capacity_rejected).await
    }

    async fn evaluate(&self, capacity_rejected: bool) -> ChainResult<AdmissionState> {
        let _serialized = self.check_lock.lock().await;
        if self.status().stopped {
            return Ok(self.state());
        }

        let ledger = match self.chain.capacity_ledger(self.settings.provider_id).await {
            Ok(ledger) => ledger,
            Err(e) => {
                if self.state() == AdmissionState::Paused {
                    tracing::warn!(error = %e, "Capacity check failed while paused, retrying next block");
                    self.arm_timer(self.settings.block_interval);
                }
                return Err(e);
            }
        };
        self.status().last_ledger = Some(ledger);

        let used = self
            .store
            .get(&epoch_capacity_key(ledger.current_epoch))
            .unwrap_or(0);
        let threshold = self.settings.limit.threshold(ledger.total_issued);
        metrics::record_epoch_capacity_used(used);

        let exhausted = capacity_rejected || ledger.remaining == 0 || used >= threshold;
        if exhausted {
            let blocks = ledger.blocks_until_next_epoch();
            let delay = self.epoch_wait(blocks);
            tracing::warn!(
                epoch = ledger.current_epoch,
                used,
                threshold,
                remaining = ledger.remaining,
                blocks_until_next_epoch = blocks,
                delay_secs = delay.as_secs(),
                "Capacity exhausted, pausing publish queue"
            );
            self.publish_queue.pause();
            self.arm_timer(delay);
            self.status().state = AdmissionState::Paused;
            metrics::record_capacity_paused(true);
            Ok(AdmissionState::Paused)
        } else {
            let was = {
                let mut status = self.status();
                if let Some(timer) = status.timer.take() {
                    self.scheduler.cancel(timer);
                }
                std::mem::replace(&mut status.state, AdmissionState::Running)
            };
            self.publish_queue.resume();
            metrics::record_capacity_paused(false);

            let redriven = self
                .publish_queue
                .retry_failed_where(|f| f.policy == RetryPolicy::OnCapacityRefill);
            if was == AdmissionState::Paused || redriven > 0 {
                tracing::info!(
                    epoch = ledger.current_epoch,
                    used,
                    threshold,
                    redriven,
                    "Capacity available, publish queue running"
                );
            }
            Ok(AdmissionState::Running)
        }
    }

    /// `blocks × block_interval`, never shorter than one block.
    fn epoch_wait(&self, blocks: u64) -> Duration {
        let interval = self.settings.block_interval;
        interval
            .saturating_mul(blocks.min(u32::MAX as u64) as u32)
            .max(interval)
    }

    fn arm_timer(&self, delay: Duration) {
        let me = self.me.clone();
        let callback = Box::new(move || {
            Box::pin(async move {
                if let Some(controller) = me.upgrade() {
                    if let Err(e) = controller.check_capacity().await {
                        tracing::warn!(error = %e, "Scheduled capacity check failed");
                    }
                }
            }) as futures_util::future::BoxFuture<'static, ()>
        });

        let mut status = self.status();
        if status.stopped {
            tracing::debug!("Admission stopped, not arming wake-up timer");
            return;
        }
        if let Some(previous) = status.timer.take() {
            self.scheduler.cancel(previous);
        }
        status.timer = Some(self.scheduler.schedule_once(delay, callback));
    }

    /// Add capacity withdrawn by a confirmed extrinsic to its epoch's
    /// counter. The entry expires when the epoch does. Usage for an epoch
    /// that already ended is dropped.
    pub async fn record_capacity_usage(&self, epoch: u64, amount: u128) -> ChainResult<Option<u128>> {
        let ledger = self.chain.capacity_ledger(self.settings.provider_id).await?;
        if ledger.current_epoch != epoch {
            tracing::debug!(
                epoch,
                current_epoch = ledger.current_epoch,
                amount,
                "Dropping capacity usage for a finished epoch"
            );
            return Ok(None);
        }

        let ttl = self.epoch_wait(ledger.blocks_until_next_epoch());
        let used = self
            .store
            .incr_by(&epoch_capacity_key(epoch), amount, Some(ttl));
        metrics::record_epoch_capacity_used(used);
        tracing::debug!(epoch, amount, used, "Recorded capacity usage");
        Ok(Some(used))
    }

    pub fn snapshot(&self) -> AdmissionSnapshot {
        let status = self.status();
        let used_this_epoch = status
            .last_ledger
            .and_then(|l| self.store.get(&epoch_capacity_key(l.current_epoch)));
        AdmissionSnapshot {
            state: status.state,
            timer_armed: status.timer.is_some(),
            limit: self.settings.limit,
            last_ledger: status.last_ledger,
            used_this_epoch,
        }
    }

    /// Cancel the wake-up timer, if any, and refuse to arm another.
    pub fn shutdown(&self) {
        let mut status = self.status();
        status.stopped = true;
        if let Some(timer) = status.timer.take() {
            self.scheduler.cancel(timer);
        }
    }
}
