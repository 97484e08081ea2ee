//! Capacity admission: pausing, wake-up timers and re-drive.

mod common;

use std::sync::Arc;
use std::time::Duration;

use account_relay::chain::CapacityLedger;
use account_relay::config::CapacityLimit;
use account_relay::pipeline::{
    AccountChangeRequest, AdmissionController, AdmissionSettings, AdmissionState, PublishJob,
    RequestPayload, Scheduler,
};
use account_relay::queue::{JobFailure, JobQueue, JobState, RetryPolicy};
use account_relay::store::{epoch_capacity_key, StateStore};
use alloy::primitives::Bytes;
use common::{default_ledger, MockChain, RecordingScheduler};

const BLOCK: Duration = Duration::from_secs(12);

struct Harness {
    chain: Arc<MockChain>,
    store: StateStore,
    queue: Arc<JobQueue<PublishJob>>,
    scheduler: Arc<RecordingScheduler>,
    admission: Arc<AdmissionController>,
}

fn harness(limit: CapacityLimit) -> Harness {
    let chain = MockChain::new();
    let store = StateStore::new(None);
    let queue = Arc::new(JobQueue::new("publish"));
    let scheduler = RecordingScheduler::new();
    let admission = AdmissionController::new(
        chain.clone(),
        store.clone(),
        queue.clone(),
        scheduler.clone(),
        AdmissionSettings {
            provider_id: 1,
            limit,
            block_interval: BLOCK,
        },
    );
    Harness {
        chain,
        store,
        queue,
        scheduler,
        admission,
    }
}

fn job(handle: &str) -> PublishJob {
    let request = AccountChangeRequest {
        provider_id: 1,
        account_id: "0xabc".into(),
        payload: RequestPayload::CreateHandle {
            base_handle: handle.into(),
            expiration: 10,
        },
        proof: Bytes::new(),
    };
    PublishJob {
        reference_id: handle.into(),
        provider_id: 1,
        request,
    }
}

/// Add a job, take it, and fail it with `policy`.
async fn fail_job(queue: &JobQueue<PublishJob>, id: &str, policy: RetryPolicy) {
    queue.add(id, job(id), Duration::ZERO);
    let taken = queue.next().await;
    assert_eq!(taken.id, id);
    queue.fail(id, JobFailure::new("test", policy));
}

#[tokio::test]
async fn test_usage_at_threshold_pauses_until_next_epoch() {
    let h = harness(CapacityLimit::Amount(500));
    h.store.set(&epoch_capacity_key(7), 500, None);

    let state = h.admission.check_capacity().await.unwrap();

    assert_eq!(state, AdmissionState::Paused);
    assert!(h.queue.is_paused());
    // Epoch ends at block 200, chain is at 150.
    let armed = h.scheduler.armed();
    assert_eq!(armed.len(), 1);
    assert_eq!(armed[0].1, BLOCK * 50);
    assert!(h.admission.snapshot().timer_armed);
}

#[tokio::test]
async fn test_percentage_limit_below_threshold_keeps_running() {
    let h = harness(CapacityLimit::Percentage(80));
    h.store.set(&epoch_capacity_key(7), 799_999, None);

    assert_eq!(h.admission.check_capacity().await.unwrap(), AdmissionState::Running);
    assert!(!h.queue.is_paused());
    assert!(h.scheduler.armed().is_empty());

    h.store.incr_by(&epoch_capacity_key(7), 1, None);
    assert_eq!(h.admission.check_capacity().await.unwrap(), AdmissionState::Paused);
}

#[tokio::test]
async fn test_empty_ledger_pauses() {
    let h = harness(CapacityLimit::Percentage(100));
    h.chain.set_ledger(CapacityLedger {
        remaining: 0,
        ..default_ledger()
    });
    assert_eq!(h.admission.check_capacity().await.unwrap(), AdmissionState::Paused);
}

#[tokio::test]
async fn test_pool_capacity_rejection_pauses_regardless_of_ledger() {
    let h = harness(CapacityLimit::Percentage(100));
    assert_eq!(
        h.admission.check_after_job(true).await.unwrap(),
        AdmissionState::Paused
    );
    assert_eq!(
        h.admission.check_after_job(false).await.unwrap(),
        AdmissionState::Running
    );
}

#[tokio::test]
async fn test_rearming_cancels_previous_timer() {
    let h = harness(CapacityLimit::Amount(1));
    h.store.set(&epoch_capacity_key(7), 1, None);

    h.admission.check_capacity().await.unwrap();
    h.admission.check_capacity().await.unwrap();

    let armed = h.scheduler.armed();
    assert_eq!(armed.len(), 2);
    assert!(h.scheduler.cancelled().contains(&armed[0].0));
    assert_eq!(h.scheduler.pending(), 1);
}

#[tokio::test]
async fn test_resume_redrives_only_capacity_failures() {
    let h = harness(CapacityLimit::Amount(100));
    fail_job(&h.queue, "refill", RetryPolicy::OnCapacityRefill).await;
    fail_job(&h.queue, "terminal", RetryPolicy::Never).await;

    h.store.set(&epoch_capacity_key(7), 100, None);
    h.admission.check_capacity().await.unwrap();
    assert_eq!(h.queue.state("refill"), Some(JobState::Failed));

    // New epoch, fresh counter.
    h.chain.set_ledger(CapacityLedger {
        epoch_start: 200,
        current_epoch: 8,
        current_block: 201,
        ..default_ledger()
    });
    assert_eq!(h.admission.check_capacity().await.unwrap(), AdmissionState::Running);

    assert!(!h.queue.is_paused());
    assert_eq!(h.queue.state("refill"), Some(JobState::Waiting));
    assert_eq!(h.queue.state("terminal"), Some(JobState::Failed));
    assert_eq!(h.scheduler.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_wakeup_timer_resumes_at_epoch_rollover() {
    let h = harness(CapacityLimit::Amount(100));
    h.store.set(&epoch_capacity_key(7), 100, None);
    assert_eq!(h.admission.check_capacity().await.unwrap(), AdmissionState::Paused);

    h.chain.set_ledger(CapacityLedger {
        epoch_start: 200,
        current_epoch: 8,
        current_block: 200,
        ..default_ledger()
    });

    tokio::time::sleep(BLOCK * 49).await;
    assert_eq!(h.admission.state(), AdmissionState::Paused);

    tokio::time::sleep(BLOCK * 2).await;
    assert_eq!(h.admission.state(), AdmissionState::Running);
    assert!(!h.queue.is_paused());
}

#[tokio::test]
async fn test_failed_check_while_paused_rearms_one_block_later() {
    let h = harness(CapacityLimit::Amount(1));
    h.store.set(&epoch_capacity_key(7), 1, None);
    h.admission.check_capacity().await.unwrap();

    h.chain.fail_ledger_reads(true);
    assert!(h.admission.check_capacity().await.is_err());

    let armed = h.scheduler.armed();
    assert_eq!(armed.last().map(|a| a.1), Some(BLOCK));
    assert_eq!(h.scheduler.pending(), 1);
    assert_eq!(h.admission.state(), AdmissionState::Paused);
}

#[tokio::test]
async fn test_usage_recorded_only_for_current_epoch() {
    let h = harness(CapacityLimit::Percentage(80));

    assert_eq!(h.admission.record_capacity_usage(7, 120).await.unwrap(), Some(120));
    assert_eq!(h.admission.record_capacity_usage(7, 30).await.unwrap(), Some(150));
    assert_eq!(h.admission.record_capacity_usage(6, 999).await.unwrap(), None);

    assert_eq!(h.store.get(&epoch_capacity_key(7)), Some(150));
    assert_eq!(h.store.get(&epoch_capacity_key(6)), None);
}

#[tokio::test]
async fn test_shutdown_cancels_pending_timer() {
    let h = harness(CapacityLimit::Amount(1));
    h.store.set(&epoch_capacity_key(7), 1, None);
    h.admission.check_capacity().await.unwrap();
    assert_eq!(h.scheduler.pending(), 1);

    h.admission.shutdown();
    assert_eq!(h.scheduler.pending(), 0);
    assert!(!h.admission.snapshot().timer_armed);
}

#[tokio::test]
async fn test_no_timer_armed_after_shutdown() {
    let h = harness(CapacityLimit::Amount(1));
    h.store.set(&epoch_capacity_key(7), 1, None);
    h.admission.check_capacity().await.unwrap();
    h.admission.shutdown();
    let armed = h.scheduler.armed().len();

    // Checks that run after shutdown arm nothing, failing or not.
    h.chain.fail_ledger_reads(true);
    assert!(h.admission.check_capacity().await.is_ok());
    h.chain.fail_ledger_reads(false);
    h.admission.check_capacity().await.unwrap();

    assert_eq!(h.scheduler.armed().len(), armed);
    assert_eq!(h.scheduler.pending(), 0);
    assert!(!h.admission.snapshot().timer_armed);
}
