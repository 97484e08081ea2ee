//! In-process named job queue with delays, pause/resume and a failed set.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::queue::job::{AddOutcome, FailedJob, Job, JobFailure, JobState, QueueCounts};

struct Record<T> {
    job: Job<T>,
    state: JobState,
    ready_at: Option<Instant>,
    failure: Option<JobFailure>,
}

struct Inner<T> {
    records: HashMap<String, Record<T>>,
    waiting: VecDeque<String>,
    /// Ids with their completion time; payloads are dropped on completion.
    completed: HashMap<String, Instant>,
    paused: bool,
}

impl<T> Inner<T> {
    fn promote_due(&mut self, now: Instant) {
        let mut due: Vec<(Instant, String)> = self
            .records
            .iter()
            .filter(|(_, r)| r.state == JobState::Delayed)
            .filter_map(|(id, r)| r.ready_at.filter(|at| *at <= now).map(|at| (at, id.clone())))
            .collect();
        due.sort();
        for (_, id) in due {
            if let Some(record) = self.records.get_mut(&id) {
                record.state = JobState::Waiting;
                record.ready_at = None;
                self.waiting.push_back(id);
            }
        }
    }

    fn next_wake(&self) -> Option<Instant> {
        self.records
            .values()
            .filter(|r| r.state == JobState::Delayed)
            .filter_map(|r| r.ready_at)
            .min()
    }

    fn count(&self, state: JobState) -> usize {
        self.records.values().filter(|r| r.state == state).count()
    }
}

/// A FIFO job queue keyed by job id.
///
/// Adding is idempotent on the id: a job id already seen in any state,
/// completed included, is not enqueued again.
pub struct JobQueue<T> {
    name: &'static str,
    inner: Mutex<Inner<T>>,
    notify: Notify,
}

impl<T: Clone> JobQueue<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(Inner {
                records: HashMap::new(),
                waiting: VecDeque::new(),
                completed: HashMap::new(),
                paused: false,
            }),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `data` under `id`, runnable after `delay`.
    pub fn add(&self, id: &str, data: T, delay: Duration) -> AddOutcome {
        let mut inner = self.lock();
        if let Some(existing) = self.state_locked(&inner, id) {
            return AddOutcome::Existing(existing);
        }

        let (state, ready_at) = if delay.is_zero() {
            inner.waiting.push_back(id.to_string());
            (JobState::Waiting, None)
        } else {
            (JobState::Delayed, Some(Instant::now() + delay))
        };
        inner.records.insert(
            id.to_string(),
            Record {
                job: Job {
                    id: id.to_string(),
                    data,
                    attempts: 0,
                },
                state,
                ready_at,
                failure: None,
            },
        );
        drop(inner);

        tracing::debug!(queue = self.name, job_id = %id, delay_ms = delay.as_millis() as u64, "Job added");
        self.notify.notify_waiters();
        AddOutcome::Added
    }

    fn state_locked(&self, inner: &Inner<T>, id: &str) -> Option<JobState> {
        if let Some(record) = inner.records.get(id) {
            return Some(record.state);
        }
        inner.completed.contains_key(id).then_some(JobState::Completed)
    }

    pub fn state(&self, id: &str) -> Option<JobState> {
        let inner = self.lock();
        self.state_locked(&inner, id)
    }

    /// Wait for the next runnable job and mark it active. Honors pause:
    /// while paused no job is handed out.
    pub async fn next(&self) -> Job<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake = {
                let mut inner = self.lock();
                if inner.paused {
                    // Delayed jobs stay put until resume, so there is no
                    // deadline to wake for.
                    None
                } else {
                    inner.promote_due(Instant::now());
                    while let Some(id) = inner.waiting.pop_front() {
                        if let Some(record) = inner.records.get_mut(&id) {
                            if record.state == JobState::Waiting {
                                record.state = JobState::Active;
                                return record.job.clone();
                            }
                        }
                    }
                    inner.next_wake()
                }
            };

            match wake {
                Some(at) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Mark an active job done; its payload is released.
    pub fn complete(&self, id: &str) {
        let mut inner = self.lock();
        inner.records.remove(id);
        inner.completed.insert(id.to_string(), Instant::now());
    }

    /// Forget completed ids older than `retention`. A forgotten id can be
    /// enqueued again. Returns how many were dropped.
    pub fn purge_completed(&self, retention: Duration) -> usize {
        let mut inner = self.lock();
        let now = Instant::now();
        let before = inner.completed.len();
        inner
            .completed
            .retain(|_, done_at| now.saturating_duration_since(*done_at) < retention);
        before - inner.completed.len()
    }

    /// Move an active job to the failed set.
    pub fn fail(&self, id: &str, failure: JobFailure) {
        let mut inner = self.lock();
        if let Some(record) = inner.records.get_mut(id) {
            record.job.attempts += 1;
            record.state = JobState::Failed;
            record.failure = Some(failure);
        }
    }

    /// Put an active job back after `delay`, counting the attempt.
    pub fn requeue(&self, id: &str, delay: Duration) {
        let mut inner = self.lock();
        if let Some(record) = inner.records.get_mut(id) {
            record.job.attempts += 1;
            record.state = JobState::Delayed;
            record.ready_at = Some(Instant::now() + delay);
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Stop handing out jobs. Active jobs run to completion.
    pub fn pause(&self) {
        self.lock().paused = true;
        tracing::info!(queue = self.name, "Queue paused");
    }

    pub fn resume(&self) {
        self.lock().paused = false;
        tracing::info!(queue = self.name, "Queue resumed");
        self.notify.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn failed(&self) -> Vec<FailedJob> {
        let inner = self.lock();
        let mut failed: Vec<FailedJob> = inner
            .records
            .values()
            .filter(|r| r.state == JobState::Failed)
            .filter_map(|r| {
                r.failure.as_ref().map(|f| FailedJob {
                    id: r.job.id.clone(),
                    reason: f.reason.clone(),
                    policy: f.policy,
                    attempts: r.job.attempts,
                })
            })
            .collect();
        failed.sort_by(|a, b| a.id.cmp(&b.id));
        failed
    }

    /// Move one failed job back to waiting with a fresh attempt budget.
    pub fn retry(&self, id: &str) -> bool {
        self.retry_failed_where(|f| f.id == id) == 1
    }

    /// Move every failed job matching `pred` back to waiting. Returns how
    /// many were moved.
    pub fn retry_failed_where<F>(&self, pred: F) -> usize
    where
        F: Fn(&FailedJob) -> bool,
    {
        let to_retry: Vec<String> = self
            .failed()
            .into_iter()
            .filter(|f| pred(f))
            .map(|f| f.id)
            .collect();

        let mut inner = self.lock();
        let mut moved = 0;
        for id in to_retry {
            if let Some(record) = inner.records.get_mut(&id) {
                if record.state != JobState::Failed {
                    continue;
                }
                record.state = JobState::Waiting;
                record.failure = None;
                record.job.attempts = 0;
                inner.waiting.push_back(id);
                moved += 1;
            }
        }
        drop(inner);

        if moved > 0 {
            tracing::info!(queue = self.name, moved, "Retrying failed jobs");
            self.notify.notify_waiters();
        }
        moved
    }

    pub fn counts(&self) -> QueueCounts {
        let inner = self.lock();
        QueueCounts {
            waiting: inner.count(JobState::Waiting),
            delayed: inner.count(JobState::Delayed),
            active: inner.count(JobState::Active),
            completed: inner.completed.len(),
            failed: inner.count(JobState::Failed),
            paused: inner.paused,
        }
    }

    /// Publish per-state depth gauges.
    pub fn record_depth(&self) {
        let counts = self.counts();
        metrics::record_queue_depth(self.name, "waiting", counts.waiting);
        metrics::record_queue_depth(self.name, "delayed", counts.delayed);
        metrics::record_queue_depth(self.name, "active", counts.active);
        metrics::record_queue_depth(self.name, "failed", counts.failed);
    }
}
