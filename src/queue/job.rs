//! Job records and retry classification.

use serde::Serialize;
use std::time::Duration;

/// A queued unit of work.
#[derive(Debug, Clone)]
pub struct Job<T> {
    pub id: String,
    pub data: T,
    /// Attempts already made before this one.
    pub attempts: u32,
}

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

/// What may bring a failed job back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RetryPolicy {
    /// Terminal.
    Never,
    /// Parked until the admission controller sees capacity return.
    OnCapacityRefill,
    /// Transient; re-queued with backoff while attempts remain.
    Backoff,
}

/// Why a job attempt failed and what should happen next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub reason: String,
    pub policy: RetryPolicy,
    /// Fixed delay overriding the backoff curve for a `Backoff` retry.
    pub retry_after: Option<Duration>,
}

impl JobFailure {
    pub fn new(reason: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            reason: reason.into(),
            policy,
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }
}

/// A job parked in the failed set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedJob {
    pub id: String,
    pub reason: String,
    pub policy: RetryPolicy,
    pub attempts: u32,
}

/// Result of adding a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// The id was already known; nothing was enqueued.
    Existing(JobState),
}

/// Per-state job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCounts {
    pub waiting: usize,
    pub delayed: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub paused: bool,
}
