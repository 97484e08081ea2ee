//! Job queues and workers.
//!
//! # Data Flow
//! ```text
//! add(id, data, delay) → waiting | delayed
//!     → worker: next() → active → JobHandler::handle
//!         Ok          → completed (id kept for idempotence)
//!         Err(policy) → Backoff with attempts left → delayed
//!                     → otherwise                  → failed
//! failed → retry / retry_failed_where → waiting
//! ```
//!
//! # Design Decisions
//! - Retry is decided by the failure's `RetryPolicy`, never by a blanket
//!   attempt counter
//! - Pause stops hand-out only; an active job always runs to completion

pub mod job;
pub mod queue;
pub mod worker;

pub use job::{AddOutcome, FailedJob, Job, JobFailure, JobState, QueueCounts, RetryPolicy};
pub use queue::JobQueue;
pub use worker::{spawn_workers, JobHandler, WorkerOptions};
