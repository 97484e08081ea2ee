//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Transient failure (chain read, webhook POST):
//!     → backoff.rs (exponential delay with jitter)
//!     → caller re-attempts until its attempt budget is spent
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline (see `chain::rpc`, `pipeline::notifier`)
//! - Retries are bounded; callers own the attempt budget

pub mod backoff;

pub use backoff::Backoff;
