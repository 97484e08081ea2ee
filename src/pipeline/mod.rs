//! The submission and confirmation pipeline.
//!
//! # Data Flow
//! ```text
//! intake.rs: AccountChangeRequest → PublishJob (id = content hash)
//!     → publish queue
//!     → publisher.rs (nonce.rs for sequencing, gated by admission.rs)
//!     → chain
//!     → confirm queue (delayed one block)
//!     → confirmation.rs (reads chain, feeds admission.rs usage counter)
//!     → notifier.rs → provider webhook
//! ```
//!
//! # Design Decisions
//! - Nonce and capacity state are owned by a single component each and
//!   reachable only through it
//! - Every failure is classified into a `RetryPolicy` before it reaches the
//!   queue
//! - Timers go through the `Scheduler` capability so they can be cancelled

pub mod admission;
pub mod confirmation;
pub mod error;
pub mod intake;
pub mod nonce;
pub mod notifier;
pub mod publisher;
pub mod scheduler;
pub mod types;

pub use admission::{AdmissionController, AdmissionSettings, AdmissionSnapshot, AdmissionState};
pub use confirmation::ConfirmationScanner;
pub use error::{IntakeError, PipelineError};
pub use intake::IntakeService;
pub use nonce::NonceSequencer;
pub use notifier::{NotifyError, OutcomeSink, WebhookNotifier};
pub use publisher::TransactionPublisher;
pub use scheduler::{Scheduler, TimerCallback, TimerHandle, TokioScheduler};
pub use types::{
    AccountChangeRequest, ConfirmationJob, OutcomeDetails, OutcomeNotification, PublishJob,
    RequestKind, RequestPayload,
};
