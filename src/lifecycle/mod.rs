//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs → startup.rs):
//!     Load config → logging → metrics → store → chain → signer
//!         → queues → admission (initial check) → workers → HTTP
//!
//! Shutdown (signals.rs → shutdown.rs → startup.rs):
//!     Ctrl+C / SIGTERM → workers stop taking jobs → timers cancelled
//!         → state snapshot → exit
//! ```
//!
//! # Design Decisions
//! - In-flight jobs are never aborted; a signed submission must be observed
//! - Shutdown is a level, not an edge: late subscribers still see it

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::wait_for_signal;
pub use startup::Relay;
