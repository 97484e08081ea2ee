//! Account relay: submits account-change requests to the chain on a
//! provider's behalf, paid from the provider's capacity, and reports each
//! outcome to the provider's webhook.

pub mod api;
pub mod chain;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod queue;
pub mod resilience;
pub mod store;

pub use config::schema::RelayConfig;
pub use lifecycle::{Relay, Shutdown};
