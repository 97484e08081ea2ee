//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the account relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Chain gateway endpoints and block timing.
    pub chain: ChainConfig,

    /// The provider account the relay acts for.
    pub provider: ProviderConfig,

    /// Epoch capacity budget.
    pub capacity: CapacityConfig,

    /// Worker pools and transient-error retries.
    pub queues: QueueConfig,

    /// Webhook delivery.
    pub notifier: NotifierConfig,

    /// Persisted state.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Intake and admin HTTP surface.
    pub api: ApiConfig,
}

/// Chain gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs, tried in order.
    pub failover_urls: Vec<String>,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Nominal seconds between blocks.
    pub block_interval_secs: u64,

    /// Maximum number of finalized blocks searched for a submitted extrinsic.
    pub scan_window_blocks: u64,

    /// Re-submissions allowed after a stale-nonce rejection.
    pub nonce_resync_attempts: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:9944".to_string(),
            failover_urls: Vec::new(),
            rpc_timeout_secs: 10,
            block_interval_secs: 12,
            scan_window_blocks: 32,
            nonce_resync_attempts: 2,
        }
    }
}

/// Provider account configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// MSA id of the provider.
    pub provider_id: u64,

    /// Where outcome notifications are delivered.
    pub webhook_url: String,

    /// Optional bearer token sent with each notification.
    pub access_token: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_id: 1,
            webhook_url: "http://localhost:3001/webhook".to_string(),
            access_token: None,
        }
    }
}

/// How much of the epoch's capacity the relay may spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CapacityLimit {
    /// Percentage (1..=100) of the provider's total issued capacity.
    Percentage(u8),
    /// Absolute capacity units.
    Amount(u128),
}

impl CapacityLimit {
    /// Usage at or above which submission pauses.
    pub fn threshold(&self, total_issued: u128) -> u128 {
        match *self {
            CapacityLimit::Percentage(p) => total_issued.saturating_mul(p as u128) / 100,
            CapacityLimit::Amount(amount) => amount,
        }
    }
}

/// Capacity budget configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub limit: CapacityLimit,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            limit: CapacityLimit::Percentage(80),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Concurrent publish workers.
    pub publish_concurrency: usize,

    /// Concurrent confirmation workers.
    pub confirm_concurrency: usize,

    /// Maximum attempts for jobs failing with transient chain errors.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// How long a completed job id keeps deduplicating resubmissions, in
    /// seconds.
    pub completed_retention_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            publish_concurrency: 2,
            confirm_concurrency: 2,
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            completed_retention_secs: 86_400,
        }
    }
}

/// Webhook delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Total delivery attempts per notification.
    pub max_retries: u32,

    pub retry_base_delay_ms: u64,

    pub retry_max_delay_ms: u64,

    /// Per-attempt HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 10_000,
            timeout_secs: 10,
        }
    }
}

/// State store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot loaded at startup and written at shutdown.
    pub persistence_path: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Intake and admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Serve the HTTP surface.
    pub enabled: bool,

    /// Bind address for intake and admin routes.
    pub bind_address: String,

    /// API key for the admin routes (Bearer token).
    pub api_key: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:3000".to_string(),
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: RelayConfig = toml::from_str("").unwrap();
        assert_eq!(config.chain.block_interval_secs, 12);
        assert_eq!(config.capacity.limit, CapacityLimit::Percentage(80));
        assert_eq!(config.notifier.max_retries, 5);
    }

    #[test]
    fn test_capacity_limit_parsing() {
        let config: RelayConfig = toml::from_str(
            r#"
            [capacity.limit]
            type = "amount"
            value = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.capacity.limit, CapacityLimit::Amount(5000));
    }

    #[test]
    fn test_capacity_threshold() {
        assert_eq!(CapacityLimit::Percentage(80).threshold(1_000), 800);
        assert_eq!(CapacityLimit::Percentage(100).threshold(7), 7);
        assert_eq!(CapacityLimit::Percentage(50).threshold(u128::MAX), u128::MAX / 100);
        assert_eq!(CapacityLimit::Amount(42).threshold(1_000), 42);
    }
}
