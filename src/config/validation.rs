//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate endpoint URLs
//! - Validate value ranges (intervals > 0, percentage within 1..=100)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::{CapacityLimit, RelayConfig};

/// A single semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_url(&mut errors, "chain.rpc_url", &config.chain.rpc_url);
    for (i, url) in config.chain.failover_urls.iter().enumerate() {
        check_url(&mut errors, &format!("chain.failover_urls[{}]", i), url);
    }
    check_url(&mut errors, "provider.webhook_url", &config.provider.webhook_url);

    let non_zero: [(&str, u64); 10] = [
        ("chain.rpc_timeout_secs", config.chain.rpc_timeout_secs),
        ("chain.block_interval_secs", config.chain.block_interval_secs),
        ("chain.scan_window_blocks", config.chain.scan_window_blocks),
        ("queues.publish_concurrency", config.queues.publish_concurrency as u64),
        ("queues.confirm_concurrency", config.queues.confirm_concurrency as u64),
        ("queues.max_attempts", config.queues.max_attempts as u64),
        ("queues.completed_retention_secs", config.queues.completed_retention_secs),
        ("notifier.max_retries", config.notifier.max_retries as u64),
        ("notifier.timeout_secs", config.notifier.timeout_secs),
        ("api.request_timeout_secs", config.api.request_timeout_secs),
    ];
    for (field, value) in non_zero {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    match config.capacity.limit {
        CapacityLimit::Percentage(p) if p == 0 || p > 100 => errors.push(ValidationError::new(
            "capacity.limit",
            format!("percentage must be within 1..=100, got {}", p),
        )),
        CapacityLimit::Amount(0) => errors.push(ValidationError::new(
            "capacity.limit",
            "amount must be greater than zero",
        )),
        _ => {}
    }

    if config.queues.base_delay_ms > config.queues.max_delay_ms {
        errors.push(ValidationError::new(
            "queues.base_delay_ms",
            "must not exceed queues.max_delay_ms",
        ));
    }
    if config.notifier.retry_base_delay_ms > config.notifier.retry_max_delay_ms {
        errors.push(ValidationError::new(
            "notifier.retry_base_delay_ms",
            "must not exceed notifier.retry_max_delay_ms",
        ));
    }

    if config.api.enabled && config.api.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new("api.bind_address", "must be a socket address"));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if let Err(e) = url::Url::parse(value) {
        errors.push(ValidationError::new(field, format!("invalid URL '{}': {}", value, e)));
    }
}
