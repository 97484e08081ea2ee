//! Outcome delivery to the provider's webhook.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use thiserror::Error;

use crate::config::schema::{NotifierConfig, ProviderConfig};
use crate::observability::metrics;
use crate::pipeline::types::OutcomeNotification;
use crate::resilience::Backoff;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid webhook configuration: {0}")]
    Config(String),

    #[error("Webhook delivery failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Where confirmed outcomes go.
#[async_trait]
pub trait OutcomeSink: Send + Sync {
    async fn deliver(&self, notification: &OutcomeNotification) -> Result<(), NotifyError>;
}

/// POSTs notifications as JSON with bounded, backed-off retries.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: url::Url,
    access_token: Option<String>,
    max_attempts: u32,
    backoff: Backoff,
}

impl WebhookNotifier {
    pub fn new(provider: &ProviderConfig, config: &NotifierConfig) -> Result<Self, NotifyError> {
        let url: url::Url = provider.webhook_url.parse().map_err(|e| {
            NotifyError::Config(format!("Invalid webhook URL '{}': {}", provider.webhook_url, e))
        })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifyError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url,
            access_token: provider.access_token.clone(),
            max_attempts: config.max_retries.max(1),
            backoff: Backoff::new(config.retry_base_delay_ms, config.retry_max_delay_ms),
        })
    }

    async fn attempt(&self, notification: &OutcomeNotification) -> Result<(), String> {
        let mut request = self
            .http
            .post(self.url.clone())
            .json(notification);
        if let Some(token) = &self.access_token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("HTTP {}", status))
        }
    }
}

#[async_trait]
impl OutcomeSink for WebhookNotifier {
    async fn deliver(&self, notification: &OutcomeNotification) -> Result<(), NotifyError> {
        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            match self.attempt(notification).await {
                Ok(()) => {
                    metrics::record_notification("delivered");
                    tracing::info!(
                        reference_id = %notification.reference_id,
                        transaction_type = %notification.transaction_type,
                        attempt,
                        "Notification delivered"
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        reference_id = %notification.reference_id,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Notification attempt failed"
                    );
                    last_error = e;
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.backoff.delay(attempt)).await;
            }
        }

        metrics::record_notification("dropped");
        tracing::error!(
            reference_id = %notification.reference_id,
            attempts = self.max_attempts,
            error = %last_error,
            "Giving up on notification"
        );
        Err(NotifyError::Exhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }
}
