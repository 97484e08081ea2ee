//! Account relay service.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │                      ACCOUNT RELAY                       │
//!                 │                                                          │
//!  POST /v1/      │  ┌─────────┐    ┌──────────┐    ┌───────────────────┐    │
//!  requests  ─────┼─▶│  api    │───▶│  intake  │───▶│  publish queue    │    │
//!                 │  └─────────┘    └──────────┘    └─────────┬─────────┘    │
//!                 │                                           │ (paused by   │
//!                 │                                           ▼  admission)  │
//!                 │  ┌───────────┐   ┌─────────────┐    ┌───────────┐        │
//!                 │  │ admission │◀──│  publisher  │───▶│   nonce   │        │
//!                 │  └─────▲─────┘   └──────┬──────┘    └───────────┘        │
//!                 │        │                │ submit                         │──▶ chain
//!                 │        │                ▼                                │
//!                 │        │         ┌──────────────┐                        │
//!                 │        └─────────│ confirmation │◀── finalized blocks ───┼─── chain
//!                 │      capacity    └──────┬───────┘                        │
//!                 │      usage              ▼                                │
//!                 │                   ┌──────────┐                           │
//!                 │                   │ notifier │───────────────────────────┼──▶ provider
//!                 │                   └──────────┘                           │    webhook
//!                 └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The config path is the first argument, else `RELAY_CONFIG`, else
//! `relay.toml`; a missing file at the default path runs on defaults.

use std::path::PathBuf;
use std::sync::Arc;

use account_relay::api;
use account_relay::chain::{ProviderSigner, RpcChainClient};
use account_relay::config::{load_config, RelayConfig};
use account_relay::lifecycle::{wait_for_signal, Relay};
use account_relay::observability::{logging, metrics};
use account_relay::pipeline::WebhookNotifier;
use account_relay::store::StateStore;

const DEFAULT_CONFIG_PATH: &str = "relay.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let explicit = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("RELAY_CONFIG").ok());
    let path = PathBuf::from(explicit.as_deref().unwrap_or(DEFAULT_CONFIG_PATH));

    let config = if explicit.is_none() && !path.exists() {
        RelayConfig::default()
    } else {
        load_config(&path)?
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %path.display(),
        provider_id = config.provider.provider_id,
        rpc_url = %config.chain.rpc_url,
        "account-relay starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = match &config.store.persistence_path {
        Some(path) => StateStore::load_from_file(path)?,
        None => StateStore::new(None),
    };
    let chain = Arc::new(RpcChainClient::new(&config.chain)?);
    let signer = ProviderSigner::from_env()?;
    let notifier = Arc::new(WebhookNotifier::new(&config.provider, &config.notifier)?);

    let relay = Relay::start(&config, chain, signer, notifier, store).await;
    let shutdown = relay.shutdown_handle();

    let server = if config.api.enabled {
        let state = relay.app_state(&config.api.api_key);
        let api_config = config.api.clone();
        let shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = api::serve(&api_config, state, &shutdown).await {
                tracing::error!(error = %e, "HTTP API failed");
            }
        }))
    } else {
        None
    };

    wait_for_signal().await;
    tracing::info!("Shutting down");

    relay.stop().await?;
    if let Some(server) = server {
        server.await?;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
