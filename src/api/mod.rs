//! Intake and admin HTTP surface.
//!
//! # Data Flow
//! ```text
//! POST /v1/requests → handlers::submit_request → IntakeService → publish queue
//!
//! GET /health → liveness, no auth
//!
//! /admin/* → auth.rs (bearer key) → handlers.rs → queue counts, failed-job
//!                                                 retry, admission snapshot
//! ```

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::schema::ApiConfig;
use crate::lifecycle::Shutdown;
use crate::pipeline::{AdmissionController, ConfirmationJob, IntakeService, PublishJob};
use crate::queue::JobQueue;

use self::auth::admin_auth_middleware;
use self::handlers::{
    get_capacity, get_health, get_queues, get_status, retry_failed_job, submit_request,
};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub intake: IntakeService,
    pub publish_queue: Arc<JobQueue<PublishJob>>,
    pub confirm_queue: Arc<JobQueue<ConfirmationJob>>,
    pub admission: Arc<AdmissionController>,
    pub api_key: Arc<str>,
}

pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let admin = Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/queues", get(get_queues))
        .route("/admin/queues/{queue}/jobs/{id}/retry", post(retry_failed_job))
        .route("/admin/capacity", get(get_capacity))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    Router::new()
        .route("/health", get(get_health))
        .route("/v1/requests", post(submit_request))
        .merge(admin)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` fires.
pub async fn serve(
    config: &ApiConfig,
    state: AppState,
    shutdown: &Shutdown,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(&config.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "HTTP API listening");

    let router = build_router(state, Duration::from_secs(config.request_timeout_secs));
    let mut signal = shutdown.subscribe();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { signal.recv().await })
        .await?;

    tracing::info!("HTTP API stopped");
    Ok(())
}
