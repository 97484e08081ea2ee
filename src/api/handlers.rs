use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::api::AppState;
use crate::pipeline::{AccountChangeRequest, AdmissionSnapshot, AdmissionState, IntakeError};
use crate::queue::{FailedJob, QueueCounts};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Accepted {
    pub reference_id: String,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Retried {
    pub queue: String,
    pub job_id: String,
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub admission: AdmissionState,
}

#[derive(Serialize)]
pub struct QueueStatus {
    pub name: &'static str,
    pub counts: QueueCounts,
    pub failed: Vec<FailedJob>,
}

pub async fn submit_request(
    State(state): State<AppState>,
    Json(request): Json<AccountChangeRequest>,
) -> impl IntoResponse {
    match state.intake.enqueue_publish(request) {
        Ok(reference_id) => (StatusCode::ACCEPTED, Json(Accepted { reference_id })).into_response(),
        Err(e) => {
            let status = match e {
                IntakeError::Encoding(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            (status, Json(ErrorBody { error: e.to_string() })).into_response()
        }
    }
}

pub async fn get_health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        admission: state.admission.state(),
    })
}

pub async fn get_queues(State(state): State<AppState>) -> Json<Vec<QueueStatus>> {
    let publish = &state.publish_queue;
    let confirm = &state.confirm_queue;
    Json(vec![
        QueueStatus {
            name: publish.name(),
            counts: publish.counts(),
            failed: publish.failed(),
        },
        QueueStatus {
            name: confirm.name(),
            counts: confirm.counts(),
            failed: confirm.failed(),
        },
    ])
}

pub async fn get_capacity(State(state): State<AppState>) -> Json<AdmissionSnapshot> {
    Json(state.admission.snapshot())
}

/// Move one failed job back to waiting with a fresh attempt budget.
pub async fn retry_failed_job(
    State(state): State<AppState>,
    Path((queue, id)): Path<(String, String)>,
) -> impl IntoResponse {
    let retried = match queue.as_str() {
        "publish" => state.publish_queue.retry(&id),
        "confirm" => state.confirm_queue.retry(&id),
        _ => {
            let error = format!("Unknown queue '{}'", queue);
            return (StatusCode::NOT_FOUND, Json(ErrorBody { error })).into_response();
        }
    };

    if retried {
        tracing::info!(queue = %queue, job_id = %id, "Failed job retried by operator");
        (StatusCode::OK, Json(Retried { queue, job_id: id })).into_response()
    } else {
        let error = format!("No failed job '{}' in queue '{}'", id, queue);
        (StatusCode::NOT_FOUND, Json(ErrorBody { error })).into_response()
    }
}
