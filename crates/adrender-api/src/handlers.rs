//! HTTP handlers for job submission and polling.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use adrender_models::{JobId, JobKind, Priority};
use adrender_queue::{JobLogs, JobView, SubmitReceipt};

use crate::error::ApiResult;
use crate::state::AppState;

/// Submission payload: `{ kind, input, priority? }`.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(flatten)]
    pub kind: JobKind,
    #[serde(default)]
    pub priority: Priority,
}

/// Submit a render job.
///
/// Validation and overflow errors are returned synchronously; no job
/// record is created for them.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<Json<SubmitReceipt>> {
    let kind = request.kind.as_str();
    let receipt = state.scheduler.submit(request.kind, request.priority)?;
    info!(
        job_id = %receipt.job_id,
        kind,
        "Accepted job at queue position {}", receipt.queue_position
    );
    Ok(Json(receipt))
}

/// Poll a job's status, progress, log tail, and result.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobView>> {
    let view = state.scheduler.view(&JobId::from_string(job_id))?;
    Ok(Json(view))
}

/// Full ordered log lines plus the last-known command line.
pub async fn get_job_logs(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobLogs>> {
    let logs = state.scheduler.logs(&JobId::from_string(job_id))?;
    Ok(Json(logs))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub status: &'static str,
    pub pending_jobs: usize,
    pub free_slots: usize,
}

/// Readiness probe with queue depth.
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    Json(ReadyResponse {
        status: "ok",
        pending_jobs: state.scheduler.pending_len(),
        free_slots: state.scheduler.free_slots(),
    })
}
