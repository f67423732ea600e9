//! Producer endpoints: enqueue, status query and dead-letter listing.

use crate::{
    responses::{ApiResult, AppError},
    state::AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use relayq_core::RelayError;
use relayq_jobs::JobPayload;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Create the jobs router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(enqueue_job))
        .route("/jobs/:job_id", get(get_job))
        .route("/dlq", get(list_dlq))
}

/// Enqueue request body.
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    #[serde(rename = "type", default)]
    pub job_type: String,
    #[serde(default)]
    pub payload: Option<JobPayload>,
    /// Unix seconds; a value in the future defers the job.
    #[serde(default)]
    pub scheduled_at: Option<i64>,
}

/// Enqueue response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub id: String,
    pub status: String,
}

/// POST /jobs
pub async fn enqueue_job(
    State(state): State<AppState>,
    body: Result<Json<EnqueueRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<EnqueueResponse>)> {
    let Json(request) = body.map_err(|e| AppError(RelayError::validation(e.body_text())))?;

    if request.job_type.trim().is_empty() {
        return Err(RelayError::validation("type is required").into());
    }
    let payload = request
        .payload
        .ok_or_else(|| AppError(RelayError::validation("payload is required")))?;

    let id = state
        .queue
        .enqueue(&request.job_type, payload, request.scheduled_at)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            id: id.to_string(),
            status: "accepted".to_string(),
        }),
    ))
}

/// GET /jobs/:job_id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<HashMap<String, String>>> {
    state
        .queue
        .status(&job_id)
        .await?
        .map(Json)
        .ok_or_else(|| RelayError::not_found("Job", job_id).into())
}

/// GET /dlq
pub async fn list_dlq(State(state): State<AppState>) -> ApiResult<Json<Vec<HashMap<String, String>>>> {
    Ok(Json(state.queue.dead_letters().await?))
}
