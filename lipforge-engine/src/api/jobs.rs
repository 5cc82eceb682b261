//! Active job listing and cancellation
//!
//! GET /jobs, POST /jobs/{id}/cancel

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    services::ActiveJob,
    AppState,
};

/// GET /jobs response
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<ActiveJob>,
}

/// POST /jobs/{id}/cancel response
#[derive(Debug, Serialize)]
pub struct CancelJobResponse {
    pub job_id: Uuid,
    pub cancelled: bool,
}

pub async fn list_jobs(State(state): State<AppState>) -> Json<JobListResponse> {
    Json(JobListResponse {
        jobs: state.jobs.list(),
    })
}

/// Request cancellation; the job reports its own terminal state
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<CancelJobResponse>> {
    if !state.jobs.cancel(job_id) {
        return Err(ApiError::NotFound(format!("Job {} is not active", job_id)));
    }

    tracing::info!(job_id = %job_id, "Cancellation requested");
    Ok(Json(CancelJobResponse {
        job_id,
        cancelled: true,
    }))
}

pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/:job_id/cancel", post(cancel_job))
}
