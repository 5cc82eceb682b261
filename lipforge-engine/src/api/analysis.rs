//! POST /process: audio analysis with a streamed result
//!
//! The response body is line-delimited JSON: zero or more `progress` lines
//! followed by exactly one `success` or `failure` line. The job runs on its
//! own task; the body stream holds a drop guard on the job's cancellation
//! token, so a client that disconnects mid-stream cancels the job and its
//! child processes.

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::Response,
    routing::post,
    Router,
};
use lipforge_common::JobEvent;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::upload;
use crate::{
    error::{ApiError, ApiResult},
    models::{AnalysisOptions, JobKind},
    services::AnalysisRequest,
    AppState,
};

/// Response header carrying the job id (usable with `/jobs/{id}/cancel`)
pub const JOB_ID_HEADER: &str = "x-job-id";

const EVENT_BUFFER: usize = 64;

/// POST /process
///
/// Multipart fields: `audio` (file, required), `dialog` (file, optional),
/// `config` (JSON `{"recognizer": "..."}`, optional).
pub async fn process_audio(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Response> {
    let ctx = state.controller.begin(JobKind::Analysis).await?;
    let registration = state.jobs.register(ctx.job.id, JobKind::Analysis);
    let job_id = ctx.job.id;

    let form = upload::receive(multipart, ctx.workspace.path()).await?;
    let Some(audio) = form.file("audio").map(|p| p.to_path_buf()) else {
        return Err(ApiError::BadRequest("No audio provided.".to_string()));
    };
    let options: AnalysisOptions = form.json("config")?.unwrap_or_default();

    let request = AnalysisRequest {
        audio,
        dialog: form.file("dialog").map(|p| p.to_path_buf()),
        variant: options.recognizer,
    };
    info!(job_id = %job_id, variant = ?request.variant, "Analysis requested");

    let (tx, mut rx) = mpsc::channel::<JobEvent>(EVENT_BUFFER);
    let cancel = registration.token();
    let guard = cancel.clone().drop_guard();
    let controller = state.controller.clone();
    tokio::spawn(async move {
        let _registration = registration;
        // Outcome already delivered as the terminal event
        let _ = controller.run_analysis(ctx, request, tx, cancel).await;
    });

    let stream = async_stream::stream! {
        let guard = guard;
        let mut terminated = false;
        while let Some(event) = rx.recv().await {
            terminated = event.is_terminal();
            yield Ok::<_, Infallible>(event.to_line());
            if terminated {
                break;
            }
        }
        if !terminated {
            warn!(job_id = %job_id, "Job task ended without a terminal event");
            yield Ok(JobEvent::failure("The job ended unexpectedly").to_line());
        }
        guard.disarm();
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(JOB_ID_HEADER, job_id.to_string())
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

pub fn analysis_routes() -> Router<AppState> {
    Router::new().route("/process", post(process_audio))
}
