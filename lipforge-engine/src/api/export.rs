//! POST /render: video export
//!
//! Multipart fields:
//! - `audio` (file, required)
//! - `cues` (JSON array of `{start, value}`, required)
//! - `config` (JSON `{videoRes, videoBgColor, videoQuality}`, optional)
//! - `frame_A` … `frame_H`, `frame_X` (image files; `frame_X` is the
//!   fallback for any shape without its own frame)
//!
//! The job runs inside the request future. A client that disconnects drops
//! the future, which stops the compositor and releases the workspace.

use axum::{
    body::Body,
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::Response,
    routing::post,
    Router,
};
use lipforge_common::{Cue, MouthShape};
use tracing::info;

use super::upload;
use crate::{
    error::{ApiError, ApiResult},
    models::{ExportConfig, JobKind, RenderOptions},
    services::{ExportRequest, ShapeFrameSet},
    AppState,
};

/// POST /render
pub async fn render_video(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Response> {
    let ctx = state.controller.begin(JobKind::Export).await?;
    let registration = state.jobs.register(ctx.job.id, JobKind::Export);

    let form = upload::receive(multipart, ctx.workspace.path()).await?;
    let Some(audio) = form.file("audio").map(|p| p.to_path_buf()) else {
        return Err(ApiError::BadRequest("Audio asset missing".to_string()));
    };
    let cues: Vec<Cue> = form
        .json("cues")?
        .ok_or_else(|| ApiError::BadRequest("Cue data missing".to_string()))?;
    let config: ExportConfig = form.json("config")?.unwrap_or_default();
    let options = RenderOptions::try_from(config)?;

    let mut frames = ShapeFrameSet::new();
    for shape in MouthShape::ALL {
        if let Some(path) = form.file(&frame_field(shape)) {
            frames.insert(shape, path);
        }
    }

    info!(
        job_id = %ctx.job.id,
        cues = cues.len(),
        frames = frames.len(),
        resolution = options.resolution,
        "Export requested"
    );

    let request = ExportRequest {
        audio,
        cues,
        frames,
        options,
    };
    let artifact = state
        .controller
        .run_export(ctx, request, registration.token())
        .await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.file_name),
        )
        .body(Body::from(artifact.bytes))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Multipart field carrying the frame for `shape`
pub fn frame_field(shape: MouthShape) -> String {
    format!("frame_{}", shape)
}

pub fn export_routes() -> Router<AppState> {
    Router::new().route("/render", post(render_video))
}
