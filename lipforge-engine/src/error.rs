//! Error types for lipforge-engine
//!
//! [`JobError`] is the taxonomy a job can terminate with; every variant
//! carries a reason specific enough to name the remedy. [`ApiError`] is the
//! HTTP-facing wrapper.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Terminal failure of a job
#[derive(Debug, Error)]
pub enum JobError {
    /// A required input was not supplied
    #[error("Missing input: {0}")]
    InputMissing(String),

    /// An input was supplied but cannot be used
    #[error("Invalid input: {0}")]
    InputInvalid(String),

    /// Audio conversion failed; recovered by recognizing the raw upload
    #[error("Audio normalization failed: {0}")]
    NormalizationFailed(String),

    /// External executable could not be found
    #[error("{tool} not found at {path}. Check the installation or the configured path.")]
    ToolNotFound { tool: &'static str, path: String },

    /// Recognizer model directory is absent
    #[error("MISSING ENGINE ASSETS: the '{asset_dir}' folder is missing next to the recognition binary ({binary}). Reinstall or extract the full engine bundle; the recognizer cannot run without its acoustic models.")]
    AssetsMissing { asset_dir: String, binary: String },

    /// Watchdog fired: the recognizer stopped producing output
    #[error("Recognition stalled: no output for {idle_secs}s, the process was stopped. Retry, or try a shorter or re-encoded audio file.")]
    RecognitionHung { idle_secs: u64 },

    /// Recognizer exited unsuccessfully
    #[error("Recognition failed: {0}")]
    RecognitionFailed(String),

    /// Compositor exited unsuccessfully or produced no file
    #[error("Render failed: {0}")]
    RenderFailed(String),

    /// The frame timeline could not be produced
    #[error("Timeline script could not be written: {0}")]
    ScriptCompile(String),

    /// Caller disconnected or cancelled
    #[error("Job cancelled")]
    Cancelled,

    /// Filesystem error inside the job workspace
    #[error("Workspace I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl JobError {
    /// Stable machine-readable code
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::InputMissing(_) => "INPUT_MISSING",
            JobError::InputInvalid(_) => "INPUT_INVALID",
            JobError::NormalizationFailed(_) => "NORMALIZATION_FAILED",
            JobError::ToolNotFound { .. } => "TOOL_NOT_FOUND",
            JobError::AssetsMissing { .. } => "ASSETS_MISSING",
            JobError::RecognitionHung { .. } => "RECOGNITION_HUNG",
            JobError::RecognitionFailed(_) => "RECOGNITION_FAILED",
            JobError::RenderFailed(_) => "RENDER_FAILED",
            JobError::ScriptCompile(_) => "SCRIPT_COMPILE",
            JobError::Cancelled => "CANCELLED",
            JobError::Io(_) => "IO_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            JobError::InputMissing(_) | JobError::InputInvalid(_) => StatusCode::BAD_REQUEST,
            // The connection is normally gone by the time this is produced
            JobError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<lipforge_common::Error> for JobError {
    fn from(err: lipforge_common::Error) -> Self {
        match err {
            lipforge_common::Error::Io(e) => JobError::Io(e),
            lipforge_common::Error::InvalidInput(msg) => JobError::InputInvalid(msg),
            lipforge_common::Error::Json(e) => JobError::InputInvalid(e.to_string()),
            other => JobError::InputInvalid(other.to_string()),
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Job terminated unsuccessfully
    #[error(transparent)]
    Job(#[from] JobError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
            ApiError::Job(ref err) => (err.status(), err.kind(), err.to_string()),
            ApiError::Io(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_are_client_errors() {
        let response = ApiError::from(JobError::InputMissing("audio".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn render_failure_is_server_error() {
        let response =
            ApiError::from(JobError::RenderFailed("exit code 1".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn assets_message_names_remedy() {
        let err = JobError::AssetsMissing {
            asset_dir: "res".into(),
            binary: "/opt/lipforge/bin/rhubarb".into(),
        };
        let message = err.to_string();
        assert!(message.contains("'res'"));
        assert!(message.contains("Reinstall"));
    }
}
