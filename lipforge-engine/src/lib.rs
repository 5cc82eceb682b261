//! lipforge-engine library interface
//!
//! Exposes the pipeline services and the HTTP router for the binary and
//! for integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use crate::config::{ConfigOverrides, EngineConfig};
pub use crate::error::{ApiError, ApiResult, JobError};

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, Router};
use chrono::{DateTime, Utc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::services::{JobController, JobRegistry};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<EngineConfig>,
    pub controller: Arc<JobController>,
    /// Jobs currently running, for listing and cancellation
    pub jobs: JobRegistry,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: EngineConfig, controller: JobController) -> Self {
        Self {
            config: Arc::new(config),
            controller: Arc::new(controller),
            jobs: JobRegistry::new(),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .merge(api::health_routes())
        .merge(api::analysis_routes())
        .merge(api::export_routes())
        .merge(api::job_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        // The only client is the local desktop shell, served from its own origin
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
