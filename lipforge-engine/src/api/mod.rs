//! HTTP API handlers for lipforge-engine
//!
//! Local REST surface for the desktop client: multipart uploads in,
//! line-delimited JSON progress or a video file out.

pub mod analysis;
pub mod export;
pub mod health;
pub mod jobs;
pub mod upload;

pub use analysis::analysis_routes;
pub use export::export_routes;
pub use health::health_routes;
pub use jobs::job_routes;
