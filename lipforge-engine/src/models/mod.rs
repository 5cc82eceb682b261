//! Data models for the LipForge engine
//!
//! - Job state machine
//! - Caller-supplied job options

pub mod job;
pub mod options;

pub use job::{Job, JobKind, JobState, StateTransition};
pub use options::{AnalysisOptions, BackgroundColor, ExportConfig, RenderOptions, VideoQuality};
