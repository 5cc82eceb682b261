//! Pipeline services
//!
//! Runners for the external tools plus the pieces that sequence them:
//! workspace allocation, progress reporting, timeline compilation and the
//! job controller.

pub mod controller;
pub mod normalizer;
pub mod process;
pub mod progress;
pub mod recognizer;
pub mod registry;
pub mod renderer;
pub mod timeline;
pub mod workspace;

pub use controller::{
    AnalysisRequest, AttemptRanges, ExportArtifact, ExportRequest, JobContext, JobController,
};
pub use normalizer::{AudioNormalizer, NormalizeError};
pub use process::{run_supervised, ProcessError, ProcessOutput, ToolInvocation};
pub use progress::{PercentScanner, ProgressRange, ProgressReporter};
pub use recognizer::{RecognitionError, RecognitionRequest, RecognitionRunner};
pub use registry::{ActiveJob, JobRegistration, JobRegistry};
pub use renderer::{EncodingPolicy, RenderError, RenderJob, RenderRunner};
pub use timeline::{Segment, ShapeFrameSet, Timeline, TimelineCompiler, TimelineError};
pub use workspace::{WorkspaceEntry, WorkspaceRoot};
