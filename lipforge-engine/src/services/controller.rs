//! Job controller
//!
//! Sequences the runners for one job and owns its outcome:
//!
//! - analysis: NORMALIZING → RECOGNIZING → (RECOGNIZING_FALLBACK) → terminal
//! - export:   COMPILING → RENDERING → terminal
//!
//! The fallback exists because normalization can mangle unusual input that
//! the recognizer would accept raw. When the normalized attempt fails, the
//! raw upload is recognized once more in the second half of the progress
//! range. When normalization itself fails there is nothing to fall back
//! from: the raw upload is recognized once over the whole range.
//!
//! Every terminal state releases the job's workspace.

use std::path::{Path, PathBuf};

use chrono::Utc;
use lipforge_common::cues::validate_cues;
use lipforge_common::{Cue, JobEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::normalizer::{AudioNormalizer, NormalizeError};
use super::progress::{ProgressRange, ProgressReporter};
use super::recognizer::{RecognitionError, RecognitionRequest, RecognitionRunner};
use super::renderer::{RenderError, RenderJob, RenderRunner};
use super::timeline::{ShapeFrameSet, TimelineCompiler, TimelineError};
use super::workspace::{WorkspaceEntry, WorkspaceRoot};
use crate::error::JobError;
use crate::models::{Job, JobKind, JobState, RenderOptions};

/// Progress sub-ranges for the recognition attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttemptRanges {
    /// First attempt, on normalized audio
    pub primary: ProgressRange,
    /// Second attempt, on the raw upload
    pub fallback: ProgressRange,
    /// Only attempt, when normalization failed
    pub sole: ProgressRange,
}

impl Default for AttemptRanges {
    fn default() -> Self {
        let half = |start, end| ProgressRange::new(start, end).unwrap_or(ProgressRange::FULL);
        Self {
            primary: half(0.0, 0.5),
            fallback: half(0.5, 1.0),
            sole: ProgressRange::FULL,
        }
    }
}

/// A job and the workspace it owns
#[derive(Debug)]
pub struct JobContext {
    pub job: Job,
    pub workspace: WorkspaceEntry,
}

/// Inputs of an analysis job
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub audio: PathBuf,
    pub dialog: Option<PathBuf>,
    /// `None` selects the configured default variant
    pub variant: Option<String>,
}

/// Inputs of an export job
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub audio: PathBuf,
    pub cues: Vec<Cue>,
    pub frames: ShapeFrameSet,
    pub options: RenderOptions,
}

/// Rendered video, read into memory before the workspace is released
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

#[derive(Debug)]
pub struct JobController {
    workspace: WorkspaceRoot,
    normalizer: AudioNormalizer,
    recognizer: RecognitionRunner,
    compiler: TimelineCompiler,
    renderer: RenderRunner,
    ranges: AttemptRanges,
    default_variant: String,
}

impl JobController {
    pub fn new(
        workspace: WorkspaceRoot,
        normalizer: AudioNormalizer,
        recognizer: RecognitionRunner,
        compiler: TimelineCompiler,
        renderer: RenderRunner,
        default_variant: impl Into<String>,
    ) -> Self {
        Self {
            workspace,
            normalizer,
            recognizer,
            compiler,
            renderer,
            ranges: AttemptRanges::default(),
            default_variant: default_variant.into(),
        }
    }

    pub fn with_ranges(mut self, ranges: AttemptRanges) -> Self {
        self.ranges = ranges;
        self
    }

    pub fn workspace_root(&self) -> &WorkspaceRoot {
        &self.workspace
    }

    pub fn recognizer(&self) -> &RecognitionRunner {
        &self.recognizer
    }

    /// Create a job and allocate its workspace
    pub async fn begin(&self, kind: JobKind) -> Result<JobContext, JobError> {
        let job = Job::new(kind);
        let workspace = self.workspace.allocate(job.id, kind).await?;
        info!(job_id = %job.id, kind = kind.as_str(), "Job accepted");
        Ok(JobContext { job, workspace })
    }

    // ------------------------------------------------------------------
    // Analysis
    // ------------------------------------------------------------------

    /// Run an analysis job, streaming events to `events`
    ///
    /// Exactly one terminal event is sent (unless the receiver is gone) and
    /// the workspace is released before returning.
    pub async fn run_analysis(
        &self,
        mut ctx: JobContext,
        request: AnalysisRequest,
        events: mpsc::Sender<JobEvent>,
        cancel: CancellationToken,
    ) -> Result<String, JobError> {
        let mut reporter = ProgressReporter::new(ctx.job.id, events);
        let normalized = ctx.workspace.file("normalized.wav");
        let outcome = self
            .analyze(&mut ctx.job, &request, &normalized, &mut reporter, &cancel)
            .await;
        ctx.job.progress = reporter.last().unwrap_or(0.0);

        let terminal = match &outcome {
            Ok(result) => {
                ctx.job.transition_to(JobState::Succeeded);
                JobEvent::success(result.clone())
            }
            Err(JobError::Cancelled) => {
                ctx.job.transition_to(JobState::Cancelled);
                JobEvent::failure(JobError::Cancelled.to_string())
            }
            Err(e) => {
                ctx.job.transition_to(JobState::Failed);
                JobEvent::failure(e.to_string())
            }
        };

        // Workspace is gone before the caller hears the outcome
        self.conclude(&mut ctx, &outcome);
        if !reporter.finish(terminal).await {
            warn!(job_id = %ctx.job.id, "Caller gone before terminal event");
        }
        outcome
    }

    async fn analyze(
        &self,
        job: &mut Job,
        request: &AnalysisRequest,
        normalized_path: &Path,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<String, JobError> {
        if !request.audio.is_file() {
            return Err(JobError::InputMissing("no audio file was provided".to_string()));
        }
        if let Some(dialog) = &request.dialog {
            if !dialog.is_file() {
                return Err(JobError::InputMissing(format!(
                    "dialog file {} is unreadable",
                    dialog.display()
                )));
            }
        }

        let variant = request
            .variant
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(&self.default_variant);

        job.transition_to(JobState::Normalizing);
        let normalized = match self
            .normalizer
            .normalize(&request.audio, normalized_path, cancel)
            .await
        {
            Ok(path) => Some(path),
            Err(NormalizeError::Cancelled) => return Err(JobError::Cancelled),
            Err(NormalizeError::Failed(reason)) => {
                let err = JobError::NormalizationFailed(reason);
                warn!(job_id = %job.id, error = %err, "Recognizing raw upload instead");
                None
            }
        };

        job.transition_to(JobState::Recognizing);
        let raw = RecognitionRequest {
            audio: &request.audio,
            dialog: request.dialog.as_deref(),
            variant,
        };

        let Some(normalized) = normalized else {
            return self
                .recognizer
                .recognize(&raw, self.ranges.sole, reporter, cancel)
                .await
                .map_err(|e| self.classify_recognition(e));
        };

        reporter.report(self.ranges.primary.start());
        let primary = RecognitionRequest {
            audio: &normalized,
            ..raw
        };
        match self
            .recognizer
            .recognize(&primary, self.ranges.primary, reporter, cancel)
            .await
        {
            Ok(result) => return Ok(result),
            Err(RecognitionError::Cancelled) => return Err(JobError::Cancelled),
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Normalized attempt failed, retrying raw audio");
            }
        }

        job.transition_to(JobState::RecognizingFallback);
        reporter.report(self.ranges.fallback.start());
        self.recognizer
            .recognize(&raw, self.ranges.fallback, reporter, cancel)
            .await
            .map_err(|e| self.classify_recognition(e))
    }

    /// Turn a final recognition failure into the most actionable job error
    fn classify_recognition(&self, err: RecognitionError) -> JobError {
        let assets_missing = || JobError::AssetsMissing {
            asset_dir: self.recognizer.asset_dir().to_string(),
            binary: self.recognizer.binary().display().to_string(),
        };

        match err {
            RecognitionError::Cancelled => JobError::Cancelled,
            RecognitionError::Hung { idle } => JobError::RecognitionHung {
                idle_secs: idle.as_secs(),
            },
            _ if !self.recognizer.assets_present() => assets_missing(),
            RecognitionError::NotFound { binary } => JobError::ToolNotFound {
                tool: "Recognition binary",
                path: binary.display().to_string(),
            },
            RecognitionError::Spawn(reason) | RecognitionError::Failed { reason } => {
                JobError::RecognitionFailed(reason)
            }
        }
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    /// Run an export job; the workspace is released before returning
    pub async fn run_export(
        &self,
        mut ctx: JobContext,
        request: ExportRequest,
        cancel: CancellationToken,
    ) -> Result<ExportArtifact, JobError> {
        let outcome = self.export(&mut ctx, &request, &cancel).await;

        match &outcome {
            Ok(_) => {
                ctx.job.progress = 1.0;
                ctx.job.transition_to(JobState::Succeeded)
            }
            Err(JobError::Cancelled) => ctx.job.transition_to(JobState::Cancelled),
            Err(_) => ctx.job.transition_to(JobState::Failed),
        };

        self.conclude(&mut ctx, &outcome);
        outcome
    }

    async fn export(
        &self,
        ctx: &mut JobContext,
        request: &ExportRequest,
        cancel: &CancellationToken,
    ) -> Result<ExportArtifact, JobError> {
        if !request.audio.is_file() {
            return Err(JobError::InputMissing("audio asset missing".to_string()));
        }
        validate_cues(&request.cues)?;

        ctx.job.transition_to(JobState::Compiling);
        let timeline = self
            .compiler
            .compile(&request.cues, &request.frames)
            .map_err(|e| match e {
                TimelineError::Empty => JobError::InputInvalid(
                    "the cue list is empty; analyze the audio before exporting".to_string(),
                ),
                TimelineError::MissingFrame(_) => JobError::InputMissing(e.to_string()),
            })?;

        let script_path = ctx.workspace.file("timeline.ffconcat");
        timeline
            .write_to(&script_path)
            .await
            .map_err(|e| JobError::ScriptCompile(e.to_string()))?;

        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        ctx.job.transition_to(JobState::Rendering);
        let output_path = ctx.workspace.file("output.mp4");
        let job = RenderJob {
            script: &script_path,
            audio: &request.audio,
            output: &output_path,
            timeline_end: timeline.end_time(),
            options: &request.options,
        };

        let video = self.renderer.render(&job, cancel).await.map_err(|e| match e {
            RenderError::Cancelled => JobError::Cancelled,
            RenderError::NotFound { binary } => JobError::ToolNotFound {
                tool: "Compositor",
                path: binary.display().to_string(),
            },
            RenderError::Failed { reason } => JobError::RenderFailed(reason),
        })?;

        let bytes = tokio::fs::read(&video).await?;
        Ok(ExportArtifact {
            bytes,
            file_name: format!("LipForge2D_Output_{}.mp4", Utc::now().timestamp_millis()),
        })
    }

    fn conclude<T>(&self, ctx: &mut JobContext, outcome: &Result<T, JobError>) {
        ctx.workspace.release();
        match outcome {
            Ok(_) => info!(
                job_id = %ctx.job.id,
                kind = ctx.job.kind.as_str(),
                elapsed_secs = ctx.job.elapsed_seconds(),
                "Job succeeded"
            ),
            Err(JobError::Cancelled) => info!(job_id = %ctx.job.id, "Job cancelled"),
            Err(e) => error!(
                job_id = %ctx.job.id,
                kind = ctx.job.kind.as_str(),
                code = e.kind(),
                error = %e,
                "Job failed"
            ),
        }
    }
}
