//! Render runner
//!
//! One compositor (ffmpeg) invocation produces the final video:
//! - input 0: synthetic solid-color background, square, unbounded
//! - input 1: the compiled frame timeline (concat demuxer)
//! - input 2: the original audio
//!
//! The timeline is overlaid centered on the background, its last frame
//! repeated once it runs out, and the result ends with the audio. Codec, pixel format and audio encoding are fixed
//! policy; callers choose only resolution, background and quality tier.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::process::{run_supervised, ProcessError, ToolInvocation};
use crate::models::{RenderOptions, VideoQuality};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("compositor not found at {}", binary.display())]
    NotFound { binary: PathBuf },

    #[error("{reason}")]
    Failed { reason: String },

    #[error("cancelled")]
    Cancelled,
}

/// Fixed encoding policy
#[derive(Debug, Clone)]
pub struct EncodingPolicy {
    pub preset: String,
    pub crf_standard: u8,
    pub crf_high: u8,
    pub audio_bitrate: String,
}

impl Default for EncodingPolicy {
    fn default() -> Self {
        Self {
            preset: "ultrafast".to_string(),
            crf_standard: 23,
            crf_high: 18,
            audio_bitrate: "192k".to_string(),
        }
    }
}

impl EncodingPolicy {
    pub fn crf(&self, quality: VideoQuality) -> u8 {
        match quality {
            VideoQuality::Standard => self.crf_standard,
            VideoQuality::High => self.crf_high,
        }
    }
}

/// Inputs of one render
#[derive(Debug, Clone, Copy)]
pub struct RenderJob<'a> {
    pub script: &'a Path,
    pub audio: &'a Path,
    pub output: &'a Path,
    /// End of the frame timeline, in seconds
    pub timeline_end: f64,
    pub options: &'a RenderOptions,
}

/// Runs the compositor
#[derive(Debug, Clone)]
pub struct RenderRunner {
    binary: PathBuf,
    policy: EncodingPolicy,
    watchdog: Option<Duration>,
}

impl RenderRunner {
    pub fn new(binary: impl Into<PathBuf>, policy: EncodingPolicy, watchdog: Option<Duration>) -> Self {
        Self {
            binary: binary.into(),
            policy,
            watchdog,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn policy(&self) -> &EncodingPolicy {
        &self.policy
    }

    pub fn invocation(&self, job: &RenderJob<'_>) -> ToolInvocation {
        let options = job.options;
        // No duration: the audio input bounds the output through -shortest
        let background = format!(
            "color=c={}:s={res}x{res}",
            options.background,
            res = options.resolution,
        );

        ToolInvocation::new(&self.binary)
            .args(["-y", "-hide_banner", "-f", "lavfi", "-i"])
            .arg(background)
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(job.script)
            .arg("-i")
            .arg(job.audio)
            .args([
                "-filter_complex",
                "[0:v][1:v]overlay=(W-w)/2:(H-h)/2:eof_action=repeat[v]",
                "-map",
                "[v]",
                "-map",
                "2:a",
                "-c:v",
                "libx264",
                "-preset",
            ])
            .arg(&self.policy.preset)
            .arg("-crf")
            .arg(self.policy.crf(options.quality).to_string())
            .args(["-pix_fmt", "yuv420p", "-c:a", "aac", "-b:a"])
            .arg(&self.policy.audio_bitrate)
            .arg("-shortest")
            .arg(job.output)
    }

    /// Render `job`, resolving to the output path
    pub async fn render(
        &self,
        job: &RenderJob<'_>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, RenderError> {
        let invocation = self.invocation(job);
        info!(
            resolution = job.options.resolution,
            quality = ?job.options.quality,
            timeline_end = job.timeline_end,
            "Starting render"
        );

        let output = match run_supervised(&invocation, self.watchdog, cancel, |_| {}).await {
            Ok(output) => output,
            Err(ProcessError::NotFound { binary }) => return Err(RenderError::NotFound { binary }),
            Err(ProcessError::Cancelled) => return Err(RenderError::Cancelled),
            Err(e) => {
                return Err(RenderError::Failed {
                    reason: e.to_string(),
                })
            }
        };

        if !output.success() {
            let reason = output.failure_reason();
            warn!(exit_code = ?output.exit_code, reason = %reason, "Compositor failed");
            return Err(RenderError::Failed { reason });
        }

        let produced = tokio::fs::metadata(job.output)
            .await
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false);
        if !produced {
            return Err(RenderError::Failed {
                reason: format!(
                    "compositor exited successfully but wrote no video to {}",
                    job.output.display()
                ),
            });
        }

        Ok(job.output.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BackgroundColor;

    fn args_of(invocation: &ToolInvocation) -> Vec<String> {
        invocation
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn command_layout() {
        let runner = RenderRunner::new("ffmpeg", EncodingPolicy::default(), None);
        let options = RenderOptions {
            resolution: 720,
            background: BackgroundColor::parse("#0f172a").unwrap(),
            quality: VideoQuality::High,
        };
        let job = RenderJob {
            script: Path::new("/w/timeline.ffconcat"),
            audio: Path::new("/w/audio.wav"),
            output: Path::new("/w/output.mp4"),
            timeline_end: 2.0,
            options: &options,
        };

        let args = args_of(&runner.invocation(&job));
        let position = |flag: &str| args.iter().position(|a| a == flag).unwrap();

        assert_eq!(args[position("lavfi") + 2], "color=c=0x0f172a:s=720x720");
        assert_eq!(args[position("-safe") + 3], "/w/timeline.ffconcat");
        assert_eq!(args[position("-crf") + 1], "18");
        assert_eq!(args[position("-b:a") + 1], "192k");
        assert_eq!(args.last().unwrap(), "/w/output.mp4");
        assert!(args.contains(&"-shortest".to_string()));
    }

    #[test]
    fn background_is_not_capped_by_cue_timeline() {
        let runner = RenderRunner::new("ffmpeg", EncodingPolicy::default(), None);
        let options = RenderOptions {
            resolution: 512,
            background: BackgroundColor::parse("#ffffff").unwrap(),
            quality: VideoQuality::Standard,
        };
        let job = RenderJob {
            script: Path::new("/w/timeline.ffconcat"),
            audio: Path::new("/w/long_take.wav"),
            output: Path::new("/w/output.mp4"),
            timeline_end: 1.0,
            options: &options,
        };

        let args = args_of(&runner.invocation(&job));
        let background = args
            .iter()
            .find(|a| a.starts_with("color="))
            .unwrap();
        assert!(!background.contains("d="), "background bounded: {}", background);

        // The audio is the only bounded stream left
        let filter = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(filter.contains("eof_action=repeat"));
        assert!(args.contains(&"-shortest".to_string()));
        let shortest = args.iter().position(|a| a == "-shortest").unwrap();
        assert_eq!(shortest, args.len() - 2);
    }

    #[test]
    fn standard_quality_uses_standard_crf() {
        let policy = EncodingPolicy::default();
        assert_eq!(policy.crf(VideoQuality::Standard), 23);
        assert_eq!(policy.crf(VideoQuality::High), 18);
    }
}
