//! Audio normalizer
//!
//! Converts arbitrary input audio to what the recognizer handles best:
//! mono, fixed sample rate, 16-bit PCM WAV. Failure here is never fatal to a
//! job; the controller falls back to the raw upload. The converter fails
//! fast when it cannot read its input, so no watchdog is applied.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::process::{run_supervised, ProcessError, ToolInvocation};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("{0}")]
    Failed(String),

    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct AudioNormalizer {
    binary: PathBuf,
    sample_rate: u32,
}

impl AudioNormalizer {
    pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

    pub fn new(binary: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            binary: binary.into(),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn invocation(&self, input: &Path, output: &Path) -> ToolInvocation {
        ToolInvocation::new(&self.binary)
            .args(["-y", "-hide_banner", "-i"])
            .arg(input)
            .args(["-ac", "1", "-ar"])
            .arg(self.sample_rate.to_string())
            .args(["-acodec", "pcm_s16le", "-f", "wav"])
            .arg(output)
    }

    /// Write a normalized copy of `input` to `output`
    pub async fn normalize(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, NormalizeError> {
        let invocation = self.invocation(input, output);

        let result = match run_supervised(&invocation, None, cancel, |_| {}).await {
            Ok(result) => result,
            Err(ProcessError::Cancelled) => return Err(NormalizeError::Cancelled),
            Err(e) => {
                warn!(error = %e, "Audio normalizer unavailable");
                return Err(NormalizeError::Failed(e.to_string()));
            }
        };

        if !result.success() {
            let reason = result.failure_reason();
            warn!(exit_code = ?result.exit_code, reason = %reason, "Audio normalization failed");
            return Err(NormalizeError::Failed(reason));
        }

        if !output.is_file() {
            return Err(NormalizeError::Failed(format!(
                "converter reported success but {} was not written",
                output.display()
            )));
        }

        debug!(output = %output.display(), "Audio normalized");
        Ok(output.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_targets_mono_pcm() {
        let normalizer = AudioNormalizer::new("ffmpeg", 16_000);
        let invocation = normalizer.invocation(Path::new("/w/audio.mp3"), Path::new("/w/normalized.wav"));
        assert_eq!(
            invocation.display_command(),
            "ffmpeg -y -hide_banner -i /w/audio.mp3 -ac 1 -ar 16000 -acodec pcm_s16le -f wav /w/normalized.wav"
        );
    }

    #[tokio::test]
    async fn missing_converter_is_recoverable_failure() {
        let normalizer = AudioNormalizer::new("/no/such/ffmpeg", 16_000);
        let err = normalizer
            .normalize(
                Path::new("/w/audio.mp3"),
                Path::new("/w/normalized.wav"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NormalizeError::Failed(_)));
    }
}
