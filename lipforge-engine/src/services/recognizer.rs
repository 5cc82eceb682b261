//! Recognition runner
//!
//! Drives the phoneme-recognition binary (Rhubarb Lip Sync CLI contract):
//!
//! ```text
//! rhubarb -f json --recognizer <variant> --logLevel <level> <audio> [--dialog <file>]
//! ```
//!
//! The binary resolves its acoustic models relative to its own install
//! directory, so it is always started with that directory as its working
//! directory and every path argument is absolute. The models live in an
//! asset folder (`res` by default) next to the binary; its absence is the
//! most common installation fault and is reported as such.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::process::{run_supervised, ProcessError, ToolInvocation};
use super::progress::{PercentScanner, ProgressRange, ProgressReporter};

/// One recognition attempt
#[derive(Debug, Clone, Copy)]
pub struct RecognitionRequest<'a> {
    pub audio: &'a Path,
    pub dialog: Option<&'a Path>,
    pub variant: &'a str,
}

/// Recognizer failure
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("recognition binary not found at {}", binary.display())]
    NotFound { binary: PathBuf },

    #[error("recognition binary could not be started: {0}")]
    Spawn(String),

    #[error("no output for {}s", idle.as_secs())]
    Hung { idle: Duration },

    #[error("{reason}")]
    Failed { reason: String },

    #[error("cancelled")]
    Cancelled,
}

/// Runs the recognition binary with a liveness watchdog
#[derive(Debug, Clone)]
pub struct RecognitionRunner {
    binary: PathBuf,
    asset_dir: String,
    watchdog: Duration,
    log_level: String,
}

impl RecognitionRunner {
    /// `binary` is made absolute when it exists, because the working
    /// directory of the child differs from ours.
    pub fn new(
        binary: impl Into<PathBuf>,
        asset_dir: impl Into<String>,
        watchdog: Duration,
        log_level: impl Into<String>,
    ) -> Self {
        let binary = binary.into();
        let binary = binary.canonicalize().unwrap_or(binary);
        Self {
            binary,
            asset_dir: asset_dir.into(),
            watchdog,
            log_level: log_level.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn asset_dir(&self) -> &str {
        &self.asset_dir
    }

    pub fn watchdog(&self) -> Duration {
        self.watchdog
    }

    /// Directory the binary is installed in (`None` for a bare command name)
    pub fn install_dir(&self) -> Option<&Path> {
        self.binary
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
    }

    /// Expected location of the acoustic model folder
    pub fn asset_path(&self) -> Option<PathBuf> {
        self.install_dir().map(|dir| dir.join(&self.asset_dir))
    }

    /// True when the model folder exists (or cannot be located, for a
    /// binary resolved through `PATH`)
    pub fn assets_present(&self) -> bool {
        self.asset_path().map_or(true, |path| path.is_dir())
    }

    pub fn invocation(&self, request: &RecognitionRequest<'_>) -> ToolInvocation {
        let mut invocation = ToolInvocation::new(&self.binary)
            .args(["-f", "json", "--recognizer"])
            .arg(request.variant)
            .arg("--logLevel")
            .arg(&self.log_level)
            .arg(request.audio);

        if let Some(dialog) = request.dialog {
            invocation = invocation.arg("--dialog").arg(dialog);
        }
        if let Some(dir) = self.install_dir() {
            invocation = invocation.working_dir(dir);
        }
        invocation
    }

    /// Run one attempt, forwarding progress scaled into `range`
    ///
    /// Resolves to the recognizer's native JSON output on exit code 0.
    pub async fn recognize(
        &self,
        request: &RecognitionRequest<'_>,
        range: ProgressRange,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<String, RecognitionError> {
        let invocation = self.invocation(request);
        info!(
            audio = %request.audio.display(),
            variant = request.variant,
            range_start = range.start(),
            range_end = range.end(),
            "Starting recognition"
        );

        let mut scanner = PercentScanner::new();
        let result = run_supervised(&invocation, Some(self.watchdog), cancel, |segment| {
            for percent in scanner.scan(segment) {
                reporter.report(range.scale(percent));
            }
        })
        .await;

        let output = match result {
            Ok(output) => output,
            Err(ProcessError::NotFound { binary }) => {
                return Err(RecognitionError::NotFound { binary })
            }
            Err(ProcessError::Hung { idle, .. }) => return Err(RecognitionError::Hung { idle }),
            Err(ProcessError::Cancelled) => return Err(RecognitionError::Cancelled),
            Err(e @ (ProcessError::Spawn { .. } | ProcessError::Io { .. })) => {
                return Err(RecognitionError::Spawn(e.to_string()))
            }
        };

        if output.success() {
            debug!(bytes = output.stdout.len(), "Recognition succeeded");
            return Ok(output.stdout);
        }

        let reason = output.failure_reason();
        warn!(exit_code = ?output.exit_code, reason = %reason, "Recognition failed");
        Err(RecognitionError::Failed { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_argument_order() {
        let runner = RecognitionRunner::new(
            "/opt/lipforge/bin/rhubarb",
            "res",
            Duration::from_secs(120),
            "Info",
        );
        let request = RecognitionRequest {
            audio: Path::new("/tmp/job/audio.wav"),
            dialog: Some(Path::new("/tmp/job/dialog.txt")),
            variant: "phonetic",
        };

        let invocation = runner.invocation(&request);
        let args: Vec<String> = invocation
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "-f",
                "json",
                "--recognizer",
                "phonetic",
                "--logLevel",
                "Info",
                "/tmp/job/audio.wav",
                "--dialog",
                "/tmp/job/dialog.txt",
            ]
        );
        assert_eq!(
            invocation.working_dir.as_deref(),
            Some(Path::new("/opt/lipforge/bin"))
        );
    }

    #[test]
    fn bare_command_has_no_working_dir_and_assumes_assets() {
        let runner = RecognitionRunner::new("rhubarb", "res", Duration::from_secs(1), "Info");
        assert!(runner.install_dir().is_none());
        assert!(runner.assets_present());

        let request = RecognitionRequest {
            audio: Path::new("/a.wav"),
            dialog: None,
            variant: "pocketSphinx",
        };
        assert!(runner.invocation(&request).working_dir.is_none());
    }

    #[test]
    fn asset_folder_checked_next_to_binary() {
        let temp = tempfile::tempdir().unwrap();
        let binary = temp.path().join("rhubarb");
        std::fs::write(&binary, b"").unwrap();

        let runner = RecognitionRunner::new(&binary, "res", Duration::from_secs(1), "Info");
        assert!(!runner.assets_present());

        std::fs::create_dir(temp.path().join("res")).unwrap();
        assert!(runner.assets_present());
    }
}
