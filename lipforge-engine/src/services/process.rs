//! External tool supervision
//!
//! Runs one external executable to completion while:
//! - draining stdout and the diagnostic stream (stderr) concurrently,
//! - feeding every complete diagnostic segment to a caller callback,
//! - enforcing an optional liveness watchdog reset by any output byte,
//! - killing the child immediately when the job is cancelled.
//!
//! The child is spawned with `kill_on_drop`, so a supervised call whose
//! future is dropped never leaves the process behind.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Diagnostic lines kept for failure reporting
const MAX_DIAGNOSTIC_LINES: usize = 256;

const READ_CHUNK: usize = 8 * 1024;

/// Fully described external tool call
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub binary: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
}

impl ToolInvocation {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Command line for logs
    pub fn display_command(&self) -> String {
        std::iter::once(self.binary.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Supervision failure (the tool never produced an exit status we can judge)
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{} not found", binary.display())]
    NotFound { binary: PathBuf },

    #[error("Failed to start {}: {source}", binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} produced no output for {}s", binary.display(), idle.as_secs())]
    Hung { binary: PathBuf, idle: Duration },

    #[error("Cancelled")]
    Cancelled,

    #[error("I/O error while supervising {}: {source}", binary.display())]
    Io {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result of a tool that ran to exit
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// `None` when terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    /// Most recent diagnostic segments, oldest first
    pub diagnostics: Vec<String>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Most useful explanation of a failed run
    ///
    /// Prefers the last diagnostic mentioning an error or fatal condition,
    /// then the last diagnostic of any kind, then the exit code.
    pub fn failure_reason(&self) -> String {
        failure_reason(&self.diagnostics, self.exit_code)
    }
}

pub fn failure_reason(diagnostics: &[String], exit_code: Option<i32>) -> String {
    let marked = diagnostics.iter().rev().find(|line| {
        let lower = line.to_ascii_lowercase();
        lower.contains("error") || lower.contains("fatal")
    });

    marked
        .or_else(|| diagnostics.iter().rev().find(|line| !line.trim().is_empty()))
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| match exit_code {
            Some(code) => format!("Exit code {}", code),
            None => "Terminated by signal".to_string(),
        })
}

/// Splits the diagnostic byte stream into `\n`/`\r` delimited segments
///
/// Progress bars redraw with carriage returns, so `\r` ends a segment too.
#[derive(Debug, Default)]
struct DiagnosticSplitter {
    pending: Vec<u8>,
    lines: VecDeque<String>,
}

impl DiagnosticSplitter {
    fn push<F: FnMut(&str)>(&mut self, bytes: &[u8], on_segment: &mut F) {
        for &byte in bytes {
            if byte == b'\n' || byte == b'\r' {
                self.flush(on_segment);
            } else {
                self.pending.push(byte);
            }
        }
    }

    fn flush<F: FnMut(&str)>(&mut self, on_segment: &mut F) {
        if self.pending.is_empty() {
            return;
        }
        let segment = String::from_utf8_lossy(&self.pending).trim_end().to_string();
        self.pending.clear();
        if segment.is_empty() {
            return;
        }

        on_segment(&segment);
        if self.lines.len() == MAX_DIAGNOSTIC_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(segment);
    }

    fn into_lines(self) -> Vec<String> {
        self.lines.into()
    }
}

/// Run `invocation` to completion under supervision
///
/// `watchdog` bounds the time between two output bytes; `None` disables it.
/// `on_diagnostic` sees each diagnostic segment as it arrives.
pub async fn run_supervised<F>(
    invocation: &ToolInvocation,
    watchdog: Option<Duration>,
    cancel: &CancellationToken,
    mut on_diagnostic: F,
) -> Result<ProcessOutput, ProcessError>
where
    F: FnMut(&str),
{
    let binary = invocation.binary.clone();

    let mut command = Command::new(&invocation.binary);
    command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &invocation.working_dir {
        command.current_dir(dir);
    }

    debug!(
        command = %invocation.display_command(),
        working_dir = ?invocation.working_dir,
        "Spawning external tool"
    );

    let mut child = command.spawn().map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ProcessError::NotFound {
                binary: binary.clone(),
            }
        } else {
            ProcessError::Spawn {
                binary: binary.clone(),
                source,
            }
        }
    })?;

    let io_error = |source: io::Error| ProcessError::Io {
        binary: binary.clone(),
        source,
    };

    let missing_pipe = || io::Error::new(io::ErrorKind::BrokenPipe, "child pipe not captured");
    let mut stdout = child.stdout.take().ok_or_else(|| io_error(missing_pipe()))?;
    let mut stderr = child.stderr.take().ok_or_else(|| io_error(missing_pipe()))?;

    if cancel.is_cancelled() {
        terminate(&mut child, &binary).await;
        return Err(ProcessError::Cancelled);
    }

    let mut stdout_bytes = Vec::new();
    let mut splitter = DiagnosticSplitter::default();
    let mut out_chunk = vec![0u8; READ_CHUNK];
    let mut err_chunk = vec![0u8; READ_CHUNK];
    let mut stdout_open = true;
    let mut stderr_open = true;
    let mut exit_status: Option<ExitStatus> = None;
    let mut deadline = watchdog.map(|idle| Instant::now() + idle);

    while exit_status.is_none() || stdout_open || stderr_open {
        let idle_timer = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(binary = %binary.display(), "Cancellation requested, killing tool");
                terminate(&mut child, &binary).await;
                return Err(ProcessError::Cancelled);
            }

            _ = idle_timer => {
                // A tool that already exited but left an inheriting
                // grandchild holding the pipes is judged on its exit status
                if exit_status.is_some() {
                    break;
                }
                let idle = watchdog.unwrap_or_default();
                warn!(
                    binary = %binary.display(),
                    idle_secs = idle.as_secs(),
                    "Watchdog fired, killing silent tool"
                );
                terminate(&mut child, &binary).await;
                return Err(ProcessError::Hung { binary, idle });
            }

            read = stdout.read(&mut out_chunk), if stdout_open => {
                match read.map_err(io_error)? {
                    0 => stdout_open = false,
                    n => {
                        stdout_bytes.extend_from_slice(&out_chunk[..n]);
                        deadline = watchdog.map(|idle| Instant::now() + idle);
                    }
                }
            }

            read = stderr.read(&mut err_chunk), if stderr_open => {
                match read.map_err(io_error)? {
                    0 => {
                        stderr_open = false;
                        splitter.flush(&mut on_diagnostic);
                    }
                    n => {
                        splitter.push(&err_chunk[..n], &mut on_diagnostic);
                        deadline = watchdog.map(|idle| Instant::now() + idle);
                    }
                }
            }

            status = child.wait(), if exit_status.is_none() => {
                exit_status = Some(status.map_err(io_error)?);
            }
        }
    }

    splitter.flush(&mut on_diagnostic);

    let exit_code = exit_status.and_then(|status| status.code());
    debug!(binary = %binary.display(), exit_code = ?exit_code, "External tool exited");

    Ok(ProcessOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        diagnostics: splitter.into_lines(),
    })
}

async fn terminate(child: &mut Child, binary: &Path) {
    if let Err(e) = child.start_kill() {
        // Already exited
        debug!(binary = %binary.display(), error = %e, "Kill skipped");
    }
    if let Err(e) = child.wait().await {
        warn!(binary = %binary.display(), error = %e, "Failed to reap killed tool");
    }
}
