//! Per-job scratch workspaces
//!
//! Every job owns exactly one directory under the process-wide scratch root.
//! Uploads, the normalized audio, the timeline script and the rendered video
//! all live inside it, so removing the directory reclaims everything the job
//! touched. Entries are removed on every exit path: explicitly when the job
//! reaches a terminal state, and on drop when a handler future is abandoned
//! (client disconnect) or a task panics.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::JobKind;

/// Process-wide scratch root
#[derive(Debug, Clone)]
pub struct WorkspaceRoot {
    path: PathBuf,
}

impl WorkspaceRoot {
    /// Create the root if absent and sweep entries left by a previous process
    ///
    /// The stored path is canonical, so every path handed to an external
    /// tool is absolute regardless of that tool's working directory.
    pub fn prepare(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        std::fs::create_dir_all(&path)?;
        let root = Self {
            path: path.canonicalize()?,
        };

        let swept = root.purge();
        if swept > 0 {
            info!(
                root = %root.path.display(),
                swept,
                "Removed stale workspaces from a previous run"
            );
        }
        Ok(root)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an empty, exclusively owned entry for `job_id`
    pub async fn allocate(&self, job_id: Uuid, kind: JobKind) -> io::Result<WorkspaceEntry> {
        let path = self.path.join(format!("{}-{}", kind.as_str(), job_id));
        // create_dir (not create_dir_all) fails if the entry already exists
        tokio::fs::create_dir(&path).await?;
        debug!(job_id = %job_id, path = %path.display(), "Workspace allocated");

        Ok(WorkspaceEntry {
            job_id,
            path,
            released: false,
        })
    }

    /// Remove every workspace entry under the root, returning how many were removed
    ///
    /// Only directories named like entries are touched, so pointing the
    /// scratch root at a shared directory never deletes foreign files.
    pub fn purge(&self) -> usize {
        let Ok(dir) = std::fs::read_dir(&self.path) else {
            return 0;
        };

        dir.flatten()
            .filter(|entry| is_entry_name(&entry.file_name().to_string_lossy()))
            .filter(|entry| match std::fs::remove_dir_all(entry.path()) {
                Ok(()) => true,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to remove workspace");
                    false
                }
            })
            .count()
    }
}

fn is_entry_name(name: &str) -> bool {
    [JobKind::Analysis, JobKind::Export].iter().any(|kind| {
        name.strip_prefix(kind.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .is_some_and(|id| Uuid::parse_str(id).is_ok())
    })
}

/// Scratch directory owned by one job
#[derive(Debug)]
pub struct WorkspaceEntry {
    job_id: Uuid,
    path: PathBuf,
    released: bool,
}

impl WorkspaceEntry {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside this entry
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Remove the entry and everything beneath it
    ///
    /// Best effort: failures are logged, never returned. Releasing twice, or
    /// releasing an entry whose directory is already gone, is a no-op.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(job_id = %self.job_id, "Workspace released"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                job_id = %self.job_id,
                path = %self.path.display(),
                error = %e,
                "Failed to release workspace"
            ),
        }
    }
}

impl Drop for WorkspaceEntry {
    fn drop(&mut self) {
        self.release();
    }
}
