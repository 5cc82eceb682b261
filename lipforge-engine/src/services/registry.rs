//! Registry of in-flight jobs
//!
//! Each running job holds a [`JobRegistration`]; dropping it removes the job
//! from the registry. The registry is only used for listing and explicit
//! cancellation; jobs never share any other state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::JobKind;

/// Listing entry for an active job
#[derive(Debug, Clone, Serialize)]
pub struct ActiveJob {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Slot {
    info: ActiveJob,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<Uuid, Slot>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Slot>> {
        // Slots are plain data; a panic while holding the lock leaves them valid
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `job_id`; the job stays listed until the registration drops
    pub fn register(&self, job_id: Uuid, kind: JobKind) -> JobRegistration {
        let cancel = CancellationToken::new();
        self.lock().insert(
            job_id,
            Slot {
                info: ActiveJob {
                    job_id,
                    kind,
                    started_at: Utc::now(),
                },
                cancel: cancel.clone(),
            },
        );

        JobRegistration {
            registry: self.clone(),
            job_id,
            cancel,
        }
    }

    /// Cancel an active job; false if it is not registered
    pub fn cancel(&self, job_id: Uuid) -> bool {
        match self.lock().get(&job_id) {
            Some(slot) => {
                slot.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every active job (shutdown)
    pub fn cancel_all(&self) {
        for slot in self.lock().values() {
            slot.cancel.cancel();
        }
    }

    pub fn list(&self) -> Vec<ActiveJob> {
        let mut jobs: Vec<ActiveJob> = self.lock().values().map(|slot| slot.info.clone()).collect();
        jobs.sort_by_key(|job| job.started_at);
        jobs
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Keeps a job listed and owns its cancellation token
#[derive(Debug)]
pub struct JobRegistration {
    registry: JobRegistry,
    job_id: Uuid,
    cancel: CancellationToken,
}

impl JobRegistration {
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for JobRegistration {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.job_id);
    }
}
