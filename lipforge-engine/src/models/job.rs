//! Job state machine
//!
//! Analysis: IDLE → NORMALIZING → RECOGNIZING → (RECOGNIZING_FALLBACK) → SUCCEEDED | FAILED
//! Export:   IDLE → COMPILING → RENDERING → SUCCEEDED | FAILED
//!
//! Either kind may end in CANCELLED when the caller goes away.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of request a job serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Audio → mouth cues
    Analysis,
    /// Audio + cues + frames → video
    Export,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Analysis => "analysis",
            JobKind::Export => "export",
        }
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Accepted, inputs being received
    Idle,
    /// Converting input audio to the recognizer's format
    Normalizing,
    /// First recognition attempt
    Recognizing,
    /// Second recognition attempt against the raw upload
    RecognizingFallback,
    /// Building the frame concatenation script
    Compiling,
    /// Compositor running
    Rendering,
    Succeeded,
    Failed,
    /// Caller disconnected or cancelled explicitly
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub job_id: Uuid,
    pub old_state: JobState,
    pub new_state: JobState,
    pub transitioned_at: DateTime<Utc>,
}

/// One analysis or export request, owned by the job controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub state: JobState,
    /// Last reported progress in `[0, 1]`
    pub progress: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(kind: JobKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            state: JobState::Idle,
            progress: 0.0,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Move to `new_state`
    ///
    /// Transitions out of a terminal state are ignored so a job reports
    /// exactly one outcome.
    pub fn transition_to(&mut self, new_state: JobState) -> Option<StateTransition> {
        if self.state.is_terminal() {
            return None;
        }

        let transition = StateTransition {
            job_id: self.id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        tracing::debug!(
            job_id = %self.id,
            from = ?transition.old_state,
            to = ?new_state,
            "Job state transition"
        );

        Some(transition)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn elapsed_seconds(&self) -> f64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as f64 / 1000.0
    }
}
