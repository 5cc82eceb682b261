//! Job event wire format
//!
//! Analysis jobs stream their progress to the caller as line-delimited JSON.
//! Each line is one [`JobEvent`]; exactly one terminal event (`success` or
//! `failure`) closes the stream.

use serde::{Deserialize, Serialize};

/// Event emitted by a running analysis job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JobEvent {
    /// Overall job progress in `[0, 1]`
    Progress {
        value: f64,
    },

    /// Terminal success carrying the recognizer's native structured output
    Success {
        result: String,
    },

    /// Terminal failure with a human-actionable reason
    Failure {
        reason: String,
    },
}

impl JobEvent {
    pub fn progress(value: f64) -> Self {
        JobEvent::Progress { value }
    }

    pub fn success(result: impl Into<String>) -> Self {
        JobEvent::Success {
            result: result.into(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        JobEvent::Failure {
            reason: reason.into(),
        }
    }

    /// True for the events that close a job stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Success { .. } | JobEvent::Failure { .. })
    }

    /// Event type string as it appears on the wire
    pub fn event_type(&self) -> &'static str {
        match self {
            JobEvent::Progress { .. } => "progress",
            JobEvent::Success { .. } => "success",
            JobEvent::Failure { .. } => "failure",
        }
    }

    /// Render as one newline-terminated JSON line
    pub fn to_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(mut line) => {
                line.push('\n');
                line
            }
            Err(e) => format!(
                "{{\"type\":\"failure\",\"reason\":\"event encoding failed: {}\"}}\n",
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_line_format() {
        let line = JobEvent::progress(0.25).to_line();
        assert_eq!(line, "{\"type\":\"progress\",\"value\":0.25}\n");
    }

    #[test]
    fn terminal_events() {
        assert!(JobEvent::success("{}").is_terminal());
        assert!(JobEvent::failure("boom").is_terminal());
        assert!(!JobEvent::progress(1.0).is_terminal());
    }

    #[test]
    fn parses_client_side() {
        let event: JobEvent =
            serde_json::from_str(r#"{"type":"failure","reason":"Rhubarb failed"}"#).unwrap();
        assert_eq!(event, JobEvent::failure("Rhubarb failed"));
        assert_eq!(event.event_type(), "failure");
    }
}
