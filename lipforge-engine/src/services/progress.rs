//! Progress extraction and delivery
//!
//! The recognizer prints percentage markers on its diagnostic stream. Each
//! attempt maps its own 0–100% onto a sub-range of the job's overall
//! progress, and the reporter guarantees the caller only ever sees
//! non-decreasing values followed by exactly one terminal event.

use lipforge_common::JobEvent;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

/// Portion of overall job progress assigned to one attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressRange {
    start: f64,
    end: f64,
}

impl ProgressRange {
    pub const FULL: ProgressRange = ProgressRange {
        start: 0.0,
        end: 1.0,
    };

    /// `None` unless `0 <= start <= end <= 1`
    pub fn new(start: f64, end: f64) -> Option<Self> {
        if (0.0..=1.0).contains(&start) && (0.0..=1.0).contains(&end) && start <= end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    /// Map a 0–100 percentage into this range
    pub fn scale(&self, percent: u32) -> f64 {
        let fraction = f64::from(percent.min(100)) / 100.0;
        self.start + (self.end - self.start) * fraction
    }
}

/// Finds `<digits>%` markers, yielding only new maxima
#[derive(Debug, Default)]
pub struct PercentScanner {
    last: Option<u32>,
}

impl PercentScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Percentages in `text` strictly greater than any seen before, in order
    pub fn scan(&mut self, text: &str) -> Vec<u32> {
        let mut found = Vec::new();
        let bytes = text.as_bytes();
        let mut digits_start: Option<usize> = None;

        for (i, &byte) in bytes.iter().enumerate() {
            if byte.is_ascii_digit() {
                digits_start.get_or_insert(i);
                continue;
            }
            if let Some(start) = digits_start.take() {
                if byte == b'%' {
                    // Overlong digit runs saturate and clamp to 100
                    let value = text[start..i].parse::<u32>().unwrap_or(u32::MAX).min(100);
                    if self.last.map_or(true, |last| value > last) {
                        self.last = Some(value);
                        found.push(value);
                    }
                }
            }
        }
        found
    }

    pub fn last(&self) -> Option<u32> {
        self.last
    }
}

/// Delivers a job's events to its caller in order
#[derive(Debug)]
pub struct ProgressReporter {
    job_id: Uuid,
    tx: mpsc::Sender<JobEvent>,
    last: Option<f64>,
    finished: bool,
}

impl ProgressReporter {
    pub fn new(job_id: Uuid, tx: mpsc::Sender<JobEvent>) -> Self {
        Self {
            job_id,
            tx,
            last: None,
            finished: false,
        }
    }

    /// Emit a progress value, returning whether it was sent
    ///
    /// Values are clamped to `[0, 1]`. Anything not above the last emitted
    /// value is suppressed, as is everything after the terminal event. A
    /// full channel drops the update; a later, larger value supersedes it.
    pub fn report(&mut self, value: f64) -> bool {
        if self.finished || !value.is_finite() {
            return false;
        }
        let value = value.clamp(0.0, 1.0);
        if self.last.is_some_and(|last| value <= last) {
            return false;
        }

        match self.tx.try_send(JobEvent::progress(value)) {
            Ok(()) => {
                trace!(job_id = %self.job_id, value, "Progress");
                self.last = Some(value);
                true
            }
            Err(e) => {
                debug!(job_id = %self.job_id, value, error = %e, "Progress update dropped");
                false
            }
        }
    }

    /// Last value delivered, if any
    pub fn last(&self) -> Option<f64> {
        self.last
    }

    /// Send the terminal event; only the first call has any effect
    ///
    /// Returns false when the receiver is gone (caller disconnected).
    pub async fn finish(&mut self, event: JobEvent) -> bool {
        debug_assert!(event.is_terminal());
        if self.finished {
            return false;
        }
        self.finished = true;
        self.tx.send(event).await.is_ok()
    }
}
