//! Timeline compiler
//!
//! Turns mouth cues plus one still image per shape into a script for the
//! compositor's concat demuxer:
//!
//! ```text
//! ffconcat version 1.0
//! file '/scratch/export-…/frame_A.png'
//! duration 0.5
//! file '/scratch/export-…/frame_X.png'
//! duration 0.5
//! file '/scratch/export-…/frame_X.png'
//! ```
//!
//! Every cue becomes one duration-bearing segment lasting until the next
//! cue starts; the final cue holds for a fixed period. The demuxer ignores
//! the duration of the last listed file, so the final frame is listed once
//! more as a terminal hold entry.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use lipforge_common::{Cue, MouthShape};
use thiserror::Error;

/// Still image for each mouth shape
#[derive(Debug, Clone, Default)]
pub struct ShapeFrameSet {
    frames: BTreeMap<MouthShape, PathBuf>,
}

impl ShapeFrameSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, shape: MouthShape, path: impl Into<PathBuf>) {
        self.frames.insert(shape, path.into());
    }

    pub fn get(&self, shape: MouthShape) -> Option<&Path> {
        self.frames.get(&shape).map(PathBuf::as_path)
    }

    /// Frame for `shape`, or the fallback (rest) frame when it has none
    pub fn resolve(&self, shape: MouthShape) -> Option<&Path> {
        self.get(shape).or_else(|| self.get(MouthShape::FALLBACK))
    }

    /// Shapes that have no frame of their own
    pub fn missing(&self) -> Vec<MouthShape> {
        MouthShape::ALL
            .into_iter()
            .filter(|shape| !self.frames.contains_key(shape))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TimelineError {
    #[error("no cues to render")]
    Empty,

    #[error("no frame for shape {0} and no fallback frame for shape X")]
    MissingFrame(MouthShape),
}

/// One entry of the concat script
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub frame: PathBuf,
    /// `None` for the terminal hold entry
    pub duration: Option<f64>,
}

/// Compiled frame timeline
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    segments: Vec<Segment>,
    end_time: f64,
}

impl Timeline {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Segments carrying a duration (one per cue)
    pub fn timed_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|s| s.duration.is_some())
    }

    /// When the final cue's hold ends, in seconds
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    /// Concat demuxer script text
    pub fn script(&self) -> String {
        let mut script = String::from("ffconcat version 1.0\n");
        for segment in &self.segments {
            // Writing to a String cannot fail
            let _ = writeln!(script, "file {}", quote_path(&segment.frame));
            if let Some(duration) = segment.duration {
                let _ = writeln!(script, "duration {}", format_seconds(duration));
            }
        }
        script
    }

    pub async fn write_to(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::write(path, self.script()).await
    }
}

/// Quote a path for the concat demuxer
///
/// Backslashes become forward slashes; single quotes are closed, escaped
/// and reopened (`'\''`).
fn quote_path(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    format!("'{}'", normalized.replace('\'', r"'\''"))
}

fn format_seconds(seconds: f64) -> String {
    let text = format!("{:.6}", seconds);
    let text = text.trim_end_matches('0');
    text.strip_suffix('.').unwrap_or(text).to_string()
}

/// Builds [`Timeline`]s
#[derive(Debug, Clone, Copy)]
pub struct TimelineCompiler {
    min_segment: f64,
    final_hold: f64,
}

impl TimelineCompiler {
    pub const DEFAULT_MIN_SEGMENT: f64 = 0.01;
    pub const DEFAULT_FINAL_HOLD: f64 = 0.5;

    /// Non-positive settings fall back to the defaults
    pub fn new(min_segment: f64, final_hold: f64) -> Self {
        let positive = |value: f64, default: f64| {
            if value.is_finite() && value > 0.0 {
                value
            } else {
                default
            }
        };
        let min_segment = positive(min_segment, Self::DEFAULT_MIN_SEGMENT);
        Self {
            min_segment,
            final_hold: positive(final_hold, Self::DEFAULT_FINAL_HOLD).max(min_segment),
        }
    }

    pub fn min_segment(&self) -> f64 {
        self.min_segment
    }

    pub fn final_hold(&self) -> f64 {
        self.final_hold
    }

    /// Compile cues (ordered by start) against the available frames
    pub fn compile(&self, cues: &[Cue], frames: &ShapeFrameSet) -> Result<Timeline, TimelineError> {
        let Some(last) = cues.last() else {
            return Err(TimelineError::Empty);
        };

        let resolve = |shape: MouthShape| {
            frames
                .resolve(shape)
                .map(Path::to_path_buf)
                .ok_or(TimelineError::MissingFrame(shape))
        };

        let mut segments = Vec::with_capacity(cues.len() + 1);
        for (index, cue) in cues.iter().enumerate() {
            let gap = match cues.get(index + 1) {
                Some(next) => next.start - cue.start,
                None => self.final_hold,
            };
            segments.push(Segment {
                frame: resolve(cue.value)?,
                duration: Some(gap.max(self.min_segment)),
            });
        }

        segments.push(Segment {
            frame: resolve(last.value)?,
            duration: None,
        });

        Ok(Timeline {
            segments,
            end_time: last.start + self.final_hold,
        })
    }
}

impl Default for TimelineCompiler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_SEGMENT, Self::DEFAULT_FINAL_HOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_frames() -> ShapeFrameSet {
        let mut frames = ShapeFrameSet::new();
        for shape in MouthShape::ALL {
            frames.insert(shape, format!("/frames/{}.png", shape));
        }
        frames
    }

    #[test]
    fn two_cue_scenario() {
        let cues = [Cue::new(0.0, MouthShape::A), Cue::new(0.5, MouthShape::X)];
        let timeline = TimelineCompiler::default().compile(&cues, &all_frames()).unwrap();

        let durations: Vec<_> = timeline.segments().iter().map(|s| s.duration).collect();
        assert_eq!(durations, vec![Some(0.5), Some(0.5), None]);
        assert_eq!(timeline.end_time(), 1.0);

        assert_eq!(
            timeline.script(),
            "ffconcat version 1.0\n\
             file '/frames/A.png'\n\
             duration 0.5\n\
             file '/frames/X.png'\n\
             duration 0.5\n\
             file '/frames/X.png'\n"
        );
    }

    #[test]
    fn one_timed_segment_per_cue_plus_hold_and_floor_respected() {
        let compiler = TimelineCompiler::new(0.01, 0.5);
        let cues = [
            Cue::new(0.0, MouthShape::X),
            Cue::new(0.0, MouthShape::B),
            Cue::new(0.004, MouthShape::C),
            Cue::new(0.3, MouthShape::D),
            Cue::new(0.3, MouthShape::E),
            Cue::new(1.75, MouthShape::X),
        ];
        let timeline = compiler.compile(&cues, &all_frames()).unwrap();

        assert_eq!(timeline.timed_segments().count(), cues.len());
        assert_eq!(timeline.segments().len(), cues.len() + 1);
        assert!(timeline
            .timed_segments()
            .all(|s| s.duration.unwrap() >= compiler.min_segment()));
        assert_eq!(timeline.segments().last().unwrap().duration, None);
    }

    #[test]
    fn unmapped_shape_uses_fallback_frame() {
        let mut frames = ShapeFrameSet::new();
        frames.insert(MouthShape::X, "/frames/rest.png");
        frames.insert(MouthShape::A, "/frames/a.png");

        let cues = [Cue::new(0.0, MouthShape::A), Cue::new(0.2, MouthShape::G)];
        let timeline = TimelineCompiler::default().compile(&cues, &frames).unwrap();

        assert_eq!(timeline.segments()[1].frame, PathBuf::from("/frames/rest.png"));
        assert_eq!(frames.missing().len(), 7);
    }

    #[test]
    fn missing_fallback_is_an_error() {
        let mut frames = ShapeFrameSet::new();
        frames.insert(MouthShape::A, "/frames/a.png");
        let cues = [Cue::new(0.0, MouthShape::B)];

        assert_eq!(
            TimelineCompiler::default().compile(&cues, &frames),
            Err(TimelineError::MissingFrame(MouthShape::B))
        );
    }

    #[test]
    fn zero_cues_rejected() {
        assert_eq!(
            TimelineCompiler::default().compile(&[], &all_frames()),
            Err(TimelineError::Empty)
        );
    }

    #[test]
    fn quotes_and_backslashes_escaped() {
        assert_eq!(
            quote_path(Path::new(r"C:\frames\it's.png")),
            r"'C:/frames/it'\''s.png'"
        );
    }

    #[test]
    fn seconds_formatting_is_compact() {
        assert_eq!(format_seconds(0.5), "0.5");
        assert_eq!(format_seconds(2.0), "2");
        assert_eq!(format_seconds(0.01), "0.01");
        assert_eq!(format_seconds(0.1 + 0.2), "0.3");
    }

    #[test]
    fn invalid_settings_fall_back_to_defaults() {
        let compiler = TimelineCompiler::new(-1.0, f64::NAN);
        assert_eq!(compiler.min_segment(), TimelineCompiler::DEFAULT_MIN_SEGMENT);
        assert_eq!(compiler.final_hold(), TimelineCompiler::DEFAULT_FINAL_HOLD);
    }
}
