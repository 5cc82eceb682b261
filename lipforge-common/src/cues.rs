//! Mouth-shape cue model
//!
//! A cue marks the moment the displayed mouth shape changes. Cues are
//! produced by the recognition binary and consumed by the timeline compiler
//! when a video is exported.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One of the fixed mouth poses emitted by the recognizer
///
/// `X` is the rest pose and doubles as the fallback frame for any shape
/// without an image of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MouthShape {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    X,
}

impl MouthShape {
    /// Every shape, in label order
    pub const ALL: [MouthShape; 9] = [
        MouthShape::A,
        MouthShape::B,
        MouthShape::C,
        MouthShape::D,
        MouthShape::E,
        MouthShape::F,
        MouthShape::G,
        MouthShape::H,
        MouthShape::X,
    ];

    /// Shape standing in for rest and for unmapped shapes
    pub const FALLBACK: MouthShape = MouthShape::X;

    pub fn as_str(&self) -> &'static str {
        match self {
            MouthShape::A => "A",
            MouthShape::B => "B",
            MouthShape::C => "C",
            MouthShape::D => "D",
            MouthShape::E => "E",
            MouthShape::F => "F",
            MouthShape::G => "G",
            MouthShape::H => "H",
            MouthShape::X => "X",
        }
    }
}

impl fmt::Display for MouthShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MouthShape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MouthShape::ALL
            .iter()
            .copied()
            .find(|shape| shape.as_str() == s.trim())
            .ok_or_else(|| Error::InvalidInput(format!("Unknown mouth shape: {:?}", s)))
    }
}

/// A timed mouth-shape change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// Seconds from the start of the audio
    pub start: f64,
    /// Shape shown from `start` until the next cue
    pub value: MouthShape,
}

impl Cue {
    pub fn new(start: f64, value: MouthShape) -> Self {
        Self { start, value }
    }
}

/// Check that cues are well formed: finite non-negative starts in
/// non-decreasing order. Equal starts are allowed (zero-duration cues).
pub fn validate_cues(cues: &[Cue]) -> Result<()> {
    let mut previous = 0.0_f64;
    for (index, cue) in cues.iter().enumerate() {
        if !cue.start.is_finite() || cue.start < 0.0 {
            return Err(Error::InvalidInput(format!(
                "Cue {} has invalid start time {}",
                index, cue.start
            )));
        }
        if cue.start < previous {
            return Err(Error::InvalidInput(format!(
                "Cue {} starts at {}s, before the previous cue at {}s",
                index, cue.start, previous
            )));
        }
        previous = cue.start;
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecognizerDocument {
    mouth_cues: Vec<RecognizerCue>,
}

#[derive(Deserialize)]
struct RecognizerCue {
    start: f64,
    value: MouthShape,
}

/// Parse the recognizer's native output into cues
///
/// Accepts the JSON document (`{"mouthCues": [...]}`) or the tab-separated
/// `<seconds>\t<shape>` form.
pub fn parse_recognizer_output(raw: &str) -> Result<Vec<Cue>> {
    let trimmed = raw.trim_start();
    let cues = if trimmed.starts_with('{') {
        let document: RecognizerDocument = serde_json::from_str(trimmed)?;
        document
            .mouth_cues
            .into_iter()
            .map(|cue| Cue::new(cue.start, cue.value))
            .collect()
    } else {
        parse_tsv(trimmed)?
    };
    validate_cues(&cues)?;
    Ok(cues)
}

fn parse_tsv(raw: &str) -> Result<Vec<Cue>> {
    let mut cues = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let (Some(start), Some(shape)) = (fields.next(), fields.next()) else {
            return Err(Error::InvalidInput(format!(
                "Line {} is not a <time>\\t<shape> pair: {:?}",
                line_no + 1,
                line
            )));
        };
        let start: f64 = start.trim().parse().map_err(|_| {
            Error::InvalidInput(format!("Line {} has a non-numeric time: {:?}", line_no + 1, start))
        })?;
        cues.push(Cue::new(start, shape.parse()?));
    }
    Ok(cues)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_document() {
        let raw = r#"{
            "metadata": { "soundFile": "a.wav", "duration": 1.2 },
            "mouthCues": [
                { "start": 0.00, "end": 0.05, "value": "X" },
                { "start": 0.05, "end": 0.27, "value": "D" },
                { "start": 0.27, "end": 1.20, "value": "X" }
            ]
        }"#;
        let cues = parse_recognizer_output(raw).unwrap();
        assert_eq!(cues.len(), 3);
        assert_eq!(cues[1], Cue::new(0.05, MouthShape::D));
    }

    #[test]
    fn parses_tsv() {
        let cues = parse_recognizer_output("0.00\tX\n0.50\tA\n\n1.25\tX\n").unwrap();
        assert_eq!(
            cues,
            vec![
                Cue::new(0.0, MouthShape::X),
                Cue::new(0.5, MouthShape::A),
                Cue::new(1.25, MouthShape::X),
            ]
        );
    }

    #[test]
    fn rejects_unknown_shape() {
        assert!(parse_recognizer_output("0.0\tQ\n").is_err());
    }

    #[test]
    fn equal_starts_are_allowed() {
        let cues = [Cue::new(0.5, MouthShape::A), Cue::new(0.5, MouthShape::B)];
        assert!(validate_cues(&cues).is_ok());
    }

    #[test]
    fn decreasing_or_negative_starts_rejected() {
        let decreasing = [Cue::new(1.0, MouthShape::A), Cue::new(0.5, MouthShape::B)];
        assert!(validate_cues(&decreasing).is_err());

        let negative = [Cue::new(-0.1, MouthShape::A)];
        assert!(validate_cues(&negative).is_err());

        let nan = [Cue::new(f64::NAN, MouthShape::A)];
        assert!(validate_cues(&nan).is_err());
    }

    #[test]
    fn shape_round_trips_through_str() {
        for shape in MouthShape::ALL {
            assert_eq!(shape.as_str().parse::<MouthShape>().unwrap(), shape);
        }
    }
}
