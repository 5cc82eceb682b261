//! # LipForge Common Library
//!
//! Shared code for the LipForge engine and its clients:
//! - Error type
//! - Configuration file model and resolution
//! - Job event wire format (line-delimited JSON)
//! - Mouth-shape cue model and recognizer output parsing

pub mod config;
pub mod cues;
pub mod error;
pub mod events;

pub use cues::{Cue, MouthShape};
pub use error::{Error, Result};
pub use events::JobEvent;
