//! Caller-supplied job options
//!
//! The `config` multipart field of both endpoints carries one of these as
//! JSON, using the desktop client's camelCase names.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Options for an analysis job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisOptions {
    /// Recognizer variant passed to `--recognizer` (e.g. `pocketSphinx`, `phonetic`)
    pub recognizer: Option<String>,
}

/// Output quality tier, mapped to a constant rate factor by the renderer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    #[default]
    Standard,
    High,
}

impl std::str::FromStr for VideoQuality {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(VideoQuality::Standard),
            "high" => Ok(VideoQuality::High),
            other => Err(JobError::InputInvalid(format!(
                "Video quality {:?} is not 'standard' or 'high'",
                other
            ))),
        }
    }
}

/// Solid background color in compositor notation (`0xRRGGBB`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundColor(u32);

impl BackgroundColor {
    /// Accepts `#RRGGBB`, `RRGGBB` or `0xRRGGBB`
    pub fn parse(value: &str) -> Result<Self, JobError> {
        let value = value.trim();
        let hex = value
            .strip_prefix('#')
            .or_else(|| value.strip_prefix("0x"))
            .or_else(|| value.strip_prefix("0X"))
            .unwrap_or(value);

        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(JobError::InputInvalid(format!(
                "Background color {:?} is not a #RRGGBB hex color",
                value
            )));
        }

        u32::from_str_radix(hex, 16)
            .map(BackgroundColor)
            .map_err(|e| JobError::InputInvalid(format!("Background color {:?}: {}", value, e)))
    }
}

impl fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06x}", self.0)
    }
}

/// Validated render settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    /// Square output edge in pixels
    pub resolution: u32,
    pub background: BackgroundColor,
    pub quality: VideoQuality,
}

impl RenderOptions {
    pub const MIN_RESOLUTION: u32 = 16;
    pub const MAX_RESOLUTION: u32 = 4096;
}

/// Wire form of the export `config` field
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportConfig {
    pub video_res: u32,
    pub video_bg_color: String,
    pub video_quality: VideoQuality,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            video_res: 512,
            video_bg_color: "#ffffff".to_string(),
            video_quality: VideoQuality::Standard,
        }
    }
}

impl TryFrom<ExportConfig> for RenderOptions {
    type Error = JobError;

    fn try_from(config: ExportConfig) -> Result<Self, Self::Error> {
        let resolution = config.video_res;
        if !(RenderOptions::MIN_RESOLUTION..=RenderOptions::MAX_RESOLUTION).contains(&resolution) {
            return Err(JobError::InputInvalid(format!(
                "Video resolution {} is outside {}..={}",
                resolution,
                RenderOptions::MIN_RESOLUTION,
                RenderOptions::MAX_RESOLUTION
            )));
        }
        // yuv420p needs even dimensions
        if resolution % 2 != 0 {
            return Err(JobError::InputInvalid(format!(
                "Video resolution {} must be even",
                resolution
            )));
        }

        Ok(RenderOptions {
            resolution,
            background: BackgroundColor::parse(&config.video_bg_color)?,
            quality: config.video_quality,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_color_forms() {
        assert_eq!(BackgroundColor::parse("#1e293b").unwrap().to_string(), "0x1e293b");
        assert_eq!(BackgroundColor::parse("0xFFFFFF").unwrap().to_string(), "0xffffff");
        assert_eq!(BackgroundColor::parse("00ff00").unwrap().to_string(), "0x00ff00");
    }

    #[test]
    fn background_color_rejects_names_and_short_forms() {
        assert!(BackgroundColor::parse("white").is_err());
        assert!(BackgroundColor::parse("#fff").is_err());
        assert!(BackgroundColor::parse("#12345g").is_err());
    }

    #[test]
    fn export_config_from_client_json() {
        let config: ExportConfig = serde_json::from_str(
            r##"{"videoRes": 1080, "videoBgColor": "#0f172a", "videoQuality": "high"}"##,
        )
        .unwrap();
        let options = RenderOptions::try_from(config).unwrap();
        assert_eq!(options.resolution, 1080);
        assert_eq!(options.quality, VideoQuality::High);
        assert_eq!(options.background.to_string(), "0x0f172a");
    }

    #[test]
    fn odd_or_oversized_resolution_rejected() {
        let odd = ExportConfig {
            video_res: 721,
            ..ExportConfig::default()
        };
        assert!(matches!(RenderOptions::try_from(odd), Err(JobError::InputInvalid(_))));

        let huge = ExportConfig {
            video_res: 8192,
            ..ExportConfig::default()
        };
        assert!(RenderOptions::try_from(huge).is_err());
    }

    #[test]
    fn quality_from_cli_text() {
        assert_eq!("High".parse::<VideoQuality>().unwrap(), VideoQuality::High);
        assert_eq!("standard".parse::<VideoQuality>().unwrap(), VideoQuality::Standard);
        assert!("ultra".parse::<VideoQuality>().is_err());
    }

    #[test]
    fn analysis_options_default_variant_absent() {
        let options: AnalysisOptions = serde_json::from_str("{}").unwrap();
        assert!(options.recognizer.is_none());

        let options: AnalysisOptions =
            serde_json::from_str(r#"{"recognizer":"phonetic"}"#).unwrap();
        assert_eq!(options.recognizer.as_deref(), Some("phonetic"));
    }
}
