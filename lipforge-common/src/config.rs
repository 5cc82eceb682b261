//! Configuration file model and path resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Tiers 1 and 2 are handled by the binary's argument parser; this module
//! owns the TOML model and the compiled defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "LIPFORGE_CONFIG";

/// Contents of `engine.toml`; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineToml {
    pub server: ServerSection,
    pub workspace: WorkspaceSection,
    pub recognizer: RecognizerSection,
    pub normalizer: NormalizerSection,
    pub compositor: CompositorSection,
    pub timeline: TimelineSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_upload_mb: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceSection {
    pub scratch_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerSection {
    pub binary: Option<PathBuf>,
    /// Directory name, next to the binary, holding the acoustic models
    pub asset_dir: Option<String>,
    pub watchdog_secs: Option<u64>,
    pub default_variant: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerSection {
    pub binary: Option<PathBuf>,
    pub sample_rate: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorSection {
    pub binary: Option<PathBuf>,
    pub preset: Option<String>,
    pub crf_standard: Option<u8>,
    pub crf_high: Option<u8>,
    pub audio_bitrate: Option<String>,
    pub watchdog_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineSection {
    pub min_segment_secs: Option<f64>,
    pub final_hold_secs: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: Option<String>,
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<EngineToml> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Locate and load the config file
///
/// An explicit path (CLI or `LIPFORGE_CONFIG`) must exist and parse. The
/// platform default is optional: when it is absent the compiled defaults
/// apply. A default file that fails to parse is reported and ignored.
pub fn resolve_toml_config(explicit: Option<&Path>) -> Result<EngineToml> {
    if let Some(path) = explicit {
        info!("Loading config from {}", path.display());
        return load_toml_config(path);
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(path);
        info!("Loading config from {} ({})", path.display(), CONFIG_ENV_VAR);
        return load_toml_config(&path);
    }

    match default_config_path() {
        Some(path) if path.exists() => match load_toml_config(&path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) => {
                warn!("{} - using compiled defaults", e);
                Ok(EngineToml::default())
            }
        },
        _ => Ok(EngineToml::default()),
    }
}

/// Platform config file location: `<config dir>/lipforge/engine.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lipforge").join("engine.toml"))
}

/// Default scratch root: `<system temp>/lipforge-uploads`
pub fn default_scratch_root() -> PathBuf {
    std::env::temp_dir().join("lipforge-uploads")
}

/// Default recognizer location: `bin/rhubarb` next to the running executable
pub fn default_recognizer_binary() -> PathBuf {
    let name = if cfg!(target_os = "windows") {
        "rhubarb.exe"
    } else {
        "rhubarb"
    };

    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .map(|dir| dir.join("bin").join(name))
        .unwrap_or_else(|| PathBuf::from(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_leaves_other_fields_empty() {
        let config: EngineToml = toml::from_str(
            r#"
            [server]
            port = 4100

            [recognizer]
            watchdog_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, Some(4100));
        assert_eq!(config.server.host, None);
        assert_eq!(config.recognizer.watchdog_secs, Some(30));
        assert_eq!(config.compositor, CompositorSection::default());
    }

    #[test]
    fn scratch_root_under_temp() {
        let root = default_scratch_root();
        assert!(root.starts_with(std::env::temp_dir()));
        assert!(root.ends_with("lipforge-uploads"));
    }

    #[test]
    fn recognizer_lives_in_bin() {
        let binary = default_recognizer_binary();
        let parent = binary.parent().and_then(Path::file_name);
        assert_eq!(parent.and_then(|p| p.to_str()), Some("bin"));
    }
}
