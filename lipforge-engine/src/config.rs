//! Configuration resolution for lipforge-engine
//!
//! Every setting is resolved once at startup with CLI → ENV → TOML → default
//! priority. Command-line and environment tiers come from [`ConfigOverrides`]
//! (clap reads both); the TOML tier is [`EngineToml`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use lipforge_common::config::{
    default_recognizer_binary, default_scratch_root, resolve_toml_config, EngineToml,
};
use lipforge_common::{Error, Result};
use tracing::info;

use crate::services::{
    AudioNormalizer, EncodingPolicy, JobController, RecognitionRunner, RenderRunner,
    TimelineCompiler, WorkspaceRoot,
};

/// Settings accepted on the command line or from the environment
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Config file (default: <config dir>/lipforge/engine.toml)
    #[arg(long, global = true, env = "LIPFORGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, global = true, env = "LIPFORGE_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, global = true, env = "LIPFORGE_PORT")]
    pub port: Option<u16>,

    /// Directory holding per-job workspaces
    #[arg(long, global = true, env = "LIPFORGE_SCRATCH_ROOT")]
    pub scratch_root: Option<PathBuf>,

    /// Phoneme recognition binary
    #[arg(long, global = true, env = "LIPFORGE_RECOGNIZER_BIN")]
    pub recognizer_bin: Option<PathBuf>,

    /// ffmpeg binary, used for normalization and rendering
    #[arg(long, global = true, env = "LIPFORGE_FFMPEG_BIN")]
    pub ffmpeg_bin: Option<PathBuf>,

    /// Seconds of recognizer silence before it is considered hung
    #[arg(long, global = true, env = "LIPFORGE_WATCHDOG_SECS")]
    pub watchdog_secs: Option<u64>,
}

/// Fully resolved engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub scratch_root: PathBuf,

    pub recognizer_bin: PathBuf,
    pub asset_dir: String,
    pub watchdog: Duration,
    pub default_variant: String,
    pub recognizer_log_level: String,

    pub normalizer_bin: PathBuf,
    pub sample_rate: u32,

    pub compositor_bin: PathBuf,
    pub encoding: EncodingPolicy,
    pub render_watchdog: Option<Duration>,

    pub min_segment_secs: f64,
    pub final_hold_secs: f64,

    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            max_upload_bytes: 512 * 1024 * 1024,
            scratch_root: default_scratch_root(),
            recognizer_bin: default_recognizer_binary(),
            asset_dir: "res".to_string(),
            watchdog: Duration::from_secs(120),
            default_variant: "pocketSphinx".to_string(),
            recognizer_log_level: "Info".to_string(),
            normalizer_bin: PathBuf::from("ffmpeg"),
            sample_rate: AudioNormalizer::DEFAULT_SAMPLE_RATE,
            compositor_bin: PathBuf::from("ffmpeg"),
            encoding: EncodingPolicy::default(),
            render_watchdog: None,
            min_segment_secs: TimelineCompiler::DEFAULT_MIN_SEGMENT,
            final_hold_secs: TimelineCompiler::DEFAULT_FINAL_HOLD,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load the TOML tier and merge it with `overrides`
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let toml = resolve_toml_config(overrides.config.as_deref())?;
        Self::resolve(overrides, toml)
    }

    /// Merge already-loaded tiers
    pub fn resolve(overrides: &ConfigOverrides, toml: EngineToml) -> Result<Self> {
        let defaults = Self::default();
        let EngineToml {
            server,
            workspace,
            recognizer,
            normalizer,
            compositor,
            timeline,
            logging,
        } = toml;

        // A single ffmpeg override covers both roles
        let ffmpeg = overrides.ffmpeg_bin.clone();

        let watchdog_secs = overrides.watchdog_secs.or(recognizer.watchdog_secs);
        if watchdog_secs == Some(0) {
            return Err(Error::Config("watchdog_secs must be at least 1".to_string()));
        }

        let encoding = EncodingPolicy {
            preset: compositor.preset.unwrap_or(defaults.encoding.preset),
            crf_standard: compositor.crf_standard.unwrap_or(defaults.encoding.crf_standard),
            crf_high: compositor.crf_high.unwrap_or(defaults.encoding.crf_high),
            audio_bitrate: compositor
                .audio_bitrate
                .unwrap_or(defaults.encoding.audio_bitrate),
        };

        let config = Self {
            host: overrides.host.clone().or(server.host).unwrap_or(defaults.host),
            port: overrides.port.or(server.port).unwrap_or(defaults.port),
            max_upload_bytes: server
                .max_upload_mb
                .map(|mb| mb.saturating_mul(1024 * 1024))
                .unwrap_or(defaults.max_upload_bytes),
            scratch_root: overrides
                .scratch_root
                .clone()
                .or(workspace.scratch_root)
                .unwrap_or(defaults.scratch_root),
            recognizer_bin: overrides
                .recognizer_bin
                .clone()
                .or(recognizer.binary)
                .unwrap_or(defaults.recognizer_bin),
            asset_dir: recognizer.asset_dir.unwrap_or(defaults.asset_dir),
            watchdog: watchdog_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.watchdog),
            default_variant: recognizer
                .default_variant
                .unwrap_or(defaults.default_variant),
            recognizer_log_level: recognizer
                .log_level
                .unwrap_or(defaults.recognizer_log_level),
            normalizer_bin: ffmpeg
                .clone()
                .or(normalizer.binary)
                .unwrap_or(defaults.normalizer_bin),
            sample_rate: normalizer
                .sample_rate
                .filter(|rate| *rate > 0)
                .unwrap_or(defaults.sample_rate),
            compositor_bin: ffmpeg
                .or(compositor.binary)
                .unwrap_or(defaults.compositor_bin),
            encoding,
            render_watchdog: compositor
                .watchdog_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            min_segment_secs: timeline
                .min_segment_secs
                .unwrap_or(defaults.min_segment_secs),
            final_hold_secs: timeline.final_hold_secs.unwrap_or(defaults.final_hold_secs),
            log_level: logging.level.unwrap_or(defaults.log_level),
        };

        Ok(config)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address {}:{}: {}", self.host, self.port, e)))
    }

    /// Prepare the scratch root and assemble the runners
    pub fn build_controller(&self) -> Result<JobController> {
        let workspace = WorkspaceRoot::prepare(&self.scratch_root)?;
        info!(scratch_root = %workspace.path().display(), "Workspace root ready");

        let recognizer = RecognitionRunner::new(
            &self.recognizer_bin,
            self.asset_dir.clone(),
            self.watchdog,
            self.recognizer_log_level.clone(),
        );
        if !recognizer.assets_present() {
            tracing::warn!(
                binary = %recognizer.binary().display(),
                asset_dir = %self.asset_dir,
                "Recognizer assets not found; analysis jobs will fail until they are installed"
            );
        }

        Ok(JobController::new(
            workspace,
            AudioNormalizer::new(&self.normalizer_bin, self.sample_rate),
            recognizer,
            TimelineCompiler::new(self.min_segment_secs, self.final_hold_secs),
            RenderRunner::new(&self.compositor_bin, self.encoding.clone(), self.render_watchdog),
            self.default_variant.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toml(text: &str) -> EngineToml {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn defaults_without_any_source() {
        let config = EngineConfig::resolve(&ConfigOverrides::default(), EngineToml::default()).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.watchdog, Duration::from_secs(120));
        assert_eq!(config.default_variant, "pocketSphinx");
        assert_eq!(config.encoding.crf_standard, 23);
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:3001");
    }

    #[test]
    fn cli_beats_toml_beats_default() {
        let file = toml(
            r#"
            [server]
            port = 4000
            host = "0.0.0.0"

            [recognizer]
            watchdog_secs = 30
            default_variant = "phonetic"
            "#,
        );
        let overrides = ConfigOverrides {
            port: Some(5000),
            ..Default::default()
        };

        let config = EngineConfig::resolve(&overrides, file).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.watchdog, Duration::from_secs(30));
        assert_eq!(config.default_variant, "phonetic");
    }

    #[test]
    fn ffmpeg_override_covers_both_roles() {
        let file = toml(
            r#"
            [normalizer]
            binary = "/opt/a/ffmpeg"
            [compositor]
            binary = "/opt/b/ffmpeg"
            "#,
        );
        let overrides = ConfigOverrides {
            ffmpeg_bin: Some(PathBuf::from("/usr/local/bin/ffmpeg")),
            ..Default::default()
        };

        let config = EngineConfig::resolve(&overrides, file).unwrap();
        assert_eq!(config.normalizer_bin, PathBuf::from("/usr/local/bin/ffmpeg"));
        assert_eq!(config.compositor_bin, PathBuf::from("/usr/local/bin/ffmpeg"));
    }

    #[test]
    fn zero_watchdog_rejected() {
        let overrides = ConfigOverrides {
            watchdog_secs: Some(0),
            ..Default::default()
        };
        assert!(EngineConfig::resolve(&overrides, EngineToml::default()).is_err());
    }
}
