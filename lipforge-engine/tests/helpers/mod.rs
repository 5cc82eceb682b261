//! Shared fixtures for integration tests
//!
//! External tools are replaced by small POSIX shell scripts installed into a
//! temporary directory laid out like a real engine bundle:
//!
//! ```text
//! <tmp>/bin/rhubarb
//! <tmp>/bin/res/
//! <tmp>/bin/ffmpeg
//! <tmp>/scratch/
//! ```

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lipforge_common::JobEvent;
use lipforge_engine::services::{
    AudioNormalizer, EncodingPolicy, JobController, RecognitionRunner, RenderRunner,
    TimelineCompiler, WorkspaceRoot,
};
use lipforge_engine::EngineConfig;
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const CUES_JSON: &str = r#"{"metadata":{"soundFile":"audio.wav","duration":1.00},"mouthCues":[{"start":0.00,"end":0.50,"value":"A"},{"start":0.50,"end":1.00,"value":"X"}]}"#;

/// Recognizer that reports progress on stderr and prints cues
pub fn rhubarb_ok() -> String {
    format!(
        r#"#!/bin/sh
echo "Generating lip sync data for $7" >&2
echo "Progress: [##        ] 10%" >&2
echo "Progress: [#####     ] 50%" >&2
echo "Progress: [##########] 100%" >&2
printf '%s' '{}'
"#,
        CUES_JSON
    )
}

/// Recognizer that rejects normalized input but accepts the raw upload
pub fn rhubarb_rejects_normalized() -> String {
    format!(
        r#"#!/bin/sh
case "$7" in
  *normalized.wav)
    echo "Progress: 40%" >&2
    echo "[Error] Error processing file: unsupported sample format" >&2
    exit 1
    ;;
esac
echo "Progress: 10%" >&2
echo "Progress: 100%" >&2
printf '%s' '{}'
"#,
        CUES_JSON
    )
}

/// Recognizer that goes silent forever
pub const RHUBARB_SILENT: &str = "#!/bin/sh\nexec sleep 30\n";

/// Recognizer that always fails
pub const RHUBARB_FAILS: &str =
    "#!/bin/sh\necho 'Progress: 30%' >&2\necho '[Fatal] Unsupported audio file' >&2\nexit 2\n";

/// Converter/compositor that logs its arguments and writes its last one
pub const FFMPEG_OK: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/ffmpeg.log"
for arg in "$@"; do out="$arg"; done
printf 'fake' > "$out"
"#;

pub const FFMPEG_FAILS: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/ffmpeg.log"
echo "Invalid data found when processing input" >&2
exit 1
"#;

/// Compositor that logs its arguments, then stalls
pub const FFMPEG_STALLS: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/ffmpeg.log"
exec sleep 30
"#;

/// Temporary engine installation
pub struct Bundle {
    pub dir: TempDir,
}

impl Bundle {
    pub fn new(rhubarb: &str, ffmpeg: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(bin.join("res")).unwrap();
        std::fs::create_dir_all(dir.path().join("scratch")).unwrap();
        install_script(&bin.join("rhubarb"), rhubarb);
        install_script(&bin.join("ffmpeg"), ffmpeg);
        Self { dir }
    }

    pub fn bin(&self) -> PathBuf {
        self.dir.path().join("bin")
    }

    pub fn rhubarb(&self) -> PathBuf {
        self.bin().join("rhubarb")
    }

    pub fn ffmpeg(&self) -> PathBuf {
        self.bin().join("ffmpeg")
    }

    pub fn scratch(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }

    pub fn remove_assets(&self) {
        std::fs::remove_dir_all(self.bin().join("res")).unwrap();
    }

    /// Arguments of every ffmpeg call, one line per call
    pub fn ffmpeg_log(&self) -> String {
        std::fs::read_to_string(self.bin().join("ffmpeg.log")).unwrap_or_default()
    }

    /// Write an input file next to the bundle
    pub fn input(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Job workspaces still present under the scratch root
    pub fn live_workspaces(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.scratch())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    pub fn controller(&self, watchdog: Duration) -> JobController {
        JobController::new(
            WorkspaceRoot::prepare(self.scratch()).unwrap(),
            AudioNormalizer::new(self.ffmpeg(), AudioNormalizer::DEFAULT_SAMPLE_RATE),
            RecognitionRunner::new(self.rhubarb(), "res", watchdog, "Info"),
            TimelineCompiler::default(),
            RenderRunner::new(self.ffmpeg(), EncodingPolicy::default(), None),
            "pocketSphinx",
        )
    }

    pub fn config(&self) -> EngineConfig {
        EngineConfig {
            scratch_root: self.scratch(),
            recognizer_bin: self.rhubarb(),
            normalizer_bin: self.ffmpeg(),
            compositor_bin: self.ffmpeg(),
            watchdog: Duration::from_secs(5),
            ..EngineConfig::default()
        }
    }
}

fn install_script(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Poll `condition` for up to three seconds
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..60 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}

/// Everything left in the channel once the job has finished
pub fn drain(rx: &mut mpsc::Receiver<JobEvent>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn progress_values(events: &[JobEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|event| match event {
            JobEvent::Progress { value } => Some(*value),
            _ => None,
        })
        .collect()
}

/// Hand-built `multipart/form-data` body
pub struct MultipartBody {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self {
            boundary: "lipforge-test-boundary".to_string(),
            body: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                self.boundary, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, contents: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                self.boundary, name, file_name
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(contents);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// (content type, body)
    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", self.boundary),
            self.body,
        )
    }
}
