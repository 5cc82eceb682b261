//! lipforge-engine - local lip-sync pipeline
//!
//! **Module Identity:**
//! - Name: lipforge-engine
//! - Port: 3001 (default)
//!
//! Serves the desktop client over HTTP, or runs a single analysis or export
//! from the command line.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use lipforge_common::cues::parse_recognizer_output;
use lipforge_common::{JobEvent, MouthShape};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lipforge_engine::models::{ExportConfig, JobKind, RenderOptions};
use lipforge_engine::services::{AnalysisRequest, ExportRequest, ShapeFrameSet};
use lipforge_engine::{AppState, ConfigOverrides, EngineConfig};

/// Command-line arguments for lipforge-engine
#[derive(Parser, Debug)]
#[command(name = "lipforge-engine")]
#[command(about = "Local lip-sync analysis and video export engine")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    overrides: ConfigOverrides,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Recognize one audio file and print job events to stdout
    Analyze {
        audio: PathBuf,

        /// Transcript guiding recognition
        #[arg(long)]
        dialog: Option<PathBuf>,

        /// Recognizer variant (default from config)
        #[arg(long)]
        recognizer: Option<String>,
    },

    /// Render one video from audio, cues and a frame directory
    Render {
        #[arg(long)]
        audio: PathBuf,

        /// Recognizer output (JSON or TSV)
        #[arg(long)]
        cues: PathBuf,

        /// Directory holding `<SHAPE>.<ext>` images (A.png … X.png)
        #[arg(long)]
        frames: PathBuf,

        #[arg(long, short)]
        output: PathBuf,

        #[arg(long, default_value_t = 512)]
        resolution: u32,

        #[arg(long, default_value = "#ffffff")]
        background: String,

        /// standard or high
        #[arg(long, default_value = "standard")]
        quality: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = EngineConfig::load(&cli.overrides).context("Failed to load configuration")?;

    // stdout carries job events in CLI mode
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.log_level))),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "Starting lipforge-engine v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE"),
    );
    info!("Recognizer: {}", config.recognizer_bin.display());
    info!("Compositor: {}", config.compositor_bin.display());

    let command = cli.command.unwrap_or(Command::Serve);
    if let Command::Serve = command {
        return serve(config).await;
    }

    // One-shot runs get a private scratch root so they never sweep a
    // running server's workspaces
    let mut config = config;
    let private_root = config
        .scratch_root
        .join(format!("cli-{}", std::process::id()));
    config.scratch_root = private_root.clone();

    let outcome = match command {
        Command::Serve => Ok(()),
        Command::Analyze {
            audio,
            dialog,
            recognizer,
        } => analyze(config, audio, dialog, recognizer).await,
        Command::Render {
            audio,
            cues,
            frames,
            output,
            resolution,
            background,
            quality,
        } => {
            let export = ExportConfig {
                video_res: resolution,
                video_bg_color: background,
                video_quality: quality.parse()?,
            };
            render(config, audio, &cues, &frames, &output, export).await
        }
    };

    if let Err(e) = std::fs::remove_dir_all(&private_root) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", private_root.display(), e);
        }
    }
    outcome
}

async fn serve(config: EngineConfig) -> Result<()> {
    let addr = config.bind_addr()?;
    let controller = config
        .build_controller()
        .context("Failed to prepare scratch workspace")?;
    let state = AppState::new(config, controller);
    let app = lipforge_engine::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.jobs.cancel_all();
    let swept = state.controller.workspace_root().purge();
    info!(swept, "Server shutdown complete");
    Ok(())
}

async fn analyze(
    config: EngineConfig,
    audio: PathBuf,
    dialog: Option<PathBuf>,
    variant: Option<String>,
) -> Result<()> {
    let controller = config.build_controller()?;
    let ctx = controller.begin(JobKind::Analysis).await?;
    let request = AnalysisRequest {
        audio: absolute(audio)?,
        dialog: dialog.map(absolute).transpose()?,
        variant,
    };

    let (tx, mut rx) = mpsc::channel::<JobEvent>(64);
    let cancel = CancellationToken::new();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print!("{}", event.to_line());
        }
    });

    let job = controller.run_analysis(ctx, request, tx, cancel.clone());
    let outcome = tokio::select! {
        outcome = job => outcome,
        _ = signal::ctrl_c() => {
            warn!("Interrupted");
            cancel.cancel();
            return Err(anyhow!("interrupted"));
        }
    };

    printer.await?;
    outcome.map(|_| ()).map_err(Into::into)
}

async fn render(
    config: EngineConfig,
    audio: PathBuf,
    cues_path: &Path,
    frames_dir: &Path,
    output: &Path,
    export: ExportConfig,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(cues_path)
        .await
        .with_context(|| format!("Failed to read cues from {}", cues_path.display()))?;
    let cues = parse_recognizer_output(&raw)?;
    let frames = frames_from_dir(frames_dir)?;
    let options = RenderOptions::try_from(export)?;

    let controller = config.build_controller()?;
    let ctx = controller.begin(JobKind::Export).await?;
    let request = ExportRequest {
        audio: absolute(audio)?,
        cues,
        frames,
        options,
    };

    let cancel = CancellationToken::new();
    let artifact = tokio::select! {
        artifact = controller.run_export(ctx, request, cancel.clone()) => artifact?,
        _ = signal::ctrl_c() => {
            cancel.cancel();
            return Err(anyhow!("interrupted"));
        }
    };

    tokio::fs::write(output, &artifact.bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(output = %output.display(), bytes = artifact.bytes.len(), "Video written");
    Ok(())
}

/// The recognizer runs from its install directory, so relative paths
/// are resolved against ours first
fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    Ok(std::env::current_dir()?.join(path))
}

/// Collect `<SHAPE>.<ext>` images from `dir`
fn frames_from_dir(dir: &Path) -> Result<ShapeFrameSet> {
    let mut frames = ShapeFrameSet::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read frame directory {}", dir.display()))?;

    for entry in entries {
        let path = entry?.path().canonicalize()?;
        let shape = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.to_ascii_uppercase().parse::<MouthShape>().ok());
        if let Some(shape) = shape {
            frames.insert(shape, path);
        }
    }

    if frames.is_empty() {
        return Err(anyhow!("No frames named A..H or X found in {}", dir.display()));
    }
    Ok(frames)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
