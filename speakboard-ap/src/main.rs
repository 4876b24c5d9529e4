//! Audio Player (speakboard-ap) - Main entry point
//!
//! Playback service for the communication board: single clips, spoken
//! sentences, preloading and stop, over HTTP with an SSE event stream.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use speakboard_ap::api;
use speakboard_ap::media::device::DeviceResolver;
use speakboard_ap::{AudioManager, PlaybackSettings};
use speakboard_common::config::{ConfigOverrides, PlayerConfig};
use speakboard_common::{EventBus, FailurePolicy};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for speakboard-ap
#[derive(Parser, Debug)]
#[command(name = "speakboard-ap")]
#[command(about = "Audio Player for the Speakboard communication board")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "SPEAKBOARD_PORT")]
    port: Option<u16>,

    /// Folder that relative clip paths are resolved against
    #[arg(short = 'r', long, env = "SPEAKBOARD_CLIP_ROOT")]
    clip_root: Option<PathBuf>,

    /// Config file (defaults to the platform config location)
    #[arg(short, long, env = "SPEAKBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// How long a clip may take to become playable
    #[arg(long, env = "SPEAKBOARD_READINESS_TIMEOUT_MS")]
    readiness_timeout_ms: Option<u64>,

    /// Pause between clips of a sentence
    #[arg(long, env = "SPEAKBOARD_INTER_CLIP_GAP_MS")]
    inter_clip_gap_ms: Option<u64>,

    /// What a sentence does when a clip fails: fail_fast or skip_failed
    #[arg(long, env = "SPEAKBOARD_FAILURE_POLICY")]
    failure_policy: Option<FailurePolicy>,

    /// Audio output device name
    #[arg(long, env = "SPEAKBOARD_OUTPUT_DEVICE")]
    output_device: Option<String>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, env = "SPEAKBOARD_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            port: self.port,
            clip_root: self.clip_root.clone(),
            readiness_timeout_ms: self.readiness_timeout_ms,
            inter_clip_gap_ms: self.inter_clip_gap_ms,
            failure_policy: self.failure_policy,
            output_device: self.output_device.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = PlayerConfig::resolve(&args.overrides(), args.config.as_deref())
        .context("Failed to resolve configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "speakboard_ap={level},speakboard_common={level},tower_http=info",
                    level = config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Speakboard Audio Player on port {}", config.port);
    info!("Clip root: {}", config.clip_root.display());
    if let Some(device) = &config.output_device {
        info!("Output device: {}", device);
    }

    let resolver = DeviceResolver::new(config.clip_root.clone(), config.output_device.clone());
    let manager = Arc::new(AudioManager::new(
        Arc::new(resolver),
        PlaybackSettings::from(&config),
        EventBus::default(),
    ));

    let app_state = api::AppState {
        manager: Arc::clone(&manager),
        port: config.port,
    };

    api::serve(app_state, shutdown_signal())
        .await
        .context("Server error")?;

    manager.stop_all();
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
