//! Chime Audio Manager (chime-am) - command-line player
//!
//! Preloads the given clips, then plays them either as a sequence or each
//! after a fixed delay. Useful for exercising both backends on a real
//! machine.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chime_am::config::BackendPreference;
use chime_am::{ManagerConfig, PlayOptions, SequenceEntry, SoundManager};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for chime-am
#[derive(Parser, Debug)]
#[command(name = "chime-am")]
#[command(about = "Play short audio clips with precise timing")]
#[command(version)]
struct Args {
    /// Config file (overrides CHIME_CONFIG and the default locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Global volume (0.0 - 1.0)
    #[arg(long)]
    volume: Option<f32>,

    /// Start muted
    #[arg(long)]
    mute: bool,

    /// Backend preference: auto, fallback or headless
    #[arg(long, env = "CHIME_BACKEND")]
    backend: Option<BackendPreference>,

    /// Play each clip after this delay (ms) instead of as a sequence
    #[arg(long, allow_negative_numbers = true)]
    delay_ms: Option<i64>,

    /// Per-play volume applied to every clip
    #[arg(long, default_value_t = 1.0)]
    clip_volume: f32,

    /// Print manager events to stdout as JSON lines
    #[arg(long)]
    events: bool,

    /// Clip identifiers (paths or URLs)
    #[arg(required = true)]
    ids: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path =
        chime_common::config::resolve_config_path(args.config.as_deref(), chime_common::config::CONFIG_ENV_VAR);
    let mut config = ManagerConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing (RUST_LOG wins over the configured level)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("chime_am={0},chime_common={0}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting chime-am {} ({}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("No config file found, using defaults"),
    }

    if let Some(backend) = args.backend {
        config.playback.backend = backend;
    }
    if let Some(volume) = args.volume {
        config.playback.volume = volume;
    }
    config.playback.muted |= args.mute;
    let config = config.validate().context("Invalid configuration")?;

    let manager = SoundManager::new(config).context("Failed to create sound manager")?;

    if args.events {
        let mut events = manager.subscribe_events();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("Failed to serialize event: {}", e),
                }
            }
        });
    }

    let backend = manager.init().await;
    info!("Backend: {}", backend);

    manager.preload_sounds(&args.ids).await;

    tokio::select! {
        result = run(&manager, &args) => result,
        _ = shutdown_signal() => Ok(()),
    }
}

async fn run(manager: &SoundManager, args: &Args) -> Result<()> {
    match args.delay_ms {
        Some(delay_ms) => {
            let plays = args.ids.iter().map(|id| {
                let options = PlayOptions::new().with_volume(args.clip_volume);
                manager.schedule_play(id, delay_ms, options)
            });
            for result in futures::future::join_all(plays).await {
                result.context("Scheduled play failed")?;
            }
        }
        None => {
            let entries = args.ids.iter().map(|id| {
                SequenceEntry::new(id.as_str())
                    .with_options(PlayOptions::new().with_volume(args.clip_volume))
            });
            manager
                .play_sequence(entries)
                .await
                .context("Sequence playback failed")?;
        }
    }

    info!("Playback complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
