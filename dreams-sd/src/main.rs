//! dreams-sd - ambient chord stream daemon
//!
//! Serves `/stream` (Ogg/Opus), `/health`, an info page and SSE events.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dreams_common::config::{resolve_root_folder, Persistence, TomlConfig};
use dreams_common::events::EventBus;
use dreams_common::play_counts::{MemoryBackend, PlayCountBackend, SqliteBackend};
use dreams_common::{db, Catalog, PlayCountStore, Selector};
use dreams_sd::api::{self, AppContext};
use dreams_sd::{FfmpegEncoder, SegmentEncoder, StreamSettings, StreamTracker};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 3000;

#[derive(Parser, Debug)]
#[command(name = "dreams-sd")]
#[command(about = "Endless ambient chord stream server")]
#[command(version)]
struct Args {
    /// HTTP port (falls back to PORT)
    #[arg(short, long, env = "DREAMS_SD_PORT")]
    port: Option<u16>,

    /// Root folder holding audio, database and catalog
    #[arg(short, long, env = "DREAMS_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Config file (defaults to the platform config location)
    #[arg(short, long, env = "DREAMS_CONFIG")]
    config: Option<PathBuf>,

    /// Directory with the clip audio files
    #[arg(long, env = "DREAMS_AUDIO_DIR")]
    audio_dir: Option<PathBuf>,

    /// Play-count persistence: sqlite or memory
    #[arg(long, env = "DREAMS_PERSISTENCE")]
    persistence: Option<Persistence>,

    /// ffmpeg binary used to encode segments
    #[arg(long, env = "DREAMS_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Fixed selector seed for reproducible sequences
    #[arg(long)]
    seed: Option<u64>,
}

/// `PORT` as used by common hosting platforms
fn port_from_env() -> Option<u16> {
    let value = std::env::var("PORT").ok()?;
    match value.parse() {
        Ok(port) => Some(port),
        Err(_) => {
            warn!("Ignoring invalid PORT value {:?}", value);
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config =
        TomlConfig::load_or_default(args.config.as_deref()).context("Failed to load config file")?;

    let default_filter = toml_config
        .logging
        .level
        .clone()
        .unwrap_or_else(|| "dreams_sd=info,dreams_common=info,tower_http=info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting dreams-sd v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), "DREAMS_ROOT_FOLDER", &toml_config);
    info!("Root folder: {}", root_folder.display());

    let port = args
        .port
        .or_else(port_from_env)
        .or(toml_config.port)
        .unwrap_or(DEFAULT_PORT);
    let timing = toml_config.crossfade_timing().context("Invalid timing configuration")?;
    let curve = toml_config.fade_curve().context("Invalid fade curve")?;

    let catalog_file = toml_config.catalog_file(&root_folder);
    let catalog = Arc::new(
        Catalog::load_or_default(catalog_file.as_deref()).context("Failed to load clip catalog")?,
    );
    let audio_dir = args
        .audio_dir
        .clone()
        .unwrap_or_else(|| toml_config.audio_dir(&root_folder));
    info!("Audio directory: {}", audio_dir.display());
    catalog.missing_assets(&audio_dir);

    // Play counts reset on restart unless sqlite persistence is chosen
    let persistence = args
        .persistence
        .or(toml_config.persistence)
        .unwrap_or(Persistence::Memory);
    let backend: Arc<dyn PlayCountBackend> = match persistence {
        Persistence::Sqlite => {
            let db_path = toml_config.database_path(&root_folder);
            let pool = db::init_database(&db_path)
                .await
                .with_context(|| format!("Failed to open database {}", db_path.display()))?;
            Arc::new(SqliteBackend::new(pool))
        }
        Persistence::Memory => Arc::new(MemoryBackend::new()),
    };
    let counts = Arc::new(PlayCountStore::open(&catalog, backend).await);
    info!("Play counts: {} backend", counts.backend_name());

    let selector = Arc::new(match args.seed {
        Some(seed) => {
            info!("Selector seeded with {}", seed);
            Selector::with_seed(Arc::clone(&catalog), counts, seed)
        }
        None => Selector::new(Arc::clone(&catalog), counts),
    });

    let ffmpeg = FfmpegEncoder::new(&args.ffmpeg);
    if let Err(e) = ffmpeg.probe().await {
        warn!("Encoder check failed, streams will fail until fixed: {}", e);
    }
    let encoder: Arc<dyn SegmentEncoder> = Arc::new(ffmpeg);

    info!(
        "Segments: clip {}s, crossfade {}s ({}), trigger at {}s",
        timing.clip_duration_s,
        timing.crossfade_s,
        curve,
        timing.trigger_offset_s()
    );

    let ctx = AppContext {
        selector,
        encoder,
        settings: StreamSettings {
            audio_dir,
            timing,
            curve,
        },
        events: EventBus::new(100),
        streams: Arc::new(StreamTracker::new()),
    };

    api::run(ctx, port, shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
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
