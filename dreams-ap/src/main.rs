//! dreams-ap - local ambient chord player
//!
//! Loads the clip catalog, decodes every clip for the output device and
//! serves the control API. Playback starts on request (or immediately with
//! `--autostart`).

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use dreams_ap::api::{self, AppContext};
use dreams_ap::audio::{AudioOutput, ClipLibrary, SlotMixer};
use dreams_ap::{Mixer, Scheduler};
use dreams_common::config::{resolve_root_folder, Persistence, TomlConfig};
use dreams_common::events::EventBus;
use dreams_common::sse::CloseSignal;
use dreams_common::play_counts::{MemoryBackend, PlayCountBackend, SqliteBackend};
use dreams_common::{db, Catalog, PlayCountStore, Selector};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 5750;

#[derive(Parser, Debug)]
#[command(name = "dreams-ap")]
#[command(about = "Endless ambient chord player")]
#[command(version)]
struct Args {
    /// HTTP control port
    #[arg(short, long, env = "DREAMS_AP_PORT")]
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

    /// Output device name (default device when unset)
    #[arg(long, env = "DREAMS_AUDIO_DEVICE")]
    device: Option<String>,

    /// Play-count persistence: sqlite or memory
    #[arg(long, env = "DREAMS_PERSISTENCE")]
    persistence: Option<Persistence>,

    /// Fixed selector seed for reproducible sequences
    #[arg(long)]
    seed: Option<u64>,

    /// Start playing immediately
    #[arg(long)]
    autostart: bool,
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
        .unwrap_or_else(|| "dreams_ap=debug,dreams_common=info,tower_http=debug".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting dreams-ap v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), "DREAMS_ROOT_FOLDER", &toml_config);
    info!("Root folder: {}", root_folder.display());

    let port = args.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);
    let timing = toml_config.crossfade_timing().context("Invalid timing configuration")?;
    let curve = toml_config.fade_curve().context("Invalid fade curve")?;

    // Catalog and assets
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

    // Database (play counts and volume)
    let db_path = toml_config.database_path(&root_folder);
    let db_pool = db::init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let persistence = args
        .persistence
        .or(toml_config.persistence)
        .unwrap_or(Persistence::Sqlite);
    let backend: Arc<dyn PlayCountBackend> = match persistence {
        Persistence::Sqlite => Arc::new(SqliteBackend::new(db_pool.clone())),
        Persistence::Memory => Arc::new(MemoryBackend::new()),
    };
    let counts = Arc::new(PlayCountStore::open(&catalog, backend).await);

    let selector = Arc::new(match args.seed {
        Some(seed) => {
            info!("Selector seeded with {}", seed);
            Selector::with_seed(Arc::clone(&catalog), counts, seed)
        }
        None => Selector::new(Arc::clone(&catalog), counts),
    });

    // Audio pipeline
    let volume = Arc::new(Mutex::new(db::get_volume(&db_pool).await.unwrap_or_else(|e| {
        warn!("Failed to read volume, using 75%: {}", e);
        0.75
    })));
    let mut output =
        AudioOutput::open(args.device.as_deref(), Arc::clone(&volume)).context("Failed to open audio output")?;

    let library = Arc::new(ClipLibrary::load_all(&catalog, &audio_dir, output.sample_rate()).await);
    if library.loaded_count() == 0 {
        warn!("No clips could be loaded; playback will fail until assets are fixed");
    }

    let mixer = Arc::new(SlotMixer::new(Arc::clone(&library), curve));
    output
        .start(Arc::clone(&mixer))
        .context("Failed to start audio output")?;

    let events = EventBus::new(100);
    let mixer: Arc<dyn Mixer> = mixer;
    let scheduler = Scheduler::new(selector, mixer, timing, events.clone());
    info!(
        "Scheduler ready: clip {}s, crossfade {}s ({}), trigger at {}s",
        timing.clip_duration_s,
        timing.crossfade_s,
        curve,
        timing.trigger_offset_s()
    );

    if args.autostart {
        if let Err(e) = scheduler.start().await {
            error!("Autostart failed: {}", e);
        }
    }

    let ctx = AppContext {
        scheduler: scheduler.clone(),
        library,
        events,
        db_pool,
        volume,
        closing: CloseSignal::new(),
    };

    api::run(ctx, port, shutdown_signal())
        .await
        .context("HTTP server error")?;

    scheduler.stop().await;
    tokio::time::sleep(timing.stop_fade()).await;
    output.stop().context("Failed to stop audio output")?;

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
