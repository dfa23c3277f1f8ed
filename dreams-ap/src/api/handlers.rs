//! HTTP request handlers

use super::server::AppContext;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::Html;
use axum::Json;
use chrono::Utc;
use dreams_common::events::{DreamsEvent, PlaybackState};
use dreams_common::{db, Clip, ClipId, Error};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::{error, info, warn};

const INDEX_HTML: &str = include_str!("index.html");

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize)]
pub struct ClipInfo {
    id: ClipId,
    name: String,
}

impl From<&Clip> for ClipInfo {
    fn from(clip: &Clip) -> Self {
        Self {
            id: clip.id,
            name: clip.name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlaybackStatusResponse {
    state: PlaybackState,
    now_playing: Option<ClipInfo>,
    next_up: Option<ClipInfo>,
    crossfading: bool,
}

#[derive(Debug, Serialize)]
pub struct CatalogEntry {
    id: ClipId,
    name: String,
    asset: String,
    play_count: u64,
    loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    clips: Vec<CatalogEntry>,
    total_plays: u64,
    /// False when play counts failed to load (uniform selection)
    counts_available: bool,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    volume: u8, // 0-100 user-facing scale
}

#[derive(Debug, Serialize)]
pub struct VolumeResponse {
    volume: u8,
}

type ApiError = (StatusCode, Json<StatusResponse>);

fn api_error(code: StatusCode, e: impl std::fmt::Display) -> ApiError {
    (
        code,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

fn ok() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

// ============================================================================
// Pages and health
// ============================================================================

/// GET / - Control page
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "dreams-ap".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Playback control
// ============================================================================

/// POST /playback/start
///
/// 409 when no clip could be started (asset missing or catalog exhausted).
pub async fn start(State(ctx): State<AppContext>) -> Result<Json<StatusResponse>, ApiError> {
    match ctx.scheduler.start().await {
        Ok(()) => {
            info!("Start command succeeded");
            Ok(ok())
        }
        Err(e @ (Error::AssetUnavailable { .. } | Error::EmptyCatalog)) => {
            warn!("Start command rejected: {}", e);
            Err(api_error(StatusCode::CONFLICT, e))
        }
        Err(e) => {
            error!("Start command failed: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e))
        }
    }
}

/// POST /playback/stop
pub async fn stop(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    ctx.scheduler.stop().await;
    info!("Stop command accepted");
    ok()
}

/// GET /playback/status
pub async fn status(State(ctx): State<AppContext>) -> Json<PlaybackStatusResponse> {
    let status = ctx.scheduler.status().await;
    Json(PlaybackStatusResponse {
        state: status.state,
        now_playing: status.now_playing.as_ref().map(ClipInfo::from),
        next_up: status.next_up.as_ref().map(ClipInfo::from),
        crossfading: status.crossfading,
    })
}

/// GET /catalog - clips with play counts and load status
pub async fn catalog(State(ctx): State<AppContext>) -> Json<CatalogResponse> {
    let selector = ctx.scheduler.selector();
    let store = selector.play_counts();
    let counts = store.snapshot().await;

    let clips = selector
        .catalog()
        .clips()
        .iter()
        .map(|clip| CatalogEntry {
            id: clip.id,
            name: clip.name.clone(),
            asset: clip.asset.clone(),
            play_count: counts.get(&clip.id).copied().unwrap_or(0),
            loaded: ctx.library.is_loaded(clip.id),
            error: ctx.library.failure(clip.id).map(str::to_string),
        })
        .collect();

    Json(CatalogResponse {
        clips,
        total_plays: counts.values().sum(),
        counts_available: store.is_available(),
    })
}

// ============================================================================
// Volume
// ============================================================================

fn read_volume(ctx: &AppContext) -> f32 {
    match ctx.volume.lock() {
        Ok(v) => *v,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

/// GET /audio/volume - 0-100
pub async fn get_volume(State(ctx): State<AppContext>) -> Json<VolumeResponse> {
    let volume = (read_volume(&ctx) * 100.0).round() as u8;
    Json(VolumeResponse { volume })
}

/// POST /audio/volume - 0-100, persisted in settings
pub async fn set_volume(
    State(ctx): State<AppContext>,
    Json(req): Json<VolumeRequest>,
) -> Result<Json<VolumeResponse>, ApiError> {
    if req.volume > 100 {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("volume {} out of range 0-100", req.volume),
        ));
    }

    let system_volume = req.volume as f32 / 100.0;
    let old_volume = read_volume(&ctx);
    match ctx.volume.lock() {
        Ok(mut v) => *v = system_volume,
        Err(poisoned) => *poisoned.into_inner() = system_volume,
    }

    if let Err(e) = db::set_volume(&ctx.db_pool, system_volume).await {
        warn!("Failed to persist volume: {}", e);
    }

    ctx.events.emit_lossy(DreamsEvent::VolumeChanged {
        volume: system_volume as f64,
        timestamp: Utc::now(),
    });

    info!(
        "Volume changed: {:.0}% -> {:.0}%",
        old_volume * 100.0,
        system_volume * 100.0
    );

    Ok(Json(VolumeResponse { volume: req.volume }))
}

// ============================================================================
// Events
// ============================================================================

/// GET /events - SSE event stream
pub async fn events(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    dreams_common::sse::event_stream(&ctx.events, "dreams-ap", ctx.closing.closed())
}
