//! HTTP server setup and routing
//!
//! Control endpoints, the status page and the SSE event stream for the
//! local player.

use crate::audio::{ClipLibrary, SharedVolume};
use crate::error::{Error, Result};
use crate::scheduler::Scheduler;
use axum::routing::{get, post};
use axum::Router;
use dreams_common::events::EventBus;
use dreams_common::sse::CloseSignal;
use sqlx::{Pool, Sqlite};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub scheduler: Scheduler,
    pub library: Arc<ClipLibrary>,
    pub events: EventBus,
    pub db_pool: Pool<Sqlite>,
    /// Master volume shared with the audio output (0.0-1.0)
    pub volume: SharedVolume,
    /// Fired when graceful shutdown starts; ends open `/events` streams
    pub closing: CloseSignal,
}

/// Build the router with all routes
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(super::handlers::index))
        .route("/health", get(super::handlers::health))
        // Playback control
        .route("/playback/start", post(super::handlers::start))
        .route("/playback/stop", post(super::handlers::stop))
        .route("/playback/status", get(super::handlers::status))
        .route("/catalog", get(super::handlers::catalog))
        // Audio
        .route("/audio/volume", get(super::handlers::get_volume))
        .route("/audio/volume", post(super::handlers::set_volume))
        // SSE event stream
        .route("/events", get(super::handlers::events))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Local control page and tools on other ports
        .layer(CorsLayer::permissive())
}

/// Serve the API until `shutdown` resolves
pub async fn run<F>(ctx: AppContext, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    serve(listener, ctx, shutdown).await
}

/// Serve on an already bound listener
///
/// Once `shutdown` resolves, open SSE responses are closed so the server
/// can drain and return.
pub async fn serve<F>(listener: TcpListener, ctx: AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let closing = ctx.closing.clone();
    let app = build_router(ctx);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Shutting down HTTP server");
            closing.close();
        })
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
