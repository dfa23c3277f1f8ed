//! HTTP server setup and routing
//!
//! `/stream` hands each connection its own stream session; the rest is
//! read-only status.

use crate::encoder::SegmentEncoder;
use crate::session::{StreamSettings, StreamTracker};
use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use dreams_common::events::EventBus;
use dreams_common::{Result, Selector};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub selector: Arc<Selector>,
    pub encoder: Arc<dyn SegmentEncoder>,
    pub settings: StreamSettings,
    pub events: EventBus,
    pub streams: Arc<StreamTracker>,
}

/// Build the router with all routes
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(super::handlers::index))
        .route("/health", get(super::handlers::health))
        .route("/stream", get(super::handlers::stream))
        .route("/events", get(super::handlers::events))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Serve the API until `shutdown` resolves
pub async fn run<F>(ctx: AppContext, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Dreams stream daemon listening on {}", addr);
    info!("Stream URL: http://localhost:{}/stream", port);

    serve(listener, ctx, shutdown).await
}

/// Serve on an already bound listener
///
/// Once `shutdown` resolves, every open `/stream` and `/events` response is
/// ended so the server can drain and return.
pub async fn serve<F>(listener: TcpListener, ctx: AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let streams = Arc::clone(&ctx.streams);
    let app = build_router(ctx);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Closing {} open streams", streams.active());
            streams.close_all();
        })
        .await?;

    Ok(())
}
