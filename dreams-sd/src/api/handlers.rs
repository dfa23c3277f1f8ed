//! HTTP request handlers

use super::server::AppContext;
use crate::session::StreamSession;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::sse::{Event, Sse};
use axum::response::{Html, IntoResponse};
use axum::Json;
use dreams_common::play_counts::PlayCounts;
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

/// Encoded chunks buffered per connection before the encoder is held back
const STREAM_BUFFER_CHUNKS: usize = 8;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: String,
    songs: usize,
    play_counts: PlayCounts,
    total_plays: u64,
    active_streams: usize,
}

/// GET /stream - endless Ogg/Opus stream, one session per connection
pub async fn stream(State(ctx): State<AppContext>) -> impl IntoResponse {
    let (tx, rx) = mpsc::channel::<Bytes>(STREAM_BUFFER_CHUNKS);

    let session = StreamSession::new(
        Arc::clone(&ctx.selector),
        Arc::clone(&ctx.encoder),
        ctx.settings.clone(),
        ctx.events.clone(),
    );
    let guard = ctx.streams.register();
    info!(
        "New stream connection {} ({} active)",
        session.id(),
        ctx.streams.active()
    );

    tokio::spawn(async move {
        let _guard = guard;
        session.run(tx).await;
    });

    // Ends the body on daemon shutdown so graceful shutdown can complete
    let chunks = ReceiverStream::new(rx)
        .take_until(ctx.streams.closed())
        .map(Ok::<_, Infallible>);

    (
        [
            (header::CONTENT_TYPE, "audio/ogg"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(chunks),
    )
}

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    let play_counts = ctx.selector.play_counts().snapshot().await;
    let total_plays = play_counts.values().sum();

    Json(HealthResponse {
        status: "ok".to_string(),
        songs: ctx.selector.catalog().len(),
        play_counts,
        total_plays,
        active_streams: ctx.streams.active(),
    })
}

/// GET / - info page
pub async fn index(State(ctx): State<AppContext>) -> Html<String> {
    let songs = ctx.selector.catalog().len();
    let total_plays = ctx.selector.play_counts().total().await;
    let active = ctx.streams.active();

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Dreams Streaming Server</title>
<style>
  body {{ font-family: monospace; background: #0a0a0a; color: #00ff88; padding: 40px; max-width: 800px; margin: 0 auto; }}
  code {{ background: #1a1a1a; padding: 2px 6px; border-radius: 3px; }}
</style>
</head>
<body>
<h1>Dreams Streaming Server</h1>
<p>Endless ambient chord progressions.</p>

<h2>Endpoints</h2>
<ul>
  <li><code>GET /stream</code> - endless audio stream (Ogg/Opus)</li>
  <li><code>GET /health</code> - server health and statistics</li>
  <li><code>GET /events</code> - server-sent events</li>
</ul>

<h2>Stats</h2>
<p>Songs in catalog: {songs}</p>
<p>Total plays: {total_plays}</p>
<p>Active streams: {active}</p>

<audio controls src="/stream"></audio>
</body>
</html>
"#
    ))
}

/// GET /events - SSE event stream
pub async fn events(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    dreams_common::sse::event_stream(&ctx.events, "dreams-sd", ctx.streams.closed())
}
