//! Server-Sent Events (SSE) utilities
//!
//! Turns an [`EventBus`] subscription into an axum SSE response. Shared by
//! the player and the stream daemon `/events` endpoints.
//!
//! SSE connections never end on their own, so each stream is tied to a
//! shutdown future; a server's graceful shutdown waits for open responses.

use crate::events::{DreamsEvent, EventBus};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

/// Keep-alive interval for idle SSE connections
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Render one event as an SSE frame (`event:` = type, `data:` = JSON)
pub fn to_sse_event(event: &DreamsEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            None
        }
    }
}

/// Shutdown flag shared by a server and its long-lived responses
#[derive(Debug, Clone)]
pub struct CloseSignal {
    closing: Arc<watch::Sender<bool>>,
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CloseSignal {
    pub fn new() -> Self {
        Self {
            closing: Arc::new(watch::channel(false).0),
        }
    }

    /// Ask every response waiting on this signal to end
    pub fn close(&self) {
        self.closing.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closing.borrow()
    }

    /// Resolves once `close` has been called, including before this call
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.closing.subscribe();
        async move {
            let _ = rx.wait_for(|closing| *closing).await;
        }
    }
}

/// SSE response streaming every event published on `bus` until `shutdown`
/// resolves
///
/// Starts with a `ConnectionStatus: connected` frame. Lagged subscribers skip
/// the events they missed.
pub fn event_stream(
    bus: &EventBus,
    service_name: &'static str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} events", service_name);

    let connected = stream::once(async {
        Ok::<_, Infallible>(Event::default().event("ConnectionStatus").data("connected"))
    });

    let events = BroadcastStream::new(bus.subscribe()).filter_map(|result| async move {
        match result {
            Ok(event) => {
                debug!("Broadcasting SSE event: {}", event.event_type());
                to_sse_event(&event).map(Ok)
            }
            Err(e) => {
                // Lagged receiver
                warn!("SSE stream error: {:?}", e);
                None
            }
        }
    });

    Sse::new(connected.chain(events).take_until(shutdown)).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}
