//! Viewer event stream listener.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::{
    Router,
    extract::State,
    middleware as axum_middleware,
    response::{
        Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use futures::Stream;
use pixelwar_api_types::{UPDATE_EVENT_NAME, UpdateEventPayload};
use tracing::{debug, warn};

use crate::application::repos::HealthRepo;
use crate::cache::FastCache;
use crate::realtime::{ChannelViewer, SessionId, SessionManager};

use super::health_response;
use super::middleware::{log_responses, set_request_context};

#[derive(Debug, Clone, Copy)]
pub struct ViewerStreamSettings {
    pub session_buffer: usize,
    pub delivery_timeout: Duration,
    pub heartbeat: Duration,
}

#[derive(Clone)]
pub struct EventsState {
    pub sessions: Arc<SessionManager>,
    pub stream: ViewerStreamSettings,
    pub health: Arc<dyn HealthRepo>,
    pub cache: Arc<dyn FastCache>,
}

pub fn build_events_router(state: EventsState) -> Router {
    Router::new()
        .route("/events", get(stream_events))
        .route("/health", get(health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

/// Unregisters the viewer when its stream is dropped.
struct SessionGuard {
    sessions: Arc<SessionManager>,
    id: SessionId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.sessions.unregister(self.id) {
            debug!(target = "pixelwar::http::events", session_id = %self.id, "Viewer stream closed");
        }
    }
}

async fn stream_events(
    State(state): State<EventsState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (viewer, mut receiver) =
        ChannelViewer::new(state.stream.session_buffer, state.stream.delivery_timeout);
    let id = state.sessions.register(Arc::new(viewer));
    let guard = SessionGuard {
        sessions: Arc::clone(&state.sessions),
        id,
    };

    let events = stream! {
        let _guard = guard;
        while let Some(event) = receiver.recv().await {
            let payload = UpdateEventPayload::from(&event);
            match Event::default().event(UPDATE_EVENT_NAME).json_data(&payload) {
                Ok(sse_event) => yield Ok::<Event, Infallible>(sse_event),
                Err(err) => warn!(
                    target = "pixelwar::http::events",
                    session_id = %id,
                    error = %err,
                    "Update event could not be encoded"
                ),
            }
        }
    };

    Sse::new(events).keep_alive(KeepAlive::new().interval(state.stream.heartbeat))
}

async fn health(State(state): State<EventsState>) -> Response {
    health_response(state.health.as_ref(), state.cache.as_ref()).await
}
