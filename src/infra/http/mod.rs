mod api;
mod auth;
pub mod error;
mod events;
mod middleware;

pub use api::{ApiState, HistoryQuery, build_api_router};
pub use auth::{AuthError, GatewayHeaderVerifier, SessionVerifier};
pub use events::{EventsState, ViewerStreamSettings, build_events_router};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::error::ErrorReport;
use crate::application::repos::HealthRepo;
use crate::cache::FastCache;

/// `204` when both stores answer, `503` with the first failure otherwise.
async fn health_response(health: &dyn HealthRepo, cache: &dyn FastCache) -> Response {
    if let Err(err) = health.health_check().await {
        return unhealthy("infra::http::db_health", &err);
    }
    if let Err(err) = cache.ping().await {
        return unhealthy("infra::http::cache_health", &err);
    }
    StatusCode::NO_CONTENT.into_response()
}

fn unhealthy(source: &'static str, err: &dyn std::error::Error) -> Response {
    let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
    ErrorReport::from_error(source, StatusCode::SERVICE_UNAVAILABLE, err).attach(&mut response);
    response
}
