//! Placement API listener.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
    middleware as axum_middleware,
    response::Response,
    routing::{get, post},
};
use pixelwar_api_types::{
    CanvasResponse, CooldownResponse, HistoryResponse, PaletteEntry, PaletteResponse,
    PlacementRequest, PlacementView,
};
use serde::Deserialize;

use crate::application::cooldown::CooldownLimiter;
use crate::application::placement::{PlacementCommand, PlacementService};
use crate::application::repos::HealthRepo;
use crate::application::snapshot::CanvasService;
use crate::cache::FastCache;
use crate::domain::canvas::{ContributorId, Coordinate};
use crate::domain::palette::Color;

use super::auth::SessionVerifier;
use super::error::ApiError;
use super::health_response;
use super::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct ApiState {
    pub placements: Arc<PlacementService>,
    pub canvas: Arc<CanvasService>,
    pub limiter: Arc<CooldownLimiter>,
    pub verifier: Arc<dyn SessionVerifier>,
    pub health: Arc<dyn HealthRepo>,
    pub cache: Arc<dyn FastCache>,
}

pub fn build_api_router(state: ApiState) -> Router {
    Router::new()
        .route("/pixel", post(place_pixel))
        .route("/pixel/{x}/{y}", get(get_pixel))
        .route("/pixel/{x}/{y}/history", get(get_pixel_history))
        .route("/canvas", get(get_canvas))
        .route("/cooldown/{player}", get(get_cooldown))
        .route("/palette", get(get_palette))
        .route("/health", get(health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

async fn place_pixel(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<PlacementRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PlacementView>), ApiError> {
    let contributor = state.verifier.verify(&headers)?;
    let Json(request) =
        body.map_err(|err| ApiError::bad_request("Malformed placement", Some(err.body_text())))?;

    let command = PlacementCommand {
        coordinate: Coordinate::new(request.x, request.y),
        color: request.color,
        claimed_contributor: request.player,
    };
    let placement = state.placements.submit(&contributor, command).await?;

    Ok((StatusCode::CREATED, Json(PlacementView::from(&placement))))
}

async fn get_canvas(State(state): State<ApiState>) -> Result<Json<CanvasResponse>, ApiError> {
    let snapshot = state.canvas.snapshot().await?;
    Ok(Json(snapshot.to_response()))
}

async fn get_cooldown(
    State(state): State<ApiState>,
    Path(player): Path<String>,
) -> Result<Json<CooldownResponse>, ApiError> {
    let contributor = ContributorId::parse(player)
        .map_err(|err| ApiError::bad_request("Invalid player", Some(err.to_string())))?;
    let remaining_seconds = state.limiter.remaining(&contributor).await?;
    Ok(Json(CooldownResponse { remaining_seconds }))
}

async fn get_pixel(
    State(state): State<ApiState>,
    path: Result<Path<(i32, i32)>, PathRejection>,
) -> Result<Json<PlacementView>, ApiError> {
    let coordinate = cell_coordinate(&state, path)?;
    match state.canvas.cell(coordinate).await? {
        Some(placement) => Ok(Json(PlacementView::from(&placement))),
        None => Err(ApiError::not_found("Cell has never been placed")),
    }
}

async fn get_pixel_history(
    State(state): State<ApiState>,
    path: Result<Path<(i32, i32)>, PathRejection>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let coordinate = cell_coordinate(&state, path)?;
    let Query(query) =
        query.map_err(|err| ApiError::bad_request("Invalid history query", Some(err.body_text())))?;
    let entries = state
        .canvas
        .history(coordinate, query.limit)
        .await?
        .iter()
        .map(PlacementView::from)
        .collect();

    Ok(Json(HistoryResponse {
        x: coordinate.x,
        y: coordinate.y,
        entries,
    }))
}

async fn get_palette() -> Json<PaletteResponse> {
    let colors = Color::ALL
        .into_iter()
        .map(|color| PaletteEntry {
            name: color.name().to_string(),
            hex: color.hex().to_string(),
        })
        .collect();
    Json(PaletteResponse { colors })
}

async fn health(State(state): State<ApiState>) -> Response {
    health_response(state.health.as_ref(), state.cache.as_ref()).await
}

fn cell_coordinate(
    state: &ApiState,
    path: Result<Path<(i32, i32)>, PathRejection>,
) -> Result<Coordinate, ApiError> {
    let Path((x, y)) =
        path.map_err(|err| ApiError::bad_request("Invalid cell", Some(err.body_text())))?;
    let coordinate = Coordinate::new(x, y);
    let bounds = state.placements.bounds();
    if !bounds.contains(coordinate) {
        return Err(ApiError::bad_request(
            "Cell is outside the canvas",
            Some(format!(
                "x must be in 0..{} and y in 0..{}",
                bounds.width(),
                bounds.height()
            )),
        ));
    }
    Ok(coordinate)
}
