mod support;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderName, Request, StatusCode, header};
use futures::StreamExt;
use pixelwar::domain::canvas::{Coordinate, UpdateEvent};
use pixelwar::domain::palette::Color;
use pixelwar::infra::http::{
    ApiState, EventsState, GatewayHeaderVerifier, ViewerStreamSettings, build_api_router,
    build_events_router,
};
use pixelwar::realtime::SessionManager;
use pixelwar_api_types::{
    ApiErrorBody, CanvasResponse, CooldownResponse, HistoryResponse, PaletteResponse,
    PlacementView, cell_key,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tower::ServiceExt;

use support::{Harness, contributor, harness, placement};

const IDENTITY_HEADER: &str = "x-contributor-id";

fn api(h: &Harness) -> Router {
    build_api_router(ApiState {
        placements: h.placements.clone(),
        canvas: h.canvas.clone(),
        limiter: h.limiter.clone(),
        verifier: Arc::new(GatewayHeaderVerifier::new(HeaderName::from_static(
            IDENTITY_HEADER,
        ))),
        health: h.repo.clone(),
        cache: h.cache.clone(),
    })
}

fn place(as_player: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::post("/pixel").header(header::CONTENT_TYPE, "application/json");
    if let Some(player) = as_player {
        builder = builder.header(IDENTITY_HEADER, player);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("build request")
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("build request")
}

async fn read_json<T: DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("decode body")
}

async fn error_code(response: axum::response::Response) -> String {
    read_json::<ApiErrorBody>(response).await.error.code
}

#[tokio::test]
async fn placement_is_created_then_rate_limited() {
    let h = harness();
    let router = api(&h);

    let response = router
        .clone()
        .oneshot(place(
            Some("alice"),
            json!({"x": 3, "y": 4, "color": "#ff4500", "player": "alice"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let view: PlacementView = read_json(response).await;
    assert_eq!((view.x, view.y), (3, 4));
    assert_eq!(view.color, "#FF4500");
    assert_eq!(view.player, "alice");

    let response = router
        .oneshot(place(
            Some("alice"),
            json!({"x": 5, "y": 5, "color": "#000000", "player": "alice"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .expect("retry-after header")
        .to_str()
        .expect("ascii header")
        .parse()
        .expect("seconds");
    assert!((1..=9).contains(&retry_after));
    assert_eq!(error_code(response).await, "cooldown_active");
}

#[tokio::test]
async fn placement_requires_a_verified_identity() {
    let h = harness();

    let response = api(&h)
        .oneshot(place(
            None,
            json!({"x": 1, "y": 1, "color": "#FFFFFF", "player": "alice"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "unauthorized");

    let response = api(&h)
        .oneshot(place(
            Some("alice"),
            json!({"x": 1, "y": 1, "color": "#FFFFFF", "player": "bob"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "identity_mismatch");
    assert!(h.repo.rows().await.is_empty());
}

#[tokio::test]
async fn invalid_placements_are_bad_requests() {
    let h = harness();

    let response = api(&h)
        .oneshot(place(
            Some("alice"),
            json!({"x": 1, "y": 1, "color": "#123456", "player": "alice"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "invalid_color");

    let response = api(&h)
        .oneshot(place(
            Some("alice"),
            json!({"x": 50, "y": 1, "color": "#FFFFFF", "player": "alice"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "out_of_bounds");

    let response = api(&h)
        .oneshot(place(Some("alice"), json!({"x": 1})))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "bad_request");
}

#[tokio::test]
async fn durable_failure_is_service_unavailable() {
    let h = harness();
    h.repo.set_fail_appends(true);

    let response = api(&h)
        .oneshot(place(
            Some("alice"),
            json!({"x": 1, "y": 1, "color": "#FFFFFF", "player": "alice"}),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_code(response).await, "durable_write_failed");
}

#[tokio::test]
async fn canvas_and_cells_reflect_placements() {
    let h = harness();
    h.placements
        .submit(
            &contributor("alice"),
            support::command(3, 4, "#FF4500", "alice"),
        )
        .await
        .expect("placement accepted");

    let canvas: CanvasResponse = read_json(api(&h).oneshot(get("/canvas")).await.expect("canvas")).await;
    let cell = canvas.get(&cell_key(3, 4)).expect("cell present");
    assert_eq!(cell.color, "#FF4500");
    assert_eq!(cell.player, "alice");

    let response = api(&h).oneshot(get("/pixel/3/4")).await.expect("pixel");
    assert_eq!(response.status(), StatusCode::OK);
    let view: PlacementView = read_json(response).await;
    assert_eq!(view.color, "#FF4500");

    let response = api(&h).oneshot(get("/pixel/1/1")).await.expect("pixel");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = api(&h).oneshot(get("/pixel/99/1")).await.expect("pixel");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = api(&h).oneshot(get("/pixel/a/1")).await.expect("pixel");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn history_endpoint_honours_the_limit() {
    let h = harness();
    for color in [Color::Red, Color::Green, Color::Blue] {
        h.repo.seed(placement(2, 2, color, "alice")).await;
    }

    let response = api(&h)
        .oneshot(get("/pixel/2/2/history?limit=2"))
        .await
        .expect("history");
    assert_eq!(response.status(), StatusCode::OK);
    let history: HistoryResponse = read_json(response).await;
    assert_eq!((history.x, history.y), (2, 2));
    let colors: Vec<&str> = history.entries.iter().map(|e| e.color.as_str()).collect();
    assert_eq!(colors, vec!["#3690EA", "#00CC78"]);

    let response = api(&h)
        .oneshot(get("/pixel/2/2/history?limit=many"))
        .await
        .expect("history");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cooldown_endpoint_reports_remaining_seconds() {
    let h = harness();
    h.placements
        .submit(&contributor("alice"), support::command(0, 0, "#FFFFFF", "alice"))
        .await
        .expect("placement accepted");

    let alice: CooldownResponse =
        read_json(api(&h).oneshot(get("/cooldown/alice")).await.expect("cooldown")).await;
    assert!((1..=9).contains(&alice.remaining_seconds));

    let bob: CooldownResponse =
        read_json(api(&h).oneshot(get("/cooldown/bob")).await.expect("cooldown")).await;
    assert_eq!(bob.remaining_seconds, 0);
}

#[tokio::test]
async fn palette_lists_every_color() {
    let h = harness();
    let palette: PaletteResponse =
        read_json(api(&h).oneshot(get("/palette")).await.expect("palette")).await;

    assert_eq!(palette.colors.len(), 18);
    assert!(
        palette
            .colors
            .iter()
            .any(|entry| entry.name == "red" && entry.hex == "#FF4500")
    );
}

#[tokio::test]
async fn health_reflects_both_stores() {
    let h = harness();

    let response = api(&h).oneshot(get("/health")).await.expect("health");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    h.cache.set_available(false);
    let response = api(&h).oneshot(get("/health")).await.expect("health");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    h.cache.set_available(true);
    h.repo.set_fail_reads(true);
    let response = api(&h).oneshot(get("/health")).await.expect("health");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn event_stream_pushes_updates_and_unregisters_on_close() {
    let h = harness();
    let sessions = Arc::new(SessionManager::new());
    let router = build_events_router(EventsState {
        sessions: sessions.clone(),
        stream: ViewerStreamSettings {
            session_buffer: 8,
            delivery_timeout: Duration::from_millis(200),
            heartbeat: Duration::from_secs(30),
        },
        health: h.repo.clone(),
        cache: h.cache.clone(),
    });

    let response = router.oneshot(get("/events")).await.expect("events");
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .expect("content type")
        .to_str()
        .expect("ascii header");
    assert!(content_type.starts_with("text/event-stream"));
    assert_eq!(sessions.len(), 1);

    let report = sessions
        .broadcast(&UpdateEvent {
            coordinate: Coordinate::new(3, 4),
            color: Color::Red,
            contributor: contributor("alice"),
        })
        .await;
    assert_eq!(report.delivered, 1);

    let mut body = response.into_body().into_data_stream();
    let frame = tokio::time::timeout(Duration::from_secs(1), body.next())
        .await
        .expect("frame within a second")
        .expect("stream open")
        .expect("frame bytes");
    let frame = String::from_utf8_lossy(&frame);
    assert!(frame.contains("event: pixel_update"), "{frame}");
    assert!(frame.contains(r##""color":"#FF4500""##), "{frame}");
    assert!(frame.contains(r#""player":"alice""#), "{frame}");

    drop(body);
    assert!(sessions.is_empty());
}
