//! Integration tests for the speakboard Audio Player API
//!
//! Tests the HTTP surface over a scripted media backend:
//! - Health check
//! - Single clip, sequence, preload and stop
//! - Error status mapping
//! - SSE stream handshake

mod helpers;

use axum::body::Body;
use axum::http::StatusCode;
use helpers::*;
use http::{Method, Request};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use speakboard_ap::api::{create_router, AppState};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Test helper to create a router over fake media
fn setup_test_server(media: &FakeResolver) -> axum::Router {
    let app_state = AppState {
        manager: Arc::new(manager(media)),
        port: 5745,
    };
    create_router(app_state)
}

/// Helper function to make HTTP requests to the test router
async fn make_request(
    app: &axum::Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Option<Value>) {
    let request = Request::builder().method(method).uri(path);
    let request = match body {
        Some(json_body) => request
            .header("content-type", "application/json")
            .body(Body::from(json_body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).ok();
    (status, body)
}

#[tokio::test]
async fn test_health_endpoint() {
    let media = FakeResolver::new();
    let app = setup_test_server(&media);

    let (status, body) = make_request(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["module"], "speakboard-ap");
    assert_eq!(body["port"], 5745);
}

#[tokio::test(start_paused = true)]
async fn test_play_single_waits_for_completion() {
    let media = FakeResolver::new();
    let app = setup_test_server(&media);

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/playback/single",
        Some(json!({ "reference": "hola.mp3" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["outcome"], "completed");
    assert_eq!(media.started(), vec!["hola.mp3".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_play_single_error_statuses() {
    let media = FakeResolver::new();
    media.script("roto.mp3", ClipScript::fails_to_load("404 Not Found"));
    media.script("mudo.mp3", ClipScript::refuses_to_start("NotAllowedError"));
    let app = setup_test_server(&media);

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/playback/single",
        Some(json!({ "reference": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        make_request(&app, Method::POST, "/playback/single", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/playback/single",
        Some(json!({ "reference": "roto.mp3" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let message = body.unwrap()["status"].as_str().unwrap().to_string();
    assert!(message.contains("404 Not Found"), "{}", message);

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/playback/single",
        Some(json!({ "reference": "mudo.mp3" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test(start_paused = true)]
async fn test_play_sequence_runs_in_background() {
    let media = FakeResolver::new();
    let app = setup_test_server(&media);

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/playback/sequence",
        Some(json!({ "references": ["yo", null, "agua"] })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body.unwrap()["sequence_id"].is_string());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        media.started(),
        vec!["yo".to_string(), "agua".to_string()]
    );

    let (status, body) = make_request(&app, Method::GET, "/playback/state", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["playing"], false);
}

#[tokio::test]
async fn test_play_sequence_rejects_malformed_body() {
    let media = FakeResolver::new();
    let app = setup_test_server(&media);

    let (status, _) = make_request(
        &app,
        Method::POST,
        "/playback/sequence",
        Some(json!({ "clips": ["yo"] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(media.log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_preload_endpoint() {
    let media = FakeResolver::new();
    let app = setup_test_server(&media);

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/playback/preload",
        Some(json!({ "references": ["agua.mp3", "leche.mp3"] })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body.unwrap()["requested"], 2);

    settle().await;
    let (_, body) = make_request(&app, Method::GET, "/playback/state", None).await;
    assert_eq!(body.unwrap()["preloaded"], 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_endpoint_stops_playback() {
    let media = FakeResolver::new();
    media.script("hola.mp3", ClipScript::endless());
    let app = setup_test_server(&media);

    let playing = {
        let app = app.clone();
        tokio::spawn(async move {
            make_request(
                &app,
                Method::POST,
                "/playback/single",
                Some(json!({ "reference": "hola.mp3" })),
            )
            .await
        })
    };
    settle().await;

    let (_, body) = make_request(&app, Method::GET, "/playback/state", None).await;
    let body = body.unwrap();
    assert_eq!(body["playing"], true);
    assert_eq!(body["current_reference"], "hola.mp3");

    let (status, body) = make_request(&app, Method::POST, "/playback/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["status"], "stopped");

    let (status, body) = playing.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["outcome"], "superseded");
    assert_eq!(media.audible_count(), 0);
}

#[tokio::test]
async fn test_event_stream_handshake() {
    let media = FakeResolver::new();
    let app = setup_test_server(&media);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/events")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(content_type.starts_with("text/event-stream"));
}
