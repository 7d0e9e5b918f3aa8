//! HTTP surface tests against the fully wired app

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use postersync::config::{Config, ConfigStore, MemoryStore};
use postersync::{AppState, build_app};

fn test_config() -> Config {
    Config {
        port: 0,
        config_dir: PathBuf::from("/tmp/postersync-test"),
        ffprobe_path: "ffprobe".to_string(),
        image_base_url: "http://127.0.0.1:9".to_string(),
        tmdb_base_url: "http://127.0.0.1:9".to_string(),
        tmdb_api_key: None,
        imdb_suggest_base_url: "http://127.0.0.1:9".to_string(),
        pretty_logs: false,
    }
}

fn app(settings: Value) -> axum::Router {
    let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::with_values(settings));
    build_app(AppState::build(test_config(), store))
}

async fn send(app: axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, String) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_health_and_status() {
    let (status, _) = send(app(json!({})), "GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);

    let library = json!({
        "unmatched": { "movie": { "Home Video (1999)": true, "Birthday (2003)": true } },
        "missingPosters": { "series": { "Obscure Show": true } }
    });
    let (status, body) = send(app(library), "GET", "/status", None).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["scanItems"], 0);
    assert_eq!(body["plexConnected"], false);
    assert_eq!(body["disabled"], false);
    assert_eq!(body["unmatched"]["movie"], json!(["Birthday (2003)", "Home Video (1999)"]));
    assert_eq!(body["unmatched"]["series"], json!([]));
    assert_eq!(body["missingPosters"]["series"], json!(["Obscure Show"]));
}

#[tokio::test]
async fn test_scan_errors_map_to_status_codes() {
    let (status, body) = send(app(json!({})), "POST", "/scan/all", None).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert!(body.contains("API key"));

    let (status, _) = send(app(json!({ "apiKey": "k" })), "POST", "/scan/everything", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(app(json!({ "apiKey": "k" })), "POST", "/scan/movies", None).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["queued"], 0);
}

#[tokio::test]
async fn test_rematch_and_cancel() {
    let (status, _) = send(
        app(json!({})),
        "POST",
        "/rematch",
        Some(json!({ "folder": "Heat (1995)", "id": "nope", "type": "movie" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(app(json!({})), "POST", "/cancel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"cancelled":false}"#);
}

#[tokio::test]
async fn test_webhook_events() {
    let (status, body) = send(app(json!({})), "POST", "/radarr", Some(json!({ "eventType": "Test" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Test event is not useful");

    let (status, body) = send(
        app(json!({})),
        "POST",
        "/sonarr",
        Some(json!({ "eventType": "Download", "series": { "path": "/nowhere/Andor" } })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Path inaccessible");
}
