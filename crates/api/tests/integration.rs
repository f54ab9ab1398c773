//! Integration tests for API routes.
//!
//! Uses `tower::ServiceExt` to test Axum routes without a real HTTP server,
//! against the in-memory store and transport.
//!
//! ```bash
//! cargo test -p relay-api --test integration
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use relay_api::routes::create_router;
use relay_api::state::AppState;
use relay_common::clock::BootEpoch;
use relay_common::config::{AppConfig, DEFAULT_PUSH_ICON_URL};
use relay_engine::RelayStats;
use relay_notifier::{DisplayHints, MemoryTransport, PushError, PushProvider};
use relay_store::{MemoryStore, TokenRegistry};

// ============================================================
// Helpers
// ============================================================

fn test_config() -> AppConfig {
    AppConfig {
        service_account_json: "{}".to_string(),
        database_url: "http://unused".to_string(),
        port: 0,
        public_url: None,
        keepalive_interval_secs: 840,
        push_icon_url: DEFAULT_PUSH_ICON_URL.to_string(),
        app_name: "Radio Bingo Live".to_string(),
    }
}

fn app(store: &MemoryStore, transport: &MemoryTransport) -> Router {
    app_started_at(store, transport, Instant::now())
}

fn app_started_at(store: &MemoryStore, transport: &MemoryTransport, started_at: Instant) -> Router {
    let tokens = TokenRegistry::new(Arc::new(store.clone()));
    let push = PushProvider::new(
        Arc::new(transport.clone()),
        tokens.clone(),
        DisplayHints::new(DEFAULT_PUSH_ICON_URL),
    );
    let state = AppState::new(
        tokens,
        Arc::new(push),
        Arc::new(RelayStats::new()),
        BootEpoch::from_millis(1_700_000_000_000),
        started_at,
        test_config(),
    );
    create_router(state)
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ============================================================
// Liveness
// ============================================================

#[tokio::test]
async fn test_root_reports_uptime() {
    let app = app(&MemoryStore::new(), &MemoryTransport::new());

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.starts_with("✅ Radio Bingo Live Push Server is running! Uptime: "));
    assert!(text.ends_with('s'));
}

#[tokio::test]
async fn test_ping() {
    let app = app(&MemoryStore::new(), &MemoryTransport::new());

    let response = app.oneshot(get("/ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["ok"], true);
    assert!(json["uptime"].is_u64());
    assert!(json["time"].as_i64().unwrap() > 1_700_000_000_000);
}

#[tokio::test]
async fn test_uptime_counts_from_process_start() {
    let started_at = Instant::now()
        .checked_sub(Duration::from_secs(120))
        .unwrap();
    let app = app_started_at(&MemoryStore::new(), &MemoryTransport::new(), started_at);

    let response = app.oneshot(get("/stats")).await.unwrap();
    assert!(body_json(response).await["uptime"].as_u64().unwrap() >= 120);
}

#[tokio::test]
async fn test_stats_snapshot() {
    let app = app(&MemoryStore::new(), &MemoryTransport::new());

    let response = app.oneshot(get("/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["delivered"], 0);
    assert_eq!(json["tokensInvalidated"], 0);
    assert_eq!(json["ownersAttached"], 0);
    assert_eq!(json["bootEpoch"], 1_700_000_000_000i64);
}

// ============================================================
// Test push
// ============================================================

#[tokio::test]
async fn test_push_requires_uid() {
    let app = app(&MemoryStore::new(), &MemoryTransport::new());

    let response = app
        .oneshot(post_json("/test-push", json!({ "title": "hi" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "uid required");
}

#[tokio::test]
async fn test_push_without_readable_body_requires_uid() {
    let empty = Request::builder()
        .method("POST")
        .uri("/test-push")
        .body(Body::empty())
        .unwrap();
    let garbled = Request::builder()
        .method("POST")
        .uri("/test-push")
        .header("content-type", "application/json")
        .body(Body::from("{uid: u1"))
        .unwrap();
    let wrong_type = post_json("/test-push", json!({ "uid": 42 }));

    for request in [empty, garbled, wrong_type] {
        let app = app(&MemoryStore::new(), &MemoryTransport::new());
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "uid required");
    }
}

#[tokio::test]
async fn test_push_unknown_token_is_404() {
    let store = MemoryStore::new();
    store.set("users/u1", json!({ "name": "Ana" }));
    let app = app(&store, &MemoryTransport::new());

    let response = app
        .oneshot(post_json("/test-push", json!({ "uid": "u1" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "No FCM token for this user");
}

#[tokio::test]
async fn test_push_sends_with_defaults() {
    let store = MemoryStore::new();
    store.set("users/u1", json!({ "name": "Ana", "fcmToken": "T1" }));
    let transport = MemoryTransport::new();
    let app = app(&store, &transport);

    let response = app
        .oneshot(post_json("/test-push", json!({ "uid": "u1" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "sent": true }));

    let delivered = transport.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].token, "T1");
    assert_eq!(delivered[0].payload.title, "🔔 Test");
    assert_eq!(delivered[0].payload.body, "Push is working!");
    assert_eq!(delivered[0].payload.data["type"], "system");
}

#[tokio::test]
async fn test_push_failure_reports_not_sent_and_reclaims_token() {
    let store = MemoryStore::new();
    store.set("users/u1", json!({ "name": "Ana", "fcmToken": "T1" }));
    let transport = MemoryTransport::new();
    transport.fail_token("T1", PushError::TokenUnregistered);
    let app = app(&store, &transport);

    let response = app
        .oneshot(post_json(
            "/test-push",
            json!({ "uid": "u1", "title": "Hello", "body": "World" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "sent": false }));

    assert_eq!(transport.attempts()[0].payload.title, "Hello");
    assert_eq!(store.get("users/u1/fcmToken"), None);
}
