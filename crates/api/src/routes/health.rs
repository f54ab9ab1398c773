//! Liveness and stats endpoints.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/ping", get(ping))
        .route("/stats", get(stats))
}

async fn root(State(state): State<AppState>) -> String {
    format!(
        "✅ {} Push Server is running! Uptime: {}s",
        state.config.app_name,
        state.uptime_secs()
    )
}

async fn ping(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "uptime": state.uptime_secs(),
        "time": Utc::now().timestamp_millis()
    }))
}

/// GET /stats: delivery counters since boot.
async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut body = serde_json::to_value(state.stats.snapshot()).unwrap_or_else(|_| json!({}));
    if let Some(obj) = body.as_object_mut() {
        obj.insert("bootEpoch".to_string(), json!(state.boot.as_millis()));
        obj.insert("uptime".to_string(), json!(state.uptime_secs()));
    }
    Json(body)
}
