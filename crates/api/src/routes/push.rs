//! Manual test push.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use relay_common::error::AppError;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/test-push", post(test_push))
}

#[derive(Debug, Default, Deserialize)]
pub struct TestPushRequest {
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// POST /test-push: send a test push to `uid`'s device.
///
/// A missing or unreadable body counts as a request without a `uid`.
async fn test_push(
    State(state): State<AppState>,
    body: Result<Json<TestPushRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Unreadable test push body");
            TestPushRequest::default()
        }
    };
    let uid = req
        .uid
        .filter(|uid| !uid.trim().is_empty())
        .ok_or_else(|| AppError::Validation("uid required".to_string()))?;

    let token = state
        .tokens
        .lookup_by_user(&uid)
        .await?
        .ok_or_else(|| AppError::NotFound("No FCM token for this user".to_string()))?;

    let payload = state
        .payloads
        .test_push(req.title.as_deref(), req.body.as_deref());
    let outcome = state.push.send(&token, payload).await;

    tracing::info!(uid = %uid, sent = outcome.is_sent(), "Test push requested");
    Ok(Json(json!({ "sent": outcome.is_sent() })))
}
