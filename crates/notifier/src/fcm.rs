//! Firebase Cloud Messaging HTTP v1 transport.
//!
//! Error classification follows the v1 error body:
//! ```json
//! {"error": {"code": 404, "status": "NOT_FOUND", "message": "...",
//!   "details": [{"@type": "...FcmError", "errorCode": "UNREGISTERED"}]}}
//! ```
//! - `UNREGISTERED` (or a bare `NOT_FOUND`) → the token no longer exists
//! - `INVALID_ARGUMENT` naming the registration token → the token is malformed
//! - anything else → opaque rejection

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use relay_common::auth::TokenSource;

use crate::transport::{PushError, PushMessage, PushTransport};

/// Public FCM v1 API root.
pub const FCM_ENDPOINT: &str = "https://fcm.googleapis.com/v1";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorStatus,
}

#[derive(Debug, Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetail {
    error_code: Option<String>,
}

/// Sends pushes through `projects/{id}/messages:send`.
pub struct FcmTransport {
    client: reqwest::Client,
    endpoint: String,
    project_id: String,
    auth: Arc<dyn TokenSource>,
}

impl FcmTransport {
    pub fn new(project_id: impl Into<String>, client: reqwest::Client, auth: Arc<dyn TokenSource>) -> Self {
        Self {
            client,
            endpoint: FCM_ENDPOINT.to_string(),
            project_id: project_id.into(),
            auth,
        }
    }

    /// Point the transport at a different API root (emulators, proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn send_url(&self) -> String {
        format!("{}/projects/{}/messages:send", self.endpoint, self.project_id)
    }
}

/// Build the v1 `message` resource for a push.
pub fn message_body(message: &PushMessage) -> Value {
    let payload = &message.payload;
    json!({
        "message": {
            "token": message.token,
            "notification": {
                "title": payload.title,
                "body": payload.body,
            },
            "data": payload.data,
            "webpush": {
                "notification": {
                    "icon": message.hints.icon_url,
                    "badge": message.hints.badge_url,
                    "vibrate": payload.profile.vibrate,
                    "requireInteraction": payload.profile.require_interaction,
                },
                "fcm_options": {
                    "link": message.hints.link,
                },
            },
        }
    })
}

/// Classify a non-success response.
pub fn classify(status: u16, body: &str) -> PushError {
    let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
        return PushError::Rejected {
            status,
            code: format!("http-{}", status),
            message: body.chars().take(200).collect(),
        };
    };
    let error = parsed.error;

    let detail_code = error
        .details
        .iter()
        .find_map(|d| d.error_code.as_deref())
        .unwrap_or("");

    if detail_code == "UNREGISTERED" || (detail_code.is_empty() && error.status == "NOT_FOUND") {
        return PushError::TokenUnregistered;
    }

    let invalid_argument = detail_code == "INVALID_ARGUMENT" || error.status == "INVALID_ARGUMENT";
    if invalid_argument && error.message.to_ascii_lowercase().contains("registration token") {
        return PushError::TokenInvalid(error.message);
    }

    let code = if detail_code.is_empty() {
        error.status
    } else {
        detail_code.to_string()
    };
    PushError::Rejected {
        status,
        code,
        message: error.message,
    }
}

#[async_trait]
impl PushTransport for FcmTransport {
    async fn deliver(&self, message: &PushMessage) -> Result<(), PushError> {
        let token = self.auth.access_token().await?;

        let response = self
            .client
            .post(self.send_url())
            .bearer_auth(token)
            .json(&message_body(message))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.auth.invalidate().await;
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify(status.as_u16(), &body))
    }
}
