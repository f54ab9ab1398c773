use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use relay_common::error::AppError;
use relay_common::types::VibrationProfile;

/// Human-facing content of a push, independent of the destination device.
#[derive(Debug, Clone, PartialEq)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    /// Flat metadata; every value is text because the transport only carries strings
    pub data: BTreeMap<String, String>,
    pub profile: VibrationProfile,
}

impl PushPayload {
    /// The notification category carried in the metadata (`system` if absent).
    pub fn kind(&self) -> &str {
        self.data.get("type").map(String::as_str).unwrap_or("system")
    }
}

/// Platform display hints attached to every web push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayHints {
    pub icon_url: String,
    pub badge_url: String,
    /// Click-through link opened when the notification is tapped
    pub link: String,
}

impl DisplayHints {
    pub fn new(icon_url: impl Into<String>) -> Self {
        let icon_url = icon_url.into();
        Self {
            badge_url: icon_url.clone(),
            icon_url,
            link: "/".to_string(),
        }
    }
}

/// A payload addressed to one device.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub token: String,
    pub payload: PushPayload,
    pub hints: DisplayHints,
}

/// Classified delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    #[error("registration token is invalid: {0}")]
    TokenInvalid(String),

    #[error("registration token is not registered")]
    TokenUnregistered,

    #[error("push rejected with {status} ({code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(String),
}

impl PushError {
    /// Whether the failure means the device token will never work again.
    pub fn is_stale_token(&self) -> bool {
        matches!(self, PushError::TokenInvalid(_) | PushError::TokenUnregistered)
    }

    /// Short machine-readable classification for logs and stats.
    pub fn code(&self) -> &str {
        match self {
            PushError::TokenInvalid(_) => "invalid-registration-token",
            PushError::TokenUnregistered => "registration-token-not-registered",
            PushError::Rejected { code, .. } => code.as_str(),
            PushError::Transport(_) => "transport",
        }
    }
}

impl From<reqwest::Error> for PushError {
    fn from(e: reqwest::Error) -> Self {
        PushError::Transport(e.to_string())
    }
}

impl From<AppError> for PushError {
    fn from(e: AppError) -> Self {
        PushError::Transport(e.to_string())
    }
}

/// A push delivery backend.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(&self, message: &PushMessage) -> Result<(), PushError>;
}
