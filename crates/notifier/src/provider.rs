//! Push provider: one delivery attempt per call, never an error to the caller.
//!
//! Failures are folded into [`SendOutcome`]. When the backend reports the
//! device token as invalid or unregistered, the token is cleared from every
//! profile holding it before the outcome is returned, so later dispatches to
//! that user are skipped instead of failing on the same token again.

use std::sync::Arc;

use relay_store::TokenRegistry;

use crate::transport::{DisplayHints, PushError, PushMessage, PushPayload, PushTransport};

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Sent,
    Failed {
        error: PushError,
        /// Profiles whose token was cleared because of this failure
        tokens_cleared: usize,
    },
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent)
    }
}

/// Delivery front-end shared by the dispatch engine and the HTTP surface.
pub struct PushProvider {
    transport: Arc<dyn PushTransport>,
    tokens: TokenRegistry,
    hints: DisplayHints,
}

impl PushProvider {
    pub fn new(transport: Arc<dyn PushTransport>, tokens: TokenRegistry, hints: DisplayHints) -> Self {
        Self {
            transport,
            tokens,
            hints,
        }
    }

    /// Deliver `payload` to `token`.
    pub async fn send(&self, token: &str, payload: PushPayload) -> SendOutcome {
        let message = PushMessage {
            token: token.to_string(),
            payload,
            hints: self.hints.clone(),
        };
        let kind = message.payload.kind().to_string();

        match self.transport.deliver(&message).await {
            Ok(()) => {
                tracing::info!(r#type = %kind, title = %message.payload.title, "Push sent");
                SendOutcome::Sent
            }
            Err(error) => {
                tracing::error!(code = error.code(), r#type = %kind, error = %error, "Push failed");

                let mut tokens_cleared = 0;
                if error.is_stale_token() {
                    match self.tokens.invalidate(token).await {
                        Ok(cleared) => tokens_cleared = cleared,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to remove stale device token");
                        }
                    }
                }

                SendOutcome::Failed {
                    error,
                    tokens_cleared,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTransport;
    use relay_common::types::VibrationProfile;
    use relay_store::MemoryStore;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn payload() -> PushPayload {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), "like".to_string());
        PushPayload {
            title: "❤️ Someone liked your post".to_string(),
            body: "nice".to_string(),
            data,
            profile: VibrationProfile {
                vibrate: vec![100],
                require_interaction: false,
            },
        }
    }

    fn provider(store: &MemoryStore, transport: &MemoryTransport) -> PushProvider {
        PushProvider::new(
            Arc::new(transport.clone()),
            TokenRegistry::new(Arc::new(store.clone())),
            DisplayHints::new("https://cdn.example/icon.png"),
        )
    }

    #[tokio::test]
    async fn test_send_success_attaches_hints() {
        let store = MemoryStore::new();
        let transport = MemoryTransport::new();

        let outcome = provider(&store, &transport).send("T1", payload()).await;
        assert!(outcome.is_sent());

        let delivered = transport.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].token, "T1");
        assert_eq!(delivered[0].hints.icon_url, "https://cdn.example/icon.png");
    }

    #[tokio::test]
    async fn test_unregistered_token_is_reclaimed() {
        let store = MemoryStore::new();
        store.set("users/u1", json!({ "name": "Ana", "fcmToken": "T1" }));
        let transport = MemoryTransport::new();
        transport.fail_token("T1", PushError::TokenUnregistered);

        let outcome = provider(&store, &transport).send("T1", payload()).await;
        assert_eq!(
            outcome,
            SendOutcome::Failed {
                error: PushError::TokenUnregistered,
                tokens_cleared: 1,
            }
        );
        assert_eq!(store.get("users/u1/fcmToken"), None);
    }

    #[tokio::test]
    async fn test_transient_failure_keeps_token() {
        let store = MemoryStore::new();
        store.set("users/u1", json!({ "fcmToken": "T1" }));
        let transport = MemoryTransport::new();
        transport.fail_token("T1", PushError::Transport("connection reset".to_string()));

        let outcome = provider(&store, &transport).send("T1", payload()).await;
        assert!(!outcome.is_sent());
        assert_eq!(store.get("users/u1/fcmToken"), Some(json!("T1")));
    }
}
