//! Dispatch engine: the per-record delivery pipeline.
//!
//! For each record:
//! 1. Check preconditions (not yet delivered, not a self-message)
//! 2. Resolve the recipient's profile and device token
//! 3. Build the payload (via `PayloadBuilder`)
//! 4. Send it (via `PushProvider`)
//! 5. On success, mark the record delivered (via `DeliveryLedger`)
//!
//! A failed send leaves the record unmarked. Nothing retries it: the
//! subscription has already passed it, and after a restart it predates the
//! new boot epoch.

use std::sync::Arc;

use thiserror::Error;

use relay_common::error::AppError;
use relay_common::types::{FeedRecord, MessageRecord, NotificationRecord};
use relay_notifier::{PushError, PushPayload, PushProvider, SendOutcome};
use relay_store::{DeliveryLedger, TokenRegistry};

use crate::payload::{FALLBACK_SENDER_NAME, PayloadBuilder};

/// Why a record was dropped without a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyDelivered,
    SelfMessage,
    /// Recipient has no profile
    NoProfile,
    /// Recipient never granted push permission, or the token was reclaimed
    NoToken,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AlreadyDelivered => write!(f, "already_delivered"),
            SkipReason::SelfMessage => write!(f, "self_message"),
            SkipReason::NoProfile => write!(f, "no_profile"),
            SkipReason::NoToken => write!(f, "no_token"),
        }
    }
}

/// Why a delivery attempt failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("profile lookup failed: {0}")]
    Lookup(#[from] AppError),

    #[error("push failed: {0}")]
    Push(#[from] PushError),
}

/// Result of handling one record.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Push accepted; `marked` is false if the delivered-flag write failed.
    Delivered { marked: bool },
    Skipped(SkipReason),
    Failed {
        error: DispatchError,
        tokens_cleared: usize,
    },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }

    fn lookup_failed(error: AppError) -> Self {
        DispatchOutcome::Failed {
            error: DispatchError::Lookup(error),
            tokens_cleared: 0,
        }
    }
}

/// Orchestrates registry, provider and ledger for each record.
pub struct DispatchEngine {
    tokens: TokenRegistry,
    ledger: DeliveryLedger,
    push: Arc<PushProvider>,
    payloads: PayloadBuilder,
}

impl DispatchEngine {
    pub fn new(
        tokens: TokenRegistry,
        ledger: DeliveryLedger,
        push: Arc<PushProvider>,
        payloads: PayloadBuilder,
    ) -> Self {
        Self {
            tokens,
            ledger,
            push,
            payloads,
        }
    }

    pub async fn handle(&self, record: &FeedRecord) -> DispatchOutcome {
        match record {
            FeedRecord::Notification(n) => self.handle_notification(n).await,
            FeedRecord::Message(m) => self.handle_message(m).await,
        }
    }

    pub async fn handle_notification(&self, record: &NotificationRecord) -> DispatchOutcome {
        if record.delivered {
            return DispatchOutcome::Skipped(SkipReason::AlreadyDelivered);
        }

        let token = match self.resolve_token(&record.owner_uid).await {
            Ok(token) => token,
            Err(outcome) => return outcome,
        };

        let payload = self.payloads.notification(record);
        self.deliver(&token, payload, &record.path).await
    }

    pub async fn handle_message(&self, record: &MessageRecord) -> DispatchOutcome {
        if record.delivered {
            return DispatchOutcome::Skipped(SkipReason::AlreadyDelivered);
        }
        if record.is_self_message() {
            return DispatchOutcome::Skipped(SkipReason::SelfMessage);
        }

        let token = match self.resolve_token(&record.recipient_uid).await {
            Ok(token) => token,
            Err(outcome) => return outcome,
        };

        let sender = match self.tokens.profile(&record.sender_uid).await {
            Ok(sender) => sender,
            Err(e) => return DispatchOutcome::lookup_failed(e),
        };
        let sender_name = sender
            .as_ref()
            .and_then(|p| p.display_name())
            .unwrap_or(FALLBACK_SENDER_NAME);

        let payload = self.payloads.message(record, sender_name);
        self.deliver(&token, payload, &record.path).await
    }

    /// Find the device token of `uid`, or the outcome to report instead.
    async fn resolve_token(&self, uid: &str) -> Result<String, DispatchOutcome> {
        let profile = self
            .tokens
            .profile(uid)
            .await
            .map_err(DispatchOutcome::lookup_failed)?
            .ok_or(DispatchOutcome::Skipped(SkipReason::NoProfile))?;

        profile
            .device_token()
            .map(str::to_string)
            .ok_or(DispatchOutcome::Skipped(SkipReason::NoToken))
    }

    async fn deliver(&self, token: &str, payload: PushPayload, record_path: &str) -> DispatchOutcome {
        match self.push.send(token, payload).await {
            SendOutcome::Sent => {
                let marked = match self.ledger.mark_delivered(record_path).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!(path = %record_path, error = %e, "Failed to mark record delivered");
                        false
                    }
                };
                DispatchOutcome::Delivered { marked }
            }
            SendOutcome::Failed {
                error,
                tokens_cleared,
            } => DispatchOutcome::Failed {
                error: DispatchError::Push(error),
                tokens_cleared,
            },
        }
    }
}
