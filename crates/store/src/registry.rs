//! Device-token registry backed by `users/{uid}` profiles.

use std::sync::Arc;

use serde_json::{Map, Value};

use relay_common::error::AppError;
use relay_common::types::UserProfile;

use crate::{ChangeFeedStore, child_path, is_valid_key};

/// Root path of user profiles.
pub const USERS_ROOT: &str = "users";

/// Profile field holding the device token.
pub const TOKEN_FIELD: &str = "fcmToken";

/// Maps users to their device tokens and reclaims stale tokens.
#[derive(Clone)]
pub struct TokenRegistry {
    store: Arc<dyn ChangeFeedStore>,
}

impl TokenRegistry {
    pub fn new(store: Arc<dyn ChangeFeedStore>) -> Self {
        Self { store }
    }

    /// Load a user's profile. Unknown users and unreadable profiles yield `None`.
    pub async fn profile(&self, uid: &str) -> Result<Option<UserProfile>, AppError> {
        if !is_valid_key(uid) {
            tracing::debug!(uid, "Refusing profile lookup for invalid uid");
            return Ok(None);
        }

        let Some(value) = self.store.read(&child_path(USERS_ROOT, uid)).await? else {
            return Ok(None);
        };

        match serde_json::from_value::<UserProfile>(value) {
            Ok(profile) => Ok(Some(profile)),
            Err(e) => {
                tracing::debug!(uid, error = %e, "Ignoring malformed user profile");
                Ok(None)
            }
        }
    }

    /// The user's current device token, if any.
    pub async fn lookup_by_user(&self, uid: &str) -> Result<Option<String>, AppError> {
        Ok(self
            .profile(uid)
            .await?
            .and_then(|p| p.device_token().map(str::to_string)))
    }

    /// Clear `token` from every profile that still holds it.
    ///
    /// This is a full scan of the users tree: the store offers no reverse
    /// index, and invalidations are rare. Returns the number of profiles
    /// cleared.
    pub async fn invalidate(&self, token: &str) -> Result<usize, AppError> {
        if token.is_empty() {
            return Ok(0);
        }

        let Some(Value::Object(users)) = self.store.read(USERS_ROOT).await? else {
            return Ok(0);
        };

        let holders: Vec<String> = users
            .into_iter()
            .filter(|(_, profile)| profile.get(TOKEN_FIELD).and_then(Value::as_str) == Some(token))
            .map(|(uid, _)| uid)
            .collect();

        for uid in &holders {
            let mut fields = Map::new();
            fields.insert(TOKEN_FIELD.to_string(), Value::Null);
            self.store.update(&child_path(USERS_ROOT, uid), fields).await?;
            tracing::info!(uid = %uid, "Stale device token removed");
        }

        Ok(holders.len())
    }
}
