//! Change-feed watcher.
//!
//! Two subscriptions run for the life of the process:
//! - `notifications`: new owner keys; each owner gets its own range-filtered
//!   subscription on `notifications/{owner}`, attached at most once
//! - `messages`: one flat range-filtered subscription
//!
//! Both filters start at the boot epoch. Every qualifying record is handed
//! to the dispatch engine on its own task, so a slow or failing record never
//! holds up the feed.

use std::sync::Arc;

use futures::StreamExt;

use relay_common::clock::BootEpoch;
use relay_common::error::AppError;
use relay_common::types::{FeedRecord, MessageRecord, NotificationRecord};
use relay_store::{ChangeFeedStore, ChildStream, RangeFilter, child_path, is_valid_key};

use crate::dispatch::{DispatchEngine, DispatchOutcome};
use crate::listeners::ListenerRegistry;
use crate::stats::RelayStats;

pub const NOTIFICATIONS_ROOT: &str = "notifications";
pub const NOTIFICATION_TIME_FIELD: &str = "time";
pub const MESSAGES_ROOT: &str = "messages";
pub const MESSAGE_TIME_FIELD: &str = "timestamp";

/// Subscribes to both feeds and fans records out to the dispatch engine.
pub struct ChangeFeedWatcher {
    store: Arc<dyn ChangeFeedStore>,
    engine: Arc<DispatchEngine>,
    listeners: Arc<ListenerRegistry>,
    boot: BootEpoch,
    stats: Arc<RelayStats>,
}

impl ChangeFeedWatcher {
    pub fn new(
        store: Arc<dyn ChangeFeedStore>,
        engine: Arc<DispatchEngine>,
        listeners: Arc<ListenerRegistry>,
        boot: BootEpoch,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            store,
            engine,
            listeners,
            boot,
            stats,
        }
    }

    /// Open both feeds and consume them until they end.
    ///
    /// Only fails if a subscription cannot be opened.
    pub async fn run(self: Arc<Self>) -> Result<(), AppError> {
        let owners = self.store.subscribe_children(NOTIFICATIONS_ROOT, None).await?;
        let messages = self
            .store
            .subscribe_children(
                MESSAGES_ROOT,
                Some(RangeFilter::new(MESSAGE_TIME_FIELD, self.boot.as_millis())),
            )
            .await?;

        tracing::info!(boot_epoch = %self.boot, "Watching notification and message feeds");

        tokio::join!(
            self.clone().watch_owners(owners),
            self.clone().watch_messages(messages)
        );

        tracing::warn!("Change feeds ended");
        Ok(())
    }

    /// Attach the per-owner notification subscription.
    ///
    /// Returns `false` without subscribing if `owner` is already attached.
    /// If the subscription cannot be opened the claim is released, so the
    /// owner can be attached on a later attempt.
    pub async fn attach_owner(self: &Arc<Self>, owner: &str) -> Result<bool, AppError> {
        if !self.listeners.try_attach(owner) {
            tracing::debug!(owner, "Owner already attached");
            return Ok(false);
        }

        let subscribed = self
            .store
            .subscribe_children(
                &child_path(NOTIFICATIONS_ROOT, owner),
                Some(RangeFilter::new(NOTIFICATION_TIME_FIELD, self.boot.as_millis())),
            )
            .await;
        let stream = match subscribed {
            Ok(stream) => stream,
            Err(e) => {
                self.listeners.release(owner);
                return Err(e);
            }
        };

        self.stats.owner_attached();
        tracing::info!(owner, "Attached notification listener");
        tokio::spawn(self.clone().watch_owner(owner.to_string(), stream));
        Ok(true)
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    async fn watch_owners(self: Arc<Self>, mut owners: ChildStream) {
        while let Some(event) = owners.next().await {
            if !is_valid_key(&event.key) {
                tracing::warn!(key = %event.key, "Ignoring invalid owner key");
                continue;
            }
            if let Err(e) = self.attach_owner(&event.key).await {
                tracing::error!(owner = %event.key, error = %e, "Failed to attach notification listener");
            }
        }
    }

    async fn watch_owner(self: Arc<Self>, owner: String, mut stream: ChildStream) {
        while let Some(event) = stream.next().await {
            match NotificationRecord::from_child(&owner, &event.key, &event.path, &event.value) {
                Ok(record) => self.admit(FeedRecord::Notification(record)),
                Err(e) => {
                    tracing::warn!(path = %event.path, error = %e, "Skipping malformed notification");
                }
            }
        }
        tracing::warn!(owner = %owner, "Notification feed ended");
    }

    async fn watch_messages(self: Arc<Self>, mut stream: ChildStream) {
        while let Some(event) = stream.next().await {
            match MessageRecord::from_child(&event.key, &event.path, &event.value) {
                Ok(record) => self.admit(FeedRecord::Message(record)),
                Err(e) => {
                    tracing::warn!(path = %event.path, error = %e, "Skipping malformed message");
                }
            }
        }
    }

    /// Boot-epoch check, then dispatch on a task of its own.
    fn admit(&self, record: FeedRecord) {
        if !self.boot.admits(record.created_at()) {
            tracing::debug!(path = %record.path(), "Skipping record older than boot epoch");
            return;
        }

        let engine = self.engine.clone();
        let stats = self.stats.clone();
        tokio::spawn(async move {
            let outcome = engine.handle(&record).await;
            stats.record(&outcome);
            report(&record, &outcome);
        });
    }
}

fn report(record: &FeedRecord, outcome: &DispatchOutcome) {
    let path = record.path();
    match outcome {
        DispatchOutcome::Delivered { marked: true } => {
            tracing::info!(path, "Record delivered");
        }
        DispatchOutcome::Delivered { marked: false } => {
            tracing::warn!(path, "Record delivered but not marked; it may be pushed again");
        }
        DispatchOutcome::Skipped(reason) => {
            tracing::debug!(path, reason = %reason, "Record skipped");
        }
        DispatchOutcome::Failed {
            error,
            tokens_cleared,
        } => {
            tracing::error!(path, error = %error, tokens_cleared, "Record dispatch failed");
        }
    }
}
