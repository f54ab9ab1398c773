//! Shared application state for the Axum API server.

use std::sync::Arc;
use std::time::Instant;

use relay_common::clock::BootEpoch;
use relay_common::config::AppConfig;
use relay_engine::{PayloadBuilder, RelayStats};
use relay_notifier::PushProvider;
use relay_store::TokenRegistry;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub tokens: TokenRegistry,
    pub push: Arc<PushProvider>,
    pub payloads: PayloadBuilder,
    pub stats: Arc<RelayStats>,
    pub boot: BootEpoch,
    pub started_at: Instant,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        tokens: TokenRegistry,
        push: Arc<PushProvider>,
        stats: Arc<RelayStats>,
        boot: BootEpoch,
        started_at: Instant,
        config: AppConfig,
    ) -> Self {
        Self {
            tokens,
            push,
            payloads: PayloadBuilder::new(&config.app_name),
            stats,
            boot,
            started_at,
            config,
        }
    }

    /// Whole seconds since the process started.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
