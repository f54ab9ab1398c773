use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::dispatch::DispatchOutcome;

/// Running delivery counters for this process.
#[derive(Debug, Default)]
pub struct RelayStats {
    delivered: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    tokens_invalidated: AtomicU64,
    owners_attached: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub delivered: u64,
    pub skipped: u64,
    pub failed: u64,
    pub tokens_invalidated: u64,
    pub owners_attached: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: &DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::Delivered { .. } => &self.delivered,
            DispatchOutcome::Skipped(_) => &self.skipped,
            DispatchOutcome::Failed { tokens_cleared, .. } => {
                self.tokens_invalidated
                    .fetch_add(*tokens_cleared as u64, Ordering::Relaxed);
                &self.failed
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn owner_attached(&self) {
        self.owners_attached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            tokens_invalidated: self.tokens_invalidated.load(Ordering::Relaxed),
            owners_attached: self.owners_attached.load(Ordering::Relaxed),
        }
    }
}
