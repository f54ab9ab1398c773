//! Delivery core: turns new feed records into pushes.
//!
//! - [`watcher::ChangeFeedWatcher`] subscribes to the notification and
//!   message feeds and spawns one task per qualifying record
//! - [`listeners::ListenerRegistry`] guarantees one subscription per owner scope
//! - [`dispatch::DispatchEngine`] resolves the recipient, builds the payload,
//!   sends it, and marks the record delivered
//! - [`payload`] holds the title/profile tables the companion client expects

pub mod dispatch;
pub mod listeners;
pub mod payload;
pub mod stats;
pub mod watcher;

pub use dispatch::{DispatchEngine, DispatchError, DispatchOutcome, SkipReason};
pub use listeners::ListenerRegistry;
pub use payload::PayloadBuilder;
pub use stats::{RelayStats, StatsSnapshot};
pub use watcher::ChangeFeedWatcher;
