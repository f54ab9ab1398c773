//! Change-feed store abstraction.
//!
//! The relay needs exactly four primitives from its backing store:
//! 1. subscribe to child creation under a path
//! 2. the same, range-filtered by a numeric child field with a lower bound
//! 3. point read of a path
//! 4. partial field update of a path
//!
//! [`ChangeFeedStore`] captures them; [`memory::MemoryStore`] and
//! [`rtdb::RtdbStore`] implement them. [`registry::TokenRegistry`] and
//! [`ledger::DeliveryLedger`] are thin domain views on top.

pub mod ledger;
pub mod memory;
pub mod registry;
pub mod rtdb;
pub mod sse;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Map, Value};

use relay_common::error::AppError;

pub use ledger::DeliveryLedger;
pub use memory::MemoryStore;
pub use registry::TokenRegistry;
pub use rtdb::RtdbStore;

/// A child that appeared under a subscribed path.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildEvent {
    /// Full store path of the child (`parent/key`)
    pub path: String,
    pub key: String,
    pub value: Value,
}

/// Lower-bound filter on a numeric child field (`orderBy` + `startAt`).
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFilter {
    pub order_by: String,
    pub start_at: i64,
}

impl RangeFilter {
    pub fn new(order_by: impl Into<String>, start_at: i64) -> Self {
        Self {
            order_by: order_by.into(),
            start_at,
        }
    }

    /// Whether a child value falls inside the range. Children without a
    /// numeric value for the field are outside.
    pub fn admits(&self, value: &Value) -> bool {
        value
            .get(&self.order_by)
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .is_some_and(|v| v >= self.start_at)
    }
}

/// Infinite, non-restartable stream of child-created events.
pub type ChildStream = BoxStream<'static, ChildEvent>;

/// The store contract the relay core is written against.
#[async_trait]
pub trait ChangeFeedStore: Send + Sync {
    /// Subscribe to children created under `path`, optionally range-filtered.
    ///
    /// Children that already exist (and pass the filter) are delivered first,
    /// then new ones as they appear. Each child key is delivered once.
    async fn subscribe_children(
        &self,
        path: &str,
        filter: Option<RangeFilter>,
    ) -> Result<ChildStream, AppError>;

    /// Read the value at `path`, or `None` if nothing is stored there.
    async fn read(&self, path: &str) -> Result<Option<Value>, AppError>;

    /// Merge `fields` into the object at `path`. A `null` field deletes it.
    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), AppError>;
}

/// Join a parent path and a child key.
pub fn child_path(parent: &str, key: &str) -> String {
    let parent = parent.trim_matches('/');
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", parent, key)
    }
}

/// Split a path into its non-empty segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Whether `key` can be used as a single path segment.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key
            .chars()
            .any(|c| matches!(c, '/' | '.' | '#' | '$' | '[' | ']') || c.is_control())
}
