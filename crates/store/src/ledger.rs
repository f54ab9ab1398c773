//! Delivered-flag ledger.
//!
//! The flag lives on the source record itself. Marking is a single-field
//! partial update of the exact path the triggering event referenced, so
//! concurrent writers touching other fields are never clobbered.

use std::sync::Arc;

use serde_json::{Map, Value};

use relay_common::error::AppError;

use crate::ChangeFeedStore;

/// Record field holding the delivered flag.
pub const DELIVERED_FIELD: &str = "pushed";

#[derive(Clone)]
pub struct DeliveryLedger {
    store: Arc<dyn ChangeFeedStore>,
}

impl DeliveryLedger {
    pub fn new(store: Arc<dyn ChangeFeedStore>) -> Self {
        Self { store }
    }

    /// Set `pushed = true` on the record at `record_path`. Idempotent.
    pub async fn mark_delivered(&self, record_path: &str) -> Result<(), AppError> {
        let mut fields = Map::new();
        fields.insert(DELIVERED_FIELD.to_string(), Value::Bool(true));
        self.store.update(record_path, fields).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_mark_delivered_preserves_other_fields() {
        let store = MemoryStore::new();
        store.set("messages/m1", json!({ "from": "a", "to": "b", "text": "hi" }));
        let ledger = DeliveryLedger::new(Arc::new(store.clone()));

        ledger.mark_delivered("messages/m1").await.unwrap();
        ledger.mark_delivered("messages/m1").await.unwrap();

        assert_eq!(
            store.get("messages/m1"),
            Some(json!({ "from": "a", "to": "b", "text": "hi", "pushed": true }))
        );
    }
}
