//! Listener registry: which owner scopes already have a watcher attached.
//!
//! An entry stays for the life of the process once its subscription is
//! open; a claim is only released when opening the subscription fails. The
//! set lives only as long as
//! the process; a restart also captures a new boot epoch, so re-attaching
//! after a restart only sees records newer than that epoch.

use std::collections::HashSet;
use std::sync::Mutex;

/// Process-wide set of attached owner scopes.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    attached: Mutex<HashSet<String>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `owner` for attachment.
    ///
    /// Returns `true` for exactly one caller per owner; the check and the
    /// insert happen under a single lock.
    pub fn try_attach(&self, owner: &str) -> bool {
        self.attached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(owner.to_string())
    }

    /// Drop the claim on `owner` so a later attempt can attach it.
    pub fn release(&self, owner: &str) -> bool {
        self.attached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(owner)
    }

    pub fn is_attached(&self, owner: &str) -> bool {
        self.attached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(owner)
    }

    /// Number of attached owner scopes.
    pub fn len(&self) -> usize {
        self.attached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_second_attach_is_refused() {
        let registry = ListenerRegistry::new();
        assert!(registry.try_attach("u1"));
        assert!(!registry.try_attach("u1"));
        assert!(registry.try_attach("u2"));
        assert!(registry.is_attached("u1"));
        assert!(!registry.is_attached("u3"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_released_owner_can_be_claimed_again() {
        let registry = ListenerRegistry::new();
        assert!(registry.try_attach("u1"));
        assert!(registry.release("u1"));
        assert!(!registry.release("u1"));
        assert!(!registry.is_attached("u1"));
        assert!(registry.try_attach("u1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_attaches_admit_exactly_one() {
        let registry = Arc::new(ListenerRegistry::new());

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.try_attach("same-owner") })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(registry.len(), 1);
    }
}
