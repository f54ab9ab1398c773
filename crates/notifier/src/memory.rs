//! In-process transport that records every attempt.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::transport::{PushError, PushMessage, PushTransport};

#[derive(Default)]
struct Inner {
    attempts: Vec<PushMessage>,
    delivered: Vec<PushMessage>,
    failures: HashMap<String, PushError>,
}

/// Transport that keeps messages in memory and fails on request.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every delivery to `token` fail with `error`.
    pub fn fail_token(&self, token: &str, error: PushError) {
        self.lock().failures.insert(token.to_string(), error);
    }

    /// Every message handed to the transport, successful or not.
    pub fn attempts(&self) -> Vec<PushMessage> {
        self.lock().attempts.clone()
    }

    /// Messages that were accepted.
    pub fn delivered(&self) -> Vec<PushMessage> {
        self.lock().delivered.clone()
    }
}

#[async_trait]
impl PushTransport for MemoryTransport {
    async fn deliver(&self, message: &PushMessage) -> Result<(), PushError> {
        let mut inner = self.lock();
        inner.attempts.push(message.clone());

        if let Some(error) = inner.failures.get(&message.token) {
            return Err(error.clone());
        }
        inner.delivered.push(message.clone());
        Ok(())
    }
}
