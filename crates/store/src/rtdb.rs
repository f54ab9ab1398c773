//! Firebase Realtime Database over its REST API.
//!
//! Reads and updates are plain `GET`/`PATCH` calls on `{base}/{path}.json`.
//! Subscriptions use the REST streaming mode (`Accept: text/event-stream`):
//! the server first sends the current contents as a `put` at `/`, then
//! `put`/`patch` events for every change. Those are folded into
//! "child created" events by remembering which child keys have been seen.
//!
//! A dropped stream is re-opened with exponential backoff. A stream that
//! stays silent past the idle timeout counts as dropped; the server sends a
//! `keep-alive` every 30 seconds. The set of known keys survives reconnects,
//! so the snapshot re-sent after a reconnect does not produce duplicate
//! events.
//!
//! A range filter needs an `.indexOn` rule for its field. Without one the
//! server answers `400 Index not defined`; the subscription then streams the
//! whole path and applies the filter locally.

use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use relay_common::auth::TokenSource;
use relay_common::error::AppError;

use crate::sse::SseDecoder;
use crate::{ChangeFeedStore, ChildEvent, ChildStream, RangeFilter, child_path, segments};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Realtime Database client.
#[derive(Clone)]
pub struct RtdbStore {
    base_url: String,
    client: reqwest::Client,
    auth: Arc<dyn TokenSource>,
    idle_timeout: Duration,
}

/// Payload of a `put` or `patch` stream event.
#[derive(Debug, Deserialize)]
struct StreamPayload {
    path: String,
    data: Value,
}

/// Why a single streaming connection ended.
#[derive(Debug)]
enum StreamEnd {
    /// Server closed the connection or the transport failed; reconnect.
    Dropped(String),
    /// Credentials expired; refresh and reconnect.
    AuthRevoked,
    /// Server revoked read access; give up.
    Cancelled(String),
    /// Nobody is listening any more.
    ReceiverGone,
}

/// Why a streaming request was refused.
#[derive(Debug, PartialEq)]
enum OpenFailure {
    /// No index on the range filter's field.
    IndexMissing(String),
    /// Access token rejected; refresh and retry.
    Unauthorized(String),
    /// Retrying the same request cannot succeed.
    Rejected(String),
    /// Network or server trouble; retry.
    Transient(String),
}

impl OpenFailure {
    fn classify(status: StatusCode, body: &str) -> Self {
        let reason = format!("{}: {}", status, body);
        match status {
            StatusCode::BAD_REQUEST if body.contains("Index not defined") => {
                OpenFailure::IndexMissing(reason)
            }
            StatusCode::UNAUTHORIZED => OpenFailure::Unauthorized(reason),
            StatusCode::BAD_REQUEST | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                OpenFailure::Rejected(reason)
            }
            _ => OpenFailure::Transient(reason),
        }
    }
}

impl RtdbStore {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client, auth: Arc<dyn TokenSource>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            auth,
            idle_timeout: IDLE_TIMEOUT,
        }
    }

    /// Treat a stream as dropped after `idle` without any bytes.
    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle_timeout = idle;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, segments(path).join("/"))
    }

    async fn open_stream(
        &self,
        path: &str,
        filter: Option<&RangeFilter>,
    ) -> Result<reqwest::Response, OpenFailure> {
        let token = self
            .auth
            .access_token()
            .await
            .map_err(|e| OpenFailure::Transient(e.to_string()))?;
        let mut request = self
            .client
            .get(self.url(path))
            .header(ACCEPT, "text/event-stream")
            .query(&[("access_token", token.as_str())]);

        if let Some(filter) = filter {
            request = request.query(&[
                ("orderBy", format!("\"{}\"", filter.order_by)),
                ("startAt", filter.start_at.to_string()),
            ]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OpenFailure::Transient(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OpenFailure::classify(status, &body));
        }
        Ok(response)
    }

    /// Keep one subscription alive until its receiver is dropped.
    async fn run_subscription(
        self,
        path: String,
        filter: Option<RangeFilter>,
        tx: mpsc::UnboundedSender<ChildEvent>,
    ) {
        let mut known = HashSet::new();
        let mut backoff = INITIAL_BACKOFF;
        let mut filter_on_server = true;

        loop {
            if tx.is_closed() {
                return;
            }

            let (server_filter, local_filter) = if filter_on_server {
                (filter.as_ref(), None)
            } else {
                (None, filter.as_ref())
            };

            match self.open_stream(&path, server_filter).await {
                Ok(response) => {
                    tracing::info!(path = %path, filtered_locally = local_filter.is_some(), "Change-feed stream connected");
                    backoff = INITIAL_BACKOFF;

                    let end = pump(
                        response.bytes_stream(),
                        &path,
                        local_filter,
                        &mut known,
                        &tx,
                        self.idle_timeout,
                    )
                    .await;
                    match end {
                        StreamEnd::ReceiverGone => return,
                        StreamEnd::Cancelled(reason) => {
                            tracing::error!(path = %path, reason = %reason, "Change-feed stream cancelled by server");
                            return;
                        }
                        StreamEnd::AuthRevoked => {
                            tracing::warn!(path = %path, "Change-feed credentials revoked, refreshing");
                            self.auth.invalidate().await;
                            continue;
                        }
                        StreamEnd::Dropped(reason) => {
                            tracing::warn!(path = %path, reason = %reason, "Change-feed stream dropped");
                        }
                    }
                }
                Err(OpenFailure::IndexMissing(reason)) if server_filter.is_some() => {
                    tracing::error!(
                        path = %path,
                        reason = %reason,
                        "No `.indexOn` rule for the range filter; streaming unfiltered and filtering locally"
                    );
                    filter_on_server = false;
                    continue;
                }
                Err(OpenFailure::IndexMissing(reason)) | Err(OpenFailure::Rejected(reason)) => {
                    tracing::error!(path = %path, reason = %reason, "Change-feed stream refused, giving up");
                    return;
                }
                Err(OpenFailure::Unauthorized(reason)) => {
                    tracing::warn!(path = %path, reason = %reason, "Change-feed credentials rejected, refreshing");
                    self.auth.invalidate().await;
                }
                Err(OpenFailure::Transient(reason)) => {
                    tracing::warn!(
                        path = %path,
                        reason = %reason,
                        retry_in_secs = backoff.as_secs(),
                        "Failed to open change-feed stream"
                    );
                }
            }

            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}

/// Read one streaming response until it ends or goes quiet for `idle`.
async fn pump<S, B, E>(
    bytes: S,
    base_path: &str,
    local_filter: Option<&RangeFilter>,
    known: &mut HashSet<String>,
    tx: &mpsc::UnboundedSender<ChildEvent>,
    idle: Duration,
) -> StreamEnd
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut bytes = std::pin::pin!(bytes);
    let mut decoder = SseDecoder::new();

    loop {
        let chunk = match tokio::time::timeout(idle, bytes.next()).await {
            Err(_) => return StreamEnd::Dropped("idle timeout".to_string()),
            Ok(None) => break,
            Ok(Some(Err(e))) => return StreamEnd::Dropped(e.to_string()),
            Ok(Some(Ok(chunk))) => chunk,
        };

        for event in decoder.feed(chunk.as_ref()) {
            let is_put = match event.event.as_str() {
                "put" => true,
                "patch" => false,
                "keep-alive" => continue,
                "auth_revoked" => return StreamEnd::AuthRevoked,
                "cancel" => return StreamEnd::Cancelled(event.data),
                other => {
                    tracing::debug!(event = other, "Ignoring unknown stream event");
                    continue;
                }
            };

            let payload: StreamPayload = match serde_json::from_str(&event.data) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed change-feed payload");
                    continue;
                }
            };

            for child in fold_child_events(base_path, known, local_filter, is_put, payload) {
                if tx.send(child).is_err() {
                    return StreamEnd::ReceiverGone;
                }
            }
        }
    }

    StreamEnd::Dropped("stream closed by server".to_string())
}

/// Translate one `put`/`patch` into the children it created.
///
/// Children outside `local_filter` are neither emitted nor remembered.
fn fold_child_events(
    base_path: &str,
    known: &mut HashSet<String>,
    local_filter: Option<&RangeFilter>,
    is_put: bool,
    payload: StreamPayload,
) -> Vec<ChildEvent> {
    let segs = segments(&payload.path);
    let mut created = Vec::new();
    let mut emit = |key: &str, value: Value, known: &mut HashSet<String>| {
        if local_filter.is_some_and(|filter| !filter.admits(&value)) {
            return;
        }
        if known.insert(key.to_string()) {
            created.push(ChildEvent {
                path: child_path(base_path, key),
                key: key.to_string(),
                value,
            });
        }
    };

    match segs.as_slice() {
        // Snapshot (put) or multi-child merge (patch) at the subscribed path.
        [] => {
            let children = match payload.data {
                Value::Object(children) => children,
                _ => Map::new(),
            };
            if is_put {
                known.retain(|key| children.get(key).is_some_and(|v| !v.is_null()));
            }
            for (key, value) in children {
                if value.is_null() {
                    known.remove(&key);
                } else {
                    emit(&key, value, known);
                }
            }
        }
        // Whole child written or removed.
        [key] => {
            if payload.data.is_null() {
                if is_put {
                    known.remove(*key);
                }
            } else if is_put {
                emit(key, payload.data, known);
            }
        }
        // Write below a child; creates the child if it was unknown.
        [key, rest @ ..] => {
            if !payload.data.is_null() && !known.contains(*key) {
                let value = rest.iter().rev().fold(payload.data, |inner, seg| {
                    let mut wrapper = Map::new();
                    wrapper.insert(seg.to_string(), inner);
                    Value::Object(wrapper)
                });
                emit(key, value, known);
            }
        }
    }

    created
}

async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response, AppError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(AppError::Store(format!("{} failed with {}: {}", what, status, body)))
}

#[async_trait]
impl ChangeFeedStore for RtdbStore {
    async fn subscribe_children(
        &self,
        path: &str,
        filter: Option<RangeFilter>,
    ) -> Result<ChildStream, AppError> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.clone().run_subscription(path.to_string(), filter, tx));

        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })))
    }

    async fn read(&self, path: &str) -> Result<Option<Value>, AppError> {
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .get(self.url(path))
            .query(&[("access_token", token.as_str())])
            .send()
            .await?;
        let value: Value = check(response, &format!("Read of {}", path))
            .await?
            .json()
            .await?;

        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), AppError> {
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .patch(self.url(path))
            .query(&[("access_token", token.as_str())])
            .json(&fields)
            .send()
            .await?;
        check(response, &format!("Update of {}", path)).await?;
        Ok(())
    }
}
