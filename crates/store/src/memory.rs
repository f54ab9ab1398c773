//! In-process change-feed store.
//!
//! Holds a single JSON tree and mirrors the Realtime Database semantics the
//! relay depends on: existing children are replayed on subscribe, range
//! filters exclude children without the ordering field, and writing `null`
//! deletes. Used by the test suites and for local runs without credentials.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use relay_common::error::AppError;

use crate::{ChangeFeedStore, ChildEvent, ChildStream, RangeFilter, child_path, segments};

struct Watcher {
    path: String,
    filter: Option<RangeFilter>,
    seen: HashSet<String>,
    tx: mpsc::UnboundedSender<ChildEvent>,
}

#[derive(Default)]
struct Inner {
    root: Value,
    watchers: Vec<Watcher>,
}

/// Shared in-memory JSON tree with child-created notifications.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the value at `path`. Writing `null` removes it.
    pub fn set(&self, path: &str, value: Value) {
        let mut inner = self.lock();
        write_at(&mut inner.root, &segments(path), value);
        notify_watchers(&mut inner);
    }

    /// Append `value` under `path` with a generated key; returns the key.
    pub fn push(&self, path: &str, value: Value) -> String {
        let key = uuid::Uuid::new_v4().simple().to_string();
        self.set(&child_path(path, &key), value);
        key
    }

    /// Synchronous read, for assertions.
    pub fn get(&self, path: &str) -> Option<Value> {
        let inner = self.lock();
        node_at(&inner.root, &segments(path))
            .filter(|v| !v.is_null())
            .cloned()
    }

    /// Number of live subscriptions attached to exactly `path`.
    pub fn subscription_count(&self, path: &str) -> usize {
        let path = segments(path).join("/");
        let mut inner = self.lock();
        inner.watchers.retain(|w| !w.tx.is_closed());
        inner.watchers.iter().filter(|w| w.path == path).count()
    }
}

#[async_trait]
impl ChangeFeedStore for MemoryStore {
    async fn subscribe_children(
        &self,
        path: &str,
        filter: Option<RangeFilter>,
    ) -> Result<ChildStream, AppError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = Watcher {
            path: segments(path).join("/"),
            filter,
            seen: HashSet::new(),
            tx,
        };

        let mut inner = self.lock();
        emit_new_children(&inner.root, &mut watcher);
        inner.watchers.push(watcher);
        drop(inner);

        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })))
    }

    async fn read(&self, path: &str) -> Result<Option<Value>, AppError> {
        Ok(self.get(path))
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), AppError> {
        let mut inner = self.lock();
        let segs = segments(path);
        for (field, value) in fields {
            let mut target = segs.clone();
            target.extend(segments(&field));
            write_at(&mut inner.root, &target, value);
        }
        notify_watchers(&mut inner);
        Ok(())
    }
}

fn node_at<'a>(root: &'a Value, segs: &[&str]) -> Option<&'a Value> {
    segs.iter().try_fold(root, |node, seg| node.get(*seg))
}

fn write_at(root: &mut Value, segs: &[&str], value: Value) {
    let Some((last, parents)) = segs.split_last() else {
        *root = if value.is_null() { Value::Null } else { value };
        return;
    };

    if value.is_null() {
        let mut node = &mut *root;
        for seg in parents {
            match node.get_mut(*seg) {
                Some(child) => node = child,
                None => return,
            }
        }
        if let Some(obj) = node.as_object_mut() {
            obj.remove(*last);
        }
        prune_empty(root, parents);
        return;
    }

    let mut node = root;
    for seg in parents {
        node = ensure_object(node)
            .entry(seg.to_string())
            .or_insert(Value::Null);
    }
    ensure_object(node).insert(last.to_string(), value);
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let Value::Object(obj) = node else {
        unreachable!("node was just replaced with an object")
    };
    obj
}

/// Drop objects left empty by a delete, deepest first.
fn prune_empty(root: &mut Value, parents: &[&str]) {
    for depth in (1..=parents.len()).rev() {
        let Some((last, upper)) = parents[..depth].split_last() else {
            return;
        };
        let Some(parent) = upper.iter().try_fold(&mut *root, |n, s| n.get_mut(*s)) else {
            return;
        };
        let empty = parent
            .get(*last)
            .is_some_and(|child| child.as_object().is_some_and(Map::is_empty));
        if !empty {
            return;
        }
        if let Some(obj) = parent.as_object_mut() {
            obj.remove(*last);
        }
    }
}

fn notify_watchers(inner: &mut Inner) {
    inner.watchers.retain(|w| !w.tx.is_closed());
    let root = &inner.root;
    for watcher in inner.watchers.iter_mut() {
        emit_new_children(root, watcher);
    }
}

/// Send every child that is present, in range, and not yet delivered.
fn emit_new_children(root: &Value, watcher: &mut Watcher) {
    let children = node_at(root, &segments(&watcher.path)).and_then(Value::as_object);

    let mut present: Vec<(&String, &Value)> = children
        .map(|obj| {
            obj.iter()
                .filter(|(_, v)| watcher.filter.as_ref().is_none_or(|f| f.admits(v)))
                .collect()
        })
        .unwrap_or_default();

    // Children that left the view may re-enter later as new children.
    watcher
        .seen
        .retain(|key| present.iter().any(|(k, _)| *k == key));

    if let Some(filter) = &watcher.filter {
        present.sort_by_key(|(key, v)| {
            (
                v.get(&filter.order_by).and_then(Value::as_f64).map(|f| f as i64),
                (*key).clone(),
            )
        });
    }

    for (key, value) in present {
        if watcher.seen.insert(key.clone()) {
            let _ = watcher.tx.send(ChildEvent {
                path: child_path(&watcher.path, key),
                key: key.clone(),
                value: value.clone(),
            });
        }
    }
}
