//! An in-process document store.
//!
//! Used when no backend is configured and by the test-suite, which relies on
//! the per-document latency and failure injection to reproduce out-of-order
//! write completion.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use log::{debug, trace, warn};
use serde_json::Value;
use tokio::sync::mpsc;

use super::{CollectionEvent, CollectionPath, CollectionSubscription, DocumentStore};
use crate::{NotoError, Result};

/// A write as seen by the store, recorded when it is issued.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    CreateOrReplace {
        path: String,
        id: String,
        record: Value,
    },
    UpdatePartial {
        path: String,
        id: String,
        partial: Value,
    },
    Delete {
        path: String,
        id: String,
    },
}

impl StoreCall {
    pub fn id(&self) -> &str {
        match self {
            StoreCall::CreateOrReplace { id, .. }
            | StoreCall::UpdatePartial { id, .. }
            | StoreCall::Delete { id, .. } => id,
        }
    }
}

#[derive(Default)]
struct MemoryInner {
    collections: HashMap<String, HashMap<String, Value>>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<CollectionEvent>>>,
    latency: HashMap<String, Duration>,
    failing: HashMap<String, String>,
    failing_all: Option<String>,
    subscribe_failure: Option<String>,
    pushes_held: bool,
    calls: Vec<StoreCall>,
}

impl MemoryInner {
    fn snapshot(&self, path: &str) -> Vec<Value> {
        let mut records: Vec<Value> = self
            .collections
            .get(path)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();
        // Newest first, like an `orderBy('updatedAt', 'desc')` query.
        records.sort_by(|a, b| {
            let key = |v: &Value| v.get("updatedAt").and_then(Value::as_str).map(str::to_owned);
            key(b).cmp(&key(a)).then_with(|| {
                let id = |v: &Value| v.get("id").and_then(Value::as_str).map(str::to_owned);
                id(a).cmp(&id(b))
            })
        });
        records
    }

    fn broadcast(&mut self, path: &str) {
        if self.pushes_held {
            trace!("Holding back snapshot of {}", path);
            return;
        }
        let snapshot = self.snapshot(path);
        if let Some(subscribers) = self.subscribers.get_mut(path) {
            subscribers.retain(|tx| tx.send(CollectionEvent::Snapshot(snapshot.clone())).is_ok());
            trace!("Broadcast {} records to {} subscribers of {}", snapshot.len(), subscribers.len(), path);
        }
    }
}

/// Cheaply clonable handle to a shared in-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Delays every write to document `id` by `latency`.
    pub fn set_latency(&self, id: &str, latency: Duration) {
        self.lock().latency.insert(id.to_string(), latency);
    }

    /// Rejects every write to document `id` until [`MemoryStore::heal`].
    pub fn fail_writes(&self, id: &str, message: &str) {
        self.lock().failing.insert(id.to_string(), message.to_string());
    }

    pub fn heal(&self, id: &str) {
        self.lock().failing.remove(id);
    }

    /// Rejects every write, whatever the document, until [`MemoryStore::heal_all`].
    pub fn fail_all_writes(&self, message: &str) {
        self.lock().failing_all = Some(message.to_string());
    }

    pub fn heal_all(&self) {
        let mut inner = self.lock();
        inner.failing.clear();
        inner.failing_all = None;
    }

    /// Makes subsequent `subscribe_collection` calls fail.
    pub fn fail_subscriptions(&self, message: &str) {
        self.lock().subscribe_failure = Some(message.to_string());
    }

    /// Stops pushing snapshots after writes, like a listener that lags
    /// behind the backend. [`MemoryStore::release_pushes`] sends the current
    /// state to every subscriber.
    pub fn hold_pushes(&self) {
        self.lock().pushes_held = true;
    }

    pub fn release_pushes(&self) {
        let mut inner = self.lock();
        inner.pushes_held = false;
        let paths: Vec<String> = inner.subscribers.keys().cloned().collect();
        for path in paths {
            inner.broadcast(&path);
        }
    }

    /// Stores a document directly, bypassing the call log, and notifies
    /// subscribers. Stands in for a write made by another client.
    pub fn insert(&self, path: &CollectionPath, record: Value) {
        let mut inner = self.lock();
        let id = record
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        inner
            .collections
            .entry(path.as_str().to_string())
            .or_default()
            .insert(id, record);
        inner.broadcast(path.as_str());
    }

    /// Pushes a stream error to every subscriber of `path`.
    pub fn push_error(&self, path: &CollectionPath, message: &str) {
        let mut inner = self.lock();
        if let Some(subscribers) = inner.subscribers.get_mut(path.as_str()) {
            subscribers.retain(|tx| tx.send(CollectionEvent::Error(message.to_string())).is_ok());
        }
    }

    pub fn document(&self, path: &CollectionPath, id: &str) -> Option<Value> {
        self.lock()
            .collections
            .get(path.as_str())
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    pub fn len(&self, path: &CollectionPath) -> usize {
        self.lock()
            .collections
            .get(path.as_str())
            .map_or(0, HashMap::len)
    }

    pub fn is_empty(&self, path: &CollectionPath) -> bool {
        self.len(path) == 0
    }

    /// Every write issued so far, in issue order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn calls_for(&self, id: &str) -> Vec<StoreCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.id() == id)
            .cloned()
            .collect()
    }

    /// Records the call and returns its configured latency and failure.
    fn begin(&self, call: StoreCall) -> (Duration, Option<String>) {
        let mut inner = self.lock();
        let id = call.id().to_string();
        debug!("Memory store received {:?}", call);
        inner.calls.push(call);
        let latency = inner.latency.get(&id).copied().unwrap_or_default();
        let failure = inner
            .failing
            .get(&id)
            .cloned()
            .or_else(|| inner.failing_all.clone());
        (latency, failure)
    }

    async fn settle(latency: Duration, failure: Option<String>, path: &CollectionPath, id: &str) -> Result<()> {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(message) => {
                warn!("Memory store rejecting write to {}/{}: {}", path, id, message);
                Err(NotoError::WriteRejected {
                    path: path.to_string(),
                    id: id.to_string(),
                    message,
                })
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_or_replace(&self, path: &CollectionPath, id: &str, record: Value) -> Result<()> {
        let (latency, failure) = self.begin(StoreCall::CreateOrReplace {
            path: path.to_string(),
            id: id.to_string(),
            record: record.clone(),
        });
        Self::settle(latency, failure, path, id).await?;

        let mut inner = self.lock();
        inner
            .collections
            .entry(path.as_str().to_string())
            .or_default()
            .insert(id.to_string(), record);
        inner.broadcast(path.as_str());
        Ok(())
    }

    async fn update_partial(&self, path: &CollectionPath, id: &str, partial: Value) -> Result<()> {
        let (latency, failure) = self.begin(StoreCall::UpdatePartial {
            path: path.to_string(),
            id: id.to_string(),
            partial: partial.clone(),
        });
        Self::settle(latency, failure, path, id).await?;

        let mut inner = self.lock();
        let document = inner
            .collections
            .get_mut(path.as_str())
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| NotoError::DocumentNotFound {
                path: path.to_string(),
                id: id.to_string(),
            })?;
        if let (Value::Object(target), Value::Object(fields)) = (document, partial) {
            target.extend(fields);
        }
        inner.broadcast(path.as_str());
        Ok(())
    }

    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<()> {
        let (latency, failure) = self.begin(StoreCall::Delete {
            path: path.to_string(),
            id: id.to_string(),
        });
        Self::settle(latency, failure, path, id).await?;

        let mut inner = self.lock();
        if let Some(docs) = inner.collections.get_mut(path.as_str()) {
            docs.remove(id);
        }
        inner.broadcast(path.as_str());
        Ok(())
    }

    fn subscribe_collection(&self, path: &CollectionPath) -> Result<CollectionSubscription> {
        let mut inner = self.lock();
        if let Some(message) = inner.subscribe_failure.clone() {
            return Err(NotoError::SubscriptionFailed {
                path: path.to_string(),
                message,
            });
        }
        let (tx, subscription) = CollectionSubscription::channel();
        let _ = tx.send(CollectionEvent::Snapshot(inner.snapshot(path.as_str())));
        inner
            .subscribers
            .entry(path.as_str().to_string())
            .or_default()
            .push(tx);
        debug!("New subscription to {}", path);
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notes() -> CollectionPath {
        CollectionPath::notes("u1")
    }

    #[tokio::test]
    async fn partial_updates_merge_top_level_fields() {
        let store = MemoryStore::new();
        store
            .create_or_replace(&notes(), "n1", json!({"id": "n1", "title": "a", "pinned": false}))
            .await
            .unwrap();
        store
            .update_partial(&notes(), "n1", json!({"pinned": true}))
            .await
            .unwrap();

        assert_eq!(
            store.document(&notes(), "n1"),
            Some(json!({"id": "n1", "title": "a", "pinned": true}))
        );
        assert_eq!(store.calls_for("n1").len(), 2);
    }

    #[tokio::test]
    async fn updating_a_missing_document_fails() {
        let store = MemoryStore::new();
        let err = store
            .update_partial(&notes(), "ghost", json!({"title": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, NotoError::DocumentNotFound { .. }));
    }

    #[tokio::test]
    async fn subscribers_get_current_contents_then_changes() {
        let store = MemoryStore::new();
        store.insert(&notes(), json!({"id": "a", "updatedAt": "2024-01-01T00:00:00Z"}));
        let mut sub = store.subscribe_collection(&notes()).unwrap();

        match sub.next().await {
            Some(CollectionEvent::Snapshot(records)) => assert_eq!(records.len(), 1),
            other => panic!("unexpected event: {:?}", other),
        }

        store.insert(&notes(), json!({"id": "b", "updatedAt": "2024-02-01T00:00:00Z"}));
        match sub.next().await {
            Some(CollectionEvent::Snapshot(records)) => {
                assert_eq!(records[0]["id"], "b");
                assert_eq!(records[1]["id"], "a");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn injected_failures_reject_after_latency() {
        let store = MemoryStore::new();
        store.set_latency("n1", Duration::from_millis(500));
        store.fail_writes("n1", "offline");

        let started = tokio::time::Instant::now();
        let result = store.delete(&notes(), "n1").await;
        assert!(matches!(result, Err(NotoError::WriteRejected { .. })));
        assert!(started.elapsed() >= Duration::from_millis(500));

        store.heal("n1");
        assert!(store.delete(&notes(), "n1").await.is_ok());
    }

    #[tokio::test]
    async fn held_pushes_are_sent_on_release() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe_collection(&notes()).unwrap();
        assert!(matches!(sub.next().await, Some(CollectionEvent::Snapshot(r)) if r.is_empty()));

        store.hold_pushes();
        store.insert(&notes(), json!({"id": "a"}));
        store.release_pushes();
        match sub.next().await {
            Some(CollectionEvent::Snapshot(records)) => assert_eq!(records.len(), 1),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
