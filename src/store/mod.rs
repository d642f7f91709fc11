//! The document store collaborator.
//!
//! The sync engines only ever talk to the remote side through
//! [`DocumentStore`]: whole-document writes, partial updates, deletes and a
//! per-collection subscription that pushes complete snapshots.

mod file;
mod memory;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::Result;

pub use file::FileStore;
pub use memory::{MemoryStore, StoreCall};

/// Path of a per-user collection, e.g. `users/u1/notes`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn notes(user_id: &str) -> Self {
        Self(format!("users/{}/notes", user_id))
    }

    pub fn notebooks(user_id: &str) -> Self {
        Self(format!("users/{}/notebooks", user_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One push from a collection subscription.
#[derive(Debug, Clone)]
pub enum CollectionEvent {
    /// The full current contents of the collection.
    Snapshot(Vec<Value>),
    /// The stream failed; the last snapshot is still the best known state.
    Error(String),
}

/// A live collection subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct CollectionSubscription {
    events: mpsc::UnboundedReceiver<CollectionEvent>,
}

impl CollectionSubscription {
    /// Creates a subscription together with the sender the store pushes into.
    pub fn channel() -> (mpsc::UnboundedSender<CollectionEvent>, Self) {
        let (tx, events) = mpsc::unbounded_channel();
        (tx, Self { events })
    }

    /// Waits for the next push. `None` once the store has closed the stream.
    pub async fn next(&mut self) -> Option<CollectionEvent> {
        self.events.recv().await
    }
}

/// Remote per-document storage, scoped by collection path.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Writes the full record, replacing any existing document.
    async fn create_or_replace(&self, path: &CollectionPath, id: &str, record: Value) -> Result<()>;

    /// Merges the top-level fields of `partial` into an existing document.
    async fn update_partial(&self, path: &CollectionPath, id: &str, partial: Value) -> Result<()>;

    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<()>;

    /// Starts pushing snapshots of the collection, beginning with its current
    /// contents.
    fn subscribe_collection(&self, path: &CollectionPath) -> Result<CollectionSubscription>;
}
