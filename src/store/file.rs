//! Offline document store backed by JSON files.
//!
//! Layout: `<root>/users/{user}/{collection}/{id}.json`. Writes go through a
//! temporary file and an atomic rename so a crash never leaves a half
//! written document behind. Writes to one document are serialized, so
//! concurrent partial updates merge instead of overwriting each other.
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use log::{debug, error, info, trace, warn};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use walkdir::WalkDir;

use super::{CollectionEvent, CollectionPath, CollectionSubscription, DocumentStore};
use crate::{load_document_from_file, NotoError, Result};

type DocumentLocks = Arc<Mutex<HashMap<PathBuf, Arc<TokioMutex<()>>>>>;

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    locks: DocumentLocks,
}

/// Runs blocking file work off the async worker threads.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| NotoError::SyncFailed {
            message: format!("File store task failed: {}", e),
        })?
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::default(),
        }
    }

    /// The write lock of one document file.
    fn document_lock(&self, file_path: &Path) -> Arc<TokioMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(file_path.to_path_buf()).or_default())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, path: &CollectionPath) -> PathBuf {
        path.as_str()
            .split('/')
            .fold(self.root.clone(), |dir, segment| dir.join(segment))
    }

    /// Helper method to get the file path for a document
    fn document_path(&self, path: &CollectionPath, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(NotoError::InvalidFormat {
                message: format!("Invalid document id: {:?}", id),
            });
        }
        Ok(self.collection_dir(path).join(format!("{}.json", id)))
    }

    /// Writes a document atomically
    fn write_document(file_path: &Path, document: &Value) -> Result<()> {
        let dir = file_path.parent().unwrap_or_else(|| Path::new("."));
        if !dir.exists() {
            debug!("Creating collection directory: {}", dir.display());
            fs::create_dir_all(dir).map_err(|e| {
                error!("Failed to create directory {}: {}", dir.display(), e);
                NotoError::DirectoryError {
                    path: dir.to_path_buf(),
                }
            })?;
        }

        let mut temp_file = NamedTempFile::new_in(dir).map_err(|e| {
            error!("Failed to create temporary file: {}", e);
            NotoError::Io(e)
        })?;

        trace!("Serializing document to JSON");
        let json = serde_json::to_string_pretty(document)?;
        temp_file.write_all(json.as_bytes())?;
        temp_file.flush()?;

        temp_file.persist(file_path).map_err(|e| {
            error!("Failed to persist file {}: {}", file_path.display(), e.error);
            NotoError::Io(e.error)
        })?;
        Ok(())
    }

    /// Merges `partial` into the document at `file_path`.
    fn merge_document(file_path: &Path, path: &CollectionPath, id: &str, partial: Value) -> Result<()> {
        if !file_path.exists() {
            return Err(NotoError::DocumentNotFound {
                path: path.to_string(),
                id: id.to_string(),
            });
        }

        let mut document = load_document_from_file(file_path)?;
        match (&mut document, partial) {
            (Value::Object(target), Value::Object(fields)) => target.extend(fields),
            _ => {
                return Err(NotoError::InvalidFormat {
                    message: format!("Partial update of {}/{} is not an object", path, id),
                })
            }
        }
        Self::write_document(file_path, &document)
    }

    /// Loads every document in a collection, skipping unreadable files.
    pub fn load_collection(&self, path: &CollectionPath) -> Vec<Value> {
        let dir = self.collection_dir(path);
        if !dir.exists() {
            return Vec::new();
        }

        let mut documents = Vec::new();
        let mut load_errors = 0;
        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let file = entry.path();
            if file.is_file() && file.extension().is_some_and(|ext| ext == "json") {
                match load_document_from_file(file) {
                    Ok(document) => documents.push(document),
                    Err(e) => {
                        warn!("Failed to load document from {}: {}", file.display(), e);
                        load_errors += 1;
                    }
                }
            }
        }

        if load_errors > 0 {
            error!("Encountered {} errors while loading {}", load_errors, path);
        }
        debug!("Loaded {} documents from {}", documents.len(), path);
        documents
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn create_or_replace(&self, path: &CollectionPath, id: &str, record: Value) -> Result<()> {
        let file_path = self.document_path(path, id)?;
        let lock = self.document_lock(&file_path);
        let _guard = lock.lock().await;
        run_blocking(move || Self::write_document(&file_path, &record)).await?;
        info!("Saved {}/{}", path, id);
        Ok(())
    }

    async fn update_partial(&self, path: &CollectionPath, id: &str, partial: Value) -> Result<()> {
        let file_path = self.document_path(path, id)?;
        let lock = self.document_lock(&file_path);
        let _guard = lock.lock().await;
        let (owned_path, owned_id) = (path.clone(), id.to_string());
        run_blocking(move || Self::merge_document(&file_path, &owned_path, &owned_id, partial)).await?;
        info!("Updated {}/{}", path, id);
        Ok(())
    }

    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<()> {
        let file_path = self.document_path(path, id)?;
        let lock = self.document_lock(&file_path);
        let _guard = lock.lock().await;
        let removed = run_blocking(move || match fs::remove_file(&file_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(NotoError::Io(e)),
        })
        .await?;
        if removed {
            info!("Deleted {}/{}", path, id);
        } else {
            debug!("Delete of missing document {}/{}", path, id);
        }
        Ok(())
    }

    fn subscribe_collection(&self, path: &CollectionPath) -> Result<CollectionSubscription> {
        let dir = self.collection_dir(path);
        fs::create_dir_all(&dir).map_err(|_| NotoError::DirectoryError { path: dir.clone() })?;

        let (fs_tx, mut fs_rx) = mpsc::unbounded_channel();
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = fs_tx.send(res);
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let (tx, subscription) = CollectionSubscription::channel();
        let _ = tx.send(CollectionEvent::Snapshot(self.load_collection(path)));

        let store = self.clone();
        let path = path.clone();
        tokio::spawn(async move {
            // Owning the watcher here keeps it alive exactly as long as the
            // subscription.
            let _watcher = watcher;
            debug!("Watching {} for changes", path);
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    event = fs_rx.recv() => match event {
                        Some(Ok(event)) => {
                            if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
                                trace!("File system event in {}: {:?}", path, event.kind);
                                if tx.send(CollectionEvent::Snapshot(store.load_collection(&path))).is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            error!("File system watcher error: {}", e);
                            if tx.send(CollectionEvent::Error(e.to_string())).is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
            debug!("Stopped watching {}", path);
        });

        Ok(subscription)
    }
}
