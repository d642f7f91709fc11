//! Notebook synchronization.
//!
//! Same optimistic model as the note engine, without debouncing: every
//! change is written immediately and rolled back if the store rejects it and
//! no newer change to that notebook has been made since.
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, info, warn};
use serde_json::{json, Value};
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    CollectionEvent, CollectionPath, DocumentStore, IssueKind, Notebook, ParaCategory, Session,
    StalenessGuard, UpdateToken, WriteTracker,
};

pub const NOTEBOOKS_SYNC_FAILED: &str = "Failed to sync notebooks. Please refresh and try again.";

#[derive(Debug, Default)]
struct NotebookState {
    notebooks: Vec<Notebook>,
    loading: bool,
    seeded_defaults: bool,
    epoch: u64,
    guard: StalenessGuard,
}

impl NotebookState {
    fn find(&self, id: &str) -> Option<&Notebook> {
        self.notebooks.iter().find(|nb| nb.id == id)
    }

    fn replace(&mut self, notebook: Notebook) {
        if let Some(slot) = self.notebooks.iter_mut().find(|nb| nb.id == notebook.id) {
            *slot = notebook;
        }
    }
}

struct Shared<S> {
    store: Arc<S>,
    state: Arc<Mutex<NotebookState>>,
    tracker: WriteTracker,
    changes: Arc<watch::Sender<u64>>,
}

impl<S> Clone for Shared<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            state: Arc::clone(&self.state),
            tracker: self.tracker.clone(),
            changes: Arc::clone(&self.changes),
        }
    }
}

impl<S: DocumentStore> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, NotebookState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `f` against the notebook list and announces the change.
    fn with_state<T>(&self, f: impl FnOnce(&mut NotebookState) -> T) -> T {
        let result = {
            let mut state = self.lock();
            f(&mut state)
        };
        self.changes.send_modify(|revision| *revision += 1);
        result
    }

    fn create_remote(&self, path: &CollectionPath, notebook: &Notebook, message: &'static str, epoch: u64) {
        let record = match serde_json::to_value(notebook) {
            Ok(record) => record,
            Err(e) => {
                error!("Failed to serialize notebook {}: {}", notebook.id, e);
                return;
            }
        };
        let store = Arc::clone(&self.store);
        let shared = self.clone();
        let path = path.clone();
        let id = notebook.id.clone();
        let rollback_id = id.clone();
        self.tracker.track(
            async move { store.create_or_replace(&path, &id, record).await },
            message,
            move |succeeded| {
                if succeeded {
                    return;
                }
                shared.with_state(|state| {
                    if state.epoch == epoch {
                        state.notebooks.retain(|nb| nb.id != rollback_id);
                        state.guard.forget(&rollback_id);
                    }
                });
            },
        );
    }

    fn patch_remote(
        &self,
        path: CollectionPath,
        previous: Notebook,
        partial: Value,
        token: UpdateToken,
        message: &'static str,
        epoch: u64,
    ) {
        let store = Arc::clone(&self.store);
        let shared = self.clone();
        let id = previous.id.clone();
        self.tracker.track(
            async move { store.update_partial(&path, &id, partial).await },
            message,
            move |succeeded| {
                shared.with_state(|state| {
                    if state.epoch != epoch {
                        return;
                    }
                    let id = previous.id.clone();
                    if !succeeded && state.guard.is_latest(&id, token) {
                        debug!("Rolling back notebook {}", id);
                        state.replace(previous);
                    }
                    state.guard.finish(&id, token, succeeded);
                });
            },
        );
    }

    fn apply_event(&self, path: &CollectionPath, epoch: u64, event: CollectionEvent) {
        match event {
            CollectionEvent::Snapshot(records) => {
                let notebooks: Vec<Notebook> = records
                    .into_iter()
                    .filter_map(|record| match serde_json::from_value(record) {
                        Ok(notebook) => Some(notebook),
                        Err(e) => {
                            warn!("Skipping malformed notebook record: {}", e);
                            None
                        }
                    })
                    .collect();

                let seed = self.with_state(|state| {
                    if state.epoch != epoch {
                        return false;
                    }
                    state.loading = false;
                    let seed = notebooks.is_empty() && !state.seeded_defaults;
                    state.seeded_defaults = true;
                    state.notebooks = if seed { Notebook::defaults() } else { notebooks };
                    seed
                });
                if seed {
                    info!("Seeding default notebooks");
                    for notebook in Notebook::defaults() {
                        self.create_remote(path, &notebook, "Failed to create default notebooks.", epoch);
                    }
                }
            }
            CollectionEvent::Error(message) => {
                error!("Notebook subscription error: {}", message);
                self.with_state(|state| {
                    if state.epoch == epoch {
                        state.loading = false;
                    }
                });
                self.tracker
                    .report(IssueKind::SubscriptionFailed, NOTEBOOKS_SYNC_FAILED);
            }
        }
    }
}

/// Keeps the signed-in user's notebooks in sync with a [`DocumentStore`].
pub struct NotebookSync<S: DocumentStore> {
    shared: Shared<S>,
    session: Session,
    subscription: Option<JoinHandle<()>>,
}

impl<S: DocumentStore> NotebookSync<S> {
    pub fn new(store: Arc<S>, session: Session, tracker: WriteTracker) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            shared: Shared {
                store,
                state: Arc::new(Mutex::new(NotebookState::default())),
                tracker,
                changes: Arc::new(changes),
            },
            session,
            subscription: None,
        }
    }

    fn collection(&self) -> Option<CollectionPath> {
        self.session.user_id().map(CollectionPath::notebooks)
    }

    pub fn start(&mut self) {
        if let Some(handle) = self.subscription.take() {
            handle.abort();
        }
        let Some(path) = self.collection() else {
            return;
        };
        let epoch = self.shared.with_state(|state| {
            state.loading = true;
            state.epoch
        });
        match self.shared.store.subscribe_collection(&path) {
            Ok(mut subscription) => {
                let shared = self.shared.clone();
                self.subscription = Some(tokio::spawn(async move {
                    while let Some(event) = subscription.next().await {
                        shared.apply_event(&path, epoch, event);
                    }
                }));
            }
            Err(e) => {
                error!("Failed to subscribe to {}: {}", path, e);
                self.shared.with_state(|state| state.loading = false);
                self.shared
                    .tracker
                    .report(IssueKind::SubscriptionFailed, NOTEBOOKS_SYNC_FAILED);
            }
        }
    }

    pub fn switch_session(&mut self, session: Session) {
        let signed_in = session.is_signed_in();
        self.shared.with_state(|state| {
            state.epoch += 1;
            state.guard.reset();
            state.notebooks.clear();
            state.seeded_defaults = false;
            state.loading = signed_in;
        });
        self.session = session;
        self.start();
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.subscription.take() {
            handle.abort();
        }
    }

    pub fn notebooks(&self) -> Vec<Notebook> {
        self.shared.lock().notebooks.clone()
    }

    pub fn notebook(&self, id: &str) -> Option<Notebook> {
        self.shared.lock().find(id).cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.lock().loading
    }

    /// Waits for the first snapshot after [`NotebookSync::start`].
    pub async fn wait_loaded(&self) {
        let mut changes = self.shared.changes.subscribe();
        while self.is_loading() {
            if changes.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn by_category(&self, category: ParaCategory) -> Vec<Notebook> {
        self.shared
            .lock()
            .notebooks
            .iter()
            .filter(|nb| nb.para_category == category)
            .cloned()
            .collect()
    }

    pub fn create(&self, name: &str, category: ParaCategory) -> Option<Notebook> {
        let path = self.collection()?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let notebook = Notebook::new(name, category);
        let epoch = self.shared.with_state(|state| {
            state.notebooks.push(notebook.clone());
            state.epoch
        });
        info!("Created notebook {} ({})", notebook.name, notebook.id);
        self.shared
            .create_remote(&path, &notebook, "Failed to create notebook.", epoch);
        Some(notebook)
    }

    pub fn rename(&self, id: &str, name: &str) {
        let name = name.trim().to_string();
        if name.is_empty() {
            return;
        }
        self.mutate(id, "Failed to rename notebook.", |notebook| {
            notebook.name = name.clone();
            json!({ "name": name })
        });
    }

    /// Moves a user notebook to another PARA category, restyling it to match.
    /// Default notebooks stay where they are.
    pub fn move_category(&self, id: &str, category: ParaCategory) {
        if crate::is_default_notebook(id) {
            debug!("Refusing to move default notebook {}", id);
            return;
        }
        self.mutate(id, "Failed to move notebook.", |notebook| {
            notebook.para_category = category;
            notebook.color = category.color().to_string();
            notebook.icon = category.icon().to_string();
            json!({
                "paraCategory": category,
                "color": notebook.color,
                "icon": notebook.icon,
            })
        });
    }

    fn mutate(&self, id: &str, message: &'static str, change: impl FnOnce(&mut Notebook) -> Value) {
        let Some(path) = self.collection() else {
            return;
        };
        let prepared = self.shared.with_state(|state| {
            let previous = state.find(id).cloned()?;
            let mut updated = previous.clone();
            let partial = change(&mut updated);
            state.replace(updated);
            let token = state.guard.mint(id);
            Some((previous, partial, token, state.epoch))
        });
        let Some((previous, partial, token, epoch)) = prepared else {
            return;
        };
        self.shared
            .patch_remote(path, previous, partial, token, message, epoch);
    }

    /// Deletes a user notebook. Returns false for default notebooks, unknown
    /// ids, or when nobody is signed in.
    pub fn delete(&self, id: &str) -> bool {
        let Some(path) = self.collection() else {
            return false;
        };
        if crate::is_default_notebook(id) {
            return false;
        }
        let removed = self.shared.with_state(|state| {
            let index = state.notebooks.iter().position(|nb| nb.id == id)?;
            let removed = state.notebooks.remove(index);
            state.guard.forget(id);
            Some((removed, state.epoch))
        });
        let Some((removed, epoch)) = removed else {
            return false;
        };

        let store = Arc::clone(&self.shared.store);
        let shared = self.shared.clone();
        let owned_id = id.to_string();
        self.shared.tracker.track(
            async move { store.delete(&path, &owned_id).await },
            "Failed to delete notebook.",
            move |succeeded| {
                if succeeded {
                    return;
                }
                shared.with_state(|state| {
                    if state.epoch == epoch && state.find(&removed.id).is_none() {
                        state.notebooks.push(removed);
                    }
                });
            },
        );
        true
    }
}

impl<S: DocumentStore> Drop for NotebookSync<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use std::time::Duration;

    fn engine(store: &Arc<MemoryStore>) -> NotebookSync<MemoryStore> {
        let tracker = WriteTracker::new(Duration::from_millis(2000));
        let mut engine = NotebookSync::new(Arc::clone(store), Session::signed_in("u1"), tracker);
        engine.start();
        engine
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn empty_collection_is_seeded_with_para_defaults() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);
        settle().await;

        assert_eq!(store.len(&CollectionPath::notebooks("u1")), 4);
        let ids: Vec<String> = engine.notebooks().into_iter().map(|nb| nb.id).collect();
        for category in ParaCategory::ALL {
            assert!(ids.iter().any(|id| id == category.id()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn default_notebooks_cannot_be_deleted_or_moved() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);
        settle().await;

        assert!(!engine.delete("projects"));
        engine.move_category("projects", ParaCategory::Archive);
        settle().await;
        let projects = engine.notebook("projects");
        assert_eq!(projects.map(|nb| nb.para_category), Some(ParaCategory::Projects));
    }

    #[tokio::test(start_paused = true)]
    async fn moving_restyles_and_failed_rename_rolls_back() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);
        settle().await;

        let Some(created) = engine.create("Garden", ParaCategory::Areas) else {
            panic!("signed-in user should be able to create notebooks");
        };
        settle().await;
        engine.move_category(&created.id, ParaCategory::Archive);
        settle().await;
        let moved = engine.notebook(&created.id).unwrap();
        assert_eq!(moved.color, ParaCategory::Archive.color());
        assert_eq!(engine.by_category(ParaCategory::Archive).len(), 2);

        store.fail_writes(&created.id, "denied");
        engine.rename(&created.id, "Yard");
        assert_eq!(engine.notebook(&created.id).unwrap().name, "Yard");
        settle().await;
        assert_eq!(engine.notebook(&created.id).unwrap().name, "Garden");
    }

    #[tokio::test(start_paused = true)]
    async fn local_changes_and_rollbacks_are_announced() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);
        engine.wait_loaded().await;
        let mut changes = engine.shared.changes.subscribe();
        changes.mark_unchanged();

        let Some(created) = engine.create("Inbox", ParaCategory::Projects) else {
            panic!("signed-in user should be able to create notebooks");
        };
        assert!(changes.has_changed().unwrap());
        settle().await;
        changes.mark_unchanged();

        store.fail_writes(&created.id, "denied");
        assert!(engine.delete(&created.id));
        assert!(changes.has_changed().unwrap());
        changes.mark_unchanged();

        settle().await;
        assert!(changes.has_changed().unwrap());
        assert!(engine.notebook(&created.id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn signed_out_engine_is_inert() {
        let store = Arc::new(MemoryStore::new());
        let tracker = WriteTracker::new(Duration::from_millis(2000));
        let mut engine = NotebookSync::new(Arc::clone(&store), Session::anonymous(), tracker);
        engine.start();
        assert!(engine.create("Nope", ParaCategory::Areas).is_none());
        assert!(!engine.delete("anything"));
        assert!(store.calls().is_empty());
    }
}
