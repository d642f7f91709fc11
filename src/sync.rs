//! The note synchronization engine.
//!
//! [`NoteSync`] owns the local snapshot of the signed-in user's notes. Every
//! mutation is applied to the snapshot first and then written to the
//! [`DocumentStore`] on a background task. Text edits go through a per-note
//! debouncer so a burst of keystrokes becomes a single remote write; if that
//! write is rejected the note goes back to how it was before the burst,
//! unless a newer edit exists. A rejected immediate change (pin, tags, move,
//! trash) is undone field by field, unless a newer immediate change to the
//! note exists.
//!
//! Pushes from the store's collection subscription replace the snapshot
//! wholesale. A push that arrives while a debounced edit is still waiting
//! wins over that edit locally; the edit is still written when its timer
//! fires.
//!
//! All methods that write must be called from within a tokio runtime.
use std::{
    collections::{hash_map::Entry, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::Utc;
use log::{debug, error, info, trace, warn};
use serde_json::Value;
use tokio::{
    sync::watch,
    task::{JoinHandle, JoinSet},
};

use crate::{
    filter_notes, normalize_tag, CollectionEvent, CollectionPath, Debouncer, DocumentStore,
    IssueKind, Note, NoteFilter, NotePatch, NoteWriteState, NotoError, Result, Session,
    StalenessGuard, SyncStatus, UpdateToken, WriteTracker,
};

pub const NOTES_SYNC_FAILED: &str = "Failed to sync notes. Please refresh and try again.";

const WELCOME_NOTE_CONTENT: &str = "# Welcome to Noto!

Noto keeps your notes organized with the **PARA method**:

- **Projects**: short-term efforts with a clear goal
- **Areas**: responsibilities you maintain over time
- **Resources**: topics you want to come back to
- **Archive**: anything inactive from the other three

## Markdown

Notes are written in Markdown. Link notes together with `[[Note title]]`
and track work with task lists:

- [x] Create a note
- [ ] Tag it
- [ ] Move it to the right notebook
";

/// Timing knobs for the engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Quiet interval before an edited note is written.
    pub update_debounce: Duration,
    /// How long "saved" stays up before the indicator goes idle.
    pub saved_display: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            update_debounce: Duration::from_millis(800),
            saved_display: Duration::from_millis(2000),
        }
    }
}

/// Edits to one note waiting for their debounce interval.
#[derive(Debug)]
struct PendingEdit {
    /// The note as it was before the first edit of this batch.
    baseline: Note,
    patch: NotePatch,
    token: UpdateToken,
}

#[derive(Debug, Default)]
struct NoteState {
    notes: Vec<Note>,
    loading: bool,
    seeded_welcome: bool,
    /// Bumped whenever the session changes; completions from an older epoch
    /// are ignored.
    epoch: u64,
    guard: StalenessGuard,
    pending: HashMap<String, PendingEdit>,
}

impl NoteState {
    fn find(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Note> {
        self.notes.iter_mut().find(|n| n.id == id)
    }

    fn replace(&mut self, note: Note) -> bool {
        match self.find_mut(&note.id) {
            Some(slot) => {
                *slot = note;
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, id: &str) -> Option<Note> {
        let index = self.notes.iter().position(|n| n.id == id)?;
        Some(self.notes.remove(index))
    }

    /// Puts notes back at the front, skipping ids that reappeared meanwhile.
    fn reinsert(&mut self, notes: Vec<Note>) {
        let present: HashSet<String> = self.notes.iter().map(|n| n.id.clone()).collect();
        let missing: Vec<Note> = notes
            .into_iter()
            .filter(|n| !present.contains(&n.id))
            .collect();
        self.notes.splice(0..0, missing);
    }

    /// Records a settled debounced write for `id`. The write state only moves
    /// when no further edit is queued behind it.
    fn settle(&mut self, id: &str, token: UpdateToken, succeeded: bool) {
        if !self.pending.contains_key(id) {
            self.guard.finish(id, token, succeeded);
        }
    }

    /// Undoes a rejected immediate write field by field. The queued edit's
    /// baseline, if there is one, is undone against its own prior copy.
    fn revert(&mut self, previous: &Note, baseline: Option<&Note>, patch: &NotePatch) {
        if let Some(note) = self.find_mut(&previous.id) {
            let mut inverse = patch.inverse(previous);
            // a later change owns the timestamp now
            if Some(note.updated_at) != patch.updated_at {
                inverse.updated_at = None;
            }
            note.apply(&inverse);
        }
        if let (Some(edit), Some(baseline)) = (self.pending.get_mut(&previous.id), baseline) {
            let mut inverse = patch.inverse(baseline);
            inverse.updated_at = None;
            edit.baseline.apply(&inverse);
        }
    }
}

/// What to undo when a write is rejected.
enum Rollback {
    /// Restore the record from before a debounced edit, if no newer edit
    /// exists.
    Restore { previous: Note, token: UpdateToken },
    /// Undo the fields of an immediate write, if no newer immediate write
    /// to the note exists.
    Revert {
        previous: Note,
        baseline: Option<Note>,
        patch: NotePatch,
        token: UpdateToken,
    },
    /// Drop a record that was optimistically added.
    Remove { id: String },
    /// Put back records that were optimistically removed.
    Reinsert { notes: Vec<Note> },
}

/// State shared with spawned write, timer and subscription tasks.
struct Shared<S> {
    store: Arc<S>,
    state: Arc<Mutex<NoteState>>,
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
    fn lock(&self) -> MutexGuard<'_, NoteState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `f` against the snapshot and announces the change.
    fn with_state<T>(&self, f: impl FnOnce(&mut NoteState) -> T) -> T {
        let result = {
            let mut state = self.lock();
            f(&mut state)
        };
        self.changes.send_modify(|revision| *revision += 1);
        result
    }

    fn serialize<T: serde::Serialize>(&self, value: &T, message: &str) -> Option<Value> {
        match serde_json::to_value(value) {
            Ok(value) => Some(value),
            Err(e) => {
                error!("Failed to serialize note write: {}", e);
                self.tracker.report(IssueKind::WriteRejected, message);
                None
            }
        }
    }

    fn apply_rollback(&self, epoch: u64, rollback: Rollback) {
        self.with_state(|state| {
            if state.epoch != epoch {
                trace!("Ignoring rollback from a previous session");
                return;
            }
            match rollback {
                Rollback::Restore { previous, token } => {
                    let id = previous.id.clone();
                    if state.guard.is_latest(&id, token) {
                        debug!("Rolling back note {}", id);
                        state.replace(previous);
                    } else {
                        debug!("Skipping rollback of note {}: superseded by a newer edit", id);
                    }
                    state.settle(&id, token, false);
                }
                Rollback::Revert {
                    previous,
                    baseline,
                    patch,
                    token,
                } => {
                    if state.guard.is_latest_write(&previous.id, token) {
                        debug!("Reverting rejected change to note {}", previous.id);
                        state.revert(&previous, baseline.as_ref(), &patch);
                    } else {
                        debug!(
                            "Skipping revert of note {}: superseded by a newer change",
                            previous.id
                        );
                    }
                }
                Rollback::Remove { id } => {
                    state.remove(&id);
                    state.guard.forget(&id);
                }
                Rollback::Reinsert { notes } => state.reinsert(notes),
            }
        });
    }

    fn settle_success(&self, epoch: u64, id: &str, token: UpdateToken) {
        self.with_state(|state| {
            if state.epoch == epoch {
                state.settle(id, token, true);
            }
        });
    }

    fn write_full(&self, path: CollectionPath, note: &Note, message: &'static str, epoch: u64) {
        let Some(record) = self.serialize(note, message) else {
            return;
        };
        let store = Arc::clone(&self.store);
        let id = note.id.clone();
        let shared = self.clone();
        self.tracker.track(
            async move { store.create_or_replace(&path, &id, record).await },
            message,
            {
                let id = note.id.clone();
                move |succeeded| {
                    if !succeeded {
                        shared.apply_rollback(epoch, Rollback::Remove { id });
                    }
                }
            },
        );
    }

    /// Sends a partial update. A debounced edit settles its write state on
    /// success; either kind applies `rollback` on failure.
    fn write_patch(
        &self,
        path: CollectionPath,
        id: String,
        partial: Value,
        message: &'static str,
        epoch: u64,
        rollback: Rollback,
    ) {
        let store = Arc::clone(&self.store);
        let shared = self.clone();
        let owned_id = id.clone();
        self.tracker.track(
            async move { store.update_partial(&path, &owned_id, partial).await },
            message,
            move |succeeded| {
                if !succeeded {
                    shared.apply_rollback(epoch, rollback);
                } else if let Rollback::Restore { token, .. } = rollback {
                    shared.settle_success(epoch, &id, token);
                }
            },
        );
    }

    /// Sends the batched edits of one note. Runs when its debounce timer fires.
    fn flush_edit(&self, path: CollectionPath, id: &str, epoch: u64) {
        let edit = self.with_state(|state| {
            if state.epoch != epoch {
                return None;
            }
            let edit = state.pending.remove(id)?;
            state.guard.set_state(id, NoteWriteState::WriteInFlight);
            Some(edit)
        });
        let Some(edit) = edit else {
            return;
        };
        let Some(partial) = self.serialize(&edit.patch, UPDATE_FAILED) else {
            return;
        };
        debug!("Writing debounced edits of note {}", id);
        let rollback = Rollback::Restore {
            previous: edit.baseline,
            token: edit.token,
        };
        self.write_patch(path, id.to_string(), partial, UPDATE_FAILED, epoch, rollback);
    }

    fn apply_event(&self, path: &CollectionPath, epoch: u64, event: CollectionEvent) {
        match event {
            CollectionEvent::Snapshot(records) => {
                let notes = parse_snapshot(records);
                trace!("Received snapshot of {} notes", notes.len());
                let welcome = self.with_state(|state| {
                    if state.epoch != epoch {
                        return None;
                    }
                    state.loading = false;
                    if notes.is_empty() && !state.seeded_welcome {
                        state.seeded_welcome = true;
                        let welcome = welcome_note();
                        state.notes = vec![welcome.clone()];
                        return Some(welcome);
                    }
                    state.seeded_welcome = true;
                    state.notes = notes;
                    None
                });
                if let Some(welcome) = welcome {
                    info!("Seeding welcome note for new user");
                    self.write_full(path.clone(), &welcome, "Failed to create welcome note.", epoch);
                }
            }
            CollectionEvent::Error(message) => {
                error!("Note subscription error: {}", message);
                self.with_state(|state| {
                    if state.epoch == epoch {
                        state.loading = false;
                    }
                });
                self.tracker.report(IssueKind::SubscriptionFailed, NOTES_SYNC_FAILED);
            }
        }
    }
}

const UPDATE_FAILED: &str = "Failed to save note changes. Please retry.";

fn welcome_note() -> Note {
    let mut note = Note::new("resources");
    note.title = "Welcome to Noto!".to_string();
    note.content = WELCOME_NOTE_CONTENT.to_string();
    note.tags = vec!["welcome".to_string(), "getting-started".to_string()];
    note.pinned = true;
    note
}

/// Decodes a pushed collection, dropping malformed records and repeated ids.
fn parse_snapshot(records: Vec<Value>) -> Vec<Note> {
    let mut seen = HashSet::new();
    let mut notes = Vec::with_capacity(records.len());
    for record in records {
        match serde_json::from_value::<Note>(record) {
            Ok(note) => {
                if seen.insert(note.id.clone()) {
                    notes.push(note);
                } else {
                    warn!("Dropping duplicate note {} from snapshot", note.id);
                }
            }
            Err(e) => warn!("Skipping malformed note record: {}", e),
        }
    }
    notes
}

/// Keeps the signed-in user's notes in sync with a [`DocumentStore`].
pub struct NoteSync<S: DocumentStore> {
    shared: Shared<S>,
    session: Session,
    debouncer: Debouncer,
    subscription: Option<JoinHandle<()>>,
}

impl<S: DocumentStore> NoteSync<S> {
    /// Creates the engine. Nothing is loaded until [`NoteSync::start`].
    pub fn new(store: Arc<S>, session: Session, tracker: WriteTracker, settings: SyncSettings) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            shared: Shared {
                store,
                state: Arc::new(Mutex::new(NoteState::default())),
                tracker,
                changes: Arc::new(changes),
            },
            session,
            debouncer: Debouncer::new(settings.update_debounce),
            subscription: None,
        }
    }

    fn collection(&self) -> Option<CollectionPath> {
        self.session.user_id().map(CollectionPath::notes)
    }

    /// Subscribes to the user's note collection. A no-op when signed out.
    pub fn start(&mut self) {
        self.stop_subscription();
        let Some(path) = self.collection() else {
            debug!("No signed-in user; note sync idle");
            return;
        };

        let epoch = self.shared.with_state(|state| {
            state.loading = true;
            state.epoch
        });

        match self.shared.store.subscribe_collection(&path) {
            Ok(mut subscription) => {
                info!("Subscribed to {}", path);
                let shared = self.shared.clone();
                self.subscription = Some(tokio::spawn(async move {
                    while let Some(event) = subscription.next().await {
                        shared.apply_event(&path, epoch, event);
                    }
                    debug!("Note subscription for {} ended", path);
                }));
            }
            Err(e) => {
                error!("Failed to subscribe to {}: {}", path, e);
                self.shared.with_state(|state| state.loading = false);
                self.shared
                    .tracker
                    .report(IssueKind::SubscriptionFailed, NOTES_SYNC_FAILED);
            }
        }
    }

    fn stop_subscription(&mut self) {
        if let Some(handle) = self.subscription.take() {
            debug!("Tearing down note subscription");
            handle.abort();
        }
    }

    /// Tears down everything belonging to the current user and starts over
    /// for `session`. Pending debounced writes are dropped, not sent.
    pub fn switch_session(&mut self, session: Session) {
        info!("Switching note sync session");
        self.stop_subscription();
        let dropped = self.debouncer.cancel_all();
        if dropped > 0 {
            warn!("Dropped {} unsent note edits on session change", dropped);
        }
        let signed_in = session.is_signed_in();
        self.shared.with_state(|state| {
            state.epoch += 1;
            state.guard.reset();
            state.pending.clear();
            state.notes.clear();
            state.seeded_welcome = false;
            state.loading = signed_in;
        });
        self.shared.tracker.clear_error();
        self.session = session;
        self.start();
    }

    /// Sends every waiting debounced edit now and waits for all outstanding
    /// writes, giving up after `timeout`.
    pub async fn flush(&self, timeout: Duration) -> Result<()> {
        let flushed = self.debouncer.flush_all();
        if flushed > 0 {
            debug!("Flushed {} debounced note writes", flushed);
        }
        tokio::time::timeout(timeout, self.shared.tracker.wait_idle())
            .await
            .map_err(|_| NotoError::SyncFailed {
                message: "Timed out while waiting for pending writes".to_string(),
            })
    }

    /// Flushes pending writes and stops the subscription.
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down note sync...");
        let flushed = self.flush(Duration::from_secs(5)).await;
        self.stop_subscription();
        flushed
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn notes(&self) -> Vec<Note> {
        self.shared.lock().notes.clone()
    }

    pub fn note(&self, id: &str) -> Option<Note> {
        self.shared.lock().find(id).cloned()
    }

    pub fn filtered_notes(&self, filter: &NoteFilter) -> Vec<Note> {
        filter_notes(&self.shared.lock().notes, filter)
    }

    pub fn all_tags(&self) -> Vec<String> {
        crate::all_tags(&self.shared.lock().notes)
    }

    pub fn is_loading(&self) -> bool {
        self.shared.lock().loading
    }

    pub fn status(&self) -> SyncStatus {
        self.shared.tracker.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.shared.tracker.subscribe()
    }

    /// A receiver that changes whenever the local snapshot does.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.shared.changes.subscribe()
    }

    pub fn clear_error(&self) {
        self.shared.tracker.clear_error();
    }

    pub fn write_state(&self, id: &str) -> NoteWriteState {
        self.shared.lock().guard.state(id)
    }

    pub fn has_pending_edit(&self, id: &str) -> bool {
        self.debouncer.is_pending(id)
    }

    /// Waits for the first snapshot after [`NoteSync::start`].
    pub async fn wait_loaded(&self) {
        let mut changes = self.subscribe_changes();
        while self.is_loading() {
            if changes.changed().await.is_err() {
                return;
            }
        }
    }

    /// Creates an empty note at the top of the list.
    pub fn create(&self, notebook_id: &str) -> Option<Note> {
        let path = self.collection()?;
        let note = Note::new(notebook_id);
        let epoch = self.shared.with_state(|state| {
            state.notes.insert(0, note.clone());
            state.epoch
        });
        info!("Created note {}", note.id);
        self.shared
            .write_full(path, &note, "Failed to create note.", epoch);
        Some(note)
    }

    /// Applies `patch` locally now and writes it once the note has been quiet
    /// for the debounce interval. Consecutive edits are merged into one write.
    pub fn update(&self, id: &str, patch: NotePatch) {
        let Some(path) = self.collection() else {
            return;
        };
        let patch = patch.touched(Utc::now());
        let epoch = self.shared.with_state(|state| {
            let note = state.find_mut(id)?;
            let before = note.clone();
            note.apply(&patch);
            let token = state.guard.mint(id);
            state.guard.set_state(id, NoteWriteState::EditingPending);
            match state.pending.entry(id.to_string()) {
                Entry::Occupied(mut entry) => {
                    let edit = entry.get_mut();
                    edit.patch.merge(patch);
                    edit.token = token;
                }
                Entry::Vacant(entry) => {
                    entry.insert(PendingEdit {
                        baseline: before,
                        patch,
                        token,
                    });
                }
            }
            Some(state.epoch)
        });
        let Some(epoch) = epoch else {
            debug!("Ignoring update of unknown note {}", id);
            return;
        };

        let shared = self.shared.clone();
        let owned_id = id.to_string();
        self.debouncer
            .schedule(id, move || shared.flush_edit(path, &owned_id, epoch));
    }

    /// Applies an immediately-written change built from the current record.
    /// `build` returning `None` makes the call a no-op.
    fn mutate(&self, id: &str, message: &'static str, build: impl FnOnce(&Note) -> Option<NotePatch>) {
        let Some(path) = self.collection() else {
            return;
        };
        let now = Utc::now();
        let prepared = self.shared.with_state(|state| {
            let previous = state.find(id)?.clone();
            let patch = build(&previous)?.touched(now);
            let partial = serde_json::to_value(&patch).ok()?;
            if let Some(note) = state.find_mut(id) {
                note.apply(&patch);
            }
            // keep a queued text edit from undoing this change on rollback;
            // the baseline keeps its pre-edit timestamp
            let baseline = state.pending.get_mut(id).map(|edit| {
                let prior = edit.baseline.clone();
                edit.baseline.apply(&NotePatch {
                    updated_at: None,
                    ..patch.clone()
                });
                prior
            });
            let token = state.guard.mint_write(id);
            Some((previous, baseline, patch, partial, token, state.epoch))
        });
        let Some((previous, baseline, patch, partial, token, epoch)) = prepared else {
            return;
        };
        let rollback = Rollback::Revert {
            previous,
            baseline,
            patch,
            token,
        };
        self.shared
            .write_patch(path, id.to_string(), partial, message, epoch, rollback);
    }

    /// Moves a note to the trash.
    pub fn delete(&self, id: &str) {
        self.mutate(id, "Failed to move note to trash.", |_| {
            Some(NotePatch {
                trashed: Some(true),
                ..NotePatch::default()
            })
        });
    }

    pub fn restore(&self, id: &str) {
        self.mutate(id, "Failed to restore note.", |_| {
            Some(NotePatch {
                trashed: Some(false),
                ..NotePatch::default()
            })
        });
    }

    pub fn toggle_pin(&self, id: &str) {
        self.mutate(id, "Failed to update pin state.", |note| {
            Some(NotePatch {
                pinned: Some(!note.pinned),
                ..NotePatch::default()
            })
        });
    }

    pub fn move_to_notebook(&self, id: &str, notebook_id: &str) {
        self.mutate(id, "Failed to move note to notebook.", |note| {
            (note.notebook_id != notebook_id).then(|| NotePatch {
                notebook_id: Some(notebook_id.to_string()),
                ..NotePatch::default()
            })
        });
    }

    /// Adds a tag. Adding a tag the note already has does nothing.
    pub fn add_tag(&self, id: &str, tag: &str) {
        let tag = normalize_tag(tag);
        if tag.is_empty() {
            return;
        }
        self.mutate(id, "Failed to add tag.", |note| {
            if note.has_tag(&tag) {
                return None;
            }
            let mut tags = note.tags.clone();
            tags.push(tag);
            Some(NotePatch {
                tags: Some(tags),
                ..NotePatch::default()
            })
        });
    }

    pub fn remove_tag(&self, id: &str, tag: &str) {
        let tag = normalize_tag(tag);
        self.mutate(id, "Failed to remove tag.", |note| {
            if !note.has_tag(&tag) {
                return None;
            }
            let tags = note.tags.iter().filter(|t| **t != tag).cloned().collect();
            Some(NotePatch {
                tags: Some(tags),
                ..NotePatch::default()
            })
        });
    }

    /// Removes a note from the snapshot and the store for good.
    pub fn permanently_delete(&self, id: &str) {
        let Some(path) = self.collection() else {
            return;
        };
        self.debouncer.cancel(id);
        let removed = self.shared.with_state(|state| {
            state.pending.remove(id);
            let removed = state.remove(id)?;
            state.guard.forget(id);
            Some((removed, state.epoch))
        });
        let Some((removed, epoch)) = removed else {
            return;
        };

        info!("Permanently deleting note {}", id);
        let store = Arc::clone(&self.shared.store);
        let shared = self.shared.clone();
        let owned_id = id.to_string();
        self.shared.tracker.track(
            async move { store.delete(&path, &owned_id).await },
            "Failed to permanently delete note.",
            move |succeeded| {
                if !succeeded {
                    shared.apply_rollback(epoch, Rollback::Reinsert { notes: vec![removed] });
                }
            },
        );
    }

    /// Permanently deletes every trashed note. If any delete is rejected all
    /// of them are put back and a single error is raised.
    pub fn empty_trash(&self) {
        let Some(path) = self.collection() else {
            return;
        };
        let (trashed, epoch) = self.shared.with_state(|state| {
            let (trashed, kept): (Vec<Note>, Vec<Note>) =
                std::mem::take(&mut state.notes).into_iter().partition(|n| n.trashed);
            state.notes = kept;
            for note in &trashed {
                state.pending.remove(&note.id);
                state.guard.forget(&note.id);
            }
            (trashed, state.epoch)
        });
        if trashed.is_empty() {
            return;
        }
        for note in &trashed {
            self.debouncer.cancel(&note.id);
        }

        info!("Emptying trash ({} notes)", trashed.len());
        let ids: Vec<String> = trashed.iter().map(|n| n.id.clone()).collect();
        let store = Arc::clone(&self.shared.store);
        let shared = self.shared.clone();
        self.shared.tracker.track(
            async move {
                let mut deletes = JoinSet::new();
                for id in ids {
                    let store = Arc::clone(&store);
                    let path = path.clone();
                    deletes.spawn(async move { store.delete(&path, &id).await });
                }
                let mut first_error = None;
                while let Some(joined) = deletes.join_next().await {
                    let outcome = joined.unwrap_or_else(|e| {
                        Err(NotoError::SyncFailed {
                            message: e.to_string(),
                        })
                    });
                    if let Err(e) = outcome {
                        first_error.get_or_insert(e);
                    }
                }
                match first_error {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            },
            "Failed to empty trash. Please try again.",
            move |succeeded| {
                if !succeeded {
                    shared.apply_rollback(epoch, Rollback::Reinsert { notes: trashed });
                }
            },
        );
    }

    /// Copies a note under a new id and title, unpinned.
    pub fn duplicate(&self, id: &str) -> Option<Note> {
        let path = self.collection()?;
        let (copy, epoch) = self.shared.with_state(|state| {
            let copy = state.find(id)?.duplicate();
            state.notes.insert(0, copy.clone());
            Some((copy, state.epoch))
        })?;
        info!("Duplicated note {} as {}", id, copy.id);
        self.shared
            .write_full(path, &copy, "Failed to duplicate note.", epoch);
        Some(copy)
    }
}

impl<S: DocumentStore> Drop for NoteSync<S> {
    fn drop(&mut self) {
        self.stop_subscription();
        self.debouncer.cancel_all();
    }
}
