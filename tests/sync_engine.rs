use std::{sync::Arc, time::Duration};

use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::sleep;

use noto::{
    CollectionPath, IssueKind, MemoryStore, Note, NoteFilter, NotePatch, NoteStatus, NoteSync,
    NoteWriteState, SaveStatus, Session, StoreCall, SyncSettings, WriteTracker,
};

const USER: &str = "user-1";

fn notes_path() -> CollectionPath {
    CollectionPath::notes(USER)
}

fn note(id: &str, title: &str, minutes_ago: i64) -> Note {
    let mut note = Note::new("projects");
    note.id = id.to_string();
    note.title = title.to_string();
    note.updated_at = Utc::now() - ChronoDuration::minutes(minutes_ago);
    note
}

fn seed(store: &MemoryStore, notes: &[Note]) {
    for note in notes {
        store.insert(&notes_path(), serde_json::to_value(note).unwrap());
    }
}

async fn engine(store: &Arc<MemoryStore>) -> NoteSync<MemoryStore> {
    let settings = SyncSettings::default();
    let tracker = WriteTracker::new(settings.saved_display);
    let mut sync = NoteSync::new(Arc::clone(store), Session::signed_in(USER), tracker, settings);
    sync.start();
    sync.wait_loaded().await;
    sync
}

fn writes_for(store: &MemoryStore, id: &str) -> Vec<StoreCall> {
    store.calls_for(id)
}

#[tokio::test(start_paused = true)]
async fn edits_within_the_quiet_interval_become_one_merged_write() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[note("n1", "Draft", 5)]);
    let sync = engine(&store).await;

    sync.update("n1", NotePatch::title("Plan"));
    sleep(Duration::from_millis(400)).await;
    sync.update("n1", NotePatch::content("first line"));
    sync.update("n1", NotePatch::title("Final plan"));

    let local = sync.note("n1").unwrap();
    assert_eq!(local.title, "Final plan");
    assert_eq!(local.content, "first line");
    assert_eq!(sync.write_state("n1"), NoteWriteState::EditingPending);

    // the timer restarted at t=400
    sleep(Duration::from_millis(790)).await;
    assert!(writes_for(&store, "n1").is_empty());

    sleep(Duration::from_millis(50)).await;
    let calls = writes_for(&store, "n1");
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        StoreCall::UpdatePartial { partial, .. } => {
            assert_eq!(partial["title"], "Final plan");
            assert_eq!(partial["content"], "first line");
            assert!(partial.get("updatedAt").is_some());
            assert!(partial.get("pinned").is_none());
        }
        other => panic!("expected a partial update, got {:?}", other),
    }
    assert_eq!(sync.write_state("n1"), NoteWriteState::Clean);
}

#[tokio::test(start_paused = true)]
async fn notes_have_independent_debounce_timers() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[note("a", "A", 5), note("b", "B", 5)]);
    let sync = engine(&store).await;

    sync.update("a", NotePatch::title("A2"));
    sleep(Duration::from_millis(500)).await;
    sync.update("b", NotePatch::title("B2"));
    sleep(Duration::from_millis(350)).await;

    assert_eq!(writes_for(&store, "a").len(), 1);
    assert!(writes_for(&store, "b").is_empty());

    sleep(Duration::from_millis(500)).await;
    assert_eq!(writes_for(&store, "b").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn adding_a_present_tag_is_a_no_op() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[note("n1", "Tagged", 5)]);
    let sync = engine(&store).await;

    sync.add_tag("n1", "rust");
    let after_first = sync.note("n1").unwrap().tags;
    sync.add_tag("n1", "rust");
    sync.add_tag("n1", "  Rust ");
    sleep(Duration::from_millis(50)).await;

    assert_eq!(after_first, vec!["rust".to_string()]);
    assert_eq!(sync.note("n1").unwrap().tags, after_first);
    assert_eq!(writes_for(&store, "n1").len(), 1);

    // removing a missing tag does nothing either
    sync.remove_tag("n1", "go");
    sleep(Duration::from_millis(50)).await;
    assert_eq!(writes_for(&store, "n1").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn tags_are_removed_by_the_label_they_were_added_with() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[note("n1", "Focus", 5)]);
    let sync = engine(&store).await;

    sync.add_tag("n1", "Deep Work");
    assert_eq!(sync.note("n1").unwrap().tags, vec!["deep-work".to_string()]);
    sync.remove_tag("n1", "Deep Work");
    assert!(sync.note("n1").unwrap().tags.is_empty());

    sleep(Duration::from_millis(50)).await;
    assert_eq!(writes_for(&store, "n1").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_debounced_write_restores_the_exact_previous_record() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[note("n1", "Original", 30)]);
    let sync = engine(&store).await;
    let before = sync.note("n1").unwrap();

    store.fail_writes("n1", "permission denied");
    sync.update("n1", NotePatch::title("Changed"));
    sync.update("n1", NotePatch::content("more"));
    assert_eq!(sync.note("n1").unwrap().title, "Changed");

    sleep(Duration::from_millis(900)).await;
    assert_eq!(sync.note("n1"), Some(before));
    assert_eq!(sync.write_state("n1"), NoteWriteState::RolledBack);

    let status = sync.status();
    assert_eq!(status.save, SaveStatus::Error);
    assert_eq!(status.error(), Some("Failed to save note changes. Please retry."));
    assert_eq!(status.issue.map(|i| i.kind), Some(IssueKind::WriteRejected));
}

#[tokio::test(start_paused = true)]
async fn rollback_is_skipped_when_a_newer_edit_exists() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[note("n1", "Original", 30)]);
    let sync = engine(&store).await;

    store.fail_writes("n1", "permission denied");
    store.set_latency("n1", Duration::from_millis(500));

    sync.update("n1", NotePatch::title("First"));
    // write fires at t=800 and is rejected at t=1300
    sleep(Duration::from_millis(850)).await;
    assert_eq!(sync.write_state("n1"), NoteWriteState::WriteInFlight);
    sync.update("n1", NotePatch::title("Second"));

    sleep(Duration::from_millis(500)).await;
    assert_eq!(sync.note("n1").unwrap().title, "Second");
    assert_eq!(sync.write_state("n1"), NoteWriteState::EditingPending);
    assert_eq!(
        sync.status().error(),
        Some("Failed to save note changes. Please retry.")
    );
}

#[tokio::test(start_paused = true)]
async fn immediate_changes_do_not_block_rollback_of_an_earlier_edit() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[note("n1", "Original", 30)]);
    let sync = engine(&store).await;
    store.hold_pushes();

    sync.update("n1", NotePatch::title("Changed"));
    sleep(Duration::from_millis(100)).await;
    sync.toggle_pin("n1");
    sleep(Duration::from_millis(50)).await;
    assert!(sync.note("n1").unwrap().pinned);
    assert_eq!(sync.write_state("n1"), NoteWriteState::EditingPending);

    // the debounced title write fires at t=800 and is rejected
    store.fail_writes("n1", "permission denied");
    sleep(Duration::from_millis(700)).await;

    let local = sync.note("n1").unwrap();
    assert_eq!(local.title, "Original");
    assert!(local.pinned);
    assert!(!sync.has_pending_edit("n1"));
    assert_eq!(sync.write_state("n1"), NoteWriteState::RolledBack);
    assert_eq!(
        sync.status().error(),
        Some("Failed to save note changes. Please retry.")
    );
}

#[tokio::test(start_paused = true)]
async fn rejected_immediate_change_keeps_a_queued_edit() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[note("n1", "Original", 30)]);
    let sync = engine(&store).await;
    store.hold_pushes();

    sync.update("n1", NotePatch::title("Changed"));
    store.fail_writes("n1", "offline");
    sync.toggle_pin("n1");
    sleep(Duration::from_millis(50)).await;

    let local = sync.note("n1").unwrap();
    assert!(!local.pinned);
    assert_eq!(local.title, "Changed");
    assert_eq!(sync.write_state("n1"), NoteWriteState::EditingPending);

    store.heal("n1");
    sleep(Duration::from_millis(800)).await;
    assert_eq!(sync.write_state("n1"), NoteWriteState::Clean);
    let stored = store.document(&notes_path(), "n1").unwrap();
    assert_eq!(stored["title"], "Changed");
    assert_eq!(stored["pinned"], false);
}

#[tokio::test(start_paused = true)]
async fn failed_immediate_write_rolls_back() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[note("n1", "Pinned?", 5)]);
    let sync = engine(&store).await;

    store.fail_writes("n1", "offline");
    sync.toggle_pin("n1");
    assert!(sync.note("n1").unwrap().pinned);

    sleep(Duration::from_millis(50)).await;
    assert!(!sync.note("n1").unwrap().pinned);
    assert_eq!(sync.status().error(), Some("Failed to update pin state."));

    sync.clear_error();
    assert_eq!(sync.status().save, SaveStatus::Idle);
    assert!(sync.status().issue.is_none());
}

#[tokio::test(start_paused = true)]
async fn filtered_views_partition_on_trash_and_sort_pinned_first() {
    let store = Arc::new(MemoryStore::new());
    let mut pinned_old = note("pinned-old", "Pinned", 120);
    pinned_old.pinned = true;
    let mut trashed = note("trashed", "Gone", 1);
    trashed.trashed = true;
    seed(
        &store,
        &[note("older", "Older", 60), trashed, note("newest", "Newest", 2), pinned_old],
    );
    let sync = engine(&store).await;

    let ids = |notes: Vec<Note>| notes.into_iter().map(|n| n.id).collect::<Vec<_>>();
    assert_eq!(ids(sync.filtered_notes(&NoteFilter::trash())), vec!["trashed"]);
    assert_eq!(
        ids(sync.filtered_notes(&NoteFilter::default())),
        vec!["pinned-old", "newest", "older"]
    );

    sync.delete("newest");
    assert_eq!(
        ids(sync.filtered_notes(&NoteFilter::default())),
        vec!["pinned-old", "older"]
    );
    sync.restore("newest");
    assert_eq!(sync.filtered_notes(&NoteFilter::default()).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn empty_trash_restores_every_note_on_failure() {
    let store = Arc::new(MemoryStore::new());
    let mut notes = vec![note("live", "Live", 1)];
    for i in 0..3 {
        let mut trashed = note(&format!("t{}", i), "Trash", 10 + i);
        trashed.trashed = true;
        notes.push(trashed);
    }
    seed(&store, &notes);
    let sync = engine(&store).await;
    for i in 0..3 {
        store.fail_writes(&format!("t{}", i), "unavailable");
    }

    let mut status_rx = sync.subscribe_status();
    sync.empty_trash();
    assert!(sync.filtered_notes(&NoteFilter::trash()).is_empty());
    assert_eq!(sync.notes().len(), 1);

    sleep(Duration::from_millis(50)).await;
    assert_eq!(sync.filtered_notes(&NoteFilter::trash()).len(), 3);
    assert_eq!(sync.notes().len(), 4);

    let deletes = store
        .calls()
        .into_iter()
        .filter(|call| matches!(call, StoreCall::Delete { .. }))
        .count();
    assert_eq!(deletes, 3);

    let status = status_rx.borrow_and_update().clone();
    assert_eq!(status.pending_writes, 0);
    assert_eq!(status.save, SaveStatus::Error);
    assert_eq!(status.error(), Some("Failed to empty trash. Please try again."));
}

#[tokio::test(start_paused = true)]
async fn empty_trash_removes_trashed_notes_from_the_store() {
    let store = Arc::new(MemoryStore::new());
    let mut trashed = note("t1", "Trash", 10);
    trashed.trashed = true;
    seed(&store, &[note("live", "Live", 1), trashed]);
    let sync = engine(&store).await;

    sync.empty_trash();
    sleep(Duration::from_millis(50)).await;
    assert!(store.document(&notes_path(), "t1").is_none());
    assert_eq!(sync.notes().len(), 1);
    assert_eq!(sync.status().save, SaveStatus::Saved);
}

#[tokio::test(start_paused = true)]
async fn overlapping_writes_keep_saving_until_the_last_one_settles() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[note("w1", "Slow", 5), note("w2", "Fast", 5)]);
    let sync = engine(&store).await;

    store.set_latency("w1", Duration::from_millis(500));
    store.fail_writes("w1", "timeout");
    store.set_latency("w2", Duration::from_millis(100));

    sync.toggle_pin("w1");
    sync.toggle_pin("w2");
    assert_eq!(sync.status().save, SaveStatus::Saving);
    assert_eq!(sync.status().pending_writes, 2);

    sleep(Duration::from_millis(150)).await;
    assert_eq!(sync.status().save, SaveStatus::Saving);
    assert_eq!(sync.status().pending_writes, 1);

    sleep(Duration::from_millis(340)).await;
    assert!(sync.status().is_saving());

    sleep(Duration::from_millis(20)).await;
    let status = sync.status();
    assert_eq!(status.pending_writes, 0);
    assert_eq!(status.save, SaveStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn saved_indicator_clears_after_display_interval() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[note("n1", "Note", 5)]);
    let sync = engine(&store).await;

    sync.toggle_pin("n1");
    sleep(Duration::from_millis(10)).await;
    assert_eq!(sync.status().save, SaveStatus::Saved);
    sleep(Duration::from_millis(2000)).await;
    assert_eq!(sync.status().save, SaveStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn duplicate_copies_everything_but_identity_and_pin() {
    let store = Arc::new(MemoryStore::new());
    let mut original = note("orig", "Recipe", 90);
    original.content = "- [ ] eggs".into();
    original.tags = vec!["food".into()];
    original.pinned = true;
    original.status = Some(NoteStatus::InProgress);
    seed(&store, &[original.clone()]);
    let sync = engine(&store).await;

    let copy = sync.duplicate("orig").unwrap();
    assert_eq!(copy.title, "Recipe (Copy)");
    assert!(!copy.pinned);
    assert_ne!(copy.id, original.id);

    let expected = Note {
        id: copy.id.clone(),
        title: copy.title.clone(),
        created_at: copy.created_at,
        updated_at: copy.updated_at,
        pinned: false,
        ..original.clone()
    };
    assert_eq!(copy, expected);
    assert_eq!(sync.notes()[0].id, copy.id);

    sleep(Duration::from_millis(50)).await;
    assert!(store.document(&notes_path(), &copy.id).is_some());
}

#[tokio::test(start_paused = true)]
async fn created_notes_are_prepended_and_removed_if_rejected() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[note("n1", "Existing", 5)]);
    let sync = engine(&store).await;

    let created = sync.create("areas").unwrap();
    assert_eq!(sync.notes()[0].id, created.id);
    assert!(created.title.is_empty() && !created.pinned && !created.trashed);
    sleep(Duration::from_millis(50)).await;
    assert!(store.document(&notes_path(), &created.id).is_some());

    store.fail_all_writes("quota exceeded");
    let rejected = sync.create("areas").unwrap();
    assert!(sync.note(&rejected.id).is_some());
    sleep(Duration::from_millis(50)).await;

    assert!(sync.note(&rejected.id).is_none());
    assert!(sync.note(&created.id).is_some());
    assert_eq!(sync.status().error(), Some("Failed to create note."));
}

#[tokio::test(start_paused = true)]
async fn failed_permanent_delete_puts_the_note_back() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[note("n1", "Keep me", 5)]);
    let sync = engine(&store).await;

    store.fail_writes("n1", "denied");
    sync.permanently_delete("n1");
    assert!(sync.note("n1").is_none());

    sleep(Duration::from_millis(50)).await;
    assert!(sync.note("n1").is_some());
    assert_eq!(sync.status().error(), Some("Failed to permanently delete note."));
}

#[tokio::test(start_paused = true)]
async fn empty_collection_gets_a_welcome_note() {
    let store = Arc::new(MemoryStore::new());
    let sync = engine(&store).await;

    let notes = sync.notes();
    assert_eq!(notes.len(), 1);
    assert!(notes[0].pinned);
    assert_eq!(notes[0].notebook_id, "resources");
    assert!(notes[0].has_tag("welcome"));

    sleep(Duration::from_millis(50)).await;
    assert_eq!(store.len(&notes_path()), 1);
}

#[tokio::test(start_paused = true)]
async fn subscription_errors_are_persistent() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[note("n1", "Note", 5)]);
    let sync = engine(&store).await;

    store.push_error(&notes_path(), "stream reset");
    sleep(Duration::from_millis(10)).await;
    assert_eq!(sync.notes().len(), 1);
    let status = sync.status();
    assert_eq!(status.issue.as_ref().map(|i| i.kind), Some(IssueKind::SubscriptionFailed));

    // a successful write does not hide it
    sync.toggle_pin("n1");
    sleep(Duration::from_millis(10)).await;
    assert_eq!(
        sync.status().error(),
        Some("Failed to sync notes. Please refresh and try again.")
    );
}

#[tokio::test(start_paused = true)]
async fn signed_out_engine_ignores_mutations() {
    let store = Arc::new(MemoryStore::new());
    let settings = SyncSettings::default();
    let mut sync = NoteSync::new(
        Arc::clone(&store),
        Session::anonymous(),
        WriteTracker::new(settings.saved_display),
        settings,
    );
    sync.start();

    assert!(sync.create("projects").is_none());
    sync.update("n1", NotePatch::title("nope"));
    sync.empty_trash();
    sleep(Duration::from_secs(1)).await;
    assert!(store.calls().is_empty());
    assert!(sync.notes().is_empty());
    assert!(!sync.is_loading());
}

#[tokio::test(start_paused = true)]
async fn switching_users_drops_pending_edits() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[note("n1", "Mine", 5)]);
    store.insert(
        &CollectionPath::notes("user-2"),
        serde_json::to_value(note("other", "Theirs", 5)).unwrap(),
    );
    let mut sync = engine(&store).await;

    sync.update("n1", NotePatch::title("unsent"));
    assert!(sync.has_pending_edit("n1"));
    sync.switch_session(Session::signed_in("user-2"));
    sync.wait_loaded().await;

    assert!(!sync.has_pending_edit("n1"));
    assert_eq!(sync.write_state("n1"), NoteWriteState::Clean);
    let ids: Vec<String> = sync.notes().into_iter().map(|n| n.id).collect();
    assert_eq!(ids, vec!["other"]);

    sleep(Duration::from_secs(2)).await;
    assert!(writes_for(&store, "n1").is_empty());
}

#[tokio::test(start_paused = true)]
async fn flush_sends_pending_edits_immediately() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &[note("n1", "Note", 5)]);
    let sync = engine(&store).await;

    sync.update("n1", NotePatch::title("Saved on exit"));
    sync.flush(Duration::from_secs(5)).await.unwrap();

    let stored = store.document(&notes_path(), "n1").unwrap();
    assert_eq!(stored["title"], "Saved on exit");
}

#[tokio::test(start_paused = true)]
async fn failing_to_subscribe_is_reported() {
    let store = Arc::new(MemoryStore::new());
    store.fail_subscriptions("unauthenticated");
    let sync = engine(&store).await;

    assert!(!sync.is_loading());
    assert!(sync.notes().is_empty());
    let status = sync.status();
    assert_eq!(status.issue.map(|i| i.kind), Some(IssueKind::SubscriptionFailed));
}
