//! Pending-write accounting and the save indicator derived from it.
//!
//! Writes overlap and finish in any order, so the indicator is driven by a
//! counter: `Saving` while any write is outstanding, then `Saved` or `Error`
//! once the counter is back at zero. The status is published on a
//! [`tokio::sync::watch`] channel for whoever renders it.
use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use log::{debug, error, warn};
use tokio::sync::watch;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// A remote write was rejected. Dismissible, and cleared by the next write.
    WriteRejected,
    /// The remote subscription failed. Stays until dismissed.
    SubscriptionFailed,
}

/// A user-visible problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncIssue {
    pub kind: IssueKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub pending_writes: usize,
    pub save: SaveStatus,
    pub issue: Option<SyncIssue>,
}

impl SyncStatus {
    pub fn is_saving(&self) -> bool {
        self.pending_writes > 0
    }

    pub fn error(&self) -> Option<&str> {
        self.issue.as_ref().map(|issue| issue.message.as_str())
    }
}

#[derive(Default)]
struct TrackerState {
    pending: usize,
    failed_since_idle: bool,
    // bumped on every save transition so a stale "Saved" timer can tell it
    // has been overtaken
    save_epoch: u64,
    save: SaveStatus,
    issue: Option<SyncIssue>,
}

impl TrackerState {
    fn status(&self) -> SyncStatus {
        SyncStatus {
            pending_writes: self.pending,
            save: self.save,
            issue: self.issue.clone(),
        }
    }
}

/// Shared, process-wide pending-write counter.
#[derive(Clone)]
pub struct WriteTracker {
    state: Arc<Mutex<TrackerState>>,
    status_tx: Arc<watch::Sender<SyncStatus>>,
    saved_display: Duration,
}

impl WriteTracker {
    pub fn new(saved_display: Duration) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::default());
        Self {
            state: Arc::new(Mutex::new(TrackerState::default())),
            status_tx: Arc::new(status_tx),
            saved_display,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &TrackerState) {
        self.status_tx.send_replace(state.status());
    }

    pub fn status(&self) -> SyncStatus {
        self.lock().status()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// Counts a write as started. Call immediately before issuing it.
    pub fn begin(&self) {
        let mut state = self.lock();
        if state.pending == 0 {
            state.failed_since_idle = false;
        }
        state.pending += 1;
        state.save_epoch += 1;
        state.save = SaveStatus::Saving;
        if state
            .issue
            .as_ref()
            .is_some_and(|issue| issue.kind == IssueKind::WriteRejected)
        {
            state.issue = None;
        }
        self.publish(&state);
    }

    /// Counts a write as finished, with its failure message if it failed.
    pub fn finish(&self, failure: Option<String>) {
        let mut state = self.lock();
        state.pending = state.pending.saturating_sub(1);
        if let Some(message) = failure {
            state.failed_since_idle = true;
            state.issue = Some(SyncIssue {
                kind: IssueKind::WriteRejected,
                message,
            });
        }

        if state.pending == 0 {
            state.save_epoch += 1;
            if state.failed_since_idle {
                state.save = SaveStatus::Error;
            } else {
                state.save = SaveStatus::Saved;
                self.schedule_saved_clear(state.save_epoch);
            }
            debug!("All writes settled: {:?}", state.save);
        }
        self.publish(&state);
    }

    fn schedule_saved_clear(&self, epoch: u64) {
        let tracker = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(tracker.saved_display).await;
            let mut state = tracker.lock();
            if state.save_epoch == epoch && state.save == SaveStatus::Saved {
                state.save = SaveStatus::Idle;
                tracker.publish(&state);
            }
        });
    }

    /// Surfaces an issue that is not tied to a counted write.
    pub fn report(&self, kind: IssueKind, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        let mut state = self.lock();
        state.issue = Some(SyncIssue { kind, message });
        self.publish(&state);
    }

    /// Dismisses the current issue.
    pub fn clear_error(&self) {
        let mut state = self.lock();
        state.issue = None;
        if state.save == SaveStatus::Error {
            state.save = SaveStatus::Idle;
        }
        self.publish(&state);
    }

    /// Runs `write` on a tokio task, counted. `on_done` receives whether the
    /// write succeeded and runs before the counter is released, so a rollback
    /// is visible by the time the status changes.
    pub fn track<Fut, F>(&self, write: Fut, message: &str, on_done: F)
    where
        Fut: Future<Output = Result<()>> + Send + 'static,
        F: FnOnce(bool) + Send + 'static,
    {
        self.begin();
        let tracker = self.clone();
        let message = message.to_string();
        tokio::spawn(async move {
            match write.await {
                Ok(()) => {
                    on_done(true);
                    tracker.finish(None);
                }
                Err(e) => {
                    warn!("{}: {}", message, e);
                    on_done(false);
                    tracker.finish(Some(message));
                }
            }
        });
    }

    /// Waits until no write is outstanding.
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|status| status.pending_writes == 0).await;
    }
}
