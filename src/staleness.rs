//! Per-note staleness tokens and write states.
//!
//! Every debounced edit of a note mints a fresh [`UpdateToken`] and records
//! it as that note's latest edit. A debounced write that fails may only roll
//! the note back if its token is still the latest edit; otherwise newer local
//! input exists and the rollback is skipped.
//!
//! Immediate writes (pin, tags, trash, ...) draw from the same clock but are
//! tracked separately, so they never make a pending edit look superseded.
use std::collections::HashMap;

use chrono::Utc;

/// Strictly increasing marker: wall-clock millis with a sequence tiebreak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UpdateToken {
    millis: i64,
    seq: u64,
}

/// Where a note is in its local-edit/remote-write lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoteWriteState {
    /// Local and remote agree as far as we know.
    #[default]
    Clean,
    /// Edited locally; a debounced write is scheduled.
    EditingPending,
    /// A write carrying the latest edit is in flight.
    WriteInFlight,
    /// The latest write failed and the note was restored.
    RolledBack,
}

#[derive(Debug, Default)]
pub struct StalenessGuard {
    last: Option<UpdateToken>,
    latest: HashMap<String, UpdateToken>,
    latest_writes: HashMap<String, UpdateToken>,
    states: HashMap<String, NoteWriteState>,
}

impl StalenessGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_token(&mut self) -> UpdateToken {
        let millis = Utc::now().timestamp_millis();
        let token = match self.last {
            // Same millisecond, or the clock stepped backwards.
            Some(last) if millis <= last.millis => UpdateToken {
                millis: last.millis,
                seq: last.seq + 1,
            },
            _ => UpdateToken { millis, seq: 0 },
        };
        self.last = Some(token);
        token
    }

    /// Mints a token and records it as the latest edit of `id`.
    pub fn mint(&mut self, id: &str) -> UpdateToken {
        let token = self.next_token();
        self.latest.insert(id.to_string(), token);
        token
    }

    pub fn is_latest(&self, id: &str, token: UpdateToken) -> bool {
        self.latest.get(id) == Some(&token)
    }

    /// Mints a token for an immediate write of `id`.
    pub fn mint_write(&mut self, id: &str) -> UpdateToken {
        let token = self.next_token();
        self.latest_writes.insert(id.to_string(), token);
        token
    }

    pub fn is_latest_write(&self, id: &str, token: UpdateToken) -> bool {
        self.latest_writes.get(id) == Some(&token)
    }

    pub fn state(&self, id: &str) -> NoteWriteState {
        self.states.get(id).copied().unwrap_or_default()
    }

    pub fn set_state(&mut self, id: &str, state: NoteWriteState) {
        if state == NoteWriteState::Clean {
            self.states.remove(id);
        } else {
            self.states.insert(id.to_string(), state);
        }
    }

    /// Records a finished write. Only the write carrying the latest token moves
    /// the note's state; a superseded write leaves it alone.
    pub fn finish(&mut self, id: &str, token: UpdateToken, succeeded: bool) -> bool {
        if !self.is_latest(id, token) {
            return false;
        }
        let next = if succeeded {
            NoteWriteState::Clean
        } else {
            NoteWriteState::RolledBack
        };
        self.set_state(id, next);
        true
    }

    pub fn forget(&mut self, id: &str) {
        self.latest.remove(id);
        self.latest_writes.remove(id);
        self.states.remove(id);
    }

    /// Drops every token and state, e.g. when the signed-in user changes.
    pub fn reset(&mut self) {
        self.latest.clear();
        self.latest_writes.clear();
        self.states.clear();
    }
}
