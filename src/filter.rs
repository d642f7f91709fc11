//! Display-list derivation over the local note snapshot.
//!
//! Everything here is a pure function of its inputs; it is cheap enough to
//! run on every (debounced) keystroke of a search box.
use std::{cmp::Ordering, collections::BTreeSet, time::Duration};

use fuzzy_matcher::{skim::SkimMatcherV2, FuzzyMatcher};
use tokio::time::Instant;

use crate::Note;

/// Notebook id meaning "every notebook".
pub const ALL_NOTEBOOKS: &str = "all";

/// Default number of quick-switcher results.
pub const QUICK_SWITCH_LIMIT: usize = 8;

/// Which notes a view shows. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteFilter {
    /// `Some(true)` shows only the trash; anything else hides trashed notes.
    pub trashed: Option<bool>,
    pub notebook_id: Option<String>,
    pub pinned: Option<bool>,
    pub tag: Option<String>,
    pub search: Option<String>,
}

impl NoteFilter {
    pub fn trash() -> Self {
        Self {
            trashed: Some(true),
            ..Self::default()
        }
    }

    pub fn notebook(id: impl Into<String>) -> Self {
        Self {
            notebook_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn pinned() -> Self {
        Self {
            pinned: Some(true),
            ..Self::default()
        }
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Self::default()
        }
    }

    pub fn with_search(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.search = if query.is_empty() { None } else { Some(query) };
        self
    }

    fn matches(&self, note: &Note, needle: Option<&str>) -> bool {
        let want_trash = self.trashed == Some(true);
        if note.trashed != want_trash {
            return false;
        }
        if let Some(notebook_id) = self.notebook_id.as_deref() {
            if notebook_id != ALL_NOTEBOOKS && note.notebook_id != notebook_id {
                return false;
            }
        }
        if self.pinned == Some(true) && !note.pinned {
            return false;
        }
        if let Some(tag) = self.tag.as_deref() {
            if !note.has_tag(tag) {
                return false;
            }
        }
        match needle {
            Some(needle) => matches_search(note, needle),
            None => true,
        }
    }
}

/// Case-insensitive substring match against title, content, or any tag.
/// `needle` must already be lowercase.
fn matches_search(note: &Note, needle: &str) -> bool {
    note.title.to_lowercase().contains(needle)
        || note.content.to_lowercase().contains(needle)
        || note.tags.iter().any(|t| t.to_lowercase().contains(needle))
}

/// Pinned first, then most recently updated first.
pub fn display_order(a: &Note, b: &Note) -> Ordering {
    b.pinned
        .cmp(&a.pinned)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
}

/// Computes the ordered display list for `filter` without touching `notes`.
pub fn filter_notes(notes: &[Note], filter: &NoteFilter) -> Vec<Note> {
    let needle = filter.search.as_deref().map(str::to_lowercase);
    let mut filtered: Vec<Note> = notes
        .iter()
        .filter(|note| filter.matches(note, needle.as_deref()))
        .cloned()
        .collect();
    // sort_by is stable
    filtered.sort_by(display_order);
    filtered
}

/// Sorted, de-duplicated tags of every non-trashed note.
pub fn all_tags(notes: &[Note]) -> Vec<String> {
    notes
        .iter()
        .filter(|note| !note.trashed)
        .flat_map(|note| note.tags.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Quick-switcher results: the first `limit` live notes for an empty query,
/// otherwise fuzzy matches ranked best first, title hits weighted double.
pub fn quick_switch(notes: &[Note], query: &str, limit: usize) -> Vec<Note> {
    let live = notes.iter().filter(|note| !note.trashed);
    let query = query.trim();
    if query.is_empty() {
        return live.take(limit).cloned().collect();
    }

    let matcher = SkimMatcherV2::default().ignore_case();
    let mut scored: Vec<(i64, &Note)> = live
        .filter_map(|note| {
            let title = matcher.fuzzy_match(&note.title, query).unwrap_or(0);
            let content = matcher.fuzzy_match(&note.content, query).unwrap_or(0);
            let tag = note
                .tags
                .iter()
                .filter_map(|t| matcher.fuzzy_match(t, query))
                .max()
                .unwrap_or(0);
            let score = title * 2 + content.max(tag);
            (score > 0).then_some((score, note))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, note)| note.clone())
        .collect()
}

/// A search box value that only counts once typing has paused.
#[derive(Debug, Clone)]
pub struct SearchInput {
    delay: Duration,
    query: String,
    changed_at: Option<Instant>,
}

impl SearchInput {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            query: String::new(),
            changed_at: None,
        }
    }

    pub fn set(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.changed_at = Some(Instant::now());
    }

    /// Returns the query once it has been unchanged for the delay.
    pub fn settled(&self) -> Option<&str> {
        match self.changed_at {
            Some(at) if at.elapsed() < self.delay => None,
            _ => Some(&self.query),
        }
    }

    /// Time left until the current query settles.
    pub fn remaining(&self) -> Duration {
        self.changed_at
            .map(|at| self.delay.saturating_sub(at.elapsed()))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    fn note(id: &str, minutes_ago: i64) -> Note {
        let mut note = Note::new("resources");
        note.id = id.to_string();
        note.updated_at = Utc::now() - ChronoDuration::minutes(minutes_ago);
        note
    }

    fn ids(notes: &[Note]) -> Vec<&str> {
        notes.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn default_view_hides_trash_and_orders_pinned_then_recent() {
        let mut old_pinned = note("old-pinned", 60);
        old_pinned.pinned = true;
        let mut trashed = note("trashed", 0);
        trashed.trashed = true;
        let notes = vec![note("older", 30), trashed, note("newest", 1), old_pinned];

        let shown = filter_notes(&notes, &NoteFilter::default());
        assert_eq!(ids(&shown), vec!["old-pinned", "newest", "older"]);
    }

    #[test]
    fn trash_view_shows_only_trash() {
        let mut trashed = note("t", 5);
        trashed.trashed = true;
        let notes = vec![note("a", 1), trashed];
        assert_eq!(ids(&filter_notes(&notes, &NoteFilter::trash())), vec!["t"]);
    }

    #[test]
    fn notebook_filter_with_all_sentinel() {
        let mut a = note("a", 1);
        a.notebook_id = "projects".into();
        let b = note("b", 2);
        let notes = vec![a, b];

        assert_eq!(ids(&filter_notes(&notes, &NoteFilter::notebook("projects"))), vec!["a"]);
        assert_eq!(filter_notes(&notes, &NoteFilter::notebook(ALL_NOTEBOOKS)).len(), 2);
    }

    #[test]
    fn pinned_and_tag_filters() {
        let mut a = note("a", 1);
        a.pinned = true;
        a.tags = vec!["rust".into()];
        let mut b = note("b", 2);
        b.tags = vec!["rust".into()];
        let notes = vec![a, b, note("c", 3)];

        assert_eq!(ids(&filter_notes(&notes, &NoteFilter::pinned())), vec!["a"]);
        assert_eq!(ids(&filter_notes(&notes, &NoteFilter::tag("rust"))), vec!["a", "b"]);
    }

    #[test]
    fn search_matches_title_content_or_tags_case_insensitively() {
        let mut a = note("a", 1);
        a.title = "Weekly Review".into();
        let mut b = note("b", 2);
        b.content = "notes about the REVIEW process".into();
        let mut c = note("c", 3);
        c.tags = vec!["review-later".into()];
        let notes = vec![a, b, c, note("d", 4)];

        let shown = filter_notes(&notes, &NoteFilter::default().with_search("review"));
        assert_eq!(ids(&shown), vec!["a", "b", "c"]);
    }

    #[test]
    fn filtering_does_not_mutate_the_snapshot() {
        let notes = vec![note("older", 30), note("newest", 1)];
        let before = notes.clone();
        let _ = filter_notes(&notes, &NoteFilter::default());
        assert_eq!(notes, before);
    }

    #[test]
    fn tags_are_collected_from_live_notes_only() {
        let mut a = note("a", 1);
        a.tags = vec!["b-tag".into(), "a-tag".into()];
        let mut b = note("b", 1);
        b.tags = vec!["a-tag".into(), "gone".into()];
        b.trashed = true;
        assert_eq!(all_tags(&[a, b]), vec!["a-tag", "b-tag"]);
    }

    #[test]
    fn quick_switch_ranks_title_hits_first() {
        let mut a = note("a", 1);
        a.title = "Groceries".into();
        let mut b = note("b", 1);
        b.title = "Meeting".into();
        b.content = "buy groceries after".into();
        let mut c = note("c", 1);
        c.title = "Groceries archive".into();
        c.trashed = true;
        let notes = vec![b, a, c];

        let hits = quick_switch(&notes, "groceries", QUICK_SWITCH_LIMIT);
        assert_eq!(ids(&hits)[0], "a");
        assert!(hits.iter().all(|n| !n.trashed));
        assert_eq!(quick_switch(&notes, "", 1).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn search_input_settles_after_quiet_period() {
        let mut input = SearchInput::new(Duration::from_millis(300));
        assert_eq!(input.settled(), Some(""));

        input.set("ru");
        tokio::time::sleep(Duration::from_millis(200)).await;
        input.set("rust");
        assert_eq!(input.settled(), None);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(input.settled(), None);
        tokio::time::sleep(input.remaining()).await;
        assert_eq!(input.settled(), Some("rust"));
    }
}
