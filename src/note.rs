//! Core note records for the noto application.
//!
//! Notes travel to and from the document store as JSON objects with
//! camelCase field names, so the serde attributes here define the wire shape.
use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{generate_id, normalize_tag, NotoError};

/// Kanban placement of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoteStatus {
    #[default]
    Backlog,
    InProgress,
    Done,
}

impl NoteStatus {
    pub const ALL: [NoteStatus; 3] = [NoteStatus::Backlog, NoteStatus::InProgress, NoteStatus::Done];

    pub fn label(self) -> &'static str {
        match self {
            NoteStatus::Backlog => "Backlog",
            NoteStatus::InProgress => "In Progress",
            NoteStatus::Done => "Done",
        }
    }
}

impl fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = match self {
            NoteStatus::Backlog => "backlog",
            NoteStatus::InProgress => "in-progress",
            NoteStatus::Done => "done",
        };
        f.write_str(id)
    }
}

impl FromStr for NoteStatus {
    type Err = NotoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NoteStatus::ALL
            .into_iter()
            .find(|status| status.to_string() == s.trim().to_lowercase())
            .ok_or_else(|| NotoError::InvalidFormat {
                message: format!("Unknown status: {}. Must be one of: backlog, in-progress, done", s),
            })
    }
}

/// Represents a single note in our system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier for the note
    pub id: String,
    /// Note title
    #[serde(default)]
    pub title: String,
    /// Note content in Markdown format
    #[serde(default)]
    pub content: String,
    /// Notebook the note belongs to
    pub notebook_id: String,
    /// Tags for organization
    #[serde(default)]
    pub tags: Vec<String>,
    /// When the note was created
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub pinned: bool,
    /// Soft-delete flag
    #[serde(default)]
    pub trashed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NoteStatus>,
}

impl Note {
    /// Creates an empty note in the given notebook
    pub fn new(notebook_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Note {
            id: generate_id(),
            title: String::new(),
            content: String::new(),
            notebook_id: notebook_id.into(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            pinned: false,
            trashed: false,
            status: Some(NoteStatus::Backlog),
        }
    }

    /// Status with the kanban default applied
    pub fn effective_status(&self) -> NoteStatus {
        self.status.unwrap_or_default()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Untitled"
        } else {
            &self.title
        }
    }

    /// A copy with a new id, a suffixed title, fresh timestamps and no pin.
    pub fn duplicate(&self) -> Note {
        let now = Utc::now();
        let title = if self.title.is_empty() {
            "Untitled (Copy)".to_string()
        } else {
            format!("{} (Copy)", self.title)
        };
        Note {
            id: generate_id(),
            title,
            created_at: now,
            updated_at: now,
            pinned: false,
            ..self.clone()
        }
    }

    /// Merges the set fields of `patch` into this note.
    pub fn apply(&mut self, patch: &NotePatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        if let Some(notebook_id) = &patch.notebook_id {
            self.notebook_id = notebook_id.clone();
        }
        if let Some(tags) = &patch.tags {
            self.tags = tags.clone();
        }
        if let Some(pinned) = patch.pinned {
            self.pinned = pinned;
        }
        if let Some(trashed) = patch.trashed {
            self.trashed = trashed;
        }
        if let Some(status) = patch.status {
            self.status = Some(status);
        }
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = updated_at;
        }
    }
}

/// A partial note update. Unset fields are left untouched, both locally and
/// in the remote document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notebook_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trashed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<NoteStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl NotePatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn status(status: NoteStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_tags(tags: Vec<String>) -> Self {
        Self {
            tags: Some(tags.iter().map(|t| normalize_tag(t)).collect()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Folds a newer patch into this one; the newer value wins per field.
    pub fn merge(&mut self, newer: NotePatch) {
        let NotePatch {
            title,
            content,
            notebook_id,
            tags,
            pinned,
            trashed,
            status,
            updated_at,
        } = newer;
        self.title = title.or(self.title.take());
        self.content = content.or(self.content.take());
        self.notebook_id = notebook_id.or(self.notebook_id.take());
        self.tags = tags.or(self.tags.take());
        self.pinned = pinned.or(self.pinned);
        self.trashed = trashed.or(self.trashed);
        self.status = status.or(self.status);
        self.updated_at = updated_at.or(self.updated_at);
    }

    /// The patch that puts back `previous`'s value for every field this
    /// patch sets.
    pub fn inverse(&self, previous: &Note) -> NotePatch {
        NotePatch {
            title: self.title.as_ref().map(|_| previous.title.clone()),
            content: self.content.as_ref().map(|_| previous.content.clone()),
            notebook_id: self.notebook_id.as_ref().map(|_| previous.notebook_id.clone()),
            tags: self.tags.as_ref().map(|_| previous.tags.clone()),
            pinned: self.pinned.map(|_| previous.pinned),
            trashed: self.trashed.map(|_| previous.trashed),
            status: self.status.map(|_| previous.effective_status()),
            updated_at: self.updated_at.map(|_| previous.updated_at),
        }
    }

    /// Stamps the patch with a modification time.
    pub fn touched(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }
}
