use std::{fs, path::Path};

use chrono::{DateTime, Datelike, Utc};
use log::{debug, error, trace};
use serde_json::Value;

use crate::{NotoError, Result};

/// Generates a fresh, opaque record id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Normalizes a tag label: trimmed, lowercase, whitespace runs become `-`.
pub fn normalize_tag(tag: &str) -> String {
    tag.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

// Helper method for parsing tags
pub fn parse_tags(tags: Option<String>) -> Vec<String> {
    let mut parsed: Vec<String> = Vec::new();
    for tag in tags
        .iter()
        .flat_map(|t| t.split(','))
        .map(normalize_tag)
        .filter(|s| !s.is_empty())
    {
        if !parsed.contains(&tag) {
            parsed.push(tag);
        }
    }
    parsed
}

/// Formats a timestamp relative to `now` the way the note list shows it.
pub fn format_relative(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(at);
    let minutes = diff.num_minutes();
    let hours = diff.num_hours();
    let days = diff.num_days();

    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if hours < 24 {
        format!("{}h ago", hours)
    } else if days < 7 {
        format!("{}d ago", days)
    } else if at.year() != now.year() {
        at.format("%b %-d, %Y").to_string()
    } else {
        at.format("%b %-d").to_string()
    }
}

/// Helper method to load a single stored document from file
pub fn load_document_from_file(path: &Path) -> Result<Value> {
    debug!("Loading document from file: {}", path.display());
    let content = fs::read_to_string(path).map_err(|e| {
        error!("Failed to open document file {}: {}", path.display(), e);
        NotoError::Io(e)
    })?;

    let document: Value = serde_json::from_str(&content)?;

    // Validate document
    let has_id = document
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.is_empty());
    if !has_id {
        let error_mgs = format!("Document from {} has an empty ID", path.display());
        error!("{}", error_mgs);
        return Err(NotoError::InvalidFormat { message: error_mgs });
    }

    trace!("Successfully loaded document: {}", path.display());
    Ok(document)
}
