//! `[[Wiki links]]` between notes.
use crate::Note;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiLink {
    /// Title of the linked note.
    pub target: String,
    /// Text to show; the target unless written as `[[Target|Label]]`.
    pub label: String,
}

/// All wiki links in `content`, in order. Links never span lines.
pub fn extract_wiki_links(content: &str) -> Vec<WikiLink> {
    let mut links = Vec::new();
    for line in content.lines() {
        let mut rest = line;
        while let Some(start) = rest.find("[[") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("]]") else {
                break;
            };
            let inner = &after[..end];
            rest = &after[end + 2..];

            let (target, label) = match inner.split_once('|') {
                Some((target, label)) => (target.trim(), label.trim()),
                None => (inner.trim(), inner.trim()),
            };
            if target.is_empty() || target.contains('[') {
                continue;
            }
            links.push(WikiLink {
                target: target.to_string(),
                label: if label.is_empty() { target } else { label }.to_string(),
            });
        }
    }
    links
}

/// The live note whose title matches `target`, ignoring case.
pub fn resolve_link<'a>(notes: &'a [Note], target: &str) -> Option<&'a Note> {
    let target = target.trim().to_lowercase();
    notes
        .iter()
        .filter(|note| !note.trashed)
        .find(|note| note.title.trim().to_lowercase() == target)
}

/// Live notes, other than the note itself, that link to the note `id`.
pub fn backlinks<'a>(notes: &'a [Note], id: &str) -> Vec<&'a Note> {
    let Some(title) = notes.iter().find(|n| n.id == id).map(|n| n.title.trim().to_lowercase()) else {
        return Vec::new();
    };
    if title.is_empty() {
        return Vec::new();
    }
    notes
        .iter()
        .filter(|note| !note.trashed && note.id != id)
        .filter(|note| {
            extract_wiki_links(&note.content)
                .iter()
                .any(|link| link.target.to_lowercase() == title)
        })
        .collect()
}
