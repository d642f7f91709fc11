//! Exporting notes as Markdown files, zip archives, and JSON backups.
use std::{
    collections::HashSet,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use log::info;
use tempfile::NamedTempFile;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::{Note, NotoError, Result};

/// A note as a standalone Markdown document.
pub fn note_to_markdown(note: &Note) -> String {
    if note.title.is_empty() {
        note.content.clone()
    } else {
        format!("# {}\n\n{}", note.title, note.content)
    }
}

/// File name for a note: its title with anything but ASCII letters and
/// digits turned into dashes, lowercased.
pub fn markdown_file_name(note: &Note) -> String {
    let title = if note.title.is_empty() {
        "untitled"
    } else {
        note.title.as_str()
    };
    let slug: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    format!("{}.md", slug)
}

pub fn backup_file_name(date: NaiveDate) -> String {
    format!("noto-backup-{}.json", date.format("%Y-%m-%d"))
}

/// Pretty-printed JSON array of notes.
pub fn export_json(notes: &[Note]) -> Result<String> {
    Ok(serde_json::to_string_pretty(notes)?)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|_| NotoError::DirectoryError {
            path: dir.to_path_buf(),
        })?;
    }
    Ok(())
}

/// Writes `contents` to `path` via a temporary file in the same directory.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.flush()?;
    temp.persist(path).map_err(|e| NotoError::Io(e.error))?;
    Ok(())
}

/// Writes `noto-backup-<date>.json` into `dir` and returns its path.
pub fn write_json_backup(dir: &Path, notes: &[Note], date: NaiveDate) -> Result<PathBuf> {
    ensure_dir(dir)?;
    let path = dir.join(backup_file_name(date));
    write_atomic(&path, export_json(notes)?.as_bytes())?;
    info!("Backed up {} notes to {}", notes.len(), path.display());
    Ok(path)
}

/// Writes one note as `<slug>.md` into `dir` and returns its path.
pub fn write_markdown_file(dir: &Path, note: &Note) -> Result<PathBuf> {
    ensure_dir(dir)?;
    let path = dir.join(markdown_file_name(note));
    write_atomic(&path, note_to_markdown(note).as_bytes())?;
    Ok(path)
}

/// Appends `-2`, `-3`, ... to repeated names.
fn unique_name(name: String, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let stem = name.trim_end_matches(".md");
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}.md", stem, n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Writes every note as a Markdown file inside a zip archive at `path`.
pub fn write_markdown_zip(path: &Path, notes: &[Note]) -> Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut used = HashSet::new();
    for note in notes {
        let name = unique_name(markdown_file_name(note), &mut used);
        zip.start_file(name, options)?;
        zip.write_all(note_to_markdown(note).as_bytes())?;
    }
    zip.finish()?;

    info!("Exported {} notes to {}", notes.len(), path.display());
    Ok(notes.len())
}
