//! Markdown task lists and the kanban board.
use serde::Serialize;

use crate::{Note, NoteStatus};

/// A `- [ ] text` line found in a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskItem {
    pub note_id: String,
    pub note_title: String,
    /// Zero-based line within the note's content.
    pub line_index: usize,
    pub text: String,
    pub done: bool,
}

/// One status column of the board.
#[derive(Debug, Clone, PartialEq)]
pub struct KanbanColumn {
    pub status: NoteStatus,
    pub notes: Vec<Note>,
}

/// Parses `<indent>- [ ] text` / `- [x] text`, returning the checkbox state
/// and the byte offset of the marker's inner character.
fn parse_task_line(line: &str) -> Option<(bool, usize, &str)> {
    let indent = line.len() - line.trim_start().len();
    let rest = line[indent..].strip_prefix('-')?;
    let after_dash = rest.trim_start();
    if after_dash.len() == rest.len() {
        return None;
    }
    let marker = after_dash.strip_prefix('[')?;
    let mut chars = marker.chars();
    let done = match chars.next()? {
        ' ' => false,
        'x' | 'X' => true,
        _ => return None,
    };
    let after_marker = chars.as_str().strip_prefix(']')?;
    let text = after_marker.trim_start();
    if text.len() == after_marker.len() || text.trim().is_empty() {
        return None;
    }
    let marker_offset = line.len() - marker.len();
    Some((done, marker_offset, text))
}

/// Every task line of every live note, in note order then line order.
pub fn extract_tasks(notes: &[Note]) -> Vec<TaskItem> {
    notes
        .iter()
        .filter(|note| !note.trashed && !note.content.is_empty())
        .flat_map(|note| {
            note.content
                .split('\n')
                .enumerate()
                .filter_map(move |(line_index, line)| {
                    let (done, _, text) = parse_task_line(line)?;
                    Some(TaskItem {
                        note_id: note.id.clone(),
                        note_title: note.display_title().to_string(),
                        line_index,
                        text: text.to_string(),
                        done,
                    })
                })
        })
        .collect()
}

/// Flips the checkbox on `line_index`. Content is returned unchanged when that
/// line is missing or not a task.
pub fn toggle_task(content: &str, line_index: usize) -> String {
    let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
    if let Some(line) = lines.get_mut(line_index) {
        if let Some((done, offset, _)) = parse_task_line(line) {
            let replacement = if done { " " } else { "x" };
            line.replace_range(offset..offset + 1, replacement);
        }
    }
    lines.join("\n")
}

/// Groups live notes by status; notes without one count as backlog.
pub fn kanban_columns(notes: &[Note]) -> Vec<KanbanColumn> {
    NoteStatus::ALL
        .into_iter()
        .map(|status| {
            let mut column: Vec<Note> = notes
                .iter()
                .filter(|note| !note.trashed && note.effective_status() == status)
                .cloned()
                .collect();
            column.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            KanbanColumn {
                status,
                notes: column,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn note_with(content: &str) -> Note {
        let mut note = Note::new("projects");
        note.title = "Plan".into();
        note.content = content.into();
        note
    }

    #[test]
    fn recognizes_task_lines() {
        assert_eq!(parse_task_line("- [ ] buy milk").map(|t| (t.0, t.2)), Some((false, "buy milk")));
        assert_eq!(parse_task_line("  - [X] nested").map(|t| (t.0, t.2)), Some((true, "nested")));
        assert!(parse_task_line("- [ ]").is_none());
        assert!(parse_task_line("-[ ] tight").is_none());
        assert!(parse_task_line("- [y] other").is_none());
        assert!(parse_task_line("* [ ] star").is_none());
    }

    #[test]
    fn extracts_tasks_from_live_notes_only() {
        let note = note_with("# Plan\n- [ ] one\ntext\n- [x] two");
        let mut trashed = note_with("- [ ] hidden");
        trashed.trashed = true;

        let tasks = extract_tasks(&[note.clone(), trashed]);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].line_index, 1);
        assert!(!tasks[0].done);
        assert_eq!(tasks[1].text, "two");
        assert!(tasks[1].done);
        assert_eq!(tasks[1].note_id, note.id);
    }

    #[test]
    fn toggling_flips_only_the_target_line() {
        let content = "- [ ] one\n- [x] two";
        assert_eq!(toggle_task(content, 0), "- [x] one\n- [x] two");
        assert_eq!(toggle_task(content, 1), "- [ ] one\n- [ ] two");
        assert_eq!(toggle_task(content, 5), content);
        assert_eq!(toggle_task("plain [ ] text", 0), "plain [ ] text");
    }

    #[test]
    fn kanban_groups_by_status_newest_first() {
        let mut older = note_with("");
        older.updated_at = Utc::now() - Duration::hours(1);
        let newer = note_with("");
        let mut done = note_with("");
        done.status = Some(NoteStatus::Done);

        let columns = kanban_columns(&[older.clone(), newer.clone(), done.clone()]);
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0].status, NoteStatus::Backlog);
        let backlog: Vec<&str> = columns[0].notes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(backlog, vec![newer.id.as_str(), older.id.as_str()]);
        assert!(columns[1].notes.is_empty());
        assert_eq!(columns[2].notes[0].id, done.id);
    }
}
