//! CLI module for the noto application
//!
//! Each command opens the sync engines against the local file store, waits
//! for the first snapshot, runs, and then flushes every pending write before
//! returning, so a single invocation behaves like one short editing session.
use std::{
    fs::{read_to_string, OpenOptions},
    io::{stdin, stdout, Write},
    path::{Path, PathBuf},
    process::Command,
    sync::Arc,
    time::Duration,
};

use chrono::Utc;
use console::style;
use log::{debug, info};
use shell_words::split;
use tempfile::Builder;

use crate::{
    backlinks, count_words, export_json, extract_snippet, extract_tasks, extract_wiki_links,
    format_relative, is_default_notebook, kanban_columns, parse_tags, quick_switch,
    reading_minutes, render_html, resolve_link, toggle_task, write_json_backup,
    write_markdown_file, write_markdown_zip, Commands, Config, FileStore, Note, NoteFilter,
    NotePatch, NoteStatus, NoteSync, NotebookCommands, NotebookSync, NotoError, ParaCategory,
    Result, Session, WriteTracker, SNIPPET_LEN,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// CLI Application handler - processes CLI commands against the sync engines
pub struct App {
    /// Application configuration
    config: Config,

    /// Where the configuration is persisted
    config_path: Option<PathBuf>,

    /// Whether to display verbose output
    verbose: bool,
}

/// The engines for one signed-in session.
struct Workspace {
    notes: NoteSync<FileStore>,
    notebooks: NotebookSync<FileStore>,
}

impl Workspace {
    async fn open(config: &Config, user_id: &str) -> Self {
        let store = Arc::new(FileStore::new(&config.data_dir));
        let settings = config.sync_settings();
        let tracker = WriteTracker::new(settings.saved_display);
        let session = Session::signed_in(user_id);

        let mut notes = NoteSync::new(Arc::clone(&store), session.clone(), tracker.clone(), settings);
        let mut notebooks = NotebookSync::new(store, session, tracker);
        notes.start();
        notebooks.start();
        notes.wait_loaded().await;
        notebooks.wait_loaded().await;
        Self { notes, notebooks }
    }

    fn require(&self, id: &str) -> Result<Note> {
        self.notes.note(id).ok_or_else(|| NotoError::NoteNotFound { id: id.to_string() })
    }

    fn notebook_name(&self, id: &str) -> String {
        self.notebooks
            .notebook(id)
            .map(|nb| nb.name)
            .unwrap_or_else(|| id.to_string())
    }

    /// Sends everything still pending and surfaces any write failure.
    async fn close(mut self) -> Result<()> {
        let flushed = self.notes.flush(SHUTDOWN_TIMEOUT).await;
        let status = self.notes.status();
        self.notes.shutdown().await?;
        self.notebooks.stop();
        flushed?;
        match status.error() {
            Some(message) => Err(NotoError::SyncFailed {
                message: message.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl App {
    /// Create a new CLI application with the given config
    pub fn new(config: Config, config_path: Option<PathBuf>, verbose: bool) -> Self {
        Self {
            config,
            config_path,
            verbose,
        }
    }

    /// Run the CLI application with the given command
    pub async fn run(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Config { show, set, reset } => return self.handle_config(show, set, reset),
            Commands::Login { user } => return self.handle_login(Some(user)),
            Commands::Logout => return self.handle_login(None),
            _ => {}
        }

        let user_id = self.config.user_id.clone().ok_or(NotoError::NotSignedIn)?;
        debug!("Opening workspace for {}", user_id);
        let workspace = Workspace::open(&self.config, &user_id).await;
        let outcome = self.dispatch(&workspace, command).await;
        let closed = workspace.close().await;
        outcome.and(closed)
    }

    async fn dispatch(&self, ws: &Workspace, command: Commands) -> Result<()> {
        match command {
            Commands::List {
                notebook,
                tag,
                pinned,
                trash,
                search,
                limit,
                json,
            } => {
                let filter = NoteFilter {
                    trashed: Some(trash),
                    notebook_id: notebook,
                    pinned: pinned.then_some(true),
                    tag,
                    search: None,
                }
                .with_search(search.unwrap_or_default());
                let mut notes = ws.notes.filtered_notes(&filter);
                notes.truncate(limit);
                self.display_notes(ws, &notes, json)?;
            }

            Commands::View { id, json, html } => self.handle_view(ws, &id, json, html)?,

            Commands::Create {
                title,
                content,
                notebook,
                tags,
                edit,
                file,
            } => {
                self.create_note(ws, title, content, notebook, tags, edit, file)
                    .await?
            }

            Commands::Edit {
                id,
                title,
                content,
                status,
                edit,
                file,
            } => self.handle_edit(ws, &id, title, content, status, edit, file)?,

            Commands::Delete { id } => {
                let note = ws.require(&id)?;
                ws.notes.delete(&id);
                println!("Moved \"{}\" to the trash", note.display_title());
            }

            Commands::Restore { id } => {
                let note = ws.require(&id)?;
                ws.notes.restore(&id);
                println!("Restored \"{}\"", note.display_title());
            }

            Commands::Purge { id, force } => {
                let note = ws.require(&id)?;
                if force || confirm(&format!("Permanently delete \"{}\"?", note.display_title()))? {
                    ws.notes.permanently_delete(&id);
                    println!("Note {} deleted permanently", id);
                } else {
                    println!("Deletion cancelled.");
                }
            }

            Commands::EmptyTrash { force } => {
                let count = ws.notes.filtered_notes(&NoteFilter::trash()).len();
                if count == 0 {
                    println!("The trash is already empty.");
                } else if force || confirm(&format!("Permanently delete {} trashed notes?", count))? {
                    ws.notes.empty_trash();
                    println!("Emptied the trash ({} notes)", count);
                } else {
                    println!("Cancelled.");
                }
            }

            Commands::Pin { id } => {
                let note = ws.require(&id)?;
                ws.notes.toggle_pin(&id);
                let verb = if note.pinned { "Unpinned" } else { "Pinned" };
                println!("{} \"{}\"", verb, note.display_title());
            }

            Commands::Move { id, notebook } => {
                ws.require(&id)?;
                if ws.notebooks.notebook(&notebook).is_none() {
                    return Err(NotoError::NotebookNotFound { id: notebook });
                }
                ws.notes.move_to_notebook(&id, &notebook);
                println!("Moved note to {}", ws.notebook_name(&notebook));
            }

            Commands::Tag { id, add, remove } => {
                ws.require(&id)?;
                for tag in parse_tags(add) {
                    ws.notes.add_tag(&id, &tag);
                }
                for tag in parse_tags(remove) {
                    ws.notes.remove_tag(&id, &tag);
                }
                let note = ws.require(&id)?;
                println!("Tags: {}", style(hashtags(&note.tags)).cyan());
            }

            Commands::Tags => {
                for tag in ws.notes.all_tags() {
                    let count = ws.notes.filtered_notes(&NoteFilter::tag(tag.clone())).len();
                    println!("{} ({})", style(format!("#{}", tag)).cyan(), count);
                }
            }

            Commands::Duplicate { id } => {
                ws.require(&id)?;
                if let Some(copy) = ws.notes.duplicate(&id) {
                    println!("Created \"{}\" with ID: {}", copy.display_title(), copy.id);
                }
            }

            Commands::Find { query, limit } => {
                let hits = quick_switch(&ws.notes.notes(), &query, limit);
                if hits.is_empty() {
                    println!("No notes found matching query: \"{}\"", query);
                }
                for note in hits {
                    println!("{}  {}", style(&note.id).dim(), style(note.display_title()).bold());
                }
            }

            Commands::Tasks { pending } => {
                let tasks = extract_tasks(&ws.notes.notes());
                let shown: Vec<_> = tasks.iter().filter(|t| !pending || !t.done).collect();
                if shown.is_empty() {
                    println!("No tasks yet. Add tasks in any note using - [ ] task text");
                }
                for task in shown {
                    let mark = if task.done { style("[x]").green() } else { style("[ ]").yellow() };
                    println!(
                        "{} {}  {}",
                        mark,
                        task.text,
                        style(format!("{} ({}:{})", task.note_title, task.note_id, task.line_index)).dim()
                    );
                }
            }

            Commands::Toggle { id, line } => {
                let note = ws.require(&id)?;
                let content = toggle_task(&note.content, line);
                if content == note.content {
                    return Err(NotoError::InvalidFormat {
                        message: format!("Line {} of note {} is not a task", line, id),
                    });
                }
                ws.notes.update(&id, NotePatch::content(content));
                println!("Toggled task on line {}", line);
            }

            Commands::Board => {
                for column in kanban_columns(&ws.notes.notes()) {
                    println!(
                        "{} ({})",
                        style(column.status.label()).bold().underlined(),
                        column.notes.len()
                    );
                    for note in &column.notes {
                        println!("  {}  {}", style(&note.id).dim(), note.display_title());
                    }
                    println!();
                }
            }

            Commands::Backlinks { id } => {
                let notes = ws.notes.notes();
                let note = ws.require(&id)?;
                let linking = backlinks(&notes, &id);
                if linking.is_empty() {
                    println!("No notes link to \"{}\"", note.display_title());
                }
                for other in linking {
                    println!("{}  {}", style(&other.id).dim(), other.display_title());
                }
            }

            Commands::Notebook(command) => self.handle_notebook(ws, command)?,

            Commands::Export { output, format, id } => self.handle_export(ws, output, &format, id)?,

            Commands::Config { .. } | Commands::Login { .. } | Commands::Logout => {}
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_note(
        &self,
        ws: &Workspace,
        title: Option<String>,
        content: Option<String>,
        notebook: String,
        tags: Option<String>,
        open_editor: bool,
        file: Option<PathBuf>,
    ) -> Result<()> {
        if ws.notebooks.notebook(&notebook).is_none() {
            return Err(NotoError::NotebookNotFound { id: notebook });
        }
        let title = title.unwrap_or_default();
        let content = match (content, file) {
            (Some(c), _) => c,
            (_, Some(file_path)) => read_content_file(&file_path)?,
            (None, None) if open_editor => self.open_editor_for_content(&title, "")?,
            (None, None) => String::new(),
        };

        let Some(note) = ws.notes.create(&notebook) else {
            return Err(NotoError::NotSignedIn);
        };
        // the record must exist remotely before it can be patched
        ws.notes.flush(SHUTDOWN_TIMEOUT).await?;

        let tags = parse_tags(tags);
        let patch = NotePatch {
            title: Some(title),
            content: Some(content),
            tags: (!tags.is_empty()).then_some(tags),
            ..NotePatch::default()
        };
        ws.notes.update(&note.id, patch);
        println!("Note created with ID: {}", note.id);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_edit(
        &self,
        ws: &Workspace,
        id: &str,
        title: Option<String>,
        content: Option<String>,
        status: Option<String>,
        open_editor: bool,
        file: Option<PathBuf>,
    ) -> Result<()> {
        let sources = [content.is_some(), file.is_some(), open_editor];
        if sources.iter().filter(|set| **set).count() > 1 {
            return Err(NotoError::InvalidFormat {
                message: "Use only one of --content, --file and --edit".to_string(),
            });
        }

        let note = ws.require(id)?;
        let content = match (content, file) {
            (Some(c), _) => Some(c),
            (_, Some(file_path)) => Some(read_content_file(&file_path)?),
            (None, None) if open_editor => {
                Some(self.open_editor_for_content(note.display_title(), &note.content)?)
            }
            (None, None) => None,
        };
        let status = status.map(|s| s.parse::<NoteStatus>()).transpose()?;

        let patch = NotePatch {
            title,
            content,
            status,
            ..NotePatch::default()
        };
        if patch.is_empty() {
            println!("Nothing to change.");
            return Ok(());
        }
        ws.notes.update(id, patch);
        println!("Note {} updated", id);
        Ok(())
    }

    fn handle_view(&self, ws: &Workspace, id: &str, json: bool, html: bool) -> Result<()> {
        let note = ws.require(id)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&note)?);
            return Ok(());
        }
        if html {
            println!("{}", render_html(&note.content));
            return Ok(());
        }

        println!("{}", style(note.display_title()).bold());
        println!(
            "{} | {} | updated {}",
            style(&note.id).dim(),
            ws.notebook_name(&note.notebook_id),
            format_relative(note.updated_at, Utc::now())
        );
        if !note.tags.is_empty() {
            println!("Tags: {}", style(hashtags(&note.tags)).cyan());
        }
        println!("\n{}\n", note.content);
        println!(
            "{}",
            style(format!(
                "{} words · ~{} min read",
                count_words(&note.content),
                reading_minutes(&note.content)
            ))
            .dim()
        );

        let notes = ws.notes.notes();
        let links = extract_wiki_links(&note.content);
        if !links.is_empty() {
            println!("\nLinks:");
            for link in links {
                match resolve_link(&notes, &link.target) {
                    Some(target) => println!("  {} -> {}", link.label, style(&target.id).dim()),
                    None => println!("  {} {}", link.label, style("(missing)").red()),
                }
            }
        }
        Ok(())
    }

    fn handle_notebook(&self, ws: &Workspace, command: NotebookCommands) -> Result<()> {
        match command {
            NotebookCommands::List => {
                for category in ParaCategory::ALL {
                    println!("{}", style(category.name()).bold());
                    for notebook in ws.notebooks.by_category(category) {
                        let count = ws
                            .notes
                            .filtered_notes(&NoteFilter::notebook(notebook.id.clone()))
                            .len();
                        println!("  {}  {} ({})", style(&notebook.id).dim(), notebook.name, count);
                    }
                }
            }
            NotebookCommands::Create { name, category } => {
                let category: ParaCategory = category.parse()?;
                match ws.notebooks.create(&name, category) {
                    Some(notebook) => println!("Notebook created with ID: {}", notebook.id),
                    None => {
                        return Err(NotoError::InvalidFormat {
                            message: "Notebook name cannot be empty".to_string(),
                        })
                    }
                }
            }
            NotebookCommands::Rename { id, name } => {
                ws.notebooks
                    .notebook(&id)
                    .ok_or_else(|| NotoError::NotebookNotFound { id: id.clone() })?;
                ws.notebooks.rename(&id, &name);
                println!("Notebook renamed to {}", name.trim());
            }
            NotebookCommands::Move { id, category } => {
                let category: ParaCategory = category.parse()?;
                if is_default_notebook(&id) {
                    return Err(NotoError::InvalidFormat {
                        message: format!("{} is a default notebook and cannot be moved", id),
                    });
                }
                ws.notebooks
                    .notebook(&id)
                    .ok_or_else(|| NotoError::NotebookNotFound { id: id.clone() })?;
                ws.notebooks.move_category(&id, category);
                println!("Notebook moved to {}", category.name());
            }
            NotebookCommands::Delete { id } => {
                if ws.notebooks.delete(&id) {
                    println!("Notebook {} deleted", id);
                } else if is_default_notebook(&id) {
                    return Err(NotoError::InvalidFormat {
                        message: format!("{} is a default notebook and cannot be deleted", id),
                    });
                } else {
                    return Err(NotoError::NotebookNotFound { id });
                }
            }
        }
        Ok(())
    }

    fn handle_export(
        &self,
        ws: &Workspace,
        output: Option<PathBuf>,
        format: &str,
        id: Option<String>,
    ) -> Result<()> {
        let target = output.unwrap_or_else(|| self.config.export_dir.clone());
        let notes = match &id {
            Some(id) => vec![ws.require(id)?],
            None => ws.notes.notes(),
        };

        let written = match format {
            "json" if target.extension().is_some_and(|ext| ext == "json") => {
                std::fs::write(&target, export_json(&notes)?)?;
                target
            }
            "json" => write_json_backup(&target, &notes, Utc::now().date_naive())?,
            "markdown" => {
                for note in &notes {
                    let path = write_markdown_file(&target, note)?;
                    if self.verbose {
                        println!("  {}", path.display());
                    }
                }
                target
            }
            "zip" => {
                let path = if target.extension().is_some_and(|ext| ext == "zip") {
                    target
                } else {
                    target.join("noto-notes.zip")
                };
                write_markdown_zip(&path, &notes)?;
                path
            }
            other => {
                return Err(NotoError::InvalidFormat {
                    message: format!("Invalid format: {}. Must be one of: markdown, json, zip", other),
                })
            }
        };
        info!("Export written to {}", written.display());
        println!("Exported {} notes to {}", notes.len(), written.display());
        Ok(())
    }

    fn handle_config(&mut self, show: bool, set: Option<String>, reset: bool) -> Result<()> {
        if reset {
            self.config = Config::default();
            let path = self.config.save(self.config_path.as_deref())?;
            println!("Configuration reset ({})", path.display());
        }
        if let Some(assignment) = set {
            self.config.set_value(&assignment)?;
            let path = self.config.save(self.config_path.as_deref())?;
            println!("Configuration updated ({})", path.display());
        }
        if show {
            println!("{}", serde_json::to_string_pretty(&self.config)?);
        }
        Ok(())
    }

    fn handle_login(&mut self, user: Option<String>) -> Result<()> {
        self.config.user_id = user.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        self.config.save(self.config_path.as_deref())?;
        match &self.config.user_id {
            Some(user) => println!("Signed in as {}", style(user).bold()),
            None => println!("Signed out"),
        }
        Ok(())
    }

    /// Display notes in text or JSON format
    fn display_notes(&self, ws: &Workspace, notes: &[Note], json: bool) -> Result<()> {
        if notes.is_empty() {
            println!("No notes found matching the criteria.");
            return Ok(());
        }
        if json {
            println!("{}", serde_json::to_string_pretty(notes)?);
            return Ok(());
        }

        let term_width = terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(80);
        let now = Utc::now();

        for (i, note) in notes.iter().enumerate() {
            if i > 0 {
                println!("{}", "-".repeat(term_width.min(50)));
            }
            let pin = if note.pinned { "📌 " } else { "" };
            println!("{}{}", pin, style(note.display_title()).bold());
            println!(
                "{} | {} | {}",
                style(&note.id).dim(),
                ws.notebook_name(&note.notebook_id),
                format_relative(note.updated_at, now)
            );
            if !note.tags.is_empty() {
                println!("Tags: {}", style(hashtags(&note.tags)).cyan());
            }
            let snippet = extract_snippet(&note.content, SNIPPET_LEN.min(term_width));
            if !snippet.is_empty() {
                println!("{}", snippet);
            }
        }

        println!(
            "\nFound {} note{}",
            notes.len(),
            if notes.len() == 1 { "" } else { "s" }
        );
        Ok(())
    }

    fn open_editor_for_content(&self, title: &str, existing: &str) -> Result<String> {
        let temp_file = Builder::new().suffix(".md").tempfile()?;
        let temp_path = temp_file.path().to_path_buf();
        let editor_cmd = self.config.get_editor_command();

        self.write_editor_template(&temp_path, title, existing)?;

        info!("Opening editor to write note content. Save and exit when done...");
        self.launch_editor(&editor_cmd, &temp_path)?;

        let content = read_to_string(&temp_path)?;
        Ok(self.process_editor_content(content))
    }

    fn write_editor_template(&self, path: &Path, title: &str, existing: &str) -> Result<()> {
        let mut file = OpenOptions::new().write(true).open(path)?;

        writeln!(file, "<!-- ")?;
        writeln!(file, "Editing: {}", title)?;
        writeln!(
            file,
            "Lines that start with <!-- and end with --> are comments and will be ignored."
        )?;
        writeln!(file, "Save and exit the editor when you're done.")?;
        writeln!(file, "-->")?;
        write!(file, "{}", existing)?;

        Ok(())
    }

    fn launch_editor(&self, editor_cmd: &str, file_path: &Path) -> Result<()> {
        let path_str = file_path.to_string_lossy();

        let args = split(editor_cmd).map_err(|e| NotoError::EditorError {
            message: format!("Failed to parse editor command: {}", e),
        })?;

        let Some((program, rest)) = args.split_first() else {
            return Err(NotoError::EditorError {
                message: "Empty editor command".to_string(),
            });
        };

        let status = Command::new(program).args(rest).arg(path_str.as_ref()).status()?;

        if !status.success() {
            return Err(NotoError::EditorError {
                message: "Editor exited with non-zero status".to_string(),
            });
        }

        Ok(())
    }

    fn process_editor_content(&self, content: String) -> String {
        // Drop the instruction block written by write_editor_template
        let mut in_comment = false;
        content
            .lines()
            .filter(|line| {
                let trimmed = line.trim();
                if !in_comment && trimmed.starts_with("<!--") {
                    in_comment = !trimmed.ends_with("-->");
                    return false;
                }
                if in_comment {
                    in_comment = !trimmed.ends_with("-->");
                    return false;
                }
                true
            })
            .collect::<Vec<&str>>()
            .join("\n")
    }
}

fn hashtags(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| format!("#{}", tag))
        .collect::<Vec<_>>()
        .join(" ")
}

fn read_content_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(NotoError::FileNotFound {
            file_path: path.display().to_string(),
        });
    }
    Ok(read_to_string(path)?)
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N]: ", prompt);
    stdout().flush()?;
    let mut input = String::new();
    stdin().read_line(&mut input)?;
    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}
