//! Shared types for the noto application.
//!
//! Holds the crate-wide `Result` alias and the command-line subcommands.
use std::path::PathBuf;

use clap::Subcommand;

use crate::NotoError;

/// A specialized Result type for noto operations.
pub type Result<T> = std::result::Result<T, NotoError>;

/// Available subcommands for the noto application
#[derive(Subcommand)]
pub enum Commands {
    /// List notes, pinned first, most recently updated first
    List {
        /// Only notes in this notebook ("all" for every notebook)
        #[clap(short = 'N', long)]
        notebook: Option<String>,

        /// Only notes with this tag
        #[clap(short, long)]
        tag: Option<String>,

        /// Only pinned notes
        #[clap(short, long)]
        pinned: bool,

        /// Show the trash instead
        #[clap(long)]
        trash: bool,

        /// Case-insensitive text to look for in title, content, and tags
        #[clap(short, long)]
        search: Option<String>,

        /// Limit the number of notes shown
        #[clap(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// View a note by ID
    View {
        /// ID of the note to view
        id: String,

        /// Format output as raw JSON
        #[clap(short, long)]
        json: bool,

        /// Render the content as HTML
        #[clap(long)]
        html: bool,
    },

    /// Create a new note
    Create {
        /// Title of the note
        #[clap(short = 'T', long)]
        title: Option<String>,

        /// Content of the note, can be markdown formatted
        #[clap(short, long)]
        content: Option<String>,

        /// Notebook to create the note in
        #[clap(short = 'N', long, default_value = "resources")]
        notebook: String,

        /// Tags to associate with the note (comma-separated)
        #[clap(short = 't', long)]
        tags: Option<String>,

        /// Open content in editor before saving
        #[clap(short, long)]
        edit: bool,

        /// Path to a file containing the note's content
        #[clap(short, long)]
        file: Option<PathBuf>,
    },

    /// Edit an existing note
    Edit {
        /// ID of the note to edit
        id: String,

        /// New title for the note
        #[clap(short = 'T', long)]
        title: Option<String>,

        /// New content for the note
        #[clap(short, long)]
        content: Option<String>,

        /// Kanban status: backlog, in-progress, or done
        #[clap(short, long, value_parser = ["backlog", "in-progress", "done"])]
        status: Option<String>,

        /// Open content in editor before saving
        #[clap(short, long)]
        edit: bool,

        /// Path to a file containing the new note content
        #[clap(short, long)]
        file: Option<PathBuf>,
    },

    /// Move a note to the trash
    Delete {
        /// ID of the note to trash
        id: String,
    },

    /// Take a note out of the trash
    Restore {
        /// ID of the note to restore
        id: String,
    },

    /// Delete a note for good
    Purge {
        /// ID of the note to delete
        id: String,

        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Permanently delete every note in the trash
    EmptyTrash {
        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Pin or unpin a note
    Pin {
        /// ID of the note
        id: String,
    },

    /// Move a note to another notebook
    Move {
        /// ID of the note
        id: String,

        /// Target notebook ID
        notebook: String,
    },

    /// Add or remove tags on a note
    Tag {
        /// ID of the note to modify
        id: String,

        /// Tags to add (comma-separated)
        #[clap(short, long)]
        add: Option<String>,

        /// Tags to remove (comma-separated)
        #[clap(short, long)]
        remove: Option<String>,
    },

    /// List every tag in use
    Tags,

    /// Copy a note
    Duplicate {
        /// ID of the note to copy
        id: String,
    },

    /// Fuzzy-find notes by title, content, or tag
    Find {
        /// Search query text
        query: String,

        /// Limit the number of results
        #[clap(short = 'n', long, default_value_t = crate::QUICK_SWITCH_LIMIT)]
        limit: usize,
    },

    /// List task items from all notes
    Tasks {
        /// Only show unfinished tasks
        #[clap(short, long)]
        pending: bool,
    },

    /// Check or uncheck a task line in a note
    Toggle {
        /// ID of the note
        id: String,

        /// Zero-based line number of the task
        line: usize,
    },

    /// Show notes grouped by kanban status
    Board,

    /// Show the notes that link to a note
    Backlinks {
        /// ID of the linked note
        id: String,
    },

    /// Notebook operations
    #[clap(subcommand)]
    Notebook(NotebookCommands),

    /// Export notes
    Export {
        /// Directory or file to write (defaults to the configured export directory)
        #[clap(short, long)]
        output: Option<PathBuf>,

        /// Format to export to
        #[clap(short, long, value_parser = ["markdown", "json", "zip"], default_value = "json")]
        format: String,

        /// Export only this note (markdown format)
        #[clap(long)]
        id: Option<String>,
    },

    /// Sign in as a user
    Login {
        /// User ID to sign in as
        user: String,
    },

    /// Sign out
    Logout,

    /// Configuration management
    Config {
        /// Show current configuration
        #[clap(short = 'S', long)]
        show: bool,

        /// Update a configuration setting (key=value)
        #[clap(short, long)]
        set: Option<String>,

        /// Reset configuration to defaults
        #[clap(short, long)]
        reset: bool,
    },
}

#[derive(Subcommand)]
pub enum NotebookCommands {
    /// List notebooks by PARA category
    List,

    /// Create a notebook
    Create {
        /// Notebook name
        name: String,

        /// PARA category: projects, areas, resources, or archive
        #[clap(short, long, default_value = "projects")]
        category: String,
    },

    /// Rename a notebook
    Rename {
        /// ID of the notebook
        id: String,

        /// New name
        name: String,
    },

    /// Move a notebook to another PARA category
    Move {
        /// ID of the notebook
        id: String,

        /// Target category
        category: String,
    },

    /// Delete a notebook
    Delete {
        /// ID of the notebook
        id: String,
    },
}
