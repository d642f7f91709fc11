//! Error types for the noto application.
//!
//! This module defines the error type shared by the document stores, the
//! export helpers, configuration handling and the command-line client. The
//! synchronization engine itself never returns these to its callers: write
//! failures are surfaced through [`crate::SyncIssue`] instead.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for the noto application.
#[derive(Error, Debug)]
pub enum NotoError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors related to zip operations.
    #[error("Zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    /// Errors raised by the file system watcher backing a local subscription.
    #[error("Watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// The document store rejected a write.
    #[error("Write to {path}/{id} rejected: {message}")]
    WriteRejected {
        path: String,
        id: String,
        message: String,
    },

    /// The document store could not establish or keep a subscription.
    #[error("Subscription to {path} failed: {message}")]
    SubscriptionFailed { path: String, message: String },

    /// Document was not found in the store.
    #[error("Document not found: {path}/{id}")]
    DocumentNotFound { path: String, id: String },

    /// Note was not found when performing an operation.
    #[error("Note not found: {id}")]
    NoteNotFound { id: String },

    /// Notebook was not found when performing an operation.
    #[error("Notebook not found: {id}")]
    NotebookNotFound { id: String },

    /// Invalid record format or content.
    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// Operation requires a signed-in user.
    #[error("No user is signed in")]
    NotSignedIn,

    /// The engine finished with an unresolved sync problem.
    #[error("{message}")]
    SyncFailed { message: String },

    /// file not found
    #[error("File not found: {file_path}")]
    FileNotFound { file_path: String },

    #[error("{message}")]
    EditorError { message: String },
}
