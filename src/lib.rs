//! Noto note-taking library
//!
//! Keeps a local, optimistically updated snapshot of a user's Markdown notes
//! and PARA notebooks in sync with a document store, with debounced writes,
//! rollback of rejected writes, and a filtered view for display.

mod cli;
mod config;
mod debounce;
mod errors;
mod export;
mod filter;
mod helper;
mod links;
mod markdown;
mod note;
mod notebook;
mod notebooks;
mod session;
mod staleness;
mod store;
mod sync;
mod tasks;
mod tracker;
mod types;

// Re-export key components
pub use cli::*;
pub use config::*;
pub use debounce::*;
pub use errors::*;
pub use export::*;
pub use filter::*;
pub use helper::*;
pub use links::*;
pub use markdown::*;
pub use note::*;
pub use notebook::*;
pub use notebooks::*;
pub use session::*;
pub use staleness::*;
pub use store::*;
pub use sync::*;
pub use tasks::*;
pub use tracker::*;
pub use types::*;
