//! Quill Search - multi-source search for the note app's command palette
//!
//! Vocabulary entries, tags and article bodies are searched concurrently with
//! either exact substring matching or weighted fuzzy scoring, merged into
//! grouped results, and navigated through the palette's selection state
//! machine. The same highlighter backs the clipboard overlay.

pub mod adapters;
pub mod config;
pub mod database;
pub mod highlight;
pub mod interface;
pub mod models;
pub mod orchestrator;
pub mod ranking;
pub mod search;
pub mod selection;
pub mod snippet;

pub use config::SearchConfig;
pub use database::Database;
pub use interface::*;
pub use orchestrator::QueryOrchestrator;
pub use selection::{CommandPalette, Key, PaletteEvent, PaletteState};
