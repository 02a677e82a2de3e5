//! Storage rows consumed by the source adapters
//!
//! These mirror what the relational store hands back; the adapters translate
//! them into `SearchResult`s and `HighlightItem`s.

use crate::interface::{HighlightItem, SearchResult};
use serde::{Deserialize, Serialize};

/// Separators that turn one vocabulary title into several searchable terms
const TITLE_SEPARATORS: [char; 2] = ['；', ';'];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub id: i64,
    pub title: String,
}

/// Row returned by the storage-side substring search over article bodies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleMatchRow {
    pub id: i64,
    pub title: Option<String>,
    pub plain_text: String,
    pub content: String,
}

/// Unfiltered article body used for client-side fuzzy scoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleBody {
    pub id: i64,
    pub content: String,
}

/// Display title for an article without metadata
pub fn fallback_article_title(id: i64) -> String {
    format!("Note {}", id)
}

/// Split a title on full- or half-width semicolons.
///
/// Titles without a separator come back as a single untrimmed term. Split
/// terms are trimmed and empty ones dropped.
pub fn split_title(title: &str) -> Vec<String> {
    if !title.contains(TITLE_SEPARATORS) {
        return vec![title.to_string()];
    }
    title
        .split(TITLE_SEPARATORS)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl VocabularyEntry {
    /// One `HighlightItem` per split term, all sharing `id` and the full title
    pub fn highlight_items(&self) -> Vec<HighlightItem> {
        split_title(&self.title)
            .into_iter()
            .filter(|t| !t.is_empty())
            .map(|title| HighlightItem {
                id: self.id,
                title,
                original_title: self.title.clone(),
            })
            .collect()
    }

    /// One vocabulary result per split term, labelled with the owning tag
    pub fn search_results(&self, category: &str) -> Vec<SearchResult> {
        split_title(&self.title)
            .into_iter()
            .filter(|t| !t.is_empty())
            .map(|title| SearchResult::vocabulary(self.id, title, Some(category.to_string())))
            .collect()
    }
}
