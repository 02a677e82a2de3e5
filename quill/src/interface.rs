//! Quill Search Interface Definition
//!
//! Shared records passed between the search pipeline and the UI surfaces that
//! consume it (command palette, tag tree, clipboard highlighter overlay), plus
//! the storage seam the pipeline reads from.

use crate::database::DatabaseResult;
use crate::models::{ArticleBody, ArticleMatchRow, Tag, VocabularyEntry};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// ENUMS
// ═══════════════════════════════════════════════════════════════════════════════

/// Which source produced a result. Also fixes the merge order of result groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Vocabulary,
    Tag,
    Article,
}

impl SourceType {
    /// Group order in every published result set.
    pub const ORDER: [SourceType; 3] = [SourceType::Vocabulary, SourceType::Tag, SourceType::Article];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Vocabulary => "vocabulary",
            SourceType::Tag => "tag",
            SourceType::Article => "article",
        }
    }

    /// Group header shown above the results of this source
    pub fn label(&self) -> &'static str {
        match self {
            SourceType::Vocabulary => "Vocabulary",
            SourceType::Tag => "Tags",
            SourceType::Article => "Articles",
        }
    }
}

/// Matching strategy selected per query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Case-insensitive substring containment
    #[default]
    Exact,
    /// Weighted approximate multi-field matching
    Fuzzy,
}

/// Where a committed selection should be routed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Open the note in the editor surface (vocabulary entries and articles)
    OpenNote { note_id: i64, title: String },
    /// Reveal the tag in the tag tree surface
    OpenTag { tag_id: i64 },
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS (Structs)
// ═══════════════════════════════════════════════════════════════════════════════

/// A candidate match surfaced to the user.
///
/// `id` is only meaningful together with the source type: a tag and a
/// vocabulary entry may share an id. The source type is fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(rename = "type")]
    source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags_id: Option<i64>,
}

impl SearchResult {
    /// A vocabulary entry (or one sub-title of a split entry) under a tag
    pub fn vocabulary(id: i64, title: impl Into<String>, category: Option<String>) -> Self {
        Self {
            id,
            title: title.into(),
            content: None,
            source_type: SourceType::Vocabulary,
            category,
            tags_id: None,
        }
    }

    /// A tag; `tags_id` routes the selection to the tag tree
    pub fn tag(id: i64, name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            id,
            title: name.into(),
            content: Some(description.unwrap_or_default()),
            source_type: SourceType::Tag,
            category: None,
            tags_id: Some(id),
        }
    }

    /// An article body; `content` holds a bounded preview, never the full text
    pub fn article(id: i64, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            content: Some(content.into()),
            source_type: SourceType::Article,
            category: None,
            tags_id: None,
        }
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }
}

/// A result the user committed, stamped with the instant of the commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedResult {
    #[serde(flatten)]
    pub result: SearchResult,
    /// Milliseconds since the Unix epoch, strictly increasing per palette
    pub timestamp: i64,
}

impl SelectedResult {
    /// Routing is a pure function of `(type, id, tags_id, title)`.
    pub fn destination(&self) -> Destination {
        let r = &self.result;
        match r.source_type() {
            SourceType::Vocabulary | SourceType::Article => Destination::OpenNote {
                note_id: r.id,
                title: r.title.clone(),
            },
            SourceType::Tag => Destination::OpenTag {
                tag_id: r.tags_id.unwrap_or(r.id),
            },
        }
    }
}

/// A keyword-to-entity binding used by the highlighter overlay.
///
/// `title` is the unit searched for; `original_title` is the full, pre-split
/// title shown when the keyword is found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightItem {
    pub id: i64,
    pub title: String,
    pub original_title: String,
}

/// Results of one source, in adapter order
#[derive(Debug, Clone, PartialEq)]
pub struct ResultGroup {
    pub source_type: SourceType,
    pub results: Vec<SearchResult>,
}

/// A published result set: non-empty groups in `SourceType::ORDER`.
///
/// The selection cursor addresses results by their global index across groups.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupedResults {
    groups: Vec<ResultGroup>,
}

impl GroupedResults {
    /// Group a flat list by source type. Relative order inside a group is kept.
    pub fn from_flat(results: Vec<SearchResult>) -> Self {
        let mut buckets: [Vec<SearchResult>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for result in results {
            let slot = SourceType::ORDER
                .iter()
                .position(|t| *t == result.source_type())
                .unwrap_or(0);
            buckets[slot].push(result);
        }

        let groups = SourceType::ORDER
            .iter()
            .zip(buckets)
            .filter(|(_, results)| !results.is_empty())
            .map(|(source_type, results)| ResultGroup { source_type: *source_type, results })
            .collect();

        Self { groups }
    }

    pub fn groups(&self) -> &[ResultGroup] {
        &self.groups
    }

    pub fn group(&self, source_type: SourceType) -> Option<&[SearchResult]> {
        self.groups
            .iter()
            .find(|g| g.source_type == source_type)
            .map(|g| g.results.as_slice())
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.results.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Result at a global (cross-group) index
    pub fn get(&self, index: usize) -> Option<&SearchResult> {
        self.iter().nth(index)
    }

    /// All results in display order
    pub fn iter(&self) -> impl Iterator<Item = &SearchResult> {
        self.groups.iter().flat_map(|g| g.results.iter())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STORAGE INTERFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// The relational store the search pipeline reads from.
///
/// Every call is a suspension point; implementations may sit behind a process
/// boundary. The pipeline never owns the schema.
#[async_trait::async_trait]
pub trait NoteStorage: Send + Sync {
    /// Tags filed under a top-level category
    async fn get_tags_by_category(&self, category_id: i64) -> DatabaseResult<Vec<Tag>>;

    /// Vocabulary entries attached to a tag, in sort order
    async fn get_vocabulary_entries_by_tag(&self, tag_id: i64) -> DatabaseResult<Vec<VocabularyEntry>>;

    async fn get_all_tags(&self) -> DatabaseResult<Vec<Tag>>;

    /// Substring search over non-empty plain-text bodies, ordered by id
    async fn search_article_bodies(&self, query: &str, limit: usize) -> DatabaseResult<Vec<ArticleMatchRow>>;

    /// Every article body, unfiltered, ordered by id
    async fn get_all_article_bodies(&self) -> DatabaseResult<Vec<ArticleBody>>;

    /// Full stored content of a note
    async fn get_note_content_by_id(&self, id: i64) -> DatabaseResult<String>;
}
