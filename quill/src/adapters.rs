//! Source adapters
//!
//! Three independent fetchers (vocabulary entries, tags, article bodies) that
//! turn storage rows into `SearchResult`s. `fetch_source` is the error
//! boundary: whatever goes wrong inside one source (storage error, timeout,
//! panic in the ranking task) is logged and that source contributes nothing.

use crate::config::{FuzzyConfig, PreviewConfig, SearchConfig};
use crate::database::{DatabaseError, DatabaseResult};
use crate::highlight::sanitize;
use crate::interface::{HighlightItem, MatchMode, NoteStorage, SearchResult, SourceType};
use crate::models::{fallback_article_title, VocabularyEntry};
use crate::ranking::MatchOptions;
use crate::search::{contains_ignore_case, fuzzy_rank};
use crate::snippet::preview;
use futures::future::try_join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Shown in place of a note body that could not be loaded
pub const NOTE_UNAVAILABLE: &str = "<p>This note could not be loaded.</p>";

#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_type(&self) -> SourceType;

    /// Exact mode: results containing `query`, in storage order
    async fn search(&self, query: &str) -> DatabaseResult<Vec<SearchResult>>;

    /// Fuzzy mode: the full candidate set, scored client-side
    async fn candidates(&self) -> DatabaseResult<Vec<SearchResult>>;

    fn fuzzy_options(&self, config: &FuzzyConfig) -> MatchOptions {
        MatchOptions::titles(config)
    }

    /// Final touch applied to each ranked fuzzy result
    fn present(&self, result: SearchResult, _query: &str) -> SearchResult {
        result
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ADAPTERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Vocabulary entries filed under the tags of one top-level category
pub struct VocabularyAdapter {
    storage: Arc<dyn NoteStorage>,
    category_id: i64,
}

impl VocabularyAdapter {
    pub fn new(storage: Arc<dyn NoteStorage>, category_id: i64) -> Self {
        Self { storage, category_id }
    }

    /// Entries per tag, in tag order, paired with the tag name
    async fn entries(&self) -> DatabaseResult<Vec<(String, Vec<VocabularyEntry>)>> {
        let tags = self.storage.get_tags_by_category(self.category_id).await?;
        let per_tag = try_join_all(tags.iter().map(|t| self.storage.get_vocabulary_entries_by_tag(t.id))).await?;
        Ok(tags.into_iter().map(|t| t.name).zip(per_tag).collect())
    }
}

#[async_trait::async_trait]
impl SourceAdapter for VocabularyAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Vocabulary
    }

    async fn search(&self, query: &str) -> DatabaseResult<Vec<SearchResult>> {
        let mut results = Vec::new();
        for (category, entries) in self.entries().await? {
            // Whole titles are matched first, then each split term on its own
            for entry in entries.iter().filter(|e| contains_ignore_case(&e.title, query)) {
                results.extend(
                    entry
                        .search_results(&category)
                        .into_iter()
                        .filter(|r| contains_ignore_case(&r.title, query)),
                );
            }
        }
        Ok(results)
    }

    async fn candidates(&self) -> DatabaseResult<Vec<SearchResult>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .flat_map(|(category, entries)| {
                entries
                    .into_iter()
                    .flat_map(move |entry| entry.search_results(&category))
                    .collect::<Vec<_>>()
            })
            .collect())
    }
}

/// Every tag, matched on its name
pub struct TagAdapter {
    storage: Arc<dyn NoteStorage>,
}

impl TagAdapter {
    pub fn new(storage: Arc<dyn NoteStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait::async_trait]
impl SourceAdapter for TagAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Tag
    }

    async fn search(&self, query: &str) -> DatabaseResult<Vec<SearchResult>> {
        Ok(self
            .storage
            .get_all_tags()
            .await?
            .into_iter()
            .filter(|t| contains_ignore_case(&t.name, query))
            .map(|t| SearchResult::tag(t.id, t.name, t.description))
            .collect())
    }

    async fn candidates(&self) -> DatabaseResult<Vec<SearchResult>> {
        Ok(self
            .storage
            .get_all_tags()
            .await?
            .into_iter()
            .map(|t| SearchResult::tag(t.id, t.name, t.description))
            .collect())
    }
}

/// Note bodies. Exact mode searches storage-side with a row cap; fuzzy
/// mode scores the whole corpus. Content is always a bounded preview.
pub struct ArticleAdapter {
    storage: Arc<dyn NoteStorage>,
    limit: usize,
    preview: PreviewConfig,
}

impl ArticleAdapter {
    pub fn new(storage: Arc<dyn NoteStorage>, limit: usize, preview: PreviewConfig) -> Self {
        Self { storage, limit, preview }
    }
}

#[async_trait::async_trait]
impl SourceAdapter for ArticleAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Article
    }

    async fn search(&self, query: &str) -> DatabaseResult<Vec<SearchResult>> {
        let rows = self.storage.search_article_bodies(query, self.limit).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let title = row.title.unwrap_or_else(|| fallback_article_title(row.id));
                SearchResult::article(row.id, title, preview(&row.plain_text, query, &self.preview))
            })
            .collect())
    }

    async fn candidates(&self) -> DatabaseResult<Vec<SearchResult>> {
        Ok(self
            .storage
            .get_all_article_bodies()
            .await?
            .into_iter()
            .map(|body| SearchResult::article(body.id, fallback_article_title(body.id), body.content))
            .collect())
    }

    fn fuzzy_options(&self, config: &FuzzyConfig) -> MatchOptions {
        MatchOptions::articles(config)
    }

    fn present(&self, mut result: SearchResult, query: &str) -> SearchResult {
        let content = result.content.take().unwrap_or_default();
        result.content = Some(preview(&content, query, &self.preview));
        result
    }
}

/// The three adapters in merge order
pub fn default_adapters(storage: Arc<dyn NoteStorage>, config: &SearchConfig) -> Vec<Arc<dyn SourceAdapter>> {
    vec![
        Arc::new(VocabularyAdapter::new(storage.clone(), config.vocabulary_category_id)),
        Arc::new(TagAdapter::new(storage.clone())),
        Arc::new(ArticleAdapter::new(storage, config.article_limit, config.preview)),
    ]
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR BOUNDARY
// ═══════════════════════════════════════════════════════════════════════════════

async fn run_source(
    adapter: &dyn SourceAdapter,
    query: &str,
    mode: MatchMode,
    config: &SearchConfig,
    token: &CancellationToken,
) -> DatabaseResult<Vec<SearchResult>> {
    match mode {
        MatchMode::Exact => adapter.search(query).await,
        MatchMode::Fuzzy => {
            let candidates = adapter.candidates().await?;
            let options = adapter.fuzzy_options(&config.fuzzy);
            let weights = config.fuzzy.weights.clone();
            let query_owned = query.to_string();
            let token_clone = token.clone();
            let hits = tokio::task::spawn_blocking(move || {
                fuzzy_rank(candidates, &query_owned, &options, &weights, &token_clone)
            })
            .await?;
            Ok(hits.into_iter().map(|hit| adapter.present(hit.result, query)).collect())
        }
    }
}

/// Fetch one source through the selected engine. Never fails: errors and
/// timeouts are logged and yield an empty list, and a cancelled fetch is
/// abandoned.
pub async fn fetch_source(
    adapter: &dyn SourceAdapter,
    query: &str,
    mode: MatchMode,
    config: &SearchConfig,
    token: &CancellationToken,
) -> Vec<SearchResult> {
    let source = adapter.source_type().as_str();
    let started = Instant::now();

    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => {
            tracing::debug!(source, "fetch abandoned");
            return Vec::new();
        }
        outcome = with_deadline(token, config.fetch_timeout(), |scope| async move {
            run_source(adapter, query, mode, config, &scope).await
        }) => outcome,
    };

    match outcome {
        Some(Ok(results)) => {
            tracing::debug!(source, count = results.len(), elapsed_ms = started.elapsed().as_millis() as u64, "source fetched");
            results
        }
        Some(Err(e)) => {
            tracing::warn!(source, error = %e, "source failed; contributing no results");
            Vec::new()
        }
        None => {
            tracing::warn!(source, timeout_ms = config.fetch_timeout_ms, "source timed out; contributing no results");
            Vec::new()
        }
    }
}

/// Run `work` under a child of `parent`. When `limit` elapses first the child
/// is cancelled, so blocking scorers polling it stop too.
async fn with_deadline<T, F, Fut>(parent: &CancellationToken, limit: Duration, work: F) -> Option<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = T>,
{
    let scope = parent.child_token();
    match tokio::time::timeout(limit, work(scope.clone())).await {
        Ok(value) => Some(value),
        Err(_) => {
            scope.cancel();
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HIGHLIGHTER OVERLAY
// ═══════════════════════════════════════════════════════════════════════════════

/// Every vocabulary keyword under `category_id`, split into highlight units
pub async fn load_highlight_items(storage: &dyn NoteStorage, category_id: i64) -> Vec<HighlightItem> {
    collect_highlight_items(storage, category_id).await.unwrap_or_else(|e| {
        tracing::warn!(category_id, error = %e, "failed to load highlight items");
        Vec::new()
    })
}

async fn collect_highlight_items(storage: &dyn NoteStorage, category_id: i64) -> DatabaseResult<Vec<HighlightItem>> {
    let tags = storage.get_tags_by_category(category_id).await?;
    let mut items = Vec::new();
    for tag in tags {
        for entry in storage.get_vocabulary_entries_by_tag(tag.id).await? {
            items.extend(entry.highlight_items());
        }
    }
    Ok(items)
}

/// Full content of a note, sanitized for rendering
pub async fn load_note_content(storage: &dyn NoteStorage, note_id: i64) -> String {
    match storage.get_note_content_by_id(note_id).await {
        Ok(content) => sanitize(&content),
        Err(DatabaseError::NotFound(_)) => {
            tracing::debug!(note_id, "note has no content");
            NOTE_UNAVAILABLE.to_string()
        }
        Err(e) => {
            tracing::warn!(note_id, error = %e, "failed to load note content");
            NOTE_UNAVAILABLE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    fn storage() -> Arc<Database> {
        let db = Database::open_in_memory().unwrap();
        let words = db.insert_tag("Words", None, Some(1)).unwrap();
        let dev = db.insert_tag("Dev", Some("programming"), Some(1)).unwrap();
        db.insert_tag("Journal", Some("daily"), None).unwrap();
        db.insert_vocabulary_entry(words, "苹果；apple；pineapple", 0).unwrap();
        db.insert_vocabulary_entry(dev, "Java", 0).unwrap();
        db.insert_vocabulary_entry(dev, "log;catalog", 1).unwrap();
        db.insert_note(Some("Rust notes"), "{}", "ownership and borrowing in rust").unwrap();
        db.insert_note(None, "raw rust body", "rust").unwrap();
        Arc::new(db)
    }

    fn titles(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_vocabulary_exact_filters_split_terms() {
        let adapter = VocabularyAdapter::new(storage(), 1);
        let results = adapter.search("apple").await.unwrap();
        assert_eq!(titles(&results), vec!["apple", "pineapple"]);
        assert!(results.iter().all(|r| r.category.as_deref() == Some("Words")));
    }

    #[tokio::test]
    async fn test_vocabulary_candidates_are_split() {
        let adapter = VocabularyAdapter::new(storage(), 1);
        let results = adapter.candidates().await.unwrap();
        assert_eq!(titles(&results), vec!["苹果", "apple", "pineapple", "Java", "log", "catalog"]);
    }

    #[tokio::test]
    async fn test_tag_exact_sets_tags_id() {
        let adapter = TagAdapter::new(storage());
        let results = adapter.search("jour").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tags_id, Some(results[0].id));
        assert_eq!(results[0].content.as_deref(), Some("daily"));
    }

    #[tokio::test]
    async fn test_article_exact_uses_fallback_title_and_preview() {
        let adapter = ArticleAdapter::new(storage(), 50, PreviewConfig::default());
        let results = adapter.search("rust").await.unwrap();
        assert_eq!(titles(&results), vec!["Rust notes", "Note 2"]);
        assert_eq!(results[1].content.as_deref(), Some("rust"));
    }

    #[tokio::test]
    async fn test_article_fuzzy_presents_preview() {
        let adapter = ArticleAdapter::new(storage(), 50, PreviewConfig { window: 10, before: 2, after: 2 });
        let config = SearchConfig::default();
        let results = fetch_source(&adapter, "raw", MatchMode::Fuzzy, &config, &CancellationToken::new()).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content.as_deref(), Some("raw r..."));
    }

    #[tokio::test]
    async fn test_fetch_source_cancelled_returns_empty() {
        let adapter = TagAdapter::new(storage());
        let token = CancellationToken::new();
        token.cancel();
        let results = fetch_source(&adapter, "dev", MatchMode::Exact, &SearchConfig::default(), &token).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_deadline_cancels_child_token_only() {
        let parent = CancellationToken::new();
        let seen: Arc<parking_lot::Mutex<Option<CancellationToken>>> = Arc::default();
        let slot = seen.clone();
        let outcome = with_deadline(&parent, Duration::from_millis(10), move |scope| {
            *slot.lock() = Some(scope);
            tokio::time::sleep(Duration::from_secs(5))
        })
        .await;
        assert!(outcome.is_none());
        let scope = seen.lock().take().unwrap();
        assert!(scope.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline_passes_through_fast_work() {
        let parent = CancellationToken::new();
        let outcome = with_deadline(&parent, Duration::from_secs(5), |scope| async move { scope.is_cancelled() }).await;
        assert_eq!(outcome, Some(false));
    }

    #[tokio::test]
    async fn test_load_highlight_items() {
        let db = storage();
        let items = load_highlight_items(db.as_ref(), 1).await;
        assert_eq!(items.len(), 6);
        assert!(items.iter().filter(|i| i.original_title == "log;catalog").count() == 2);
    }

    #[tokio::test]
    async fn test_load_note_content_sanitizes_and_falls_back() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_note_content(1, "<p>hi</p><script>x()</script>", "hi").unwrap();
        assert_eq!(load_note_content(&db, 1).await, "<p>hi</p>");
        assert_eq!(load_note_content(&db, 2).await, NOTE_UNAVAILABLE);
    }
}
