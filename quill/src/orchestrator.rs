//! Query Orchestrator
//!
//! Owns the query session. Each submission:
//! - bumps the session generation and cancels the previous query via a DropGuard
//! - waits out the trailing-edge debounce
//! - fans out to every source concurrently, merging in fixed source order
//! - publishes only if its generation is still current
//!
//! Cancellation is cooperative: adapters stop at their next await point and
//! fuzzy scoring stops between candidates. The generation check remains the
//! final word on what reaches subscribers.

use crate::adapters::{default_adapters, fetch_source, SourceAdapter};
use crate::config::SearchConfig;
use crate::interface::{GroupedResults, MatchMode, NoteStorage, SearchResult};
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancels its token when dropped, so replacing the guard for a newer query
/// aborts the older one.
struct DropGuard {
    token: CancellationToken,
}

impl DropGuard {
    fn new(token: CancellationToken) -> Self {
        Self { token }
    }
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Snapshot of the query session
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub query: String,
    pub mode: MatchMode,
    pub results: GroupedResults,
    pub selected_index: usize,
    pub loading: bool,
    pub generation: u64,
}

struct Inner {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    config: SearchConfig,
    state: Mutex<SessionState>,
    in_flight: Mutex<Option<DropGuard>>,
    results_tx: watch::Sender<GroupedResults>,
    loading_tx: watch::Sender<bool>,
}

impl Inner {
    /// Replace the in-flight query; the previous guard cancels on drop
    fn replace_in_flight(&self, guard: Option<DropGuard>) {
        let previous = std::mem::replace(&mut *self.in_flight.lock(), guard);
        drop(previous);
    }

    fn publish(&self, state: &SessionState) {
        self.results_tx.send_replace(state.results.clone());
        self.loading_tx.send_replace(state.loading);
    }

    /// Store results of `generation` unless a newer query was submitted
    fn commit(&self, generation: u64, results: GroupedResults) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            tracing::debug!(generation, current = state.generation, "discarding stale results");
            return false;
        }
        state.results = results;
        state.selected_index = 0;
        state.loading = false;
        self.publish(&state);
        tracing::debug!(generation, count = state.results.len(), "results published");
        true
    }
}

/// Debounced, cancellable fan-out over the three sources.
///
/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct QueryOrchestrator {
    inner: Arc<Inner>,
}

impl QueryOrchestrator {
    /// Orchestrator over the standard vocabulary, tag and article sources
    pub fn new(storage: Arc<dyn NoteStorage>, config: SearchConfig) -> Self {
        let adapters = default_adapters(storage, &config);
        Self::with_adapters(adapters, config)
    }

    /// Orchestrator over custom sources. Results are merged in the given order.
    pub fn with_adapters(adapters: Vec<Arc<dyn SourceAdapter>>, config: SearchConfig) -> Self {
        let (results_tx, _) = watch::channel(GroupedResults::default());
        let (loading_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                adapters,
                config,
                state: Mutex::new(SessionState::default()),
                in_flight: Mutex::new(None),
                results_tx,
                loading_tx,
            }),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.inner.config
    }

    /// Submit a query. Must be called inside a tokio runtime.
    ///
    /// A blank query clears the results immediately and fetches nothing
    /// (returns `None`). Otherwise the query is debounced and fetched on a
    /// spawned task whose handle is returned; awaiting it is optional.
    pub fn submit(&self, query: &str, mode: MatchMode) -> Option<JoinHandle<()>> {
        let inner = &self.inner;
        let trimmed = query.trim().to_string();

        let generation = {
            let mut state = inner.state.lock();
            state.generation += 1;
            state.query = query.to_string();
            state.mode = mode;
            state.generation
        };

        if trimmed.is_empty() {
            inner.replace_in_flight(None);
            let mut state = inner.state.lock();
            state.results = GroupedResults::default();
            state.selected_index = 0;
            state.loading = false;
            inner.publish(&state);
            tracing::debug!(generation, "blank query; results cleared");
            return None;
        }

        let token = CancellationToken::new();
        inner.replace_in_flight(Some(DropGuard::new(token.clone())));
        {
            let mut state = inner.state.lock();
            if state.generation == generation {
                state.loading = true;
                inner.loading_tx.send_replace(true);
            }
        }
        tracing::debug!(generation, query = %trimmed, ?mode, "query submitted");

        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(async move {
            run_query(inner, generation, trimmed, mode, token).await;
        }))
    }

    /// Drop the current query and clear the session; cancels any fetch in flight
    pub fn reset(&self) {
        self.inner.replace_in_flight(None);
        let mut state = self.inner.state.lock();
        let generation = state.generation + 1;
        *state = SessionState { generation, ..SessionState::default() };
        self.inner.publish(&state);
    }

    /// Move the cursor by `delta`, clamped to the result range. Returns the new index.
    pub fn move_cursor(&self, delta: isize) -> usize {
        let mut state = self.inner.state.lock();
        let last = state.results.len().saturating_sub(1);
        let next = state.selected_index.saturating_add_signed(delta).min(last);
        state.selected_index = next;
        next
    }

    /// Put the cursor on a global result index. Out-of-range indices are ignored.
    pub fn select_index(&self, index: usize) -> bool {
        let mut state = self.inner.state.lock();
        if index >= state.results.len() {
            return false;
        }
        state.selected_index = index;
        true
    }

    /// Result under the cursor
    pub fn selected(&self) -> Option<SearchResult> {
        let state = self.inner.state.lock();
        state.results.get(state.selected_index).cloned()
    }

    pub fn snapshot(&self) -> SessionState {
        self.inner.state.lock().clone()
    }

    pub fn subscribe_results(&self) -> watch::Receiver<GroupedResults> {
        self.inner.results_tx.subscribe()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.inner.loading_tx.subscribe()
    }

    /// Submit and wait for the fetch to settle, returning the session results.
    /// Used by one-shot callers such as the CLI.
    pub async fn search(&self, query: &str, mode: MatchMode) -> GroupedResults {
        if let Some(handle) = self.submit(query, mode) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "query task failed");
            }
        }
        self.snapshot().results
    }
}

async fn run_query(inner: Arc<Inner>, generation: u64, query: String, mode: MatchMode, token: CancellationToken) {
    let debounce = inner.config.debounce();
    if !debounce.is_zero() {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!(generation, "superseded while debouncing");
                return;
            }
            _ = tokio::time::sleep(debounce) => {}
        }
    }

    let fetches = inner
        .adapters
        .iter()
        .map(|adapter| fetch_source(adapter.as_ref(), &query, mode, &inner.config, &token));
    // join_all yields in input order, so completion order never affects the merge
    let per_source: Vec<Vec<SearchResult>> = join_all(fetches).await;

    if token.is_cancelled() {
        tracing::debug!(generation, "superseded while fetching");
        return;
    }

    let results = GroupedResults::from_flat(per_source.into_iter().flatten().collect());
    inner.commit(generation, results);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    fn orchestrator() -> QueryOrchestrator {
        let db = Database::open_in_memory().unwrap();
        let words = db.insert_tag("Words", None, Some(1)).unwrap();
        db.insert_tag("wordplay", None, None).unwrap();
        db.insert_vocabulary_entry(words, "word;wordy", 0).unwrap();
        db.insert_note(Some("Draft"), "{}", "a word about words").unwrap();
        let config = SearchConfig { debounce_ms: 0, ..SearchConfig::default() };
        QueryOrchestrator::new(Arc::new(db), config)
    }

    #[tokio::test]
    async fn test_search_groups_in_source_order() {
        let orch = orchestrator();
        let results = orch.search("word", MatchMode::Exact).await;
        let types: Vec<&str> = results.iter().map(|r| r.source_type().as_str()).collect();
        assert_eq!(types, vec!["vocabulary", "vocabulary", "tag", "tag", "article"]);
        assert!(!orch.snapshot().loading);
    }

    #[tokio::test]
    async fn test_cursor_clamps_without_wrapping() {
        let orch = orchestrator();
        orch.search("word", MatchMode::Exact).await;
        assert_eq!(orch.move_cursor(-1), 0);
        assert_eq!(orch.move_cursor(2), 2);
        assert_eq!(orch.move_cursor(10), 4);
        assert_eq!(orch.move_cursor(1), 4);
        assert_eq!(orch.selected().unwrap().title, "Draft");
        assert!(!orch.select_index(5));
        assert!(orch.select_index(1));
        assert_eq!(orch.selected().unwrap().title, "wordy");
    }

    #[tokio::test]
    async fn test_new_results_reset_cursor() {
        let orch = orchestrator();
        orch.search("word", MatchMode::Exact).await;
        orch.move_cursor(3);
        orch.search("wor", MatchMode::Exact).await;
        assert_eq!(orch.snapshot().selected_index, 0);
    }

    #[tokio::test]
    async fn test_blank_query_clears_without_task() {
        let orch = orchestrator();
        orch.search("word", MatchMode::Exact).await;
        assert!(orch.submit("   ", MatchMode::Exact).is_none());
        let snapshot = orch.snapshot();
        assert!(snapshot.results.is_empty());
        assert_eq!(snapshot.query, "   ");
        assert!(orch.subscribe_results().borrow().is_empty());
    }

    #[tokio::test]
    async fn test_commit_rejects_older_generation() {
        let orch = orchestrator();
        orch.search("word", MatchMode::Exact).await;
        let current = orch.snapshot().generation;
        let mut watcher = orch.subscribe_results();
        watcher.borrow_and_update();

        assert!(!orch.inner.commit(current - 1, GroupedResults::default()));
        assert_eq!(orch.snapshot().results.len(), 5);
        assert!(!watcher.has_changed().unwrap());

        assert!(orch.inner.commit(current, GroupedResults::default()));
        assert!(orch.snapshot().results.is_empty());
        assert!(watcher.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_reset_clears_session() {
        let orch = orchestrator();
        orch.search("word", MatchMode::Fuzzy).await;
        let before = orch.snapshot().generation;
        orch.reset();
        let state = orch.snapshot();
        assert!(state.results.is_empty());
        assert_eq!(state.mode, MatchMode::Exact);
        assert!(state.generation > before);
    }
}
