//! Match Engines
//!
//! Exact mode keeps results whose title contains the query, in storage order.
//! Fuzzy mode scores every candidate over title, content and category with the
//! approximate scorer in `ranking`, then orders by relevance. Ties keep fetch
//! order.

use crate::config::FieldWeights;
use crate::interface::SearchResult;
use crate::ranking::{weighted_score, FieldMatch, MatchOptions, WeightedField};
use crate::snippet::{find_chars, fold_chars};
use tokio_util::sync::CancellationToken;

/// Case-insensitive substring containment. An empty needle is always contained.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    find_chars(&fold_chars(haystack), &fold_chars(needle)).is_some()
}

/// Exact engine: keep results whose title contains `query`, order unchanged
pub fn exact_filter(results: Vec<SearchResult>, query: &str) -> Vec<SearchResult> {
    results
        .into_iter()
        .filter(|r| contains_ignore_case(&r.title, query))
        .collect()
}

/// Field of a `SearchResult` that produced the best fuzzy match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchField {
    Title,
    Content,
    Category,
}

impl MatchField {
    const ALL: [MatchField; 3] = [MatchField::Title, MatchField::Content, MatchField::Category];

    /// The text of this field on `result`, if present
    pub fn text<'a>(&self, result: &'a SearchResult) -> Option<&'a str> {
        match self {
            MatchField::Title => Some(result.title.as_str()),
            MatchField::Content => result.content.as_deref(),
            MatchField::Category => result.category.as_deref(),
        }
    }
}

/// One ranked fuzzy result. Lower `score` is more relevant.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyHit {
    pub result: SearchResult,
    pub score: f64,
    /// The best single-field match found while scoring
    pub best: Option<(MatchField, FieldMatch)>,
}

fn weight_of(field: MatchField, weights: &FieldWeights) -> f64 {
    match field {
        MatchField::Title => weights.title,
        MatchField::Content => weights.content,
        MatchField::Category => weights.category,
    }
}

/// Score one candidate. `None` when no field matches within the threshold.
pub fn score_result(
    result: &SearchResult,
    query: &str,
    options: &MatchOptions,
    weights: &FieldWeights,
) -> Option<(f64, MatchField, FieldMatch)> {
    let fields: Vec<WeightedField<'_>> = MatchField::ALL
        .iter()
        .map(|f| WeightedField { text: f.text(result), weight: weight_of(*f, weights) })
        .collect();
    let (score, idx, found) = weighted_score(&fields, query, options)?;
    Some((score, MatchField::ALL[idx], found))
}

/// Fuzzy engine: rank candidates of one source by relevance.
///
/// Scoring runs on the rayon pool and stops early once `token` is cancelled;
/// a cancelled run returns whatever was scored so far and the caller is
/// expected to discard it.
pub fn fuzzy_rank(
    candidates: Vec<SearchResult>,
    query: &str,
    options: &MatchOptions,
    weights: &FieldWeights,
    token: &CancellationToken,
) -> Vec<FuzzyHit> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }

    use rayon::prelude::*;
    let mut scored: Vec<(usize, FuzzyHit)> = candidates
        .into_par_iter()
        .enumerate()
        .take_any_while(|_| !token.is_cancelled())
        .filter_map(|(order, result)| {
            let (score, field, found) = score_result(&result, query, options, weights)?;
            Some((order, FuzzyHit { result, score, best: Some((field, found)) }))
        })
        .collect();

    // par_iter + take_any_while doesn't preserve order; fetch order breaks ties
    scored.sort_by(|(ia, a), (ib, b)| a.score.total_cmp(&b.score).then(ia.cmp(ib)));
    scored.into_iter().map(|(_, hit)| hit).collect()
}
