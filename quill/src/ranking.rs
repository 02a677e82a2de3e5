//! Approximate string scoring for fuzzy search.
//!
//! A field score combines two penalties, both in `0..=1`:
//! - accuracy: edit errors / pattern length
//! - proximity: |match start - expected location| / distance
//!
//! Lower is better. A field matches when the sum stays within the threshold,
//! which also bounds how far into the text a match may start. Multi-field
//! scores are the weighted product of matched field scores, each weight
//! damped by the field's token count.

use crate::config::FuzzyConfig;
use crate::snippet::fold_chars;

/// Matches of a perfect field never score exactly zero in a product.
const EPSILON: f64 = f64::EPSILON;

/// Floor for non-identical matches, so only an identical field scores 0.
const MIN_SCORE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    pub threshold: f64,
    pub distance: usize,
    pub location: usize,
    /// Score on errors alone and scan the whole text
    pub ignore_location: bool,
}

impl MatchOptions {
    pub fn new(threshold: f64, distance: usize, location: usize) -> Self {
        Self { threshold, distance, location, ignore_location: false }
    }

    /// Same threshold, but a match may start anywhere without penalty
    pub fn ignoring_location(self) -> Self {
        Self { ignore_location: true, ..self }
    }

    /// Options for titles, tags and vocabulary entries
    pub fn titles(config: &FuzzyConfig) -> Self {
        Self::new(config.threshold, config.distance, config.location)
    }

    /// Looser options for article bodies
    pub fn articles(config: &FuzzyConfig) -> Self {
        Self::new(config.article_threshold, config.distance, config.location)
    }

    /// Options for locating the span to highlight in a rendered result
    pub fn highlight(config: &FuzzyConfig) -> Self {
        Self::new(config.highlight_threshold, config.distance, config.location)
    }

    fn proximity_penalty(&self, start: usize) -> f64 {
        if self.ignore_location {
            return 0.0;
        }
        let proximity = start.abs_diff(self.location);
        if self.distance == 0 {
            return if proximity == 0 { 0.0 } else { 1.0 };
        }
        proximity as f64 / self.distance as f64
    }

    /// Furthest char offset at which a match may still start
    fn max_start(&self) -> usize {
        if self.ignore_location {
            return usize::MAX;
        }
        if self.distance == 0 {
            return self.location;
        }
        self.location + (self.threshold * self.distance as f64).floor() as usize
    }
}

/// Best approximate occurrence of a pattern inside one field.
/// `start..end` is a char range into the field text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldMatch {
    pub score: f64,
    pub errors: usize,
    pub start: usize,
    pub end: usize,
}

/// Find the best-scoring approximate occurrence of `pattern` in `text`.
///
/// Case-insensitive. Among equally scored candidates the earliest one wins.
pub fn best_match(text: &str, pattern: &str, options: &MatchOptions) -> Option<FieldMatch> {
    let pat = fold_chars(pattern);
    let txt = fold_chars(text);
    let m = pat.len();
    if m == 0 || txt.is_empty() {
        return None;
    }

    if pat == txt {
        return Some(FieldMatch { score: 0.0, errors: 0, start: 0, end: m });
    }

    let max_errors = (options.threshold * m as f64).floor() as usize;
    // Nothing starting past `max_start` can pass the proximity penalty
    let scan_end = txt.len().min(options.max_start().saturating_add(m + max_errors));

    // Column of a Sellers DP: cost[i] is the fewest edits aligning pat[..i]
    // with some substring of the text ending at the current column, and
    // start[i] is where that substring begins.
    let mut cost: Vec<usize> = (0..=m).collect();
    let mut start = vec![0usize; m + 1];
    let mut next_cost = vec![0usize; m + 1];
    let mut next_start = vec![0usize; m + 1];

    let mut best: Option<FieldMatch> = None;

    for (j, &tc) in txt.iter().enumerate().take(scan_end) {
        next_cost[0] = 0;
        next_start[0] = j + 1;

        for i in 1..=m {
            let substitute = cost[i - 1] + usize::from(pat[i - 1] != tc);
            let skip_text = cost[i] + 1;
            let skip_pattern = next_cost[i - 1] + 1;

            if substitute <= skip_text && substitute <= skip_pattern {
                next_cost[i] = substitute;
                next_start[i] = start[i - 1];
            } else if skip_text <= skip_pattern {
                next_cost[i] = skip_text;
                next_start[i] = start[i];
            } else {
                next_cost[i] = skip_pattern;
                next_start[i] = next_start[i - 1];
            }
        }

        std::mem::swap(&mut cost, &mut next_cost);
        std::mem::swap(&mut start, &mut next_start);

        let errors = cost[m];
        let match_start = start[m];
        let match_end = j + 1;
        if errors > max_errors || match_end <= match_start {
            continue;
        }

        let score = errors as f64 / m as f64 + options.proximity_penalty(match_start);
        if score > options.threshold {
            continue;
        }

        let score = score.max(MIN_SCORE);
        let is_better = best.as_ref().map_or(true, |b| score < b.score);
        if is_better {
            best = Some(FieldMatch {
                score,
                errors,
                start: match_start,
                end: match_end,
            });
        }
    }

    best
}

/// Field length norm: longer fields weigh less per match.
pub(crate) fn field_norm(text: &str) -> f64 {
    let tokens = text.split(' ').filter(|t| !t.is_empty()).count().max(1);
    let norm = 1.0 / (tokens as f64).sqrt();
    (norm * 1000.0).round() / 1000.0
}

/// A field to score, with its raw (unnormalized) weight
#[derive(Debug, Clone, Copy)]
pub struct WeightedField<'a> {
    pub text: Option<&'a str>,
    pub weight: f64,
}

/// Combined score over several fields, plus the index and match of the best
/// single field. `None` if no field matched.
pub fn weighted_score(
    fields: &[WeightedField<'_>],
    pattern: &str,
    options: &MatchOptions,
) -> Option<(f64, usize, FieldMatch)> {
    let total_weight: f64 = fields.iter().map(|f| f.weight).sum();
    if total_weight <= 0.0 {
        return None;
    }

    let mut total = 1.0_f64;
    let mut best: Option<(usize, FieldMatch)> = None;

    for (idx, field) in fields.iter().enumerate() {
        let Some(text) = field.text.filter(|t| !t.is_empty()) else {
            continue;
        };
        let Some(found) = best_match(text, pattern, options) else {
            continue;
        };

        let weight = field.weight / total_weight;
        let score = if found.score == 0.0 && weight > 0.0 { EPSILON } else { found.score };
        total *= score.powf(weight * field_norm(text));

        let is_better = best.as_ref().map_or(true, |(_, b)| found.score < b.score);
        if is_better {
            best = Some((idx, found));
        }
    }

    best.map(|(idx, found)| (total, idx, found))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(threshold: f64) -> MatchOptions {
        MatchOptions::new(threshold, 100, 0)
    }

    #[test]
    fn test_identical_text_scores_zero() {
        let found = best_match("Rust", "rust", &opts(0.4)).unwrap();
        assert_eq!(found.score, 0.0);
        assert_eq!((found.start, found.end), (0, 4));
    }

    #[test]
    fn test_exact_substring_at_start() {
        let found = best_match("rustacean handbook", "rust", &opts(0.4)).unwrap();
        assert_eq!(found.errors, 0);
        assert_eq!((found.start, found.end), (0, 4));
        assert_eq!(found.score, MIN_SCORE);
    }

    #[test]
    fn test_single_typo_within_threshold() {
        let found = best_match("javascript", "javasript", &opts(0.4)).unwrap();
        assert_eq!(found.errors, 1);
        assert!(found.score < 0.4);
    }

    #[test]
    fn test_too_many_errors_rejected() {
        assert!(best_match("python", "haskell", &opts(0.4)).is_none());
    }

    #[test]
    fn test_distant_match_penalized_by_location() {
        let text = format!("{}needle", "x".repeat(80));
        // 80 / 100 proximity exceeds 0.4 but not 0.9
        assert!(best_match(&text, "needle", &opts(0.4)).is_none());
        let found = best_match(&text, "needle", &opts(0.9)).unwrap();
        assert_eq!(found.start, 80);
        assert!((found.score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_earliest_equal_match_wins() {
        let found = best_match("cat cat", "cat", &opts(0.4)).unwrap();
        assert_eq!((found.start, found.end), (0, 3));
    }

    #[test]
    fn test_earliest_wins_when_proximity_is_below_floor() {
        // the second hit's raw score (4 / 100_000) is under the floor, as is the first's
        let found = best_match("cat cat", "cat", &MatchOptions::new(0.4, 100_000, 0)).unwrap();
        assert_eq!((found.start, found.end), (0, 3));
    }

    #[test]
    fn test_ignoring_location_finds_late_matches() {
        let text = format!("{}needle", "x".repeat(500));
        let options = MatchOptions::new(0.4, 100, 0);
        assert!(best_match(&text, "needle", &options).is_none());

        let found = best_match(&text, "needle", &options.ignoring_location()).unwrap();
        assert_eq!((found.start, found.end), (500, 506));
        assert_eq!(found.score, MIN_SCORE);
    }

    #[test]
    fn test_closer_match_beats_exact_far_match() {
        // one error at 0 (0.33) vs exact at 40 (0.4)
        let text = format!("cbt{}cat", " ".repeat(37));
        let found = best_match(&text, "cat", &MatchOptions::new(0.5, 100, 0)).unwrap();
        assert_eq!(found.start, 0);
    }

    #[test]
    fn test_zero_distance_requires_exact_location() {
        let options = MatchOptions::new(0.6, 0, 0);
        assert!(best_match("xx rust", "rust", &options).is_none());
        assert!(best_match("rust xx", "rust", &options).is_some());
    }

    #[test]
    fn test_empty_inputs() {
        assert!(best_match("", "a", &opts(0.6)).is_none());
        assert!(best_match("abc", "", &opts(0.6)).is_none());
    }

    #[test]
    fn test_multibyte_spans_are_char_offsets() {
        let found = best_match("我爱苹果", "苹果", &opts(0.4)).unwrap();
        assert_eq!((found.start, found.end), (2, 4));
    }

    #[test]
    fn test_field_norm() {
        assert_eq!(field_norm("one"), 1.0);
        assert_eq!(field_norm("one two three four"), 0.5);
        assert_eq!(field_norm("a  b"), 0.707);
    }

    #[test]
    fn test_weighted_title_beats_category_hit() {
        let options = opts(0.4);
        let title_hit = weighted_score(
            &[
                WeightedField { text: Some("borrow checker"), weight: 0.7 },
                WeightedField { text: None, weight: 0.3 },
                WeightedField { text: Some("misc"), weight: 0.2 },
            ],
            "borrow",
            &options,
        )
        .unwrap();
        let category_hit = weighted_score(
            &[
                WeightedField { text: Some("lifetimes"), weight: 0.7 },
                WeightedField { text: None, weight: 0.3 },
                WeightedField { text: Some("borrow"), weight: 0.2 },
            ],
            "borrow",
            &options,
        )
        .unwrap();
        assert_eq!(title_hit.1, 0);
        assert_eq!(category_hit.1, 2);
        assert!(category_hit.0 < 1.0);
        // an identical category field still contributes EPSILON^weight
        assert!(category_hit.0 < title_hit.0);
    }

    #[test]
    fn test_weighted_no_match() {
        let fields = [WeightedField { text: Some("alpha"), weight: 1.0 }];
        assert!(weighted_score(&fields, "zzzzz", &opts(0.4)).is_none());
    }
}
