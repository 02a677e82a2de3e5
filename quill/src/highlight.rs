//! Keyword highlighting for rendered text.
//!
//! Text is escaped before any markup is composed, markers are added around
//! matches, and the result goes through `sanitize` before it reaches a
//! rendering surface. Highlighting never fails outward: on any error the
//! escaped text is returned without markers.

use crate::interface::{HighlightItem, MatchMode};
use crate::ranking::{best_match, MatchOptions};
use once_cell::sync::Lazy;
use regex::{Captures, Regex, RegexBuilder};
use std::collections::HashMap;

/// Compiled size cap for the keyword alternation (vocabularies get large)
const PATTERN_SIZE_LIMIT: usize = 64 * 1024 * 1024;

static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^&(?:#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z][A-Za-z0-9]*);").expect("static regex"));

/// Character references in already-escaped text. Tried after every term, so
/// a term never binds inside `&amp;` and friends.
const ENTITY_BRANCH: &str = r"&(?:#\d+|#x[0-9a-f]+|\w+);";

static SANITIZER: Lazy<ammonia::Builder<'static>> = Lazy::new(|| {
    let mut builder = ammonia::Builder::default();
    builder
        .add_tags(&["mark"])
        .add_generic_attributes(&["class"])
        .add_tag_attributes("mark", &["data-id"])
        .link_rel(None);
    builder
});

/// Outcome of highlighting a text against a set of keywords
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HighlightOutcome {
    pub highlighted_text: String,
    /// Original titles of every matched item, first appearance order, no repeats
    pub found_keywords: Vec<String>,
}

impl HighlightOutcome {
    fn plain(escaped: String) -> Self {
        Self { highlighted_text: escaped, found_keywords: Vec::new() }
    }
}

/// Escape the five HTML-significant characters.
///
/// Existing character references are left alone, so escaping twice gives the
/// same result as escaping once.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, ch) in text.char_indices() {
        match ch {
            '&' if ENTITY.is_match(&text[i..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

/// Build one case-insensitive alternation over already-escaped terms.
///
/// Terms must be sorted longest first: alternation is leftmost-first, so a
/// short term listed earlier would shadow a longer one sharing its start.
/// Each term also matches wrapped in literal `{}` or `[]`. A trailing branch
/// consumes character references; callers pass those through unmarked.
pub fn build_pattern(terms: &[String]) -> Result<Option<Regex>, regex::Error> {
    let mut alternatives: Vec<String> = terms
        .iter()
        .filter(|t| !t.is_empty())
        .map(|t| {
            let escaped = regex::escape(t);
            format!(r"\{{{0}\}}|\[{0}\]|{0}", escaped)
        })
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    alternatives.push(ENTITY_BRANCH.to_string());

    RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
        .map(Some)
}

fn strip_brackets(fragment: &str) -> &str {
    let wrapped = (fragment.starts_with('{') && fragment.ends_with('}'))
        || (fragment.starts_with('[') && fragment.ends_with(']'));
    if wrapped && fragment.len() >= 2 {
        &fragment[1..fragment.len() - 1]
    } else {
        fragment
    }
}

fn push_found(found: &mut Vec<String>, title: &str) {
    if !found.iter().any(|f| f == title) {
        found.push(title.to_string());
    }
}

/// Wrap every keyword occurrence in `text` with a `<mark>` pointing back at
/// the owning item's id.
pub fn highlight(text: &str, items: &[HighlightItem]) -> HighlightOutcome {
    let escaped = escape_html(text);
    if items.is_empty() {
        return HighlightOutcome::plain(escaped);
    }

    let mut sorted: Vec<&HighlightItem> = items.iter().filter(|i| !i.title.is_empty()).collect();
    sorted.sort_by_key(|item| std::cmp::Reverse(item.title.chars().count()));

    // First item wins when two share a title
    let mut lookup: HashMap<String, &HighlightItem> = HashMap::new();
    let mut terms = Vec::with_capacity(sorted.len());
    for item in &sorted {
        let term = escape_html(&item.title);
        lookup.entry(term.to_lowercase()).or_insert(item);
        terms.push(term);
    }

    let pattern = match build_pattern(&terms) {
        Ok(Some(p)) => p,
        Ok(None) => return HighlightOutcome::plain(escaped),
        Err(e) => {
            tracing::warn!(error = %e, "keyword pattern failed to build; showing text unhighlighted");
            return HighlightOutcome::plain(escaped);
        }
    };

    let mut found_keywords = Vec::new();
    let marked = pattern.replace_all(&escaped, |caps: &Captures| {
        let fragment = &caps[0];
        let key = fragment.to_lowercase();
        let item = lookup
            .get(&key)
            .or_else(|| lookup.get(&strip_brackets(fragment).to_lowercase()));
        match item {
            Some(item) => {
                push_found(&mut found_keywords, &item.original_title);
                format!(r#"<mark class="highlight" data-id="{}">{}</mark>"#, item.id, fragment)
            }
            None => fragment.to_string(),
        }
    });

    HighlightOutcome {
        highlighted_text: sanitize(&marked),
        found_keywords,
    }
}

/// Approximate variant of [`highlight`] for the overlay's fuzzy mode.
///
/// The whole text is scanned regardless of `options.location`, and every
/// occurrence of every item is marked. Items are tried longest first; each
/// only claims text no earlier item has claimed.
pub fn highlight_fuzzy(text: &str, items: &[HighlightItem], options: &MatchOptions) -> HighlightOutcome {
    if items.is_empty() {
        return HighlightOutcome::plain(escape_html(text));
    }

    let options = options.ignoring_location();
    let chars: Vec<char> = text.chars().collect();

    let mut sorted: Vec<&HighlightItem> = items.iter().filter(|i| !i.title.is_empty()).collect();
    sorted.sort_by_key(|item| std::cmp::Reverse(item.title.chars().count()));

    let mut claimed: Vec<(usize, usize, &HighlightItem)> = Vec::new();
    for item in sorted {
        claimed.sort_by_key(|(start, _, _)| *start);
        let mut gaps = Vec::new();
        let mut cursor = 0;
        for (start, end, _) in &claimed {
            gaps.push((cursor, *start));
            cursor = *end;
        }
        gaps.push((cursor, chars.len()));

        for (lo, hi) in gaps {
            for (start, end) in occurrences(&chars, lo, hi, &item.title, &options) {
                claimed.push((start, end, item));
            }
        }
    }
    claimed.sort_by_key(|(start, _, _)| *start);

    let mut out = String::with_capacity(text.len());
    let mut found_keywords = Vec::new();
    let mut cursor = 0;
    for (start, end, item) in claimed {
        out.push_str(&escape_html(&chars[cursor..start].iter().collect::<String>()));
        let fragment: String = chars[start..end].iter().collect();
        out.push_str(&format!(
            r#"<mark class="highlight" data-id="{}">{}</mark>"#,
            item.id,
            escape_html(&fragment)
        ));
        push_found(&mut found_keywords, &item.original_title);
        cursor = end;
    }
    out.push_str(&escape_html(&chars[cursor..].iter().collect::<String>()));

    HighlightOutcome {
        highlighted_text: sanitize(&out),
        found_keywords,
    }
}

/// Non-overlapping approximate occurrences of `term` inside `chars[lo..hi]`,
/// best first. Each hit splits the range and both sides are searched again.
fn occurrences(chars: &[char], lo: usize, hi: usize, term: &str, options: &MatchOptions) -> Vec<(usize, usize)> {
    let mut hits = Vec::new();
    let mut pending = vec![(lo, hi)];
    while let Some((lo, hi)) = pending.pop() {
        if lo >= hi {
            continue;
        }
        let window: String = chars[lo..hi].iter().collect();
        let Some(found) = best_match(&window, term, options) else {
            continue;
        };
        let (start, end) = (lo + found.start, lo + found.end);
        if end <= start {
            continue;
        }
        hits.push((start, end));
        pending.push((lo, start));
        pending.push((end, hi));
    }
    hits
}

/// Mark every case-insensitive occurrence of the literal query.
/// Used for palette rows in exact mode.
pub fn highlight_exact(text: &str, query: &str) -> String {
    let escaped = escape_html(text);
    if query.trim().is_empty() || text.is_empty() {
        return escaped;
    }

    let needle = format!("({})|{}", regex::escape(&escape_html(query)), ENTITY_BRANCH);
    match RegexBuilder::new(&needle).case_insensitive(true).build() {
        Ok(re) => re
            .replace_all(&escaped, |caps: &Captures| match caps.get(1) {
                Some(hit) => format!(r#"<mark class="query-highlight">{}</mark>"#, hit.as_str()),
                None => caps[0].to_string(),
            })
            .into_owned(),
        Err(e) => {
            tracing::warn!(error = %e, "query pattern failed to build");
            escaped
        }
    }
}

/// Wrap exactly one char span in a fuzzy marker. Out-of-range spans leave
/// the text unmarked.
pub fn highlight_span(text: &str, start: usize, end: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if start >= end || end > chars.len() {
        return escape_html(text);
    }
    let before: String = chars[..start].iter().collect();
    let matched: String = chars[start..end].iter().collect();
    let after: String = chars[end..].iter().collect();
    format!(
        r#"{}<span class="fuzzy-highlight">{}</span>{}"#,
        escape_html(&before),
        escape_html(&matched),
        escape_html(&after)
    )
}

/// Locate the best approximate span of `query` in `text` and mark it.
/// Used for palette rows in fuzzy mode.
pub fn highlight_fuzzy_match(text: &str, query: &str, options: &MatchOptions) -> String {
    if query.trim().is_empty() || text.is_empty() {
        return escape_html(text);
    }
    match best_match(text, query, options) {
        Some(found) => highlight_span(text, found.start, found.end),
        None => escape_html(text),
    }
}

/// Escaped palette-row text with the query marked the way `mode` matched it
pub fn highlight_row(text: &str, query: &str, mode: MatchMode, options: &MatchOptions) -> String {
    match mode {
        MatchMode::Exact => highlight_exact(text, query),
        MatchMode::Fuzzy => highlight_fuzzy_match(text, query, options),
    }
}

/// Strip executable content from an HTML fragment before it is rendered.
///
/// Script-like elements go with their contents, unknown tags are dropped
/// while their text stays, and URLs are checked after character references
/// are decoded. `<mark>` keeps its `class` and `data-id`.
pub fn sanitize(html: &str) -> String {
    SANITIZER.clean(html).to_string()
}
