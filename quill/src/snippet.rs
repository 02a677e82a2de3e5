//! Bounded previews of article bodies
//!
//! All offsets are in chars. Case folding is done char-by-char so that an
//! index into the folded text is also an index into the original.

use crate::config::PreviewConfig;
use once_cell::sync::Lazy;
use regex::Regex;

pub const ELLIPSIS: &str = "...";

static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("static regex"));
static ZERO_WIDTH: Lazy<Regex> = Lazy::new(|| Regex::new("[\u{200B}-\u{200D}\u{FEFF}]").expect("static regex"));

/// Lowercase a single char without changing the char count
pub(crate) fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

pub(crate) fn fold_chars(text: &str) -> Vec<char> {
    text.chars().map(fold_char).collect()
}

/// Char index of the first occurrence of `needle` in `haystack`
pub(crate) fn find_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Collapse every whitespace run into one space and trim both ends
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

fn head(chars: &[char], window: usize) -> String {
    if chars.len() <= window {
        return chars.iter().collect();
    }
    let mut out: String = chars[..window].iter().collect();
    out.push_str(ELLIPSIS);
    out
}

/// Slice of `content` centered on the first case-insensitive occurrence of
/// `query`, with ellipses where the slice stops short of either end.
///
/// Without an occurrence the first `window` chars are returned, with a
/// trailing ellipsis only when something was cut.
pub fn preview(content: &str, query: &str, config: &PreviewConfig) -> String {
    let normalized = collapse_whitespace(content);
    let chars: Vec<char> = normalized.chars().collect();
    if query.trim().is_empty() {
        return head(&chars, config.window);
    }

    let folded: Vec<char> = chars.iter().copied().map(fold_char).collect();
    let needle = fold_chars(query);
    let Some(match_index) = find_chars(&folded, &needle) else {
        return head(&chars, config.window);
    };

    let start = match_index.saturating_sub(config.before);
    let end = chars.len().min(match_index + needle.len() + config.after);

    let mut out = String::new();
    if start > 0 {
        out.push_str(ELLIPSIS);
    }
    out.extend(&chars[start..end]);
    if end < chars.len() {
        out.push_str(ELLIPSIS);
    }

    if out.chars().count() > config.window {
        let mut capped: String = out.chars().take(config.window).collect();
        capped.push_str(ELLIPSIS);
        return capped;
    }
    out
}

/// Tidy text captured from the clipboard before it is highlighted
pub fn clean_clipboard_text(text: &str) -> String {
    let collapsed = EXCESS_NEWLINES.replace_all(text, "\n");
    let trimmed = collapsed.trim_matches('\n');
    ZERO_WIDTH.replace_all(trimmed, "").into_owned()
}
