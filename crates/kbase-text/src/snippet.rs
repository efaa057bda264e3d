//! Highlighted snippet extraction around the first query-term match.

use regex::RegexBuilder;

pub const HIGHLIGHT_OPEN: &str = "<em>";
pub const HIGHLIGHT_CLOSE: &str = "</em>";

/// Extract a window of ±`radius` characters around the first occurrence of
/// the query phrase (preferred) or any individual term, wrapping matches in
/// highlight markers. Pure semantic hits with no literal match fall back to
/// the leading window of the chunk, unhighlighted.
pub fn build_snippet(text: &str, phrase: &str, terms: &[String], radius: usize) -> String {
    let phrase = phrase.trim();
    if let Some((start, pattern)) = first_match(text, phrase, terms) {
        let window = window_around(text, start, radius);
        return highlight(window, &pattern);
    }
    leading_window(text, radius * 2)
}

/// Locate the first match position and the pattern that produced it. A
/// multi-word phrase match wins over single-term matches so the highlight
/// covers the phrase as typed.
fn first_match(text: &str, phrase: &str, terms: &[String]) -> Option<(usize, String)> {
    if phrase.split_whitespace().count() > 1 {
        if let Some(m) = find_ci(text, phrase) {
            return Some((m, phrase.to_string()));
        }
    }
    let mut best: Option<(usize, String)> = None;
    for term in terms {
        if let Some(m) = find_ci(text, term) {
            if best.as_ref().map_or(true, |(pos, _)| m < *pos) {
                best = Some((m, term.clone()));
            }
        }
    }
    best
}

fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let re = RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
        .ok()?;
    re.find(haystack).map(|m| m.start())
}

fn highlight(window: &str, pattern: &str) -> String {
    let re = match RegexBuilder::new(&regex::escape(pattern))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re,
        Err(_) => return window.to_string(),
    };
    re.replace_all(window, |caps: &regex::Captures<'_>| {
        format!("{HIGHLIGHT_OPEN}{}{HIGHLIGHT_CLOSE}", &caps[0])
    })
    .into_owned()
}

fn window_around(text: &str, pos: usize, radius: usize) -> &str {
    let start = floor_char_boundary(text, pos.saturating_sub(radius));
    let end = ceil_char_boundary(text, (pos + radius).min(text.len()));
    &text[start..end]
}

fn leading_window(text: &str, len: usize) -> String {
    text.chars().take(len).collect()
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrase_match_is_highlighted() {
        let text = "Redis caching improves read latency. It uses an in-memory store.";
        let terms = vec!["redis".to_string(), "caching".to_string()];
        let snippet = build_snippet(text, "redis caching", &terms, 80);
        assert!(snippet.contains("<em>Redis caching</em>"), "got: {snippet}");
    }

    #[test]
    fn single_term_match_is_highlighted() {
        let text = "Latency drops when caching is enabled on the edge.";
        let terms = vec!["caching".to_string()];
        let snippet = build_snippet(text, "caching", &terms, 40);
        assert!(snippet.contains("<em>caching</em>"));
    }

    #[test]
    fn no_literal_match_falls_back_to_leading_window() {
        let text = "Completely unrelated paragraph about database storage engines.";
        let terms = vec!["kubernetes".to_string()];
        let snippet = build_snippet(text, "kubernetes", &terms, 10);
        assert!(snippet.starts_with("Completely"));
        assert!(!snippet.contains(HIGHLIGHT_OPEN));
        assert!(snippet.chars().count() <= 20);
    }

    #[test]
    fn window_respects_char_boundaries() {
        let text = "caché améliore la latence de lecture — caché partout";
        let terms = vec!["caché".to_string()];
        let snippet = build_snippet(text, "caché", &terms, 5);
        assert!(snippet.contains("<em>caché</em>"));
    }

    #[test]
    fn earliest_term_wins() {
        let text = "store first, cache later";
        let terms = vec!["cache".to_string(), "store".to_string()];
        let snippet = build_snippet(text, "cache store", &terms, 100);
        // Phrase does not occur; earliest single term anchors the window.
        assert!(snippet.contains("<em>store</em>"));
    }
}
