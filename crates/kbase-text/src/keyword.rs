//! Lexical relevance: token-overlap scoring between query terms and chunk
//! text. Case-insensitive, stop words excluded, normalized to [0,1].

use std::collections::HashSet;

/// Kept sorted so membership checks can binary-search.
static STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "because",
    "been", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have",
    "how", "if", "in", "into", "is", "it", "its", "just", "may", "more", "most", "not", "of", "on",
    "only", "or", "other", "our", "out", "over", "so", "some", "such", "than", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "to", "under", "up", "was", "we",
    "were", "what", "when", "where", "which", "who", "will", "with", "would", "you", "your",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.binary_search(&word).is_ok()
}

/// Lowercased, deduplicated query terms with stop words removed, in first
/// occurrence order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut terms = Vec::new();
    for token in tokenize(query) {
        if is_stop_word(&token) {
            continue;
        }
        if seen.insert(token.clone()) {
            terms.push(token);
        }
    }
    terms
}

/// Fraction of query terms that occur in `text`. Empty term lists score 0.
pub fn overlap_score(terms: &[String], text: &str) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let text_terms: HashSet<String> = tokenize(text).collect();
    let matched = terms.iter().filter(|t| text_terms.contains(*t)).count();
    matched as f32 / terms.len() as f32
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}
