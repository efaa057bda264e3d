//! Splits raw document text into bounded, sentence-aligned chunks.
//!
//! Sentences are packed greedily up to the token budget. A sentence that is
//! larger than the whole budget is hard-split at token boundaries. When an
//! overlap budget is configured, each chunk starts with the trailing tokens
//! of its predecessor so context is not lost at chunk boundaries.

use kbase_core::types::Chunk;

use crate::tokens::TokenCounter;

pub fn chunk_text(
    document_id: &str,
    text: &str,
    max_tokens: usize,
    overlap_tokens: usize,
    counter: &TokenCounter,
) -> Vec<Chunk> {
    if text.trim().is_empty() || max_tokens == 0 {
        return Vec::new();
    }

    let mut pieces: Vec<(String, usize)> = Vec::new();
    for sentence in split_sentences(text) {
        let tokens = counter.count(sentence);
        if tokens <= max_tokens {
            pieces.push((sentence.to_string(), tokens));
        } else {
            for window in hard_split(sentence, max_tokens, counter) {
                let tokens = counter.count(&window);
                pieces.push((window, tokens));
            }
        }
    }

    let mut texts: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_tokens = 0usize;
    for (piece, tokens) in pieces {
        if !current.is_empty() && current_tokens + tokens > max_tokens {
            let chunk = current.join(" ");
            // Seed the next chunk with trailing context, trimmed so the
            // incoming piece still fits the budget.
            let seed_budget = overlap_tokens.min(max_tokens.saturating_sub(tokens));
            let seed = overlap_tail(&chunk, seed_budget, counter);
            texts.push(chunk);
            current.clear();
            current_tokens = 0;
            if !seed.is_empty() {
                current_tokens = counter.count(&seed);
                current.push(seed);
            }
        }
        current_tokens += tokens;
        current.push(piece);
    }
    if !current.is_empty() {
        texts.push(current.join(" "));
    }

    let total_chunks = texts.len();
    texts
        .into_iter()
        .enumerate()
        .map(|(ordinal, text)| Chunk {
            id: Chunk::make_id(document_id, ordinal),
            document_id: document_id.to_string(),
            ordinal,
            total_chunks,
            token_count: counter.count(&text),
            text,
        })
        .collect()
}

/// Sentence boundaries: terminal punctuation followed by whitespace, or a
/// paragraph break. Returned slices are trimmed and non-empty.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '.' | '!' | '?' => match chars.peek() {
                Some((_, next)) => next.is_whitespace(),
                None => true,
            },
            '\n' => matches!(chars.peek(), Some((_, '\n'))),
            _ => false,
        };
        if boundary {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Fallback for a single sentence that exceeds the whole budget: greedy
/// word windows whose summed token counts stay within `max_tokens`.
fn hard_split(sentence: &str, max_tokens: usize, counter: &TokenCounter) -> Vec<String> {
    let mut windows = Vec::new();
    let mut words: Vec<&str> = Vec::new();
    let mut tokens = 0usize;
    for word in sentence.split_whitespace() {
        let word_tokens = counter.count(word).max(1);
        if !words.is_empty() && tokens + word_tokens > max_tokens {
            windows.push(words.join(" "));
            words.clear();
            tokens = 0;
        }
        tokens += word_tokens;
        words.push(word);
    }
    if !words.is_empty() {
        windows.push(words.join(" "));
    }
    windows
}

/// Trailing words of `text` whose summed token counts fit `budget`.
fn overlap_tail(text: &str, budget: usize, counter: &TokenCounter) -> String {
    if budget == 0 {
        return String::new();
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut taken = 0usize;
    let mut tokens = 0usize;
    for word in words.iter().rev() {
        let word_tokens = counter.count(word).max(1);
        if tokens + word_tokens > budget {
            break;
        }
        tokens += word_tokens;
        taken += 1;
    }
    words[words.len() - taken..].join(" ")
}
