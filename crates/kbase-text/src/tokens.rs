//! Token counting for chunk budgeting.
//!
//! When a HuggingFace `tokenizer.json` is configured the count is
//! provider-consistent. Without one, the count degrades to the number of
//! whitespace-separated words, which is approximate, not exact.

use std::path::Path;

use kbase_core::{Error, Result};
use tokenizers::Tokenizer;
use tracing::warn;

pub enum TokenCounter {
    HuggingFace(Box<Tokenizer>),
    Whitespace,
}

impl TokenCounter {
    pub fn from_file(path: &Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            Error::Validation(format!("failed to load tokenizer from {}: {e}", path.display()))
        })?;
        Ok(TokenCounter::HuggingFace(Box::new(tokenizer)))
    }

    /// Build from an optional configured tokenizer path, degrading to the
    /// whitespace approximation when loading fails.
    pub fn from_config(tokenizer_file: Option<&str>) -> Self {
        match tokenizer_file {
            Some(path) => match Self::from_file(Path::new(path)) {
                Ok(counter) => counter,
                Err(e) => {
                    warn!("{e}; falling back to whitespace token counting");
                    TokenCounter::Whitespace
                }
            },
            None => TokenCounter::Whitespace,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, TokenCounter::HuggingFace(_))
    }

    pub fn count(&self, text: &str) -> usize {
        match self {
            TokenCounter::HuggingFace(tokenizer) => match tokenizer.encode(text, false) {
                Ok(encoding) => encoding.get_ids().len(),
                Err(_) => text.split_whitespace().count(),
            },
            TokenCounter::Whitespace => text.split_whitespace().count(),
        }
    }
}
