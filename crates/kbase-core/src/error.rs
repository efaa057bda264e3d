use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A whole embedding batch failed after retries were exhausted. Counts
    /// distinguish vectors that were produced before the failure from the
    /// inputs that never got one, so callers can retry the failed subset.
    #[error(
        "embedding provider failed after {attempts} attempts \
         ({completed} embedded, {failed} failed): {message}"
    )]
    EmbeddingProviderFailed {
        attempts: u32,
        completed: usize,
        failed: usize,
        message: String,
    },

    #[error("vector backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("collection '{collection}' expects vector dimension {expected}, got {actual}")]
    CollectionDimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("search unavailable: all {attempted} targeted collections failed")]
    SearchUnavailable { attempted: usize },

    #[error("backend operation failed: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Transient faults are retried locally; structural faults are surfaced
    /// immediately because they indicate a caller or configuration bug.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable(_) | Error::Backend(_) | Error::SearchUnavailable { .. }
        )
    }
}
