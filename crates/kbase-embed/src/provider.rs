use async_trait::async_trait;
use kbase_core::Result;

/// One provider call's worth of vectors, in input order, plus the token
/// count the provider reported for cost accounting.
#[derive(Debug)]
pub struct ProviderBatch {
    pub vectors: Vec<Vec<f32>>,
    pub total_tokens: u64,
}

/// A source of embedding vectors. Implementations may call a remote API or
/// derive deterministic pseudo-embeddings offline; callers can always tell
/// which through [`EmbeddingProvider::is_mock`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `http:text-embedding-3-small:d1024`).
    fn id(&self) -> &str;

    /// Embedding dimensionality. Constant for the provider's lifetime.
    fn dimension(&self) -> usize;

    /// True for offline pseudo-embeddings. Mock and real vectors must never
    /// end up in the same collection.
    fn is_mock(&self) -> bool;

    /// Embed one provider-sized batch. Order of outputs matches inputs.
    async fn embed_batch(&self, texts: &[String]) -> Result<ProviderBatch>;
}
