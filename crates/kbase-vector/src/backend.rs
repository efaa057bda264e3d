//! Capability interface over vector storage.

use async_trait::async_trait;
use kbase_core::types::{CollectionStatus, HealthStatus};
use kbase_core::Result;
use serde_json::Value;

/// One stored chunk: its vector plus a JSON payload carrying the chunk text
/// and the owning document's metadata for result assembly.
#[derive(Debug, Clone)]
pub struct PointRecord {
    pub id: String,
    pub document_id: String,
    pub ordinal: usize,
    pub total_chunks: usize,
    pub vector: Vec<f32>,
    pub payload: Value,
}

/// One nearest-neighbor hit. `score` is cosine similarity normalized to
/// [0,1] via `(cos + 1) / 2`.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub document_id: String,
    pub score: f32,
    pub payload: Value,
}

/// Optional payload filter applied during queries.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub document_id: Option<String>,
    pub exclude_document: Option<String>,
}

impl QueryFilter {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn excluding(document_id: impl Into<String>) -> Self {
        Self {
            document_id: None,
            exclude_document: Some(document_id.into()),
        }
    }

    pub fn matches(&self, document_id: &str) -> bool {
        if let Some(want) = &self.document_id {
            if want != document_id {
                return false;
            }
        }
        if let Some(skip) = &self.exclude_document {
            if skip == document_id {
                return false;
            }
        }
        true
    }
}

/// Uniform interface over a vector-storage service. Two implementations:
/// an embedded LanceDB store and a non-persistent in-memory fallback.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Idempotent collection creation. Re-ensuring with a different vector
    /// dimension is rejected, never silently widened.
    async fn ensure_collection(&self, name: &str, vector_dim: usize) -> Result<()>;

    /// Explicit administrative deletion; removing a missing collection is ok.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Insert or replace points by id.
    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<()>;

    /// Remove every chunk belonging to a document.
    async fn delete_by_document(&self, collection: &str, document_id: &str) -> Result<()>;

    /// Nearest-neighbor search, best first.
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<ScoredPoint>>;

    /// Point lookup by id, vectors included.
    async fn fetch_points(&self, collection: &str, ids: &[String]) -> Result<Vec<PointRecord>>;

    async fn collection_stats(&self, name: &str) -> Result<CollectionStatus>;

    async fn health(&self) -> HealthStatus;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Map cosine similarity from [-1,1] into the [0,1] score space shared by
/// the keyword side of the fusion.
pub fn similarity_to_score(cosine: f32) -> f32 {
    ((cosine + 1.0) / 2.0).clamp(0.0, 1.0)
}
