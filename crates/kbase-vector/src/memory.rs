//! Exact-scan in-memory backend.
//!
//! Serves as the fallback when the persistent backend is unavailable and as
//! the test backend. Nothing survives a process restart; that is a
//! documented limitation of this layer, not a bug.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use kbase_core::types::{CollectionStatus, HealthStatus};
use kbase_core::{Error, Result};

use crate::backend::{
    cosine_similarity, similarity_to_score, PointRecord, QueryFilter, ScoredPoint, VectorBackend,
};

#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, MemCollection>>,
}

struct MemCollection {
    vector_dim: usize,
    points: HashMap<String, PointRecord>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    async fn ensure_collection(&self, name: &str, vector_dim: usize) -> Result<()> {
        let mut collections = self.collections.write().expect("lock poisoned");
        match collections.get(name) {
            Some(existing) if existing.vector_dim != vector_dim => {
                Err(Error::CollectionDimensionMismatch {
                    collection: name.to_string(),
                    expected: existing.vector_dim,
                    actual: vector_dim,
                })
            }
            Some(_) => Ok(()),
            None => {
                collections.insert(
                    name.to_string(),
                    MemCollection {
                        vector_dim,
                        points: HashMap::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections
            .write()
            .expect("lock poisoned")
            .remove(name);
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<()> {
        let mut collections = self.collections.write().expect("lock poisoned");
        let col = collections
            .get_mut(collection)
            .ok_or_else(|| Error::NotFound(format!("collection '{collection}'")))?;
        for point in &points {
            if point.vector.len() != col.vector_dim {
                return Err(Error::CollectionDimensionMismatch {
                    collection: collection.to_string(),
                    expected: col.vector_dim,
                    actual: point.vector.len(),
                });
            }
        }
        for point in points {
            col.points.insert(point.id.clone(), point);
        }
        Ok(())
    }

    async fn delete_by_document(&self, collection: &str, document_id: &str) -> Result<()> {
        let mut collections = self.collections.write().expect("lock poisoned");
        if let Some(col) = collections.get_mut(collection) {
            col.points.retain(|_, p| p.document_id != document_id);
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().expect("lock poisoned");
        let Some(col) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        if vector.len() != col.vector_dim {
            return Err(Error::CollectionDimensionMismatch {
                collection: collection.to_string(),
                expected: col.vector_dim,
                actual: vector.len(),
            });
        }
        let mut hits: Vec<ScoredPoint> = col
            .points
            .values()
            .filter(|p| filter.matches(&p.document_id))
            .map(|p| ScoredPoint {
                id: p.id.clone(),
                document_id: p.document_id.clone(),
                score: similarity_to_score(cosine_similarity(vector, &p.vector)),
                payload: p.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn fetch_points(&self, collection: &str, ids: &[String]) -> Result<Vec<PointRecord>> {
        let collections = self.collections.read().expect("lock poisoned");
        let Some(col) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| col.points.get(id).cloned()).collect())
    }

    async fn collection_stats(&self, name: &str) -> Result<CollectionStatus> {
        let collections = self.collections.read().expect("lock poisoned");
        Ok(match collections.get(name) {
            Some(col) => CollectionStatus {
                exists: true,
                chunk_count: col.points.len(),
                vector_dim: Some(col.vector_dim),
            },
            None => CollectionStatus::default(),
        })
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus::Healthy
    }
}
