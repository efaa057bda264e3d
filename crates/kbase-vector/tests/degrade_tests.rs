use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kbase_core::types::{CollectionStatus, HealthStatus};
use kbase_core::{Error, Result};
use kbase_vector::{DegradingBackend, PointRecord, QueryFilter, ScoredPoint, VectorBackend};
use serde_json::json;

/// A primary that refuses every call, as an unreachable service would.
struct DeadBackend {
    calls: AtomicU32,
}

#[async_trait]
impl VectorBackend for DeadBackend {
    async fn ensure_collection(&self, _name: &str, _vector_dim: usize) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::BackendUnavailable("connection refused".into()))
    }
    async fn delete_collection(&self, _name: &str) -> Result<()> {
        Err(Error::BackendUnavailable("connection refused".into()))
    }
    async fn upsert(&self, _collection: &str, _points: Vec<PointRecord>) -> Result<()> {
        Err(Error::BackendUnavailable("connection refused".into()))
    }
    async fn delete_by_document(&self, _collection: &str, _document_id: &str) -> Result<()> {
        Err(Error::BackendUnavailable("connection refused".into()))
    }
    async fn query(
        &self,
        _collection: &str,
        _vector: &[f32],
        _top_k: usize,
        _filter: &QueryFilter,
    ) -> Result<Vec<ScoredPoint>> {
        Err(Error::BackendUnavailable("connection refused".into()))
    }
    async fn fetch_points(&self, _collection: &str, _ids: &[String]) -> Result<Vec<PointRecord>> {
        Err(Error::BackendUnavailable("connection refused".into()))
    }
    async fn collection_stats(&self, _name: &str) -> Result<CollectionStatus> {
        Err(Error::BackendUnavailable("connection refused".into()))
    }
    async fn health(&self) -> HealthStatus {
        HealthStatus::Unavailable
    }
}

#[tokio::test]
async fn failed_primary_call_switches_to_memory_for_good() {
    let primary = Arc::new(DeadBackend {
        calls: AtomicU32::new(0),
    });
    let backend = DegradingBackend::new(primary.clone());
    assert!(!backend.is_degraded());

    // The first call trips the fallback and is replayed against memory.
    backend.ensure_collection("c", 2).await.unwrap();
    assert!(backend.is_degraded());
    assert_eq!(backend.health().await, HealthStatus::Degraded);

    // Subsequent calls never touch the primary again.
    backend
        .upsert(
            "c",
            vec![PointRecord {
                id: "a::0".into(),
                document_id: "a".into(),
                ordinal: 0,
                total_chunks: 1,
                vector: vec![1.0, 0.0],
                payload: json!({}),
            }],
        )
        .await
        .unwrap();
    let hits = backend
        .query("c", &[1.0, 0.0], 5, &QueryFilter::none())
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn health_probe_alone_degrades_unreachable_primary() {
    let backend = DegradingBackend::new(Arc::new(DeadBackend {
        calls: AtomicU32::new(0),
    }));
    assert_eq!(backend.health().await, HealthStatus::Degraded);
    assert!(backend.is_degraded());
}

#[tokio::test]
async fn explicit_memory_mode_is_healthy_not_degraded() {
    let backend = DegradingBackend::memory_only();
    backend.ensure_collection("c", 2).await.unwrap();
    assert_eq!(backend.health().await, HealthStatus::Healthy);
    assert!(!backend.is_degraded());
}

#[tokio::test]
async fn structural_errors_do_not_trigger_fallback() {
    let backend = DegradingBackend::memory_only();
    backend.ensure_collection("c", 2).await.unwrap();
    let err = backend.ensure_collection("c", 3).await.unwrap_err();
    assert!(matches!(err, Error::CollectionDimensionMismatch { .. }));
    assert!(!backend.is_degraded());
}
