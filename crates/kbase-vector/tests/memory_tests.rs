use kbase_core::types::HealthStatus;
use kbase_core::Error;
use kbase_vector::{MemoryBackend, PointRecord, QueryFilter, VectorBackend};
use serde_json::json;

fn point(id: &str, document_id: &str, ordinal: usize, vector: Vec<f32>) -> PointRecord {
    PointRecord {
        id: id.to_string(),
        document_id: document_id.to_string(),
        ordinal,
        total_chunks: 1,
        vector,
        payload: json!({"text": id}),
    }
}

#[tokio::test]
async fn ensure_collection_is_idempotent() {
    let backend = MemoryBackend::new();
    backend.ensure_collection("c", 4).await.unwrap();
    backend.ensure_collection("c", 4).await.unwrap();
    let stats = backend.collection_stats("c").await.unwrap();
    assert!(stats.exists);
    assert_eq!(stats.vector_dim, Some(4));
    assert_eq!(stats.chunk_count, 0);
}

#[tokio::test]
async fn dimension_change_is_rejected() {
    let backend = MemoryBackend::new();
    backend.ensure_collection("c", 4).await.unwrap();
    let err = backend.ensure_collection("c", 8).await.unwrap_err();
    match err {
        Error::CollectionDimensionMismatch {
            expected, actual, ..
        } => {
            assert_eq!(expected, 4);
            assert_eq!(actual, 8);
        }
        other => panic!("expected dimension mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn upsert_replaces_points_with_same_id() {
    let backend = MemoryBackend::new();
    backend.ensure_collection("c", 2).await.unwrap();
    backend
        .upsert("c", vec![point("a::0", "a", 0, vec![1.0, 0.0])])
        .await
        .unwrap();
    backend
        .upsert("c", vec![point("a::0", "a", 0, vec![0.0, 1.0])])
        .await
        .unwrap();
    let stats = backend.collection_stats("c").await.unwrap();
    assert_eq!(stats.chunk_count, 1);

    let fetched = backend
        .fetch_points("c", &["a::0".to_string()])
        .await
        .unwrap();
    assert_eq!(fetched[0].vector, vec![0.0, 1.0]);
}

#[tokio::test]
async fn upsert_into_missing_collection_fails() {
    let backend = MemoryBackend::new();
    let err = backend
        .upsert("nope", vec![point("a::0", "a", 0, vec![1.0])])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn wrong_point_dimension_is_rejected() {
    let backend = MemoryBackend::new();
    backend.ensure_collection("c", 2).await.unwrap();
    let err = backend
        .upsert("c", vec![point("a::0", "a", 0, vec![1.0, 2.0, 3.0])])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CollectionDimensionMismatch { .. }));
}

#[tokio::test]
async fn query_ranks_by_similarity_with_bounded_scores() {
    let backend = MemoryBackend::new();
    backend.ensure_collection("c", 2).await.unwrap();
    backend
        .upsert(
            "c",
            vec![
                point("same::0", "same", 0, vec![1.0, 0.0]),
                point("orth::0", "orth", 0, vec![0.0, 1.0]),
                point("anti::0", "anti", 0, vec![-1.0, 0.0]),
            ],
        )
        .await
        .unwrap();

    let hits = backend
        .query("c", &[1.0, 0.0], 10, &QueryFilter::none())
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].id, "same::0");
    assert_eq!(hits[1].id, "orth::0");
    assert_eq!(hits[2].id, "anti::0");
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert!((hits[1].score - 0.5).abs() < 1e-6);
    assert!(hits[2].score.abs() < 1e-6);
    for hit in &hits {
        assert!((0.0..=1.0).contains(&hit.score));
    }
}

#[tokio::test]
async fn query_respects_filters_and_top_k() {
    let backend = MemoryBackend::new();
    backend.ensure_collection("c", 2).await.unwrap();
    backend
        .upsert(
            "c",
            vec![
                point("a::0", "a", 0, vec![1.0, 0.0]),
                point("b::0", "b", 0, vec![0.9, 0.1]),
            ],
        )
        .await
        .unwrap();

    let hits = backend
        .query("c", &[1.0, 0.0], 10, &QueryFilter::excluding("a"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document_id, "b");

    let hits = backend
        .query("c", &[1.0, 0.0], 1, &QueryFilter::none())
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document_id, "a");
}

#[tokio::test]
async fn delete_by_document_removes_all_chunks() {
    let backend = MemoryBackend::new();
    backend.ensure_collection("c", 1).await.unwrap();
    backend
        .upsert(
            "c",
            vec![
                point("a::0", "a", 0, vec![1.0]),
                point("a::1", "a", 1, vec![0.5]),
                point("b::0", "b", 0, vec![0.2]),
            ],
        )
        .await
        .unwrap();
    backend.delete_by_document("c", "a").await.unwrap();
    let stats = backend.collection_stats("c").await.unwrap();
    assert_eq!(stats.chunk_count, 1);
    // Deleting from a missing collection is not an error.
    backend.delete_by_document("ghost", "a").await.unwrap();
}

#[tokio::test]
async fn query_on_missing_collection_is_empty() {
    let backend = MemoryBackend::new();
    let hits = backend
        .query("ghost", &[1.0], 5, &QueryFilter::none())
        .await
        .unwrap();
    assert!(hits.is_empty());
    assert_eq!(backend.health().await, HealthStatus::Healthy);
}
