//! End-to-end flow against an embedded LanceDB store in a temp directory.

use kbase_core::Error;
use kbase_vector::{LanceBackend, PointRecord, QueryFilter, VectorBackend};
use serde_json::json;

fn point(id: &str, document_id: &str, ordinal: usize, vector: Vec<f32>) -> PointRecord {
    PointRecord {
        id: id.to_string(),
        document_id: document_id.to_string(),
        ordinal,
        total_chunks: 2,
        vector,
        payload: json!({"text": format!("payload for {id}")}),
    }
}

#[tokio::test]
async fn lance_round_trip() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let backend = LanceBackend::connect(&tmp.path().to_string_lossy()).await?;

    backend.ensure_collection("docs", 4).await?;
    backend.ensure_collection("docs", 4).await?; // idempotent

    let err = backend.ensure_collection("docs", 8).await.unwrap_err();
    assert!(matches!(err, Error::CollectionDimensionMismatch { .. }));

    backend
        .upsert(
            "docs",
            vec![
                point("a::0", "a", 0, vec![1.0, 0.0, 0.0, 0.0]),
                point("a::1", "a", 1, vec![0.9, 0.1, 0.0, 0.0]),
                point("b::0", "b", 0, vec![0.0, 1.0, 0.0, 0.0]),
            ],
        )
        .await?;

    let stats = backend.collection_stats("docs").await?;
    assert!(stats.exists);
    assert_eq!(stats.chunk_count, 3);
    assert_eq!(stats.vector_dim, Some(4));

    // Re-upserting the same id replaces instead of duplicating.
    backend
        .upsert("docs", vec![point("a::0", "a", 0, vec![0.8, 0.2, 0.0, 0.0])])
        .await?;
    assert_eq!(backend.collection_stats("docs").await?.chunk_count, 3);

    let hits = backend
        .query("docs", &[1.0, 0.0, 0.0, 0.0], 10, &QueryFilter::none())
        .await?;
    assert_eq!(hits.len(), 3);
    for hit in &hits {
        assert!((0.0..=1.0).contains(&hit.score), "score out of range");
    }
    assert_eq!(hits[0].document_id, "a");

    let filtered = backend
        .query(
            "docs",
            &[1.0, 0.0, 0.0, 0.0],
            10,
            &QueryFilter::excluding("a"),
        )
        .await?;
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].document_id, "b");

    let fetched = backend.fetch_points("docs", &["a::1".to_string()]).await?;
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].ordinal, 1);
    assert_eq!(fetched[0].vector.len(), 4);

    backend.delete_by_document("docs", "a").await?;
    assert_eq!(backend.collection_stats("docs").await?.chunk_count, 1);

    backend.delete_collection("docs").await?;
    assert!(!backend.collection_stats("docs").await?.exists);
    Ok(())
}

#[tokio::test]
async fn missing_collection_behaviors() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let backend = LanceBackend::connect(&tmp.path().to_string_lossy()).await?;

    let hits = backend
        .query("ghost", &[1.0], 5, &QueryFilter::none())
        .await?;
    assert!(hits.is_empty());
    backend.delete_by_document("ghost", "a").await?;
    backend.delete_collection("ghost").await?;
    assert!(!backend.collection_stats("ghost").await?.exists);
    Ok(())
}
