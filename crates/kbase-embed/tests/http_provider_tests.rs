use httpmock::prelude::*;
use kbase_core::config::EmbeddingConfig;
use kbase_core::Error;
use kbase_embed::{EmbeddingProvider, HttpProvider};
use serde_json::json;

fn config_for(server: &MockServer) -> EmbeddingConfig {
    EmbeddingConfig {
        endpoint: server.url("/v1/embeddings"),
        api_key: Some("test-key".to_string()),
        model: "test-model".to_string(),
        dimension: 3,
        request_timeout_ms: 2_000,
        ..EmbeddingConfig::default()
    }
}

#[tokio::test]
async fn successful_batch_returns_vectors_and_usage() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/embeddings")
                .header("authorization", "Bearer test-key")
                .json_body_partial(r#"{"model": "test-model"}"#);
            then.status(200).json_body(json!({
                "data": [
                    {"embedding": [0.1, 0.2, 0.3], "index": 0},
                    {"embedding": [0.4, 0.5, 0.6], "index": 1}
                ],
                "usage": {"prompt_tokens": 7, "total_tokens": 7}
            }));
        })
        .await;

    let provider = HttpProvider::new(&config_for(&server)).unwrap();
    let batch = provider
        .embed_batch(&["alpha".to_string(), "beta".to_string()])
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(batch.vectors.len(), 2);
    assert_eq!(batch.vectors[1], vec![0.4, 0.5, 0.6]);
    assert_eq!(batch.total_tokens, 7);
    assert!(!provider.is_mock());
}

#[tokio::test]
async fn server_error_maps_to_transient_backend_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(500).body("upstream exploded");
        })
        .await;

    let provider = HttpProvider::new(&config_for(&server)).unwrap();
    let err = provider.embed_batch(&["alpha".to_string()]).await.unwrap_err();
    assert!(err.is_transient(), "http 500 should be retryable: {err:?}");
}

#[tokio::test]
async fn wrong_dimension_is_a_structural_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(200).json_body(json!({
                "data": [{"embedding": [0.1, 0.2], "index": 0}]
            }));
        })
        .await;

    let provider = HttpProvider::new(&config_for(&server)).unwrap();
    let err = provider.embed_batch(&["alpha".to_string()]).await.unwrap_err();
    match err {
        Error::Validation(msg) => assert!(msg.contains("dimension")),
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[tokio::test]
async fn count_mismatch_is_a_structural_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(200).json_body(json!({
                "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}]
            }));
        })
        .await;

    let provider = HttpProvider::new(&config_for(&server)).unwrap();
    let err = provider
        .embed_batch(&["alpha".to_string(), "beta".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}
