use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kbase_core::config::EmbeddingConfig;
use kbase_core::{Error, Result};
use kbase_embed::{EmbeddingClient, EmbeddingProvider, HashProvider, ProviderBatch};

fn fast_config() -> EmbeddingConfig {
    EmbeddingConfig {
        dimension: 16,
        batch_size: 2,
        max_retries: 3,
        base_delay_ms: 1,
        ..EmbeddingConfig::default()
    }
}

/// Fails with a transient error the first `failures` calls, then succeeds.
struct FlakyProvider {
    inner: HashProvider,
    failures: AtomicU32,
    calls: AtomicU32,
}

impl FlakyProvider {
    fn new(dimension: usize, failures: u32) -> Self {
        Self {
            inner: HashProvider::new(dimension),
            failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyProvider {
    fn id(&self) -> &str {
        "test:flaky"
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn is_mock(&self) -> bool {
        true
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<ProviderBatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| f.checked_sub(1)).is_ok()
        {
            return Err(Error::Backend("simulated outage".into()));
        }
        self.inner.embed_batch(texts).await
    }
}

#[tokio::test]
async fn batching_preserves_input_order() {
    let config = fast_config();
    let client = EmbeddingClient::new(Arc::new(HashProvider::new(16)), &config);
    let texts: Vec<String> = (0..5).map(|i| format!("document number {i}")).collect();

    let batched = client.embed(&texts).await.unwrap();
    assert_eq!(batched.len(), 5);

    // One-at-a-time embedding must agree with the batched result.
    for (i, text) in texts.iter().enumerate() {
        let single = client.embed(std::slice::from_ref(text)).await.unwrap();
        assert_eq!(single[0], batched[i], "order broken at index {i}");
    }
}

#[tokio::test]
async fn empty_input_is_a_no_op() {
    let config = fast_config();
    let client = EmbeddingClient::new(Arc::new(HashProvider::new(16)), &config);
    let vectors = client.embed(&[]).await.unwrap();
    assert!(vectors.is_empty());
    assert_eq!(client.usage().requests, 0);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let config = fast_config();
    let provider = Arc::new(FlakyProvider::new(16, 2));
    let client = EmbeddingClient::new(provider.clone(), &config);

    let vectors = client.embed(&["hello".to_string()]).await.unwrap();
    assert_eq!(vectors.len(), 1);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausted_retries_surface_typed_error_with_counts() {
    let config = fast_config();
    let provider = Arc::new(FlakyProvider::new(16, u32::MAX));
    let client = EmbeddingClient::new(provider, &config);

    // First batch of two succeeds never; with batch_size 2 and four texts,
    // zero vectors complete before the failure.
    let texts: Vec<String> = (0..4).map(|i| format!("t{i}")).collect();
    let err = client.embed(&texts).await.unwrap_err();
    match err {
        Error::EmbeddingProviderFailed {
            attempts,
            completed,
            failed,
            ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(completed, 0);
            assert_eq!(failed, 4);
        }
        other => panic!("expected EmbeddingProviderFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn partial_completion_is_reported() {
    let config = fast_config();
    // Succeeds for the first batch (no initial failures), then the stub
    // starts failing permanently.
    struct FailAfterFirst {
        inner: HashProvider,
        calls: AtomicU32,
    }

    #[async_trait]
    impl EmbeddingProvider for FailAfterFirst {
        fn id(&self) -> &str {
            "test:fail-after-first"
        }
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
        fn is_mock(&self) -> bool {
            true
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<ProviderBatch> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.inner.embed_batch(texts).await
            } else {
                Err(Error::Backend("simulated outage".into()))
            }
        }
    }

    let client = EmbeddingClient::new(
        Arc::new(FailAfterFirst {
            inner: HashProvider::new(16),
            calls: AtomicU32::new(0),
        }),
        &config,
    );
    let texts: Vec<String> = (0..4).map(|i| format!("t{i}")).collect();
    let err = client.embed(&texts).await.unwrap_err();
    match err {
        Error::EmbeddingProviderFailed {
            completed, failed, ..
        } => {
            assert_eq!(completed, 2);
            assert_eq!(failed, 2);
        }
        other => panic!("expected EmbeddingProviderFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn usage_counters_accumulate() {
    let config = fast_config();
    let client = EmbeddingClient::new(Arc::new(HashProvider::new(16)), &config);
    client
        .embed(&["one two three".to_string(), "four five".to_string()])
        .await
        .unwrap();
    let usage = client.usage();
    assert_eq!(usage.requests, 1);
    assert_eq!(usage.input_tokens, 5);

    client.embed(&["six".to_string()]).await.unwrap();
    let usage = client.usage();
    assert_eq!(usage.requests, 2);
    assert_eq!(usage.input_tokens, 6);
}
