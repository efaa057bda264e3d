//! Batching, retrying embedding client with shared usage accounting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kbase_core::config::{EmbeddingConfig, EmbeddingMode};
use kbase_core::{Error, Result};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, warn};

use crate::http::HttpProvider;
use crate::mock::HashProvider;
use crate::provider::EmbeddingProvider;

/// Running token/cost counters, shared across clones and updated atomically.
#[derive(Default)]
pub struct EmbeddingUsage {
    requests: AtomicU64,
    input_tokens: AtomicU64,
}

impl EmbeddingUsage {
    fn record(&self, requests: u64, tokens: u64) {
        self.requests.fetch_add(requests, Ordering::Relaxed);
        self.input_tokens.fetch_add(tokens, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub requests: u64,
    pub input_tokens: u64,
}

#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    max_retries: u32,
    base_delay: Duration,
    usage: Arc<EmbeddingUsage>,
}

impl EmbeddingClient {
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let provider: Arc<dyn EmbeddingProvider> = match config.mode {
            EmbeddingMode::Offline => Arc::new(HashProvider::new(config.dimension)),
            EmbeddingMode::Http => Arc::new(HttpProvider::new(config)?),
        };
        Ok(Self::new(provider, config))
    }

    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self {
            provider,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            usage: Arc::new(EmbeddingUsage::default()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    pub fn is_mock(&self) -> bool {
        self.provider.is_mock()
    }

    pub fn provider_id(&self) -> &str {
        self.provider.id()
    }

    pub fn usage(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }

    /// Embed `texts`, one vector per input in input order. Larger inputs are
    /// split into provider-sized batches transparently; a batch that keeps
    /// failing after retries fails the whole call with completed/failed
    /// counts so the caller can retry the remainder deliberately.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut out: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let vectors = self.embed_batch_with_retry(batch, out.len(), texts.len()).await?;
            out.extend(vectors);
        }
        Ok(out)
    }

    async fn embed_batch_with_retry(
        &self,
        batch: &[String],
        completed: usize,
        total: usize,
    ) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.provider.embed_batch(batch).await {
                Ok(result) => {
                    if result.vectors.len() != batch.len() {
                        return Err(Error::EmbeddingProviderFailed {
                            attempts: attempt,
                            completed,
                            failed: total - completed,
                            message: format!(
                                "provider returned {} vectors for {} inputs",
                                result.vectors.len(),
                                batch.len()
                            ),
                        });
                    }
                    self.usage.record(1, result.total_tokens);
                    return Ok(result.vectors);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "embedding batch failed, retrying: {e}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    return Err(Error::EmbeddingProviderFailed {
                        attempts: attempt,
                        completed,
                        failed: total - completed,
                        message: e.to_string(),
                    });
                }
                // Structural faults (validation, dimension) are never retried.
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << (attempt - 1).min(8));
        let jitter = if base > 1 {
            rand::thread_rng().gen_range(0..base / 2)
        } else {
            0
        };
        debug!(attempt, backoff_ms = exp + jitter, "embedding retry backoff");
        Duration::from_millis(exp + jitter)
    }
}
