//! Deterministic offline embeddings derived from token hashes.
//!
//! Same text always produces the same vector, which keeps development and
//! tests reproducible without a live provider. Vectors are L2-normalized so
//! cosine scoring behaves the same as with real embeddings.

use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use kbase_core::Result;
use twox_hash::XxHash64;

use crate::provider::{EmbeddingProvider, ProviderBatch};

pub struct HashProvider {
    dimension: usize,
    id: String,
}

impl HashProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            id: format!("offline:hash:d{dimension}"),
            dimension,
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dimension];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dimension;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn is_mock(&self) -> bool {
        true
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<ProviderBatch> {
        let mut total_tokens = 0u64;
        let vectors = texts
            .iter()
            .map(|t| {
                total_tokens += t.split_whitespace().count() as u64;
                self.embed_one(t)
            })
            .collect();
        Ok(ProviderBatch {
            vectors,
            total_tokens,
        })
    }
}
