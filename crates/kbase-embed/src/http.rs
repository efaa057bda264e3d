//! HTTP embedding provider speaking the OpenAI-style embeddings wire shape:
//! `{model, input[]}` in, `{data[].embedding, usage.total_tokens}` out.

use async_trait::async_trait;
use kbase_core::config::EmbeddingConfig;
use kbase_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::provider::{EmbeddingProvider, ProviderBatch};

pub struct HttpProvider {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    id: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

impl HttpProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| Error::Backend(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
            id: format!("http:{}:d{}", config.model, config.dimension),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn is_mock(&self) -> bool {
        false
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<ProviderBatch> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut builder = self.http_client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| Error::Backend(format!("embedding request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Backend(format!(
                "embedding API error ({status}): {body}"
            )));
        }

        let response: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| Error::Backend(format!("malformed embedding response: {e}")))?;

        if response.data.len() != texts.len() {
            return Err(Error::Validation(format!(
                "provider returned {} embeddings for {} inputs",
                response.data.len(),
                texts.len()
            )));
        }
        for data in &response.data {
            if data.embedding.len() != self.dimension {
                return Err(Error::Validation(format!(
                    "provider returned dimension {}, expected {}",
                    data.embedding.len(),
                    self.dimension
                )));
            }
        }

        let total_tokens = response.usage.map_or(0, |u| u.total_tokens);
        Ok(ProviderBatch {
            vectors: response.data.into_iter().map(|d| d.embedding).collect(),
            total_tokens,
        })
    }
}
