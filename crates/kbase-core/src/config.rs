//! Typed configuration, merged from `kbase.toml` and `KBASE_*` env vars.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub embedding: EmbeddingConfig,
    pub backend: BackendConfig,
    pub chunking: ChunkingConfig,
    pub search: SearchConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingMode {
    /// Remote HTTP provider (OpenAI-style wire shape).
    Http,
    /// Deterministic hash-derived pseudo-embeddings; no network.
    Offline,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub mode: EmbeddingMode,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            mode: EmbeddingMode::Offline,
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
            api_key: None,
            model: "text-embedding-3-small".to_string(),
            dimension: 1024,
            batch_size: 64,
            max_retries: 3,
            base_delay_ms: 500,
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// LanceDB data directory. Ignored when `in_memory` is set.
    pub data_dir: String,
    pub collection_prefix: String,
    /// Skip the persistent backend entirely and serve from memory.
    pub in_memory: bool,
    pub query_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data/lancedb".to_string(),
            collection_prefix: "kb_".to_string(),
            in_memory: false,
            query_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    /// Optional path to a HuggingFace `tokenizer.json`. Without it, token
    /// counts fall back to a whitespace approximation.
    pub tokenizer_file: Option<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            overlap_tokens: 50,
            tokenizer_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub semantic_weight: f32,
    pub keyword_weight: f32,
    /// Per-collection candidates are fetched as `top_k * overfetch_factor`
    /// so fusion and dedup never need a second query round.
    pub overfetch_factor: usize,
    pub snippet_radius: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.7,
            keyword_weight: 0.3,
            overfetch_factor: 3,
            snippet_radius: 160,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from `kbase.toml` in the working directory plus `KBASE_*` env
    /// vars (`KBASE_EMBEDDING__MODE=offline` style nesting).
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("kbase.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config: AppConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("KBASE_").split("__"))
            .extract()
            .map_err(|e| Error::Validation(format!("configuration error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(Error::Validation("embedding.dimension must be > 0".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::Validation("embedding.batch_size must be > 0".into()));
        }
        if self.chunking.max_tokens == 0 {
            return Err(Error::Validation("chunking.max_tokens must be > 0".into()));
        }
        if self.chunking.overlap_tokens >= self.chunking.max_tokens {
            return Err(Error::Validation(
                "chunking.overlap_tokens must be smaller than chunking.max_tokens".into(),
            ));
        }
        if self.search.overfetch_factor < 2 {
            return Err(Error::Validation("search.overfetch_factor must be >= 2".into()));
        }
        let w = self.search.semantic_weight + self.search.keyword_weight;
        if !(0.99..=1.01).contains(&w) {
            return Err(Error::Validation(format!(
                "search weights must sum to 1.0, got {w}"
            )));
        }
        Ok(())
    }
}
