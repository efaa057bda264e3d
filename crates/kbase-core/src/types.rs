//! Domain types shared by the chunking, embedding, storage and search layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

pub type ChunkId = String;

/// Logical document category. Each source type maps to exactly one physical
/// vector collection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    WikiPage,
    Ticket,
    RepositoryFile,
    UploadedFile,
    Generic,
}

impl SourceType {
    pub const ALL: [SourceType; 5] = [
        SourceType::WikiPage,
        SourceType::Ticket,
        SourceType::RepositoryFile,
        SourceType::UploadedFile,
        SourceType::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::WikiPage => "wiki-page",
            SourceType::Ticket => "ticket",
            SourceType::RepositoryFile => "repository-file",
            SourceType::UploadedFile => "uploaded-file",
            SourceType::Generic => "generic",
        }
    }

    /// Physical collection name for this source type.
    pub fn collection_name(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.as_str().replace('-', "_"))
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bounded text segment of a document, the unit of embedding and storage.
///
/// Chunk ids are stable: `{document_id}::{ordinal}`. Ordinals are dense,
/// 0-based and strictly less than `total_chunks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: String,
    pub ordinal: usize,
    pub total_chunks: usize,
    pub text: String,
    pub token_count: usize,
}

impl Chunk {
    pub fn make_id(document_id: &str, ordinal: usize) -> ChunkId {
        format!("{document_id}::{ordinal}")
    }

    /// Recover the document id from a chunk id. Returns `None` for ids that
    /// were not produced by [`Chunk::make_id`].
    pub fn document_id_of(chunk_id: &str) -> Option<&str> {
        chunk_id.rsplit_once("::").map(|(doc, _)| doc)
    }
}

/// Descriptive attributes attached to a document at indexing time. Owned by
/// the collection registry and referenced, never duplicated, by chunks.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

/// One ranked hit of a search call. Ephemeral; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: ChunkId,
    pub document_id: String,
    pub title: String,
    pub snippet: String,
    pub source_type: SourceType,
    pub semantic_score: f32,
    pub keyword_score: f32,
    pub combined_score: f32,
    pub rank: usize,
}

/// Parameters of one search call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub source_types: Option<Vec<SourceType>>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_score: Option<f32>,
    #[serde(default = "default_true")]
    pub hybrid_enabled: bool,
    /// When true, every matching chunk is returned instead of the best chunk
    /// per document.
    #[serde(default)]
    pub all_chunks: bool,
}

fn default_top_k() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            source_types: None,
            top_k: default_top_k(),
            min_score: None,
            hybrid_enabled: true,
            all_chunks: false,
        }
    }
}

/// A per-collection failure recorded during a fan-out search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionFailure {
    pub source_type: SourceType,
    pub error: String,
}

/// The complete outcome of one search call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub total_results: usize,
    pub collections_searched: Vec<SourceType>,
    pub collections_errored: Vec<CollectionFailure>,
    pub elapsed_ms: u64,
}

/// Durable facts reported per collection.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CollectionStatus {
    pub exists: bool,
    pub chunk_count: usize,
    pub vector_dim: Option<usize>,
}

/// Backend health as observed through the adapter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unavailable,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}
