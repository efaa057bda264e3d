//! Maps logical source types to physical vector collections and owns
//! chunk-to-document metadata.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};
use std::sync::Arc;

use kbase_core::config::ChunkingConfig;
use kbase_core::types::{
    Chunk, ChunkId, CollectionStatus, DocumentMetadata, SourceType,
};
use kbase_core::{Error, Result};
use kbase_embed::EmbeddingClient;
use kbase_text::{chunk_text, TokenCounter};
use kbase_vector::{PointRecord, VectorBackend};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Stored alongside each vector so search results can be assembled without
/// a second metadata lookup.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ChunkPayload {
    pub text: String,
    pub title: String,
    pub source_type: SourceType,
    pub token_count: usize,
    pub metadata: DocumentMetadata,
}

struct DocumentRecord {
    source_type: SourceType,
    metadata: DocumentMetadata,
    chunk_count: usize,
}

#[derive(Clone, Copy)]
struct CollectionSeen {
    vector_dim: usize,
    mock_vectors: bool,
}

pub struct CollectionRegistry {
    backend: Arc<dyn VectorBackend>,
    embedder: EmbeddingClient,
    counter: TokenCounter,
    chunking: ChunkingConfig,
    prefix: String,
    documents: RwLock<HashMap<String, DocumentRecord>>,
    collections: RwLock<HashMap<SourceType, CollectionSeen>>,
    // Per-document writer locks; concurrent re-index of the same document
    // must serialize to keep replacement atomic.
    doc_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CollectionRegistry {
    pub fn new(
        backend: Arc<dyn VectorBackend>,
        embedder: EmbeddingClient,
        chunking: ChunkingConfig,
        collection_prefix: impl Into<String>,
    ) -> Self {
        let counter = TokenCounter::from_config(chunking.tokenizer_file.as_deref());
        Self {
            backend,
            embedder,
            counter,
            chunking,
            prefix: collection_prefix.into(),
            documents: RwLock::new(HashMap::new()),
            collections: RwLock::new(HashMap::new()),
            doc_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn VectorBackend> {
        &self.backend
    }

    pub fn embedder(&self) -> &EmbeddingClient {
        &self.embedder
    }

    pub fn collection_name(&self, source_type: SourceType) -> String {
        source_type.collection_name(&self.prefix)
    }

    /// Chunk, embed and store one document. Re-indexing an existing
    /// `document_id` replaces its chunks: the old version stays visible
    /// until embedding has succeeded, and a failed write leaves the
    /// document with zero chunks rather than a mix of old and new.
    pub async fn index_document(
        &self,
        source_type: SourceType,
        document_id: &str,
        metadata: DocumentMetadata,
        text: &str,
    ) -> Result<usize> {
        if document_id.trim().is_empty() {
            return Err(Error::Validation("document_id must not be empty".into()));
        }
        let lock = self.lock_for(document_id);
        let _guard = lock.lock().await;

        let collection = self.collection_name(source_type);
        let chunks = chunk_text(
            document_id,
            text,
            self.chunking.max_tokens,
            self.chunking.overlap_tokens,
            &self.counter,
        );
        if chunks.is_empty() {
            // Empty text clears any previous version of the document.
            self.backend
                .delete_by_document(&collection, document_id)
                .await?;
            self.documents
                .write()
                .expect("lock poisoned")
                .remove(document_id);
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        // An embedding failure must leave the previous chunks untouched.
        let vectors = self.embedder.embed(&texts).await?;

        self.ensure_collection(source_type).await?;
        self.backend
            .delete_by_document(&collection, document_id)
            .await?;

        let points = self.build_points(&chunks, vectors, source_type, &metadata)?;
        if let Err(e) = self.backend.upsert(&collection, points).await {
            // Old chunks are gone already; guarantee "zero chunks" over a
            // partial mix before surfacing the failure.
            let _ = self
                .backend
                .delete_by_document(&collection, document_id)
                .await;
            self.documents
                .write()
                .expect("lock poisoned")
                .remove(document_id);
            return Err(e);
        }

        let chunk_count = chunks.len();
        self.documents.write().expect("lock poisoned").insert(
            document_id.to_string(),
            DocumentRecord {
                source_type,
                metadata,
                chunk_count,
            },
        );
        info!(document_id, collection, chunk_count, "document indexed");
        Ok(chunk_count)
    }

    pub async fn remove_document(&self, source_type: SourceType, document_id: &str) -> Result<()> {
        let lock = self.lock_for(document_id);
        let _guard = lock.lock().await;
        let collection = self.collection_name(source_type);
        self.backend
            .delete_by_document(&collection, document_id)
            .await?;
        self.documents
            .write()
            .expect("lock poisoned")
            .remove(document_id);
        debug!(document_id, collection, "document removed");
        Ok(())
    }

    /// Explicit collection initialization. Collections are otherwise created
    /// lazily on the first index request; this call makes them exist up
    /// front with the embedder's dimension.
    pub async fn init_collection(&self, source_type: SourceType) -> Result<()> {
        self.ensure_collection(source_type).await
    }

    /// Explicit administrative teardown of one source type's collection.
    pub async fn drop_collection(&self, source_type: SourceType) -> Result<()> {
        let collection = self.collection_name(source_type);
        self.backend.delete_collection(&collection).await?;
        self.collections
            .write()
            .expect("lock poisoned")
            .remove(&source_type);
        self.documents
            .write()
            .expect("lock poisoned")
            .retain(|_, record| record.source_type != source_type);
        Ok(())
    }

    pub async fn list_collections(&self) -> Result<BTreeMap<SourceType, CollectionStatus>> {
        let mut out = BTreeMap::new();
        for source_type in SourceType::ALL {
            let stats = self
                .backend
                .collection_stats(&self.collection_name(source_type))
                .await?;
            out.insert(source_type, stats);
        }
        Ok(out)
    }

    /// Source types that currently hold data; the default search targets.
    pub async fn populated_source_types(&self) -> Result<Vec<SourceType>> {
        let mut out = Vec::new();
        for source_type in SourceType::ALL {
            let stats = self
                .backend
                .collection_stats(&self.collection_name(source_type))
                .await?;
            if stats.exists && stats.chunk_count > 0 {
                out.push(source_type);
            }
        }
        Ok(out)
    }

    /// Resolve chunk ids to their documents' metadata for result assembly.
    /// Chunks indexed by an earlier process resolve through their stored
    /// payload.
    pub async fn resolve_metadata(
        &self,
        chunk_ids: &[ChunkId],
    ) -> Result<HashMap<ChunkId, DocumentMetadata>> {
        let mut out = HashMap::new();
        let mut missing: Vec<ChunkId> = Vec::new();
        {
            let documents = self.documents.read().expect("lock poisoned");
            for chunk_id in chunk_ids {
                let record = Chunk::document_id_of(chunk_id).and_then(|doc| documents.get(doc));
                match record {
                    Some(record) => {
                        out.insert(chunk_id.clone(), record.metadata.clone());
                    }
                    None => missing.push(chunk_id.clone()),
                }
            }
        }
        if missing.is_empty() {
            return Ok(out);
        }
        for source_type in SourceType::ALL {
            if missing.is_empty() {
                break;
            }
            let points = self
                .backend
                .fetch_points(&self.collection_name(source_type), &missing)
                .await?;
            for point in points {
                if let Ok(payload) = serde_json::from_value::<ChunkPayload>(point.payload) {
                    missing.retain(|id| id != &point.id);
                    out.insert(point.id, payload.metadata);
                }
            }
        }
        Ok(out)
    }

    /// The stored vector that represents a document: its first chunk.
    /// Used by similarity search to skip the embedding step.
    pub async fn stored_vector(&self, document_id: &str) -> Result<(SourceType, Vec<f32>)> {
        let seed_id = Chunk::make_id(document_id, 0);
        let known_type = self
            .documents
            .read()
            .expect("lock poisoned")
            .get(document_id)
            .map(|r| r.source_type);
        let candidates: Vec<SourceType> = match known_type {
            Some(st) => vec![st],
            None => SourceType::ALL.to_vec(),
        };
        for source_type in candidates {
            let points = self
                .backend
                .fetch_points(
                    &self.collection_name(source_type),
                    std::slice::from_ref(&seed_id),
                )
                .await?;
            if let Some(point) = points.into_iter().next() {
                return Ok((source_type, point.vector));
            }
        }
        Err(Error::NotFound(format!("document '{document_id}'")))
    }

    async fn ensure_collection(&self, source_type: SourceType) -> Result<()> {
        let collection = self.collection_name(source_type);
        let dim = self.embedder.dimension();
        let mock = self.embedder.is_mock();
        {
            let mut seen = self.collections.write().expect("lock poisoned");
            match seen.get(&source_type) {
                Some(prev) if prev.vector_dim != dim => {
                    return Err(Error::CollectionDimensionMismatch {
                        collection,
                        expected: prev.vector_dim,
                        actual: dim,
                    });
                }
                Some(prev) if prev.mock_vectors != mock => {
                    return Err(Error::Validation(format!(
                        "collection '{collection}' holds {} vectors; refusing to mix in {} ones",
                        if prev.mock_vectors { "mock" } else { "real" },
                        if mock { "mock" } else { "real" },
                    )));
                }
                _ => {
                    seen.insert(
                        source_type,
                        CollectionSeen {
                            vector_dim: dim,
                            mock_vectors: mock,
                        },
                    );
                }
            }
        }
        // Always forwarded: creation is idempotent and the backend may have
        // been swapped for the in-memory fallback since the last call.
        self.backend.ensure_collection(&collection, dim).await
    }

    fn build_points(
        &self,
        chunks: &[Chunk],
        vectors: Vec<Vec<f32>>,
        source_type: SourceType,
        metadata: &DocumentMetadata,
    ) -> Result<Vec<PointRecord>> {
        chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                let payload = serde_json::to_value(ChunkPayload {
                    text: chunk.text.clone(),
                    title: metadata.title.clone(),
                    source_type,
                    token_count: chunk.token_count,
                    metadata: metadata.clone(),
                })
                .map_err(|e| Error::Backend(format!("payload serialization failed: {e}")))?;
                Ok(PointRecord {
                    id: chunk.id.clone(),
                    document_id: chunk.document_id.clone(),
                    ordinal: chunk.ordinal,
                    total_chunks: chunk.total_chunks,
                    vector,
                    payload,
                })
            })
            .collect()
    }

    fn lock_for(&self, document_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.doc_locks.lock().expect("lock poisoned");
        locks
            .entry(document_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
