//! Multi-collection hybrid search: concurrent fan-out, linear score fusion,
//! deterministic ranking, per-document dedup and snippet assembly.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use kbase_core::config::SearchConfig;
use kbase_core::types::{
    CollectionFailure, SearchOutcome, SearchRequest, SearchResult, SourceType,
};
use kbase_core::{Error, Result};
use kbase_text::{keyword, snippet};
use kbase_vector::QueryFilter;
use tracing::{debug, warn};

use crate::registry::{ChunkPayload, CollectionRegistry};

pub struct HybridSearchEngine {
    registry: Arc<CollectionRegistry>,
    config: SearchConfig,
    query_timeout: Duration,
}

struct Candidate {
    source_type: SourceType,
    chunk_id: String,
    document_id: String,
    title: String,
    text: String,
    semantic_score: f32,
    keyword_score: f32,
    combined_score: f32,
}

impl HybridSearchEngine {
    pub fn new(
        registry: Arc<CollectionRegistry>,
        config: SearchConfig,
        query_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            config,
            query_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<CollectionRegistry> {
        &self.registry
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        let started = Instant::now();
        if request.query.trim().is_empty() {
            return Err(Error::Validation("query text must not be empty".into()));
        }
        if request.top_k == 0 {
            return Err(Error::Validation("top_k must be positive".into()));
        }
        if let Some(min_score) = request.min_score {
            if !(0.0..=1.0).contains(&min_score) {
                return Err(Error::Validation(format!(
                    "min_score must be within [0,1], got {min_score}"
                )));
            }
        }

        let targets = match &request.source_types {
            Some(explicit) if !explicit.is_empty() => dedup_types(explicit),
            _ => self.registry.populated_source_types().await?,
        };
        if targets.is_empty() {
            return Ok(empty_outcome(started));
        }

        // One embedding call serves every collection.
        let query_vector = self
            .registry
            .embedder()
            .embed(std::slice::from_ref(&request.query))
            .await?
            .remove(0);

        self.run_pipeline(
            &query_vector,
            Some(request.query.as_str()),
            &targets,
            request.top_k,
            request.min_score,
            request.hybrid_enabled,
            request.all_chunks,
            &QueryFilter::none(),
            started,
        )
        .await
    }

    /// Same fusion pipeline seeded with the target document's stored vector;
    /// no embedding call is made. The seed document itself is excluded.
    pub async fn find_similar(&self, document_id: &str, top_k: usize) -> Result<SearchOutcome> {
        let started = Instant::now();
        if top_k == 0 {
            return Err(Error::Validation("top_k must be positive".into()));
        }
        let (_, seed_vector) = self.registry.stored_vector(document_id).await?;
        let targets = self.registry.populated_source_types().await?;
        if targets.is_empty() {
            return Ok(empty_outcome(started));
        }
        self.run_pipeline(
            &seed_vector,
            None,
            &targets,
            top_k,
            None,
            false,
            false,
            &QueryFilter::excluding(document_id),
            started,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_pipeline(
        &self,
        query_vector: &[f32],
        query_text: Option<&str>,
        targets: &[SourceType],
        top_k: usize,
        min_score: Option<f32>,
        hybrid_enabled: bool,
        all_chunks: bool,
        filter: &QueryFilter,
        started: Instant,
    ) -> Result<SearchOutcome> {
        let fetch = top_k.saturating_mul(self.config.overfetch_factor.max(2));
        let queries = targets.iter().map(|&source_type| {
            let collection = self.registry.collection_name(source_type);
            async move {
                let outcome = tokio::time::timeout(
                    self.query_timeout,
                    self.registry
                        .backend()
                        .query(&collection, query_vector, fetch, filter),
                )
                .await;
                (source_type, outcome)
            }
        });
        let outcomes = join_all(queries).await;

        let terms = query_text.map(keyword::query_terms).unwrap_or_default();
        let mut errored: Vec<CollectionFailure> = Vec::new();
        let mut searched: Vec<SourceType> = Vec::new();
        let mut candidates: Vec<Candidate> = Vec::new();
        for (source_type, outcome) in outcomes {
            let hits = match outcome {
                Err(_) => {
                    warn!(%source_type, "collection query timed out");
                    errored.push(CollectionFailure {
                        source_type,
                        error: "query timed out".to_string(),
                    });
                    continue;
                }
                Ok(Err(e)) => {
                    warn!(%source_type, "collection query failed: {e}");
                    errored.push(CollectionFailure {
                        source_type,
                        error: e.to_string(),
                    });
                    continue;
                }
                Ok(Ok(hits)) => hits,
            };
            searched.push(source_type);
            for hit in hits {
                let Ok(payload) = serde_json::from_value::<ChunkPayload>(hit.payload) else {
                    warn!(chunk_id = %hit.id, "skipping chunk with malformed payload");
                    continue;
                };
                let semantic_score = hit.score.clamp(0.0, 1.0);
                let keyword_score = if hybrid_enabled {
                    keyword::overlap_score(&terms, &payload.text)
                } else {
                    0.0
                };
                let combined_score = if hybrid_enabled {
                    self.config.semantic_weight * semantic_score
                        + self.config.keyword_weight * keyword_score
                } else {
                    semantic_score
                };
                candidates.push(Candidate {
                    source_type,
                    chunk_id: hit.id,
                    document_id: hit.document_id,
                    title: payload.title,
                    text: payload.text,
                    semantic_score,
                    keyword_score,
                    combined_score,
                });
            }
        }

        if searched.is_empty() {
            return Err(Error::SearchUnavailable {
                attempted: targets.len(),
            });
        }

        // Deterministic global order: combined desc, semantic desc, then
        // document and chunk ids ascending.
        candidates.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.semantic_score
                        .partial_cmp(&a.semantic_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.document_id.cmp(&b.document_id))
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });

        let floor = min_score.unwrap_or(0.0);
        let mut seen_documents: HashSet<String> = HashSet::new();
        let survivors: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| c.combined_score >= floor)
            .filter(|c| all_chunks || seen_documents.insert(c.document_id.clone()))
            .collect();

        let total_results = survivors.len();
        let phrase = query_text.unwrap_or("");
        let results: Vec<SearchResult> = survivors
            .into_iter()
            .take(top_k)
            .enumerate()
            .map(|(i, c)| SearchResult {
                snippet: snippet::build_snippet(&c.text, phrase, &terms, self.config.snippet_radius),
                chunk_id: c.chunk_id,
                document_id: c.document_id,
                title: c.title,
                source_type: c.source_type,
                semantic_score: c.semantic_score,
                keyword_score: c.keyword_score,
                combined_score: c.combined_score,
                rank: i + 1,
            })
            .collect();

        debug!(
            total_results,
            returned = results.len(),
            errored = errored.len(),
            "search completed"
        );
        Ok(SearchOutcome {
            results,
            total_results,
            collections_searched: searched,
            collections_errored: errored,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn dedup_types(types: &[SourceType]) -> Vec<SourceType> {
    let mut seen = HashSet::new();
    types
        .iter()
        .copied()
        .filter(|st| seen.insert(*st))
        .collect()
}

fn empty_outcome(started: Instant) -> SearchOutcome {
    SearchOutcome {
        results: Vec::new(),
        total_results: 0,
        collections_searched: Vec::new(),
        collections_errored: Vec::new(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}
