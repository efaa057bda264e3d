//! HTTP surface of the retrieval engine. Thin: validation and status-code
//! mapping live here, everything else is delegated to the registry and the
//! hybrid search engine.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use kbase_core::config::AppConfig;
use kbase_core::types::{DocumentMetadata, SearchOutcome, SearchRequest, SourceType};
use kbase_core::{Error, Result};
use kbase_embed::{EmbeddingClient, UsageSnapshot};
use kbase_hybrid::{CollectionRegistry, HybridSearchEngine};
use kbase_vector::{DegradingBackend, VectorBackend};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<HybridSearchEngine>,
    pub registry: Arc<CollectionRegistry>,
    pub backend: Arc<DegradingBackend>,
}

/// Composition root: one embedding client and one backend per process,
/// injected into the registry and engine explicitly.
pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let backend = Arc::new(DegradingBackend::from_config(&config.backend).await);
    let embedder = EmbeddingClient::from_config(&config.embedding)?;
    let registry = Arc::new(CollectionRegistry::new(
        backend.clone() as Arc<dyn VectorBackend>,
        embedder,
        config.chunking.clone(),
        config.backend.collection_prefix.clone(),
    ));
    let engine = Arc::new(HybridSearchEngine::new(
        registry.clone(),
        config.search.clone(),
        Duration::from_millis(config.backend.query_timeout_ms),
    ));
    Ok(AppState {
        engine,
        registry,
        backend,
    })
}

pub fn build_app(state: AppState) -> Router {
    // CORS: CORS_ALLOW_ORIGIN (comma-separated) or allow any by default.
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/index", post(index_document).delete(delete_document))
        .route("/search", post(search))
        .route("/similar/:document_id", get(similar))
        .route("/collections", get(collections))
        .route("/health", get(health))
        .route("/usage", get(usage))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn into_api_error(e: Error) -> ApiError {
    let status = match &e {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::CollectionDimensionMismatch { .. } => StatusCode::CONFLICT,
        // Distinguishable from an empty result set: the engine is
        // temporarily unable to answer at all.
        Error::SearchUnavailable { .. } | Error::BackendUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        Error::EmbeddingProviderFailed { .. } => StatusCode::BAD_GATEWAY,
        Error::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() })))
}

#[derive(Deserialize)]
pub struct IndexRequest {
    pub source_type: SourceType,
    pub document_id: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    pub text: String,
}

#[derive(Serialize)]
pub struct IndexResponse {
    pub chunks_indexed: usize,
}

#[derive(Deserialize)]
pub struct DeleteRequest {
    pub source_type: SourceType,
    pub document_id: String,
}

#[derive(Deserialize)]
pub struct SimilarParams {
    #[serde(default = "default_similar_top_k")]
    pub top_k: usize,
}

fn default_similar_top_k() -> usize {
    10
}

async fn index_document(
    State(state): State<AppState>,
    Json(req): Json<IndexRequest>,
) -> std::result::Result<Json<IndexResponse>, ApiError> {
    let chunks_indexed = state
        .registry
        .index_document(req.source_type, &req.document_id, req.metadata, &req.text)
        .await
        .map_err(into_api_error)?;
    Ok(Json(IndexResponse { chunks_indexed }))
}

async fn delete_document(
    State(state): State<AppState>,
    Json(req): Json<DeleteRequest>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    state
        .registry
        .remove_document(req.source_type, &req.document_id)
        .await
        .map_err(into_api_error)?;
    Ok(Json(json!({ "ok": true })))
}

async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> std::result::Result<Json<SearchOutcome>, ApiError> {
    let outcome = state.engine.search(&req).await.map_err(into_api_error)?;
    Ok(Json(outcome))
}

async fn similar(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Query(params): Query<SimilarParams>,
) -> std::result::Result<Json<SearchOutcome>, ApiError> {
    let outcome = state
        .engine
        .find_similar(&document_id, params.top_k)
        .await
        .map_err(into_api_error)?;
    Ok(Json(outcome))
}

async fn collections(
    State(state): State<AppState>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let listing = state
        .registry
        .list_collections()
        .await
        .map_err(into_api_error)?;
    let body: serde_json::Map<String, serde_json::Value> = listing
        .into_iter()
        .map(|(source_type, status)| {
            (source_type.to_string(), json!(status))
        })
        .collect();
    Ok(Json(serde_json::Value::Object(body)))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = state.backend.health().await;
    Json(json!({ "status": status }))
}

async fn usage(State(state): State<AppState>) -> Json<UsageSnapshot> {
    Json(state.registry.embedder().usage())
}
