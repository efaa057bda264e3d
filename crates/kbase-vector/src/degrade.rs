//! Fallback wrapper: primary backend with a transparent switch to the
//! in-memory implementation when the primary becomes unavailable.
//!
//! The switch is an observable state transition, not a hidden branch:
//! `health()` reports `Degraded` and the transition is logged exactly once.
//! Data already in the primary is not migrated; the fallback starts empty
//! and lives only for the remainder of the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kbase_core::config::BackendConfig;
use kbase_core::types::{CollectionStatus, HealthStatus};
use kbase_core::{Error, Result};
use tracing::warn;

use crate::backend::{PointRecord, QueryFilter, ScoredPoint, VectorBackend};
use crate::lance::LanceBackend;
use crate::memory::MemoryBackend;

pub struct DegradingBackend {
    primary: Option<Arc<dyn VectorBackend>>,
    fallback: MemoryBackend,
    degraded: AtomicBool,
}

impl DegradingBackend {
    pub fn new(primary: Arc<dyn VectorBackend>) -> Self {
        Self {
            primary: Some(primary),
            fallback: MemoryBackend::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// Explicitly configured in-memory mode. Healthy, not degraded: nothing
    /// was lost, the operator asked for it.
    pub fn memory_only() -> Self {
        Self {
            primary: None,
            fallback: MemoryBackend::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// Build from config: LanceDB at `data_dir`, or memory when requested.
    /// A primary that is already unreachable at startup degrades immediately.
    pub async fn from_config(config: &BackendConfig) -> Self {
        if config.in_memory {
            return Self::memory_only();
        }
        match LanceBackend::connect(&config.data_dir).await {
            Ok(backend) => Self::new(Arc::new(backend)),
            Err(e) => {
                let this = Self::memory_only();
                this.degraded.store(true, Ordering::SeqCst);
                warn!("vector backend unavailable at startup, serving from memory: {e}");
                this
            }
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    fn active_primary(&self) -> Option<&Arc<dyn VectorBackend>> {
        if self.is_degraded() {
            None
        } else {
            self.primary.as_ref()
        }
    }

    fn note_degraded(&self, reason: &str) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            warn!("vector backend unavailable, falling back to in-memory store for the rest of the session: {reason}");
        }
    }
}

/// Run `$call` against the primary; on unavailability, degrade and replay
/// the same call against the in-memory fallback.
macro_rules! with_fallback {
    ($self:ident, $backend:ident => $call:expr) => {{
        if let Some(primary) = $self.active_primary() {
            let $backend = primary.as_ref();
            match $call {
                Err(Error::BackendUnavailable(reason)) => $self.note_degraded(&reason),
                other => return other,
            }
        }
        let $backend = &$self.fallback;
        $call
    }};
}

#[async_trait]
impl VectorBackend for DegradingBackend {
    async fn ensure_collection(&self, name: &str, vector_dim: usize) -> Result<()> {
        with_fallback!(self, backend => backend.ensure_collection(name, vector_dim).await)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        with_fallback!(self, backend => backend.delete_collection(name).await)
    }

    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<()> {
        with_fallback!(self, backend => backend.upsert(collection, points.clone()).await)
    }

    async fn delete_by_document(&self, collection: &str, document_id: &str) -> Result<()> {
        with_fallback!(self, backend => backend.delete_by_document(collection, document_id).await)
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<ScoredPoint>> {
        with_fallback!(self, backend => backend.query(collection, vector, top_k, filter).await)
    }

    async fn fetch_points(&self, collection: &str, ids: &[String]) -> Result<Vec<PointRecord>> {
        with_fallback!(self, backend => backend.fetch_points(collection, ids).await)
    }

    async fn collection_stats(&self, name: &str) -> Result<CollectionStatus> {
        with_fallback!(self, backend => backend.collection_stats(name).await)
    }

    async fn health(&self) -> HealthStatus {
        if self.is_degraded() {
            return HealthStatus::Degraded;
        }
        match &self.primary {
            None => self.fallback.health().await,
            Some(primary) => {
                let status = primary.health().await;
                if status == HealthStatus::Unavailable {
                    // A probe is as good as a failed call.
                    self.note_degraded("health probe failed");
                    HealthStatus::Degraded
                } else {
                    status
                }
            }
        }
    }
}
