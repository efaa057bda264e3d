//! Embedded LanceDB backend: one table per collection.

use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{
    Array, FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{ArrowError, DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use kbase_core::types::{CollectionStatus, HealthStatus};
use kbase_core::{Error, Result};
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};

use crate::backend::{similarity_to_score, PointRecord, QueryFilter, ScoredPoint, VectorBackend};

pub struct LanceBackend {
    conn: Connection,
}

impl LanceBackend {
    pub async fn connect(uri: &str) -> Result<Self> {
        let conn = connect(uri).execute().await.map_err(unavailable)?;
        Ok(Self { conn })
    }

    fn schema_for(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("document_id", DataType::Utf8, false),
            Field::new("ordinal", DataType::Int32, false),
            Field::new("total_chunks", DataType::Int32, false),
            Field::new("payload", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    vector_dim as i32,
                ),
                true,
            ),
        ]))
    }

    async fn open(&self, name: &str) -> Result<Option<Table>> {
        match self.conn.open_table(name).execute().await {
            Ok(table) => Ok(Some(table)),
            Err(lancedb::Error::TableNotFound { .. }) => Ok(None),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn table_dim(&self, table: &Table) -> Result<Option<usize>> {
        let schema = table.schema().await.map_err(unavailable)?;
        Ok(schema.fields().iter().find_map(|f| {
            if f.name() == "vector" {
                match f.data_type() {
                    DataType::FixedSizeList(_, dim) => Some(*dim as usize),
                    _ => None,
                }
            } else {
                None
            }
        }))
    }

    fn points_to_batch(points: &[PointRecord], vector_dim: usize) -> Result<RecordBatch> {
        let mut ids = Vec::with_capacity(points.len());
        let mut document_ids = Vec::with_capacity(points.len());
        let mut ordinals = Vec::with_capacity(points.len());
        let mut totals = Vec::with_capacity(points.len());
        let mut payloads = Vec::with_capacity(points.len());
        let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(points.len());
        for point in points {
            ids.push(point.id.clone());
            document_ids.push(point.document_id.clone());
            ordinals.push(point.ordinal as i32);
            totals.push(point.total_chunks as i32);
            payloads.push(point.payload.to_string());
            vectors.push(Some(point.vector.iter().map(|&x| Some(x)).collect()));
        }
        RecordBatch::try_new(
            Self::schema_for(vector_dim),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(document_ids)),
                Arc::new(Int32Array::from(ordinals)),
                Arc::new(Int32Array::from(totals)),
                Arc::new(StringArray::from(payloads)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
                    vectors.into_iter(),
                    vector_dim as i32,
                )),
            ],
        )
        .map_err(|e| Error::Backend(format!("record batch construction failed: {e}")))
    }

    fn decode_points(batch: &RecordBatch) -> Result<Vec<PointRecord>> {
        let ids = string_col(batch, "id")?;
        let document_ids = string_col(batch, "document_id")?;
        let ordinals = i32_col(batch, "ordinal")?;
        let totals = i32_col(batch, "total_chunks")?;
        let payloads = string_col(batch, "payload")?;
        let vectors = batch
            .column_by_name("vector")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| Error::Backend("vector column missing".into()))?;

        let mut out = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let list = vectors.value(i);
            let vector: Vec<f32> = list
                .as_primitive::<Float32Type>()
                .values()
                .iter()
                .copied()
                .collect();
            out.push(PointRecord {
                id: ids.value(i).to_string(),
                document_id: document_ids.value(i).to_string(),
                ordinal: ordinals.value(i) as usize,
                total_chunks: totals.value(i) as usize,
                vector,
                payload: parse_payload(payloads.value(i)),
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl VectorBackend for LanceBackend {
    async fn ensure_collection(&self, name: &str, vector_dim: usize) -> Result<()> {
        if let Some(table) = self.open(name).await? {
            return match self.table_dim(&table).await? {
                Some(existing) if existing != vector_dim => {
                    Err(Error::CollectionDimensionMismatch {
                        collection: name.to_string(),
                        expected: existing,
                        actual: vector_dim,
                    })
                }
                _ => Ok(()),
            };
        }
        let schema = Self::schema_for(vector_dim);
        let batches: Vec<std::result::Result<RecordBatch, ArrowError>> = Vec::new();
        let reader = RecordBatchIterator::new(batches.into_iter(), schema);
        match self.conn.create_table(name, Box::new(reader)).execute().await {
            Ok(_) => Ok(()),
            // Another writer won the creation race; creation is idempotent.
            Err(lancedb::Error::TableAlreadyExists { .. }) => Ok(()),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        match self.conn.drop_table(name).await {
            Ok(()) | Err(lancedb::Error::TableNotFound { .. }) => Ok(()),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let table = self
            .open(collection)
            .await?
            .ok_or_else(|| Error::NotFound(format!("collection '{collection}'")))?;
        let vector_dim = self
            .table_dim(&table)
            .await?
            .ok_or_else(|| Error::Backend(format!("collection '{collection}' has no vector column")))?;
        for point in &points {
            if point.vector.len() != vector_dim {
                return Err(Error::CollectionDimensionMismatch {
                    collection: collection.to_string(),
                    expected: vector_dim,
                    actual: point.vector.len(),
                });
            }
        }
        let batch = Self::points_to_batch(&points, vector_dim)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let mut merge = table.merge_insert(&["id"]);
        merge.when_matched_update_all(None).when_not_matched_insert_all();
        merge.execute(reader).await.map_err(unavailable)?;
        Ok(())
    }

    async fn delete_by_document(&self, collection: &str, document_id: &str) -> Result<()> {
        let Some(table) = self.open(collection).await? else {
            return Ok(());
        };
        table
            .delete(&format!("document_id = '{}'", escape(document_id)))
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<ScoredPoint>> {
        let Some(table) = self.open(collection).await? else {
            return Ok(Vec::new());
        };
        if let Some(dim) = self.table_dim(&table).await? {
            if vector.len() != dim {
                return Err(Error::CollectionDimensionMismatch {
                    collection: collection.to_string(),
                    expected: dim,
                    actual: vector.len(),
                });
            }
        }
        let mut query = table
            .vector_search(vector.to_vec())
            .map_err(unavailable)?
            .distance_type(DistanceType::Cosine)
            .limit(top_k);
        if let Some(predicate) = predicate_for(filter) {
            query = query.only_if(predicate);
        }
        let mut stream = query.execute().await.map_err(unavailable)?;

        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(unavailable)? {
            let ids = string_col(&batch, "id")?;
            let document_ids = string_col(&batch, "document_id")?;
            let payloads = string_col(&batch, "payload")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<arrow_array::Float32Array>())
                .ok_or_else(|| Error::Backend("_distance column missing".into()))?;
            for i in 0..batch.num_rows() {
                // Cosine distance is `1 - cos`; undo it before normalizing.
                let cosine = 1.0 - distances.value(i);
                hits.push(ScoredPoint {
                    id: ids.value(i).to_string(),
                    document_id: document_ids.value(i).to_string(),
                    score: similarity_to_score(cosine),
                    payload: parse_payload(payloads.value(i)),
                });
            }
        }
        Ok(hits)
    }

    async fn fetch_points(&self, collection: &str, ids: &[String]) -> Result<Vec<PointRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let Some(table) = self.open(collection).await? else {
            return Ok(Vec::new());
        };
        let id_list = ids
            .iter()
            .map(|id| format!("'{}'", escape(id)))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stream = table
            .query()
            .only_if(format!("id IN ({id_list})"))
            .execute()
            .await
            .map_err(unavailable)?;
        let mut out = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(unavailable)? {
            out.extend(Self::decode_points(&batch)?);
        }
        Ok(out)
    }

    async fn collection_stats(&self, name: &str) -> Result<CollectionStatus> {
        let Some(table) = self.open(name).await? else {
            return Ok(CollectionStatus::default());
        };
        let chunk_count = table.count_rows(None).await.map_err(unavailable)?;
        let vector_dim = self.table_dim(&table).await?;
        Ok(CollectionStatus {
            exists: true,
            chunk_count,
            vector_dim,
        })
    }

    async fn health(&self) -> HealthStatus {
        match self.conn.table_names().execute().await {
            Ok(_) => HealthStatus::Healthy,
            Err(_) => HealthStatus::Unavailable,
        }
    }
}

/// Embedded store faults are treated as unavailability so the degrading
/// wrapper can switch to the in-memory fallback.
fn unavailable<E: std::fmt::Display>(e: E) -> Error {
    Error::BackendUnavailable(e.to_string())
}

fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

fn predicate_for(filter: &QueryFilter) -> Option<String> {
    let mut clauses = Vec::new();
    if let Some(doc) = &filter.document_id {
        clauses.push(format!("document_id = '{}'", escape(doc)));
    }
    if let Some(doc) = &filter.exclude_document {
        clauses.push(format!("document_id != '{}'", escape(doc)));
    }
    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" AND "))
    }
}

fn parse_payload(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or(serde_json::Value::Null)
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::Backend(format!("{name} column missing")))
}

fn i32_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| Error::Backend(format!("{name} column missing")))
}
