//! LanceDB-backed vector index.
//!
//! One table per knowledge base with columns `id, doc_name, text, vector,
//! metadata`. Metadata is stored as a JSON string; `doc_name` is duplicated
//! as a column so documents can be replaced with a delete predicate.

use crate::types::DocumentMeta;
use crate::vector_index::{IndexBackend, IndexHit, IndexRecord, VectorIndex};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use bocs_core::{AppError, AppResult};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::path::Path;
use std::sync::Arc;

/// Opens connections to `<location>/<table>.lance`.
pub struct LanceDbBackend {
    location: String,
    table: String,
}

impl LanceDbBackend {
    pub fn new(location: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            table: table.into(),
        }
    }

    async fn connect(&self) -> AppResult<Connection> {
        tokio::fs::create_dir_all(&self.location).await.map_err(|e| {
            AppError::Knowledge(format!("Failed to create index directory: {}", e))
        })?;

        lancedb::connect(&self.location)
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to connect to LanceDB: {}", e)))
    }
}

#[async_trait::async_trait]
impl IndexBackend for LanceDbBackend {
    fn name(&self) -> &str {
        "lancedb"
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn table(&self) -> &str {
        &self.table
    }

    async fn open(&self, dimensions: usize) -> AppResult<Arc<dyn VectorIndex>> {
        let conn = self.connect().await?;
        let table_names = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to list tables: {}", e)))?;

        let table = if table_names.contains(&self.table) {
            let table = conn
                .open_table(&self.table)
                .execute()
                .await
                .map_err(|e| AppError::Knowledge(format!("Failed to open table: {}", e)))?;
            let schema = table
                .schema()
                .await
                .map_err(|e| AppError::Knowledge(format!("Failed to read table schema: {}", e)))?;
            match vector_width(&schema) {
                Some(width) if width == dimensions => table,
                found => {
                    return Err(AppError::Knowledge(format!(
                        "Table '{}' stores {} vectors but the embedder produces {}; reset the knowledge base",
                        self.table,
                        found.map_or_else(|| "non-vector".to_string(), |w| format!("{}-dimension", w)),
                        dimensions
                    )))
                }
            }
        } else {
            conn.create_empty_table(&self.table, create_schema(dimensions))
                .execute()
                .await
                .map_err(|e| AppError::Knowledge(format!("Failed to create table: {}", e)))?
        };

        tracing::debug!(
            "Opened LanceDB table '{}' at {}",
            self.table,
            self.location
        );

        Ok(Arc::new(LanceDbIndex {
            conn,
            table,
            table_name: self.table.clone(),
            dimensions,
        }))
    }

    async fn destroy(&self) -> AppResult<()> {
        let path = Path::new(&self.location);
        if path.exists() {
            tokio::fs::remove_dir_all(path).await.map_err(|e| {
                AppError::Knowledge(format!("Failed to remove {}: {}", self.location, e))
            })?;
            tracing::info!("Removed LanceDB directory {}", self.location);
        }
        tokio::fs::create_dir_all(path).await.map_err(|e| {
            AppError::Knowledge(format!("Failed to recreate {}: {}", self.location, e))
        })?;
        Ok(())
    }
}

fn create_schema(dimensions: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("doc_name", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimensions as i32,
            ),
            false,
        ),
        Field::new("metadata", DataType::Utf8, false),
    ]))
}

fn vector_width(schema: &Schema) -> Option<usize> {
    match schema.field_with_name("vector").ok()?.data_type() {
        DataType::FixedSizeList(_, width) => usize::try_from(*width).ok(),
        _ => None,
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub struct LanceDbIndex {
    conn: Connection,
    table: Table,
    table_name: String,
    dimensions: usize,
}

impl LanceDbIndex {
    fn records_to_batch(&self, records: &[IndexRecord]) -> AppResult<RecordBatch> {
        let schema = create_schema(self.dimensions);

        let mut flat = Vec::with_capacity(records.len() * self.dimensions);
        let mut metadata = Vec::with_capacity(records.len());
        for record in records {
            if record.vector.len() != self.dimensions {
                return Err(AppError::Knowledge(format!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    self.dimensions,
                    record.vector.len()
                )));
            }
            flat.extend_from_slice(&record.vector);
            metadata.push(serde_json::to_string(&record.meta)?);
        }

        let vectors = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.dimensions as i32,
            Arc::new(Float32Array::from(flat)),
            None,
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to build vector column: {}", e)))?;

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.id.as_str()))),
                Arc::new(StringArray::from_iter_values(
                    records.iter().map(|r| r.meta.doc_name.as_str()),
                )),
                Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.text.as_str()))),
                Arc::new(vectors),
                Arc::new(StringArray::from_iter_values(metadata.iter().map(String::as_str))),
            ],
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to create RecordBatch: {}", e)))
    }

    async fn rows_matching(&self, filter: &str) -> AppResult<Vec<RecordBatch>> {
        self.table
            .query()
            .only_if(filter)
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to read rows: {}", e)))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to collect rows: {}", e)))
    }

    async fn append(&self, batches: Vec<RecordBatch>) -> AppResult<()> {
        let batches: Vec<RecordBatch> = batches.into_iter().filter(|b| b.num_rows() > 0).collect();
        let Some(first) = batches.first() else {
            return Ok(());
        };
        let schema = first.schema();
        self.table
            .add(RecordBatchIterator::new(batches.into_iter().map(Ok), schema))
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to add chunks batch: {}", e)))?;
        Ok(())
    }

    fn batch_to_hits(batch: &RecordBatch, hits: &mut Vec<IndexHit>) -> AppResult<()> {
        let text = string_column(batch, "text")?;
        let metadata = string_column(batch, "metadata")?;
        let distance = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| AppError::Knowledge("Missing _distance column".to_string()))?;

        for row in 0..batch.num_rows() {
            let meta: DocumentMeta = match serde_json::from_str(metadata.value(row)) {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!("Skipping row with unreadable metadata: {}", e);
                    continue;
                }
            };
            hits.push(IndexHit {
                distance: distance.value(row),
                text: text.value(row).to_string(),
                meta,
            });
        }
        Ok(())
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| AppError::Knowledge(format!("Invalid {} column", name)))
}

#[async_trait::async_trait]
impl VectorIndex for LanceDbIndex {
    async fn upsert(&self, doc_name: &str, records: Vec<IndexRecord>) -> AppResult<usize> {
        let batch = if records.is_empty() {
            None
        } else {
            Some(self.records_to_batch(&records)?)
        };

        let filter = format!("doc_name = {}", quote(doc_name));
        let previous = self.rows_matching(&filter).await?;
        self.table
            .delete(&filter)
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to replace '{}': {}", doc_name, e)))?;

        let Some(batch) = batch else {
            return Ok(0);
        };

        if let Err(e) = self.append(vec![batch]).await {
            tracing::warn!("Restoring previous chunks of '{}' after failed write", doc_name);
            if let Err(restore) = self.append(previous).await {
                tracing::error!("Could not restore '{}': {}", doc_name, restore);
            }
            return Err(e);
        }

        tracing::debug!("Inserted {} chunks for '{}' into LanceDB", records.len(), doc_name);
        Ok(records.len())
    }

    async fn delete_all(&self) -> AppResult<()> {
        self.table
            .delete("id IS NOT NULL")
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to clear index: {}", e)))?;
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize) -> AppResult<Vec<IndexHit>> {
        if query.len() != self.dimensions {
            return Err(AppError::Knowledge(format!(
                "Query embedding dimension mismatch: expected {}, got {}",
                self.dimensions,
                query.len()
            )));
        }

        let batches = self
            .table
            .query()
            .nearest_to(query.to_vec())
            .map_err(|e| AppError::Knowledge(format!("Failed to create query: {}", e)))?
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to execute search: {}", e)))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to collect results: {}", e)))?;

        let mut hits = Vec::new();
        for batch in &batches {
            Self::batch_to_hits(batch, &mut hits)?;
        }

        tracing::debug!("Retrieved {} chunks (requested top-{})", hits.len(), limit);
        Ok(hits)
    }

    async fn exists(&self) -> AppResult<bool> {
        let names = self
            .conn
            .table_names()
            .execute()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to list tables: {}", e)))?;
        Ok(names.contains(&self.table_name))
    }

    async fn count(&self) -> AppResult<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to count rows: {}", e)))
    }
}
