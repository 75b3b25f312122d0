//! In-process vector index.
//!
//! Tables live in the backend, so contents survive re-opening, and
//! `destroy` detaches them the way deleting a directory would: connections
//! opened before still hold the old rows but report `exists() == false`.

use crate::similarity::cosine_distance;
use crate::vector_index::{IndexBackend, IndexHit, IndexRecord, VectorIndex};
use bocs_core::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Rows = Arc<RwLock<Vec<IndexRecord>>>;

#[derive(Clone)]
pub struct MemoryBackend {
    location: String,
    table: String,
    tables: Arc<RwLock<HashMap<String, Rows>>>,
}

impl MemoryBackend {
    pub fn new(location: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            table: table.into(),
            tables: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait::async_trait]
impl IndexBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn table(&self) -> &str {
        &self.table
    }

    async fn open(&self, dimensions: usize) -> AppResult<Arc<dyn VectorIndex>> {
        let rows = {
            let mut tables = self.tables.write().await;
            tables
                .entry(self.table.clone())
                .or_insert_with(|| Arc::new(RwLock::new(Vec::new())))
                .clone()
        };

        Ok(Arc::new(MemoryIndex {
            table: self.table.clone(),
            tables: Arc::clone(&self.tables),
            rows,
            dimensions,
        }))
    }

    async fn destroy(&self) -> AppResult<()> {
        self.tables.write().await.remove(&self.table);
        tracing::debug!("Dropped in-memory table '{}'", self.table);
        Ok(())
    }
}

pub struct MemoryIndex {
    table: String,
    tables: Arc<RwLock<HashMap<String, Rows>>>,
    rows: Rows,
    dimensions: usize,
}

#[async_trait::async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, doc_name: &str, records: Vec<IndexRecord>) -> AppResult<usize> {
        if let Some(bad) = records.iter().find(|r| r.vector.len() != self.dimensions) {
            return Err(AppError::Knowledge(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimensions,
                bad.vector.len()
            )));
        }

        let written = records.len();
        let mut rows = self.rows.write().await;
        rows.retain(|r| r.meta.doc_name != doc_name);
        rows.extend(records);
        Ok(written)
    }

    async fn delete_all(&self) -> AppResult<()> {
        self.rows.write().await.clear();
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize) -> AppResult<Vec<IndexHit>> {
        let rows = self.rows.read().await;
        let mut hits: Vec<IndexHit> = rows
            .iter()
            .map(|r| IndexHit {
                distance: cosine_distance(query, &r.vector),
                text: r.text.clone(),
                meta: r.meta.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn exists(&self) -> AppResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&self.table)
            .is_some_and(|rows| Arc::ptr_eq(rows, &self.rows)))
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.rows.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentMeta;
    use chrono::Utc;

    fn record(doc: &str, position: u32, vector: Vec<f32>) -> IndexRecord {
        IndexRecord {
            id: crate::vector_index::record_id(doc, position),
            text: format!("{} chunk {}", doc, position),
            vector,
            meta: DocumentMeta {
                doc_type: "NDT_document".to_string(),
                source_type: "uploaded_pdf".to_string(),
                doc_name: doc.to_string(),
                page: Some(1),
                chunk: position,
                file_name: format!("{}.pdf", doc),
                content_hash: String::new(),
                indexed_at: Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_document_rows() {
        let backend = MemoryBackend::new("mem", "vectors");
        let index = backend.open(2).await.unwrap();

        index
            .upsert("a", vec![record("a", 0, vec![1.0, 0.0]), record("a", 1, vec![0.0, 1.0])])
            .await
            .unwrap();
        index.upsert("b", vec![record("b", 0, vec![1.0, 1.0])]).await.unwrap();
        index.upsert("a", vec![record("a", 0, vec![1.0, 0.0])]).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_search_orders_by_distance() {
        let backend = MemoryBackend::new("mem", "vectors");
        let index = backend.open(2).await.unwrap();
        index.upsert("far", vec![record("far", 0, vec![0.0, 1.0])]).await.unwrap();
        index.upsert("near", vec![record("near", 0, vec![1.0, 0.1])]).await.unwrap();

        let hits = index.search(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].meta.doc_name, "near");
        assert!(hits[0].distance < hits[1].distance);

        assert_eq!(index.search(&[1.0, 0.0], 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_contents_survive_reopen_but_not_destroy() {
        let backend = MemoryBackend::new("mem", "vectors");
        let first = backend.open(2).await.unwrap();
        first.upsert("a", vec![record("a", 0, vec![1.0, 0.0])]).await.unwrap();

        let second = backend.open(2).await.unwrap();
        assert_eq!(second.count().await.unwrap(), 1);

        backend.destroy().await.unwrap();
        assert!(!first.exists().await.unwrap());

        let third = backend.open(2).await.unwrap();
        assert!(third.exists().await.unwrap());
        assert_eq!(third.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_rejected() {
        let backend = MemoryBackend::new("mem", "vectors");
        let index = backend.open(3).await.unwrap();
        assert!(index.upsert("a", vec![record("a", 0, vec![1.0])]).await.is_err());
    }
}
