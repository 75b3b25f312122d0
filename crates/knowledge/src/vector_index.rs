//! Vector index abstraction.
//!
//! An [`IndexBackend`] names a location and a table/collection and opens
//! [`VectorIndex`] connections to it. Every store handle opens its own
//! connection; the backend also owns physical destruction.

use crate::config::{KnowledgeConfig, StoreBackend};
use crate::types::DocumentMeta;
use bocs_core::AppResult;
use std::path::Path;
use std::sync::Arc;

/// A chunk ready to be written: text, vector and provenance.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub meta: DocumentMeta,
}

/// A nearest-neighbour match.
#[derive(Debug, Clone)]
pub struct IndexHit {
    /// Cosine distance, lower is closer
    pub distance: f32,
    pub text: String,
    pub meta: DocumentMeta,
}

/// Stable record id for chunk `position` of `doc_name`.
pub fn record_id(doc_name: &str, position: u32) -> String {
    format!("{}#{}", doc_name, position)
}

/// One open connection to a table or collection.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Replace every record of `doc_name` with `records`. Returns the number
    /// of records written.
    async fn upsert(&self, doc_name: &str, records: Vec<IndexRecord>) -> AppResult<usize>;

    /// Remove every record, keeping the table.
    async fn delete_all(&self) -> AppResult<()>;

    /// Nearest neighbours of `query`, closest first.
    async fn search(&self, query: &[f32], limit: usize) -> AppResult<Vec<IndexHit>>;

    /// Whether the underlying table still exists.
    async fn exists(&self) -> AppResult<bool>;

    async fn count(&self) -> AppResult<usize>;
}

/// Factory for connections to one location/table pair.
#[async_trait::async_trait]
pub trait IndexBackend: Send + Sync {
    fn name(&self) -> &str;

    fn location(&self) -> &str;

    fn table(&self) -> &str;

    /// Open the table, creating it empty if absent.
    async fn open(&self, dimensions: usize) -> AppResult<Arc<dyn VectorIndex>>;

    /// Physically remove the table and its storage, leaving an empty
    /// location behind.
    async fn destroy(&self) -> AppResult<()>;
}

/// Build the backend configured for a knowledge base.
pub fn create_backend(config: &KnowledgeConfig, workspace: &Path) -> AppResult<Arc<dyn IndexBackend>> {
    let location = config.store_location(workspace);
    let table = config.store.table.clone();

    let backend: Arc<dyn IndexBackend> = match config.store.backend {
        StoreBackend::Lancedb => Arc::new(crate::lancedb_index::LanceDbBackend::new(location, table)),
        StoreBackend::Qdrant => {
            let api_key = std::env::var(&config.store.api_key_env).ok();
            Arc::new(crate::qdrant_index::QdrantBackend::new(location, table, api_key)?)
        }
        StoreBackend::Memory => Arc::new(crate::memory_index::MemoryBackend::new(location, table)),
    };

    tracing::debug!(
        "Using {} backend at {} (table '{}')",
        backend.name(),
        backend.location(),
        backend.table()
    );
    Ok(backend)
}
