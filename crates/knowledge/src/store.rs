//! Knowledge store handle: one open index connection plus its embedder.
//!
//! Handles are immutable once built. Resetting or reloading builds a new
//! handle with a higher generation; holders of an older one keep a working
//! connection but can tell it has been superseded.

use crate::chunker::PageChunk;
use crate::config::Provenance;
use crate::embeddings::EmbeddingProvider;
use crate::error::{DocumentError, InitError, SearchError};
use crate::progress::ProgressReporter;
use crate::similarity::similarity_from_distance;
use crate::types::{DocumentMeta, RetrievalResult};
use crate::vector_index::{record_id, IndexBackend, IndexRecord, VectorIndex};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// What one document contributes to an ingest call.
#[derive(Debug, Clone)]
pub struct IngestRequest<'a> {
    pub doc_name: &'a str,
    pub file_name: &'a str,
    pub bytes: &'a [u8],
    pub chunks: Vec<PageChunk>,
}

pub struct KnowledgeStoreHandle {
    generation: u64,
    backend: String,
    location: String,
    table: String,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for KnowledgeStoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeStoreHandle")
            .field("generation", &self.generation)
            .field("backend", &self.backend)
            .field("location", &self.location)
            .field("table", &self.table)
            .field("embedder", &self.embedder_label())
            .finish()
    }
}

impl KnowledgeStoreHandle {
    /// Health-check the embedder, then open the table.
    pub async fn open(
        generation: u64,
        backend: &dyn IndexBackend,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, InitError> {
        embedder
            .health_check()
            .await
            .map_err(|e| InitError::EmbedderUnavailable {
                provider: embedder.provider_name().to_string(),
                reason: e.to_string(),
            })?;

        let index = backend
            .open(embedder.dimensions())
            .await
            .map_err(|e| InitError::StoreUnavailable {
                location: backend.location().to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(
            "Opened store handle #{} ({} at {}, table '{}')",
            generation,
            backend.name(),
            backend.location(),
            backend.table()
        );

        Ok(Self {
            generation,
            backend: backend.name().to_string(),
            location: backend.location().to_string(),
            table: backend.table().to_string(),
            index,
            embedder,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn embedder_label(&self) -> String {
        format!(
            "{}:{}",
            self.embedder.provider_name(),
            self.embedder.model_name()
        )
    }

    /// Nearest passages to `query`, in index order.
    pub async fn retrieve(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>, SearchError> {
        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| SearchError::Embedding(e.to_string()))?;

        let hits = self
            .index
            .search(&vector, limit)
            .await
            .map_err(|e| SearchError::Index(e.to_string()))?;

        Ok(hits
            .into_iter()
            .map(|hit| RetrievalResult {
                similarity: similarity_from_distance(hit.distance),
                distance: hit.distance,
                text: hit.text,
                meta: hit.meta,
            })
            .collect())
    }

    /// Embed and write the chunks of one document, replacing any previous
    /// version under the same name. Returns the number of chunks written.
    pub async fn ingest(
        &self,
        request: IngestRequest<'_>,
        provenance: &Provenance,
        batch_size: usize,
        progress: &ProgressReporter,
    ) -> Result<usize, DocumentError> {
        let content_hash = format!("{:x}", Sha256::digest(request.bytes));
        let indexed_at = Utc::now();
        let total = request.chunks.len();
        let batch_size = batch_size.max(1);

        let mut records = Vec::with_capacity(total);
        for batch in request.chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await.map_err(|e| {
                DocumentError::Embedding {
                    name: request.doc_name.to_string(),
                    reason: e.to_string(),
                }
            })?;

            if vectors.len() != batch.len() {
                return Err(DocumentError::Embedding {
                    name: request.doc_name.to_string(),
                    reason: format!(
                        "expected {} embeddings, got {}",
                        batch.len(),
                        vectors.len()
                    ),
                });
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                records.push(IndexRecord {
                    id: record_id(request.doc_name, chunk.position),
                    text: chunk.text.clone(),
                    vector,
                    meta: DocumentMeta {
                        doc_type: provenance.doc_type.clone(),
                        source_type: provenance.source_type.clone(),
                        doc_name: request.doc_name.to_string(),
                        page: Some(chunk.page),
                        chunk: chunk.position,
                        file_name: request.file_name.to_string(),
                        content_hash: content_hash.clone(),
                        indexed_at,
                    },
                });
            }
            progress.embed(records.len() as u64, total as u64, self.embedder.model_name());
        }

        let written = self
            .index
            .upsert(request.doc_name, records)
            .await
            .map_err(|e| DocumentError::Index {
                name: request.doc_name.to_string(),
                reason: e.to_string(),
            })?;
        progress.index(written as u64, &self.backend);

        Ok(written)
    }

    /// Row count, if the index can report it.
    pub async fn count(&self) -> Option<usize> {
        match self.index.count().await {
            Ok(rows) => Some(rows),
            Err(e) => {
                tracing::warn!("Could not count rows in '{}': {}", self.table, e);
                None
            }
        }
    }
}
