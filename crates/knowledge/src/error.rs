//! Typed failures of the coordinator operations.
//!
//! Collaborators (backends, embedders, readers) return `AppResult`; the
//! coordinator folds their failures into one of these enums so callers can
//! branch on what went wrong. Rendering to a string happens at the edge.

use crate::types::CoordinatorState;
use std::path::PathBuf;
use thiserror::Error;

/// Building a knowledge store handle failed.
#[derive(Debug, Clone, Error)]
pub enum InitError {
    #[error("vector store unavailable at {location}: {reason}")]
    StoreUnavailable { location: String, reason: String },

    #[error("embedder '{provider}' unavailable: {reason}")]
    EmbedderUnavailable { provider: String, reason: String },

    #[error("answering agent could not be built: {0}")]
    Agent(String),
}

/// Indexing one document failed.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("knowledge store is not ready (state: {0})")]
    NotReady(CoordinatorState),

    #[error("document not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("could not stage '{name}': {reason}")]
    Staging { name: String, reason: String },

    #[error("could not read '{name}': {reason}")]
    Unreadable { name: String, reason: String },

    #[error("'{0}' contains no extractable text")]
    Empty(String),

    #[error("embedding failed for '{name}': {reason}")]
    Embedding { name: String, reason: String },

    #[error("indexing failed for '{name}': {reason}")]
    Index { name: String, reason: String },

    #[error("'{name}' was indexed but the reload failed: {source}")]
    Reload {
        name: String,
        #[source]
        source: InitError,
    },
}

impl DocumentError {
    /// Whether the document content reached the index before the failure.
    pub fn content_indexed(&self) -> bool {
        matches!(self, DocumentError::Reload { .. })
    }
}

/// A typed search failed.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("knowledge store is not ready (state: {0})")]
    NotReady(CoordinatorState),

    #[error("query embedding failed: {0}")]
    Embedding(String),

    #[error("vector search failed: {0}")]
    Index(String),
}

/// Answer generation failed.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("knowledge store is not ready (state: {0})")]
    NotReady(CoordinatorState),

    #[error("question is empty")]
    EmptyQuestion,

    #[error("generation failed: {0}")]
    Agent(String),
}

/// A forced cleanup failed.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("could not purge {location}: {reason}")]
    Purge { location: String, reason: String },

    #[error("purge succeeded but re-initialization failed: {0}")]
    Reinitialize(#[from] InitError),
}
