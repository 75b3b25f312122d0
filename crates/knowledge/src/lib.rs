//! Knowledge store management for chatBOCS.
//!
//! PDFs are read page by page, chunked, embedded and written to a vector
//! index (LanceDB locally, Qdrant for the service, or in memory). The
//! [`KnowledgeCoordinator`] keeps that index consistent with the document
//! directory across resets, incremental adds and reloads, and hands out
//! versioned snapshots for retrieval and chat.

pub mod agent;
pub mod chunker;
pub mod config;
pub mod coordinator;
pub mod documents;
pub mod embeddings;
pub mod error;
pub mod lancedb_index;
pub mod memory_index;
pub mod progress;
pub mod qdrant_index;
pub mod reader;
pub mod registry;
pub mod session;
pub mod similarity;
pub mod store;
pub mod types;
pub mod vector_index;

pub use agent::{AgentFactory, AgentRequest, AnsweringAgent, LlmAgentFactory};
pub use config::{KnowledgeConfig, StoreBackend};
pub use coordinator::{
    build_context_prompt, Collaborators, CoordinatorSettings, KnowledgeCoordinator,
    KnowledgeSnapshot,
};
pub use error::{CleanupError, DocumentError, GenerationError, InitError, SearchError};
pub use progress::{ProgressEvent, ProgressReporter};
pub use session::{ChatSession, LatencyBadge};
pub use similarity::similarity_from_distance;
pub use types::{
    ChatOutcome, ConversationTurn, CoordinatorState, DocumentMeta, IndexedDocument,
    RetrievalResult, ScanOutcome, ScanReport, StatusReport,
};

use bocs_core::AppResult;
use std::path::Path;
use std::sync::Arc;

/// Assemble the configured collaborators of a knowledge base: vector
/// backend, embedder and PDF reader, plus the given agent factory.
pub async fn collaborators_from_config(
    workspace: &Path,
    config: &KnowledgeConfig,
    agents: Arc<dyn AgentFactory>,
) -> AppResult<Collaborators> {
    let backend = vector_index::create_backend(config, workspace)?;
    let embedder = embeddings::create_provider(&config.embedding).await?;

    tracing::debug!(
        "Knowledge base '{}': {} backend, {} embedder",
        config.name,
        backend.name(),
        config.embedding.label()
    );

    Ok(Collaborators {
        backend,
        embedder,
        reader: Arc::new(reader::PdfReader::new()),
        agents,
    })
}

/// Build an uninitialized coordinator for a knowledge base.
pub async fn open_coordinator(
    workspace: &Path,
    config: &KnowledgeConfig,
    agents: Arc<dyn AgentFactory>,
) -> AppResult<KnowledgeCoordinator> {
    let collaborators = collaborators_from_config(workspace, config, agents).await?;
    KnowledgeCoordinator::new(
        collaborators,
        CoordinatorSettings::from_config(config, workspace),
    )
}
