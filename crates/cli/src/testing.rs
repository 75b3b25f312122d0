//! Offline coordinator for command and handler tests.

use bocs_core::{AppError, AppResult};
use bocs_knowledge::agent::{AgentFactory, AgentRequest, AnsweringAgent};
use bocs_knowledge::embeddings::providers::TrigramProvider;
use bocs_knowledge::memory_index::MemoryBackend;
use bocs_knowledge::reader::PlainTextReader;
use bocs_knowledge::store::KnowledgeStoreHandle;
use bocs_knowledge::{Collaborators, CoordinatorSettings, KnowledgeCoordinator};
use std::path::Path;
use std::sync::Arc;

/// Answers `#<generation> <prompt>`; fails when the question is `explode`.
struct EchoAgent {
    generation: u64,
}

#[async_trait::async_trait]
impl AnsweringAgent for EchoAgent {
    async fn run(&self, request: &AgentRequest) -> AppResult<String> {
        if request.query == "explode" {
            return Err(AppError::Llm("model overloaded".to_string()));
        }
        Ok(format!("#{} {}", self.generation, request.prompt))
    }
}

struct EchoAgents;

impl AgentFactory for EchoAgents {
    fn build(&self, store: Arc<KnowledgeStoreHandle>) -> AppResult<Arc<dyn AnsweringAgent>> {
        Ok(Arc::new(EchoAgent {
            generation: store.generation(),
        }))
    }
}

/// Uninitialized coordinator over an in-memory index, reading plain text.
pub fn coordinator(upload_dir: &Path) -> KnowledgeCoordinator {
    let collaborators = Collaborators {
        backend: Arc::new(MemoryBackend::new("memory://test", "vectors")),
        embedder: Arc::new(TrigramProvider::new(128)),
        reader: Arc::new(PlainTextReader::new()),
        agents: Arc::new(EchoAgents),
    };
    let settings = CoordinatorSettings {
        upload_dir: upload_dir.to_path_buf(),
        chunking: Default::default(),
        provenance: Default::default(),
        batch_size: 8,
    };
    KnowledgeCoordinator::new(collaborators, settings).expect("test coordinator")
}
