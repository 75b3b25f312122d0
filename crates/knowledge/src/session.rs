//! Interactive chat session: conversation history and display helpers.

use crate::coordinator::KnowledgeCoordinator;
use crate::error::GenerationError;
use crate::types::{ChatOutcome, ConversationTurn, RetrievalResult};
use bocs_core::{AppError, AppResult};
use std::fmt;
use std::ops::RangeInclusive;
use uuid::Uuid;

pub const TOP_K_RANGE: RangeInclusive<usize> = 1..=50;
pub const MEMORY_DEPTH_RANGE: RangeInclusive<usize> = 0..=20;

/// Preview length for the sources of the latest answer.
pub const LATEST_PREVIEW_CHARS: usize = 300;
/// Preview length for sources shown in the history.
pub const HISTORY_PREVIEW_CHARS: usize = 400;

/// One user's conversation and retrieval settings.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: Uuid,
    history: Vec<ConversationTurn>,
    top_k: usize,
    memory_depth: usize,
}

impl ChatSession {
    pub fn new(top_k: usize, memory_depth: usize) -> AppResult<Self> {
        let mut session = Self {
            id: Uuid::new_v4(),
            history: Vec::new(),
            top_k: *TOP_K_RANGE.start(),
            memory_depth: 0,
        };
        session.set_top_k(top_k)?;
        session.set_memory_depth(memory_depth)?;
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn memory_depth(&self) -> usize {
        self.memory_depth
    }

    pub fn set_top_k(&mut self, top_k: usize) -> AppResult<()> {
        if !TOP_K_RANGE.contains(&top_k) {
            return Err(AppError::Config(format!(
                "top_k must be between {} and {}, got {}",
                TOP_K_RANGE.start(),
                TOP_K_RANGE.end(),
                top_k
            )));
        }
        self.top_k = top_k;
        Ok(())
    }

    pub fn set_memory_depth(&mut self, memory_depth: usize) -> AppResult<()> {
        if !MEMORY_DEPTH_RANGE.contains(&memory_depth) {
            return Err(AppError::Config(format!(
                "memory depth must be between {} and {}, got {}",
                MEMORY_DEPTH_RANGE.start(),
                MEMORY_DEPTH_RANGE.end(),
                memory_depth
            )));
        }
        self.memory_depth = memory_depth;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Search, answer and record a turn. Empty questions and a store that
    /// is not Ready are rejected without recording anything; a failed
    /// generation is recorded.
    pub async fn ask(
        &mut self,
        coordinator: &KnowledgeCoordinator,
        question: &str,
    ) -> Result<&ConversationTurn, GenerationError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(GenerationError::EmptyQuestion);
        }
        if !coordinator.is_ready() {
            return Err(GenerationError::NotReady(coordinator.state()));
        }

        let retrieved = coordinator.search(question, self.top_k).await;
        let outcome = coordinator
            .chat(question, &self.history, self.memory_depth)
            .await;
        Ok(self.record(question, &outcome, retrieved))
    }

    fn record(
        &mut self,
        question: &str,
        outcome: &ChatOutcome,
        retrieved: Vec<RetrievalResult>,
    ) -> &ConversationTurn {
        self.history
            .push(ConversationTurn::from_outcome(question, outcome, retrieved));
        let index = self.history.len() - 1;
        &self.history[index]
    }
}

/// Coarse answer latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyBadge {
    Fast,
    Moderate,
    Slow,
}

impl LatencyBadge {
    pub fn from_secs(secs: f64) -> Self {
        if secs < 3.0 {
            LatencyBadge::Fast
        } else if secs < 8.0 {
            LatencyBadge::Moderate
        } else {
            LatencyBadge::Slow
        }
    }
}

impl fmt::Display for LatencyBadge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LatencyBadge::Fast => "fast",
            LatencyBadge::Moderate => "moderate",
            LatencyBadge::Slow => "slow",
        };
        f.write_str(s)
    }
}

/// First `max_chars` characters of `text`, with `...` when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// `doc_name (score: 0.873, p. 4)` header for a source.
pub fn format_source(result: &RetrievalResult) -> String {
    match result.meta.page {
        Some(page) => format!(
            "{} (score: {:.3}, p. {})",
            result.meta.doc_name, result.similarity, page
        ),
        None => format!("{} (score: {:.3})", result.meta.doc_name, result.similarity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentMeta;
    use chrono::Utc;

    fn result(page: Option<u32>) -> RetrievalResult {
        RetrievalResult {
            distance: 0.127,
            similarity: 0.873,
            text: "Article 4".to_string(),
            meta: DocumentMeta {
                doc_type: "NDT_document".to_string(),
                source_type: "uploaded_pdf".to_string(),
                doc_name: "decree_12".to_string(),
                page,
                chunk: 0,
                file_name: "decree_12.pdf".to_string(),
                content_hash: String::new(),
                indexed_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_bounds_are_enforced() {
        assert!(ChatSession::new(0, 3).is_err());
        assert!(ChatSession::new(51, 3).is_err());
        assert!(ChatSession::new(5, 21).is_err());

        let mut session = ChatSession::new(5, 3).unwrap();
        assert!(session.set_memory_depth(0).is_ok());
        assert!(session.set_top_k(50).is_ok());
        assert!(session.set_top_k(0).is_err());
        assert_eq!(session.top_k(), 50);
    }

    #[test]
    fn test_latency_badge() {
        assert_eq!(LatencyBadge::from_secs(0.4), LatencyBadge::Fast);
        assert_eq!(LatencyBadge::from_secs(3.0), LatencyBadge::Moderate);
        assert_eq!(LatencyBadge::from_secs(7.99), LatencyBadge::Moderate);
        assert_eq!(LatencyBadge::from_secs(8.0), LatencyBadge::Slow);
        assert_eq!(LatencyBadge::Slow.to_string(), "slow");
    }

    #[test]
    fn test_preview_truncates_on_chars() {
        assert_eq!(preview("short", 300), "short");
        assert_eq!(preview("décret", 3), "déc...");
        let long = "a".repeat(LATEST_PREVIEW_CHARS + 1);
        assert_eq!(preview(&long, LATEST_PREVIEW_CHARS).chars().count(), 303);
        let exact = "b".repeat(HISTORY_PREVIEW_CHARS);
        assert_eq!(preview(&exact, HISTORY_PREVIEW_CHARS), exact);
    }

    struct EchoAgents;

    struct EchoAgent;

    #[async_trait::async_trait]
    impl crate::agent::AnsweringAgent for EchoAgent {
        async fn run(&self, request: &crate::agent::AgentRequest) -> AppResult<String> {
            if request.query == "fail" {
                return Err(AppError::Llm("rate limited".to_string()));
            }
            Ok(format!("echo: {}", request.query))
        }
    }

    impl crate::agent::AgentFactory for EchoAgents {
        fn build(
            &self,
            _store: std::sync::Arc<crate::store::KnowledgeStoreHandle>,
        ) -> AppResult<std::sync::Arc<dyn crate::agent::AnsweringAgent>> {
            Ok(std::sync::Arc::new(EchoAgent))
        }
    }

    fn coordinator() -> KnowledgeCoordinator {
        use crate::coordinator::{Collaborators, CoordinatorSettings};
        use std::sync::Arc;

        let collaborators = Collaborators {
            backend: Arc::new(crate::memory_index::MemoryBackend::new("mem", "vectors")),
            embedder: Arc::new(crate::embeddings::providers::TrigramProvider::new(64)),
            reader: Arc::new(crate::reader::PlainTextReader::new()),
            agents: Arc::new(EchoAgents),
        };
        let settings = CoordinatorSettings {
            upload_dir: std::path::PathBuf::from("documents_pdf"),
            chunking: Default::default(),
            provenance: Default::default(),
            batch_size: 10,
        };
        KnowledgeCoordinator::new(collaborators, settings).unwrap()
    }

    #[tokio::test]
    async fn test_ask_records_turns() {
        let mut coordinator = coordinator();
        let mut session = ChatSession::new(5, 3).unwrap();

        assert!(matches!(
            session.ask(&coordinator, "Which decree?").await,
            Err(GenerationError::NotReady(_))
        ));
        assert!(session.history().is_empty());

        coordinator.initialize(false).await.unwrap();
        assert!(matches!(
            session.ask(&coordinator, "  ").await,
            Err(GenerationError::EmptyQuestion)
        ));

        let turn = session.ask(&coordinator, " Which decree? ").await.unwrap();
        assert!(turn.success);
        assert_eq!(turn.user, "Which decree?");
        assert_eq!(turn.assistant, "echo: Which decree?");

        let failed = session.ask(&coordinator, "fail").await.unwrap();
        assert!(!failed.success);
        assert!(failed.assistant.is_empty());
        assert!(failed.error.as_deref().unwrap().contains("rate limited"));
        assert_eq!(session.history().len(), 2);

        session.clear();
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_format_source() {
        assert_eq!(format_source(&result(Some(4))), "decree_12 (score: 0.873, p. 4)");
        assert_eq!(format_source(&result(None)), "decree_12 (score: 0.873)");
    }
}
