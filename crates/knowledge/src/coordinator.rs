//! Knowledge reindexing coordinator.
//!
//! Owns the live store handle, the answering agent built for it and the
//! session registry of indexed file names. Only [`initialize`],
//! [`reload_knowledge_base`] and [`force_cleanup`] build handles; every other
//! operation reports a typed "not ready" instead of initializing on demand.
//!
//! [`initialize`]: KnowledgeCoordinator::initialize
//! [`reload_knowledge_base`]: KnowledgeCoordinator::reload_knowledge_base
//! [`force_cleanup`]: KnowledgeCoordinator::force_cleanup

use crate::agent::{AgentFactory, AgentRequest, AnsweringAgent};
use crate::chunker::Chunker;
use crate::config::{ChunkingConfig, KnowledgeConfig, Provenance};
use crate::documents::{doc_name_for, list_pdfs, PdfListing};
use crate::embeddings::EmbeddingProvider;
use crate::error::{CleanupError, DocumentError, GenerationError, InitError, SearchError};
use crate::progress::ProgressReporter;
use crate::reader::DocumentReader;
use crate::registry::IndexedFileRegistry;
use crate::store::{IngestRequest, KnowledgeStoreHandle};
use crate::types::{
    ChatOutcome, ConversationTurn, CoordinatorState, IndexedDocument, RetrievalResult,
    ScanFailure, ScanOutcome, ScanReport, StatusReport,
};
use crate::vector_index::IndexBackend;
use bocs_core::AppResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Settings the coordinator needs from [`KnowledgeConfig`].
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub upload_dir: PathBuf,
    pub chunking: ChunkingConfig,
    pub provenance: Provenance,
    /// Texts per embedding request
    pub batch_size: usize,
}

impl CoordinatorSettings {
    pub fn from_config(config: &KnowledgeConfig, workspace: &Path) -> Self {
        Self {
            upload_dir: config.upload_dir(workspace),
            chunking: config.chunking,
            provenance: config.provenance.clone(),
            batch_size: config.embedding.batch_size,
        }
    }
}

/// Everything the coordinator delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn IndexBackend>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub reader: Arc<dyn DocumentReader>,
    pub agents: Arc<dyn AgentFactory>,
}

/// A published handle and the agent built for it.
///
/// Cloning is cheap. A snapshot keeps working after the coordinator moves
/// on; compare [`generation`](Self::generation) against the coordinator's to
/// detect that.
#[derive(Clone)]
pub struct KnowledgeSnapshot {
    store: Arc<KnowledgeStoreHandle>,
    agent: Arc<dyn AnsweringAgent>,
}

impl KnowledgeSnapshot {
    pub fn generation(&self) -> u64 {
        self.store.generation()
    }

    pub fn store(&self) -> &Arc<KnowledgeStoreHandle> {
        &self.store
    }

    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>, SearchError> {
        self.store.retrieve(query, limit).await
    }

    /// Answer `query` with the last `memory_depth` complete turns of
    /// `history` as context. Never fails; see [`ChatOutcome`].
    pub async fn chat(
        &self,
        query: &str,
        history: &[ConversationTurn],
        memory_depth: usize,
    ) -> ChatOutcome {
        let start = Instant::now();
        let query = query.trim();
        if query.is_empty() {
            return ChatOutcome {
                answer: Err(GenerationError::EmptyQuestion),
                duration: start.elapsed(),
                generation: Some(self.generation()),
            };
        }

        let request = AgentRequest {
            prompt: build_context_prompt(query, history, memory_depth),
            query: query.to_string(),
        };

        let answer = self
            .agent
            .run(&request)
            .await
            .map_err(|e| GenerationError::Agent(e.to_string()));
        let duration = start.elapsed();

        match &answer {
            Ok(_) => tracing::info!(
                "Answered with handle #{} in {:.2}s",
                self.generation(),
                duration.as_secs_f64()
            ),
            Err(e) => tracing::warn!("Generation failed after {:.2}s: {}", duration.as_secs_f64(), e),
        }

        ChatOutcome {
            answer,
            duration,
            generation: Some(self.generation()),
        }
    }
}

/// Prepend the recent conversation to `query`.
///
/// Takes the last `memory_depth` turns, then drops those with an empty
/// question or answer. Returns `query` unchanged when nothing is left.
pub fn build_context_prompt(query: &str, history: &[ConversationTurn], memory_depth: usize) -> String {
    if memory_depth == 0 || history.is_empty() {
        return query.to_string();
    }

    let recent = &history[history.len().saturating_sub(memory_depth)..];
    let blocks: Vec<String> = recent
        .iter()
        .filter_map(|turn| {
            let user = turn.user.trim();
            let assistant = turn.assistant.trim();
            if user.is_empty() || assistant.is_empty() {
                None
            } else {
                Some(format!("Q: {}\nA: {}", user, assistant))
            }
        })
        .collect();

    if blocks.is_empty() {
        return query.to_string();
    }

    format!(
        "Recent history (summary):\n{}\n\nCurrent question: {}",
        blocks.join("\n\n"),
        query
    )
}

pub struct KnowledgeCoordinator {
    state: CoordinatorState,
    live: Option<KnowledgeSnapshot>,
    /// Last generation handed out; never reused
    issued: u64,
    registry: IndexedFileRegistry,
    last_error: Option<String>,
    settings: CoordinatorSettings,
    collaborators: Collaborators,
    chunker: Chunker,
    progress: ProgressReporter,
}

impl KnowledgeCoordinator {
    /// Create an uninitialized coordinator. No connection is opened.
    pub fn new(collaborators: Collaborators, settings: CoordinatorSettings) -> AppResult<Self> {
        let chunker = Chunker::new(&settings.chunking)?;
        Ok(Self {
            state: CoordinatorState::Uninitialized,
            live: None,
            issued: 0,
            registry: IndexedFileRegistry::new(),
            last_error: None,
            settings,
            collaborators,
            chunker,
            progress: ProgressReporter::noop(),
        })
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == CoordinatorState::Ready
    }

    /// Generation of the live handle, 0 when there is none.
    pub fn generation(&self) -> u64 {
        self.live.as_ref().map_or(0, KnowledgeSnapshot::generation)
    }

    pub fn registry(&self) -> &IndexedFileRegistry {
        &self.registry
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn upload_dir(&self) -> &Path {
        &self.settings.upload_dir
    }

    /// The live handle and agent, if Ready.
    pub fn snapshot(&self) -> Option<KnowledgeSnapshot> {
        self.live.clone()
    }

    /// Whether `snapshot` is still the live handle.
    pub fn is_current(&self, snapshot: &KnowledgeSnapshot) -> bool {
        self.generation() == snapshot.generation()
    }

    fn ready_snapshot(&self) -> Option<&KnowledgeSnapshot> {
        match self.state {
            CoordinatorState::Ready => self.live.as_ref(),
            _ => None,
        }
    }

    async fn build_live(&mut self) -> Result<KnowledgeSnapshot, InitError> {
        self.issued += 1;
        let store = KnowledgeStoreHandle::open(
            self.issued,
            self.collaborators.backend.as_ref(),
            Arc::clone(&self.collaborators.embedder),
        )
        .await?;
        let store = Arc::new(store);
        let agent = self
            .collaborators
            .agents
            .build(Arc::clone(&store))
            .map_err(|e| InitError::Agent(e.to_string()))?;
        Ok(KnowledgeSnapshot { store, agent })
    }

    fn publish(&mut self, snapshot: KnowledgeSnapshot) -> u64 {
        let generation = snapshot.generation();
        self.live = Some(snapshot);
        self.state = CoordinatorState::Ready;
        self.last_error = None;
        generation
    }

    fn fail(&mut self, error: &InitError) {
        tracing::error!("Knowledge store initialization failed: {}", error);
        self.live = None;
        self.state = CoordinatorState::Failed;
        self.last_error = Some(error.to_string());
    }

    /// Build a new handle. With `reset`, the index location is destroyed and
    /// recreated first, and the new table is cleared.
    pub async fn initialize(&mut self, reset: bool) -> Result<u64, InitError> {
        tracing::info!(
            "Initializing knowledge store ({} at {}, reset: {})",
            self.collaborators.backend.name(),
            self.collaborators.backend.location(),
            reset
        );

        if reset {
            self.live = None;
            if let Err(e) = self.collaborators.backend.destroy().await {
                tracing::warn!("Could not remove the previous index: {}", e);
            }
        }

        match self.build_live().await {
            Ok(snapshot) => {
                if reset {
                    if let Err(e) = snapshot.store.index().delete_all().await {
                        tracing::warn!("Could not clear the new index: {}", e);
                    }
                }
                let generation = self.publish(snapshot);
                tracing::info!("Knowledge store ready (handle #{})", generation);
                Ok(generation)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Replace the live handle with a fresh one on the same location.
    /// Initializes instead when not Ready.
    pub async fn reload_knowledge_base(&mut self) -> Result<u64, InitError> {
        if !self.is_ready() {
            return self.initialize(false).await;
        }

        let previous = self.generation();
        match self.build_live().await {
            Ok(snapshot) => {
                let generation = self.publish(snapshot);
                tracing::info!(
                    "Knowledge store reloaded (handle #{} -> #{})",
                    previous,
                    generation
                );
                Ok(generation)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Index one document under `name`, or its file stem. With
    /// `auto_reload`, reload afterwards so the agent sees the new content.
    pub async fn add_document(
        &mut self,
        source: &Path,
        name: Option<&str>,
        auto_reload: bool,
    ) -> Result<IndexedDocument, DocumentError> {
        let store = self
            .ready_snapshot()
            .map(|live| Arc::clone(&live.store))
            .ok_or(DocumentError::NotReady(self.state))?;

        self.progress.read(1, Some(1), &source.display().to_string());
        let mut indexed = self.ingest_file(&store, source, name).await?;

        if auto_reload {
            self.reload_knowledge_base()
                .await
                .map_err(|source| DocumentError::Reload {
                    name: indexed.doc_name.clone(),
                    source,
                })?;
        }

        indexed.generation = self.generation();
        Ok(indexed)
    }

    async fn ingest_file(
        &self,
        store: &KnowledgeStoreHandle,
        source: &Path,
        name: Option<&str>,
    ) -> Result<IndexedDocument, DocumentError> {
        if !source.is_file() {
            return Err(DocumentError::NotFound(source.to_path_buf()));
        }

        let doc_name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| doc_name_for(source));
        let file_name = source
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| doc_name.clone());

        let unreadable = |reason: String| DocumentError::Unreadable {
            name: doc_name.clone(),
            reason,
        };
        let bytes = tokio::fs::read(source)
            .await
            .map_err(|e| unreadable(e.to_string()))?;
        let pages = self
            .collaborators
            .reader
            .read(source)
            .await
            .map_err(|e| unreadable(e.to_string()))?;

        let chunks = self.chunker.chunk_pages(&pages);
        if chunks.is_empty() {
            return Err(DocumentError::Empty(doc_name));
        }
        self.progress
            .chunk(pages.len() as u64, chunks.len() as u64, &doc_name);

        let written = store
            .ingest(
                IngestRequest {
                    doc_name: &doc_name,
                    file_name: &file_name,
                    bytes: &bytes,
                    chunks,
                },
                &self.settings.provenance,
                self.settings.batch_size,
                &self.progress,
            )
            .await?;

        tracing::info!(
            "Indexed '{}' from {} ({} page(s), {} chunk(s))",
            doc_name,
            file_name,
            pages.len(),
            written
        );

        Ok(IndexedDocument {
            doc_name,
            file_name,
            pages: pages.len(),
            chunks: written,
            generation: store.generation(),
        })
    }

    /// Index every PDF directly inside `dir` (default: the upload
    /// directory), then reload once if anything was indexed. Files are not
    /// marked; callers decide what to record.
    pub async fn auto_index_directory(&mut self, dir: Option<&Path>) -> ScanReport {
        let directory = dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.settings.upload_dir.clone());

        let files = match list_pdfs(&directory) {
            Ok(PdfListing::Missing) => {
                tracing::warn!("Document directory {} does not exist", directory.display());
                return ScanReport::new(directory, ScanOutcome::DirectoryMissing);
            }
            Ok(PdfListing::Files(files)) if files.is_empty() => {
                tracing::info!("No PDF found in {}", directory.display());
                return ScanReport::new(directory, ScanOutcome::Empty);
            }
            Ok(PdfListing::Files(files)) => files,
            Err(e) => {
                tracing::warn!("Could not list {}: {}", directory.display(), e);
                let reason = e.to_string();
                return ScanReport::new(directory, ScanOutcome::ListingFailed { reason });
            }
        };

        let Some(store) = self.ready_snapshot().map(|live| Arc::clone(&live.store)) else {
            tracing::warn!(
                "Skipping indexing of {}: knowledge store is {}",
                directory.display(),
                self.state
            );
            let state = self.state;
            return ScanReport::new(directory, ScanOutcome::NotReady { state });
        };

        self.progress
            .scan(files.len() as u64, &directory.display().to_string());
        let mut report = ScanReport::new(directory.clone(), ScanOutcome::Scanned);
        let total = files.len() as u64;

        for (i, file) in files.into_iter().enumerate() {
            self.progress.read(i as u64 + 1, Some(total), &file);
            match self.ingest_file(&store, &directory.join(&file), None).await {
                Ok(_) => report.indexed.push(file),
                Err(e) => {
                    tracing::warn!("Failed to index {}: {}", file, e);
                    report.failures.push(ScanFailure {
                        file,
                        error: e.to_string(),
                    });
                }
            }
        }

        if !report.indexed.is_empty() {
            if let Err(e) = self.reload_knowledge_base().await {
                report.reload_error = Some(e.to_string());
            }
        }

        tracing::info!(
            "Indexed {} of {} PDF(s) from {}",
            report.count(),
            total,
            directory.display()
        );
        report
    }

    /// PDF names in `dir` (default: the upload directory) not yet marked.
    pub fn check_for_new_documents(&self, dir: Option<&Path>) -> Vec<String> {
        let directory = dir.unwrap_or(&self.settings.upload_dir);
        match list_pdfs(directory) {
            Ok(listing) => self.registry.unmarked(listing.files()),
            Err(e) => {
                tracing::warn!("Could not list {}: {}", directory.display(), e);
                Vec::new()
            }
        }
    }

    /// Record `file_name` as indexed. Returns false if it already was.
    pub fn mark_as_indexed(&mut self, file_name: &str) -> bool {
        self.registry.mark(file_name)
    }

    /// Nearest passages; empty when not Ready or on failure.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<RetrievalResult> {
        match self.try_search(query, limit).await {
            Ok(results) => results,
            Err(SearchError::NotReady(state)) => {
                tracing::debug!("Search skipped: knowledge store is {}", state);
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("Search failed: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn try_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>, SearchError> {
        let live = self
            .ready_snapshot()
            .ok_or(SearchError::NotReady(self.state))?;
        live.search(query, limit).await
    }

    /// Answer `query` with the live agent. Never fails; see [`ChatOutcome`].
    pub async fn chat(
        &self,
        query: &str,
        history: &[ConversationTurn],
        memory_depth: usize,
    ) -> ChatOutcome {
        let start = Instant::now();
        if query.trim().is_empty() {
            return ChatOutcome {
                answer: Err(GenerationError::EmptyQuestion),
                duration: start.elapsed(),
                generation: self.live.as_ref().map(KnowledgeSnapshot::generation),
            };
        }

        match self.ready_snapshot() {
            Some(live) => live.chat(query, history, memory_depth).await,
            None => ChatOutcome {
                answer: Err(GenerationError::NotReady(self.state)),
                duration: start.elapsed(),
                generation: None,
            },
        }
    }

    /// Clear and physically remove the index, drop to Uninitialized, then
    /// initialize again. The file registry is kept.
    pub async fn force_cleanup(&mut self) -> Result<u64, CleanupError> {
        tracing::info!(
            "Forcing cleanup of {}",
            self.collaborators.backend.location()
        );

        if let Some(live) = self.live.take() {
            if let Err(e) = live.store.index().delete_all().await {
                tracing::warn!("Could not clear the index before removal: {}", e);
            }
        }
        self.state = CoordinatorState::Uninitialized;

        if let Err(e) = self.collaborators.backend.destroy().await {
            let error = CleanupError::Purge {
                location: self.collaborators.backend.location().to_string(),
                reason: e.to_string(),
            };
            tracing::error!("{}", error);
            self.last_error = Some(error.to_string());
            return Err(error);
        }

        Ok(self.initialize(false).await?)
    }

    pub async fn status(&self) -> StatusReport {
        let backend = &self.collaborators.backend;
        let (embedder, rows) = match &self.live {
            Some(live) => (Some(live.store.embedder_label()), live.store.count().await),
            None => (None, None),
        };

        StatusReport {
            state: self.state,
            generation: self.generation(),
            backend: backend.name().to_string(),
            location: backend.location().to_string(),
            table: backend.table().to_string(),
            embedder,
            rows,
            registry_size: self.registry.len(),
            last_error: self.last_error.clone(),
        }
    }
}
