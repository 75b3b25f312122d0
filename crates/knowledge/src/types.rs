//! Core types for the knowledge store and its coordinator.

use crate::error::GenerationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Lifecycle state of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorState {
    Uninitialized,
    Ready,
    Failed,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CoordinatorState::Uninitialized => "uninitialized",
            CoordinatorState::Ready => "ready",
            CoordinatorState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Provenance metadata stored with every chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub doc_type: String,
    pub source_type: String,
    pub doc_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default)]
    pub chunk: u32,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub content_hash: String,
    pub indexed_at: DateTime<Utc>,
}

/// One passage returned by `search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Raw distance reported by the index (lower is closer)
    pub distance: f32,
    /// Derived relevance in `[0, 1]`
    pub similarity: f32,
    pub text: String,
    pub meta: DocumentMeta,
}

/// One question/answer exchange of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user: String,
    /// Empty when generation failed
    pub assistant: String,
    #[serde(default)]
    pub retrieved: Vec<RetrievalResult>,
    pub duration_secs: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub asked_at: DateTime<Utc>,
}

impl ConversationTurn {
    /// Record a finished exchange.
    pub fn from_outcome(
        user: impl Into<String>,
        outcome: &ChatOutcome,
        retrieved: Vec<RetrievalResult>,
    ) -> Self {
        let (assistant, error) = match &outcome.answer {
            Ok(text) => (text.clone(), None),
            Err(e) => (String::new(), Some(e.to_string())),
        };
        Self {
            user: user.into(),
            assistant,
            retrieved,
            duration_secs: outcome.duration.as_secs_f64(),
            success: outcome.success(),
            error,
            asked_at: Utc::now(),
        }
    }
}

/// Result of `chat`. Never an `Err`: failures live in `answer`.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub answer: Result<String, GenerationError>,
    pub duration: Duration,
    /// Generation of the handle that answered, if any
    pub generation: Option<u64>,
}

impl ChatOutcome {
    pub fn success(&self) -> bool {
        self.answer.is_ok()
    }

    /// Answer text, or the rendered failure.
    pub fn content(&self) -> String {
        match &self.answer {
            Ok(text) => text.clone(),
            Err(e) => format!("Error: {}", e),
        }
    }
}

/// How a directory scan ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanOutcome {
    DirectoryMissing,
    Empty,
    NotReady { state: CoordinatorState },
    ListingFailed { reason: String },
    Scanned,
}

/// A file that failed during a directory scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanFailure {
    pub file: String,
    pub error: String,
}

/// Result of `auto_index_directory`.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub directory: PathBuf,
    pub outcome: ScanOutcome,
    /// File names indexed successfully, in listing order
    pub indexed: Vec<String>,
    pub failures: Vec<ScanFailure>,
    /// Set when the reload after indexing failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload_error: Option<String>,
}

impl ScanReport {
    pub(crate) fn new(directory: PathBuf, outcome: ScanOutcome) -> Self {
        Self {
            directory,
            outcome,
            indexed: Vec::new(),
            failures: Vec::new(),
            reload_error: None,
        }
    }

    /// Number of documents indexed.
    pub fn count(&self) -> usize {
        self.indexed.len()
    }
}

/// Result of a successful `add_document`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedDocument {
    pub doc_name: String,
    pub file_name: String,
    pub pages: usize,
    pub chunks: usize,
    /// Handle generation after the call
    pub generation: u64,
}

/// Snapshot of the coordinator for status displays.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub state: CoordinatorState,
    pub generation: u64,
    pub backend: String,
    pub location: String,
    pub table: String,
    pub embedder: Option<String>,
    pub rows: Option<usize>,
    pub registry_size: usize,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&CoordinatorState::Ready).unwrap();
        assert_eq!(json, "\"ready\"");
        assert_eq!(CoordinatorState::Uninitialized.to_string(), "uninitialized");
    }

    #[test]
    fn test_failed_turn_has_empty_assistant() {
        let outcome = ChatOutcome {
            answer: Err(GenerationError::Agent("timeout".to_string())),
            duration: Duration::from_millis(0),
            generation: Some(1),
        };
        let turn = ConversationTurn::from_outcome("Question ?", &outcome, Vec::new());

        assert!(!turn.success);
        assert!(turn.assistant.is_empty());
        assert_eq!(turn.error.as_deref(), Some("generation failed: timeout"));
        assert_eq!(outcome.content(), "Error: generation failed: timeout");
    }

    #[test]
    fn test_meta_page_is_optional() {
        let json = r#"{
            "doc_type": "NDT_document",
            "source_type": "uploaded_pdf",
            "doc_name": "decree_12",
            "indexed_at": "2025-01-01T00:00:00Z"
        }"#;
        let meta: DocumentMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.page, None);
        assert_eq!(meta.chunk, 0);
    }

    #[test]
    fn test_scan_outcome_tagging() {
        let json = serde_json::to_value(ScanOutcome::NotReady {
            state: CoordinatorState::Failed,
        })
        .unwrap();
        assert_eq!(json["kind"], "not_ready");
        assert_eq!(json["state"], "failed");
    }
}
