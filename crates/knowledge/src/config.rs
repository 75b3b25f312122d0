//! Knowledge base configuration management.
//!
//! Each base keeps its settings in `.bocs/knowledge/<base>/config.yaml`.
//! Missing files and missing sections fall back to the defaults below.

use crate::embeddings::EmbeddingConfig;
use bocs_core::config::STATE_DIR;
use bocs_core::{AppError, AppResult};
use bocs_prompt::DASHBOARD_PERSONA;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Vector store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Lancedb,
    Qdrant,
    Memory,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreBackend::Lancedb => "lancedb",
            StoreBackend::Qdrant => "qdrant",
            StoreBackend::Memory => "memory",
        };
        f.write_str(s)
    }
}

/// Where vectors live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Directory for lancedb (relative to the workspace), URL for qdrant
    #[serde(default = "default_location")]
    pub location: String,

    /// Table (lancedb) or collection (qdrant) name
    #[serde(default = "default_table")]
    pub table: String,

    /// Environment variable holding the qdrant API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_location() -> String {
    "tmp/lancedb".to_string()
}

fn default_table() -> String {
    "vectors".to_string()
}

fn default_api_key_env() -> String {
    "QDRANT_API_KEY".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            location: default_location(),
            table: default_table(),
            api_key_env: default_api_key_env(),
        }
    }
}

/// Chunk size and overlap in characters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentsConfig {
    /// Directory scanned for PDFs and receiving uploads
    pub upload_dir: String,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            upload_dir: "documents_pdf".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub memory_depth: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            memory_depth: 3,
        }
    }
}

/// Provenance stamped on every indexed chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub doc_type: String,
    pub source_type: String,
}

impl Default for Provenance {
    fn default() -> Self {
        Self {
            doc_type: "NDT_document".to_string(),
            source_type: "uploaded_pdf".to_string(),
        }
    }
}

/// Full configuration of one knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub provenance: Provenance,
    /// Persona id rendered by the answering agent
    #[serde(default = "default_persona")]
    pub persona: String,
}

fn default_description() -> String {
    "BOCS knowledge base of official documents".to_string()
}

fn default_persona() -> String {
    DASHBOARD_PERSONA.to_string()
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            name: "bocs".to_string(),
            description: default_description(),
            store: StoreConfig::default(),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            documents: DocumentsConfig::default(),
            retrieval: RetrievalConfig::default(),
            provenance: Provenance::default(),
            persona: default_persona(),
        }
    }
}

impl KnowledgeConfig {
    /// Load the config of `base_name`, or defaults when no file exists.
    pub fn load(workspace: &Path, base_name: &str) -> AppResult<Self> {
        let config_path = get_config_path(workspace, base_name);

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).map_err(|e| {
                AppError::Knowledge(format!("Failed to read config at {:?}: {}", config_path, e))
            })?;

            let config: KnowledgeConfig = serde_yaml::from_str(&content).map_err(|e| {
                AppError::Knowledge(format!("Failed to parse config at {:?}: {}", config_path, e))
            })?;

            tracing::debug!("Loaded knowledge base config for '{}'", base_name);
            config
        } else {
            tracing::debug!(
                "Using default knowledge base config for '{}' (no config file found)",
                base_name
            );
            KnowledgeConfig::default()
        };

        // Ensure name matches
        config.name = base_name.to_string();
        config.validate()?;
        Ok(config)
    }

    /// Write the config to `.bocs/knowledge/<name>/config.yaml`.
    pub fn save(&self, workspace: &Path) -> AppResult<()> {
        let config_path = get_config_path(workspace, &self.name);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Knowledge(format!("Failed to create config directory: {}", e))
            })?;
        }

        let yaml = serde_yaml::to_string(self)
            .map_err(|e| AppError::Knowledge(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, yaml).map_err(|e| {
            AppError::Knowledge(format!("Failed to write config to {:?}: {}", config_path, e))
        })?;

        tracing::debug!("Saved knowledge base config for '{}'", self.name);
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if self.chunking.chunk_size == 0 {
            return Err(AppError::Knowledge(
                "chunking.chunkSize must be greater than zero".to_string(),
            ));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(AppError::Knowledge(format!(
                "chunking.chunkOverlap ({}) must be smaller than chunkSize ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.embedding.dimensions == 0 {
            return Err(AppError::Knowledge(
                "embedding.dimensions must be greater than zero".to_string(),
            ));
        }
        if self.store.table.trim().is_empty() {
            return Err(AppError::Knowledge("store.table cannot be empty".to_string()));
        }
        if self.retrieval.top_k == 0 {
            return Err(AppError::Knowledge(
                "retrieval.topK must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Store location as handed to the backend. Relative lancedb paths are
    /// resolved against the workspace.
    pub fn store_location(&self, workspace: &Path) -> String {
        match self.store.backend {
            StoreBackend::Lancedb => resolve(workspace, &self.store.location)
                .to_string_lossy()
                .to_string(),
            StoreBackend::Qdrant | StoreBackend::Memory => self.store.location.clone(),
        }
    }

    /// Absolute upload directory.
    pub fn upload_dir(&self, workspace: &Path) -> PathBuf {
        resolve(workspace, &self.documents.upload_dir)
    }
}

fn resolve(workspace: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

/// Get the base directory for a knowledge base.
pub fn get_base_dir(workspace: &Path, base_name: &str) -> PathBuf {
    workspace.join(STATE_DIR).join("knowledge").join(base_name)
}

/// Get the path to a base's config file.
pub fn get_config_path(workspace: &Path, base_name: &str) -> PathBuf {
    get_base_dir(workspace, base_name).join("config.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let config = KnowledgeConfig::load(temp.path(), "test-base").unwrap();

        assert_eq!(config.name, "test-base");
        assert_eq!(config.store.backend, StoreBackend::Lancedb);
        assert_eq!(config.store.table, "vectors");
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.memory_depth, 3);
        assert_eq!(config.provenance.doc_type, "NDT_document");
        assert_eq!(config.persona, "agent.dashboard");
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let mut config = KnowledgeConfig {
            name: "my-base".to_string(),
            ..Default::default()
        };
        config.chunking.chunk_size = 500;
        config.store.backend = StoreBackend::Memory;

        config.save(temp.path()).unwrap();

        let loaded = KnowledgeConfig::load(temp.path(), "my-base").unwrap();
        assert_eq!(loaded.chunking.chunk_size, 500);
        assert_eq!(loaded.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = get_config_path(temp.path(), "svc");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "store:\n  backend: qdrant\n  location: http://localhost:6333\n  table: pole-suivi\npersona: agent.service\n",
        )
        .unwrap();

        let config = KnowledgeConfig::load(temp.path(), "svc").unwrap();
        assert_eq!(config.store.backend, StoreBackend::Qdrant);
        assert_eq!(config.store.api_key_env, "QDRANT_API_KEY");
        assert_eq!(config.store_location(temp.path()), "http://localhost:6333");
        assert_eq!(config.persona, "agent.service");
        assert_eq!(config.documents.upload_dir, "documents_pdf");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let mut config = KnowledgeConfig::default();
        config.chunking.chunk_overlap = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_paths_resolve_against_workspace() {
        let temp = TempDir::new().unwrap();
        let config = KnowledgeConfig::default();

        assert_eq!(
            config.upload_dir(temp.path()),
            temp.path().join("documents_pdf")
        );
        assert_eq!(
            config.store_location(temp.path()),
            temp.path().join("tmp/lancedb").to_string_lossy()
        );
    }
}
