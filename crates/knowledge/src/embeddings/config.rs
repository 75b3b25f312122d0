//! Embedding configuration for a knowledge base.

use serde::{Deserialize, Serialize};

/// Embedding settings, the `embedding` section of the base config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfig {
    /// Provider name: "trigram" or "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Provider endpoint override (Ollama: `OLLAMA_URL` or localhost otherwise)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Maximum texts per embedding call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    100
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
            batch_size: default_batch_size(),
        }
    }
}

impl EmbeddingConfig {
    /// Short label used in logs and status output.
    pub fn label(&self) -> String {
        format!("{}/{} ({}d)", self.provider, self.model, self.dimensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.provider, "trigram");
        assert_eq!(config.dimensions, 384);
        assert_eq!(config.label(), "trigram/trigram-v1 (384d)");
    }

    #[test]
    fn test_batch_size_defaults_when_missing() {
        let yaml = "provider: ollama\nmodel: nomic-embed-text\ndimensions: 768\n";
        let config: EmbeddingConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.batch_size, 100);
        assert!(config.endpoint.is_none());
    }
}
