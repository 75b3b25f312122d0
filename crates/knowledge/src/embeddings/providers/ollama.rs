//! Embeddings from a local Ollama daemon.
//!
//! Uses the batched `POST /api/embed` endpoint (`nomic-embed-text` and
//! friends). Transient failures are retried with exponential backoff.
//!
//! ```no_run
//! use bocs_knowledge::embeddings::{EmbeddingConfig, EmbeddingProvider};
//! use bocs_knowledge::embeddings::providers::OllamaProvider;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EmbeddingConfig {
//!     provider: "ollama".to_string(),
//!     model: "nomic-embed-text".to_string(),
//!     dimensions: 768,
//!     ..Default::default()
//! };
//! let provider = OllamaProvider::new(config).await?;
//! provider.health_check().await?;
//! let vector = provider.embed("Décret n° 12").await?;
//! assert_eq!(vector.len(), 768);
//! # Ok(())
//! # }
//! ```

use crate::embeddings::{EmbeddingConfig, EmbeddingProvider};
use async_trait::async_trait;
use bocs_core::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const ATTEMPTS: u32 = 3;
const FIRST_BACKOFF_MS: u64 = 200;
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbedReply {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    error: String,
}

/// Embedder backed by Ollama.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OllamaProvider {
    /// Endpoint resolution: config, then `OLLAMA_URL`, then localhost.
    /// Nothing is sent until the first embed or health check.
    pub async fn new(config: EmbeddingConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Knowledge(format!("Ollama HTTP client: {}", e)))?;

        let base_url = config
            .endpoint
            .or_else(|| std::env::var("OLLAMA_URL").ok())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model,
            dimensions: config.dimensions,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self, inputs), fields(batch = inputs.len(), model = %self.model))]
    async fn embed_with_backoff(&self, inputs: &[&str]) -> AppResult<Vec<Vec<f32>>> {
        let mut backoff = Duration::from_millis(FIRST_BACKOFF_MS);
        let mut attempt = 1;
        loop {
            match self.request(inputs).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if attempt < ATTEMPTS => {
                    warn!(
                        "Ollama embed failed (attempt {}/{}): {}; retrying in {:?}",
                        attempt, ATTEMPTS, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request(&self, inputs: &[&str]) -> AppResult<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&EmbedRequest {
                model: &self.model,
                input: inputs,
            })
            .send()
            .await
            .map_err(|e| AppError::Knowledge(format!("Ollama unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorReply>(&body)
                .map(|reply| reply.error)
                .unwrap_or(body);
            return Err(AppError::Knowledge(format!(
                "Ollama embed error ({}): {}",
                status, message
            )));
        }

        let reply: EmbedReply = response
            .json()
            .await
            .map_err(|e| AppError::Knowledge(format!("Malformed Ollama embed reply: {}", e)))?;
        self.check_reply(inputs.len(), reply.embeddings)
    }

    fn check_reply(&self, expected: usize, vectors: Vec<Vec<f32>>) -> AppResult<Vec<Vec<f32>>> {
        if vectors.len() != expected {
            return Err(AppError::Knowledge(format!(
                "Ollama returned {} embeddings for {} inputs",
                vectors.len(),
                expected
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(AppError::Knowledge(format!(
                "Ollama model '{}' returned {} dimensions, expected {}",
                self.model,
                bad.len(),
                self.dimensions
            )));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AppError::Knowledge("Cannot embed empty text".to_string()));
        }
        let mut vectors = self.embed_with_backoff(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| AppError::Knowledge("Ollama returned no embedding".to_string()))
    }

    /// Blank entries get a zero vector and are not sent.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let inputs: Vec<&str> = texts
            .iter()
            .map(String::as_str)
            .filter(|t| !t.trim().is_empty())
            .collect();

        let vectors = if inputs.is_empty() {
            Vec::new()
        } else {
            self.embed_with_backoff(&inputs).await?
        };
        let mut sent = vectors.into_iter();

        texts
            .iter()
            .map(|text| {
                if text.trim().is_empty() {
                    Ok(vec![0.0; self.dimensions])
                } else {
                    sent.next().ok_or_else(|| {
                        AppError::Knowledge("Ollama returned too few embeddings".to_string())
                    })
                }
            })
            .collect()
    }

    async fn health_check(&self) -> AppResult<()> {
        debug!("Checking Ollama at {}", self.base_url);
        self.embed_with_backoff(&["health check"]).await.map_err(|e| {
            AppError::Knowledge(format!(
                "Ollama not available at {} ({}). Start it and run: ollama pull {}",
                self.base_url, e, self.model
            ))
        })?;
        debug!("Ollama model '{}' ready", self.model);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn provider(endpoint: &str) -> OllamaProvider {
        OllamaProvider::new(EmbeddingConfig {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 4,
            endpoint: Some(endpoint.to_string()),
            ..Default::default()
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_configured_endpoint_wins() {
        let provider = provider("http://ollama:11434/").await;
        assert_eq!(provider.base_url(), "http://ollama:11434");
        assert_eq!(provider.dimensions(), 4);
        assert_eq!(provider.model_name(), "nomic-embed-text");
    }

    #[test]
    fn test_request_body() {
        let body = serde_json::to_value(EmbedRequest {
            model: "nomic-embed-text",
            input: &["a", "b"],
        })
        .unwrap();
        assert_eq!(body["input"], serde_json::json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_reply_is_checked() {
        let provider = provider("http://127.0.0.1:9").await;
        assert!(provider.check_reply(1, vec![vec![0.1; 4]]).is_ok());

        let short = provider.check_reply(2, vec![vec![0.1; 4]]).unwrap_err();
        assert!(short.to_string().contains("1 embeddings for 2 inputs"));

        let wrong = provider.check_reply(1, vec![vec![0.1; 3]]).unwrap_err();
        assert!(wrong.to_string().contains("returned 3 dimensions, expected 4"));
    }

    #[tokio::test]
    async fn test_blank_inputs_skip_the_network() {
        let provider = provider("http://127.0.0.1:9").await;
        assert!(provider.embed("   ").await.is_err());

        let vectors = provider
            .embed_batch(&["".to_string(), "  ".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![0.0; 4], vec![0.0; 4]]);
    }

    #[tokio::test]
    async fn test_health_check_fails_when_unreachable() {
        let provider = provider("http://127.0.0.1:9").await;
        let err = provider.health_check().await.unwrap_err();
        assert!(err.to_string().contains("Ollama not available"));
    }
}
