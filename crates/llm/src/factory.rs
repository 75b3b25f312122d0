//! LLM provider factory.
//!
//! This module creates chat clients from a provider name, an optional
//! endpoint override and an optional API key.

use crate::client::LlmClient;
use crate::providers::ollama::DEFAULT_OLLAMA_URL;
use crate::providers::openai::{GROQ_BASE_URL, OPENAI_BASE_URL};
use crate::providers::{OllamaClient, OpenAiCompatibleClient};
use crate::types::ProviderType;
use std::sync::Arc;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("groq", "openai", "ollama")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - Optional API key (for providers that require it)
///
/// # Errors
/// Returns error if:
/// - Provider is unknown
/// - Required secrets are missing
/// - Client initialization fails
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> Result<Arc<dyn LlmClient>, String> {
    let provider_type =
        ProviderType::parse(provider).ok_or_else(|| format!("Unknown provider: {}", provider))?;

    match provider_type {
        ProviderType::Ollama => {
            let base_url = endpoint.unwrap_or(DEFAULT_OLLAMA_URL);
            Ok(Arc::new(OllamaClient::with_base_url(base_url)))
        }
        ProviderType::Groq | ProviderType::OpenAI => {
            let (label, default_url) = if provider_type == ProviderType::Groq {
                ("Groq", GROQ_BASE_URL)
            } else {
                ("OpenAI", OPENAI_BASE_URL)
            };
            let api_key = api_key.ok_or_else(|| format!("{} provider requires API key", label))?;
            let client = OpenAiCompatibleClient::new(
                provider_type.as_str(),
                endpoint.unwrap_or(default_url),
                api_key,
            )
            .map_err(|e| e.to_string())?;
            Ok(Arc::new(client))
        }
    }
}
