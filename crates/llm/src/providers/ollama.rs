//! Local chat models served by Ollama.
//!
//! Uses the non-streaming `POST /api/chat` endpoint. A missing model or an
//! unreachable daemon surfaces as `AppError::Llm`.

use crate::client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, LlmUsage};
use bocs_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// CPU-only hosts can take minutes on a long context.
const REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<SamplingOptions>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct SamplingOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    model: String,
    message: ChatMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    error: String,
}

/// Client for an Ollama daemon.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_OLLAMA_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn chat_request(request: &LlmRequest) -> ChatRequest {
        let options = request.has_sampling().then(|| SamplingOptions {
            temperature: request.temperature,
            top_p: request.top_p,
            num_predict: request.max_tokens,
        });

        ChatRequest {
            model: request.model.clone(),
            messages: request.messages(),
            options,
            stream: false,
        }
    }

    fn into_response(reply: ChatReply) -> LlmResponse {
        LlmResponse {
            content: reply.message.content,
            model: reply.model,
            usage: LlmUsage::new(reply.prompt_eval_count, reply.eval_count),
            done: reply.done_reason.as_deref() != Some("length"),
        }
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::info!("Sending chat request to Ollama at {}", self.base_url);
        tracing::debug!("Request model: {}", request.model);

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&Self::chat_request(request))
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Ollama unreachable at {}: {}", self.base_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorReply>(&body)
                .map(|reply| reply.error)
                .unwrap_or(body);
            return Err(AppError::Llm(format!(
                "Ollama error ({}) for model '{}': {}",
                status, request.model, message
            )));
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama reply: {}", e)))?;

        let converted = Self::into_response(reply);
        tracing::info!(
            "Received Ollama reply ({} tokens)",
            converted.usage.total_tokens
        );
        Ok(converted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChatRole;

    #[test]
    fn test_base_url_is_normalized() {
        let client = OllamaClient::with_base_url("http://gpu-box:11434/");
        assert_eq!(client.provider_name(), "ollama");
        assert_eq!(client.base_url, "http://gpu-box:11434");
    }

    #[test]
    fn test_chat_request_shape() {
        let request = LlmRequest::new("Which decree sets the budget?", "llama3.2")
            .with_system("Answer from the documents.")
            .with_temperature(0.1)
            .with_max_tokens(256);

        let body = serde_json::to_value(OllamaClient::chat_request(&request)).unwrap();
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "Which decree sets the budget?");
        assert_eq!(body["options"]["num_predict"], 256);
        assert!(body["options"].get("top_p").is_none());
    }

    #[test]
    fn test_options_omitted_without_sampling() {
        let body =
            serde_json::to_value(OllamaClient::chat_request(&LlmRequest::new("Hi", "llama3.2")))
                .unwrap();
        assert!(body.get("options").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_reply_conversion() {
        let reply: ChatReply = serde_json::from_str(
            r#"{"model":"llama3.2","message":{"role":"assistant","content":"Decree 12."},
                "done":true,"done_reason":"stop","prompt_eval_count":40,"eval_count":8}"#,
        )
        .unwrap();
        assert_eq!(reply.message.role, ChatRole::Assistant);

        let response = OllamaClient::into_response(reply);
        assert_eq!(response.content, "Decree 12.");
        assert_eq!(response.usage.total_tokens, 48);
        assert!(response.done);
    }

    #[test]
    fn test_truncated_reply_is_not_done() {
        let reply: ChatReply = serde_json::from_str(
            r#"{"model":"llama3.2","message":{"role":"assistant","content":"Decree"},"done_reason":"length"}"#,
        )
        .unwrap();
        let response = OllamaClient::into_response(reply);
        assert!(!response.done);
        assert_eq!(response.usage.total_tokens, 0);
    }
}
