//! Provider-agnostic completion types and the `LlmClient` trait.
//!
//! Every provider chatBOCS talks to speaks a chat-message protocol, so a
//! request carries one optional system instruction and one user turn.

use bocs_core::AppResult;
use serde::{Deserialize, Serialize};

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message of a chat exchange, in the wire shape shared by Ollama and
/// the OpenAI-compatible APIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// User turn: the assembled prompt with context and question
    pub prompt: String,

    /// Model identifier (e.g. "llama-3.3-70b-versatile")
    pub model: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// System instruction sent ahead of the user turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            top_p: None,
            system: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// The request as chat messages: the system instruction, if any,
    /// followed by the user turn.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.system
            .iter()
            .map(|system| ChatMessage::new(ChatRole::System, system.clone()))
            .chain(std::iter::once(ChatMessage::new(
                ChatRole::User,
                self.prompt.clone(),
            )))
            .collect()
    }

    /// Whether any sampling parameter was set.
    pub fn has_sampling(&self) -> bool {
        self.temperature.is_some() || self.top_p.is_some() || self.max_tokens.is_some()
    }
}

/// A finished completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,

    /// Model that actually answered, as reported by the provider
    pub model: String,

    pub usage: LlmUsage,

    /// False when generation stopped on the token limit
    #[serde(default = "default_done")]
    pub done: bool,
}

fn default_done() -> bool {
    true
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LlmUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl LlmUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// A chat model provider (Groq, OpenAI, Ollama).
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Short provider name used in logs and errors.
    fn provider_name(&self) -> &str;

    /// Run one non-streaming completion.
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;
}
