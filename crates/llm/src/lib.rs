//! LLM integration crate for chatBOCS.
//!
//! This crate provides a provider-agnostic abstraction for the chat models
//! that generate answers from retrieved passages.
//!
//! # Providers
//! - **Groq** (default) and **OpenAI** through the OpenAI-compatible API
//! - **Ollama**: local LLM runtime
//!
//! # Example
//! ```no_run
//! use bocs_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Hello, world!", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{ChatMessage, ChatRole, LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiCompatibleClient};
pub use types::ProviderType;
