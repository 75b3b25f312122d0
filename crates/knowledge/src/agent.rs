//! Answering agent: retrieval, persona prompt, LLM call.
//!
//! An agent is bound to one store handle. The coordinator asks its
//! [`AgentFactory`] for a new agent each time it publishes a handle, so an
//! agent never outlives the data it retrieves from.

use crate::store::KnowledgeStoreHandle;
use crate::types::RetrievalResult;
use bocs_core::{AppError, AppResult};
use bocs_llm::{LlmClient, LlmRequest};
use bocs_prompt::{build_prompt, PromptDefinition};
use std::collections::HashMap;
use std::sync::Arc;

/// What the agent is asked.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRequest {
    /// Question with the recent conversation prepended
    pub prompt: String,
    /// The bare question, used for retrieval
    pub query: String,
}

#[async_trait::async_trait]
pub trait AnsweringAgent: Send + Sync {
    async fn run(&self, request: &AgentRequest) -> AppResult<String>;
}

/// Builds the agent for a freshly published handle.
pub trait AgentFactory: Send + Sync {
    fn build(&self, store: Arc<KnowledgeStoreHandle>) -> AppResult<Arc<dyn AnsweringAgent>>;
}

/// Retrieval-augmented agent backed by an [`LlmClient`].
pub struct RagAgent {
    store: Arc<KnowledgeStoreHandle>,
    llm: Arc<dyn LlmClient>,
    persona: PromptDefinition,
    model: String,
    top_k: usize,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

/// Render passages as `[doc p.N] text` blocks.
pub fn format_passages(passages: &[RetrievalResult]) -> String {
    passages
        .iter()
        .map(|p| match p.meta.page {
            Some(page) => format!("[{} p.{}] {}", p.meta.doc_name, page, p.text),
            None => format!("[{}] {}", p.meta.doc_name, p.text),
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[async_trait::async_trait]
impl AnsweringAgent for RagAgent {
    async fn run(&self, request: &AgentRequest) -> AppResult<String> {
        let passages = match self.store.retrieve(&request.query, self.top_k).await {
            Ok(passages) => passages,
            Err(e) => {
                tracing::warn!("Retrieval failed, answering without passages: {}", e);
                Vec::new()
            }
        };

        tracing::debug!(
            "Agent '{}' retrieved {} passage(s) from handle #{}",
            self.persona.id,
            passages.len(),
            self.store.generation()
        );

        let context = if passages.is_empty() {
            None
        } else {
            Some(format_passages(&passages))
        };

        let mut variables = HashMap::new();
        variables.insert("prompt".to_string(), request.prompt.clone());
        let built = build_prompt(&self.persona, variables, context)?;

        let mut llm_request = LlmRequest::new(built.user, self.model.clone());
        if let Some(system) = built.system {
            llm_request = llm_request.with_system(system);
        }
        if let Some(temperature) = self.temperature {
            llm_request = llm_request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            llm_request = llm_request.with_max_tokens(max_tokens);
        }

        let response = self.llm.complete(&llm_request).await?;
        if response.content.trim().is_empty() {
            return Err(AppError::Llm(format!(
                "{} returned an empty answer",
                self.llm.provider_name()
            )));
        }
        Ok(response.content)
    }
}

/// Builds a [`RagAgent`] per handle with a fixed persona and model.
pub struct LlmAgentFactory {
    llm: Arc<dyn LlmClient>,
    persona: PromptDefinition,
    model: String,
    top_k: usize,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl LlmAgentFactory {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        persona: PromptDefinition,
        model: impl Into<String>,
        top_k: usize,
    ) -> Self {
        Self {
            llm,
            persona,
            model: model.into(),
            top_k,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

impl AgentFactory for LlmAgentFactory {
    fn build(&self, store: Arc<KnowledgeStoreHandle>) -> AppResult<Arc<dyn AnsweringAgent>> {
        if self.model.trim().is_empty() {
            return Err(AppError::Config("No chat model configured".to_string()));
        }
        Ok(Arc::new(RagAgent {
            store,
            llm: Arc::clone(&self.llm),
            persona: self.persona.clone(),
            model: self.model.clone(),
            top_k: self.top_k.max(1),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }))
    }
}
