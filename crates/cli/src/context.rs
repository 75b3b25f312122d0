//! Wiring from configuration to a ready-to-use knowledge coordinator.

use bocs_core::{config::AppConfig, AppError, AppResult};
use bocs_knowledge::progress::ProgressCallback;
use bocs_knowledge::{
    open_coordinator, KnowledgeConfig, KnowledgeCoordinator, LlmAgentFactory, ProgressReporter,
};
use bocs_llm::{create_client, LlmClient, LlmRequest, LlmResponse};
use bocs_prompt::load_prompt;
use std::sync::Arc;

/// How a command uses the chat model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelNeed {
    /// The command answers questions; a missing client is an error.
    Required,
    /// The command only indexes or searches; a missing client is logged.
    Optional,
}

#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Persona id overriding the knowledge base setting
    pub persona: Option<String>,
    pub llm: ModelNeed,
    /// Print indexing progress to stderr
    pub progress: bool,
}

impl OpenOptions {
    pub fn new(llm: ModelNeed) -> Self {
        Self {
            persona: None,
            llm,
            progress: false,
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }
}

/// A knowledge base opened for one command or server.
pub struct KnowledgeContext {
    pub knowledge: KnowledgeConfig,
    pub coordinator: KnowledgeCoordinator,
}

/// Load the knowledge base config, build the answering agent factory and an
/// uninitialized coordinator.
pub async fn open_knowledge(config: &AppConfig, options: &OpenOptions) -> AppResult<KnowledgeContext> {
    let knowledge = KnowledgeConfig::load(&config.workspace, &config.knowledge_base)?;

    let persona_id = options.persona.as_deref().unwrap_or(&knowledge.persona);
    let persona = load_prompt(&config.workspace, persona_id)?;
    tracing::debug!("Answering persona: {}", persona.id);

    let llm = connect_llm(config, options.llm)?;
    let temperature = config.llm.as_ref().and_then(|l| l.temperature);
    let max_tokens = config.llm.as_ref().and_then(|l| l.max_tokens);
    let agents = LlmAgentFactory::new(llm, persona, config.model.clone(), knowledge.retrieval.top_k)
        .with_temperature(temperature)
        .with_max_tokens(max_tokens);

    let mut coordinator = open_coordinator(&config.workspace, &knowledge, Arc::new(agents)).await?;
    if options.progress {
        let callback: ProgressCallback = Arc::new(|event| eprintln!("{}", event.format_simple()));
        coordinator = coordinator.with_progress(ProgressReporter::new(callback));
    }

    Ok(KnowledgeContext {
        knowledge,
        coordinator,
    })
}

fn connect_llm(config: &AppConfig, usage: ModelNeed) -> AppResult<Arc<dyn LlmClient>> {
    let endpoint = config.resolve_endpoint(&config.provider);
    let api_key = config.resolve_api_key(&config.provider);

    match create_client(&config.provider, endpoint.as_deref(), api_key.as_deref()) {
        Ok(client) => Ok(client),
        Err(reason) if usage == ModelNeed::Optional => {
            tracing::debug!("Chat model unavailable: {}", reason);
            Ok(Arc::new(UnavailableLlm {
                provider: config.provider.clone(),
                reason,
            }))
        }
        Err(reason) => Err(AppError::Config(reason)),
    }
}

/// Stands in for a provider that could not be configured, so indexing and
/// search commands still run.
struct UnavailableLlm {
    provider: String,
    reason: String,
}

#[async_trait::async_trait]
impl LlmClient for UnavailableLlm {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    async fn complete(&self, _request: &LlmRequest) -> AppResult<LlmResponse> {
        Err(AppError::Llm(format!(
            "{} is not available: {}",
            self.provider, self.reason
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn offline_config(workspace: &TempDir) -> AppConfig {
        AppConfig {
            workspace: workspace.path().to_path_buf(),
            provider: "groq".to_string(),
            api_key: None,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_optional_llm_falls_back() {
        let workspace = TempDir::new().unwrap();
        let config = offline_config(&workspace);
        if config.resolve_api_key("groq").is_some() {
            return;
        }

        let client = connect_llm(&config, ModelNeed::Optional).unwrap();
        let err = client
            .complete(&LlmRequest::new("q", "m"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("requires API key"));

        assert!(connect_llm(&config, ModelNeed::Required).is_err());
    }

    #[test]
    fn test_open_options_builder() {
        let options = OpenOptions::new(ModelNeed::Optional)
            .with_persona("agent.service")
            .with_progress(true);
        assert_eq!(options.persona.as_deref(), Some("agent.service"));
        assert!(options.progress);
        assert_eq!(options.llm, ModelNeed::Optional);
    }
}
