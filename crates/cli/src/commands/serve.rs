//! Serve command handler.

use crate::context::{open_knowledge, ModelNeed, OpenOptions};
use crate::server::{self, AppState, ServiceSettings};
use bocs_core::{config::AppConfig, AppError, AppResult};
use bocs_prompt::SERVICE_PERSONA;
use clap::Args;

/// Run the HTTP and WebSocket service
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// Listen address (default: server.bind, 0.0.0.0:8000)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Origin allowed by CORS (default: server.allowedOrigin)
    #[arg(long)]
    pub allowed_origin: Option<String>,

    /// Persona used to answer
    #[arg(long, default_value = SERVICE_PERSONA)]
    pub persona: String,

    /// Skip loading the upload directory into an empty store at startup
    #[arg(long)]
    pub no_initial_load: bool,
}

impl ServeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing serve command");

        let options = OpenOptions::new(ModelNeed::Required).with_persona(self.persona.clone());
        let mut ctx = open_knowledge(config, &options).await?;

        if self.no_initial_load {
            if let Err(e) = ctx.coordinator.initialize(false).await {
                tracing::error!("Starting without a knowledge store: {}", e);
            }
        } else {
            server::prepare(&mut ctx.coordinator).await;
        }

        let retrieval = ctx.knowledge.retrieval;
        let state = AppState::new(
            ctx.coordinator,
            ServiceSettings {
                top_k: retrieval.top_k,
                memory_depth: retrieval.memory_depth,
            },
        );

        let bind = self.bind.as_deref().unwrap_or(&config.server.bind);
        let origin = self
            .allowed_origin
            .as_deref()
            .unwrap_or(&config.server.allowed_origin);

        server::serve(state, bind, origin, config.server.max_upload_bytes)
            .await
            .map_err(|e| AppError::Server(format!("{:#}", e)))
    }
}
