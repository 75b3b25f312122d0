//! Reset command handler.

use super::{knowledge_error, print_json};
use crate::context::{open_knowledge, ModelNeed, OpenOptions};
use bocs_core::{config::AppConfig, AppResult};
use clap::Args;

/// Destroy the index and start from an empty one
#[derive(Args, Debug)]
pub struct ResetCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ResetCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing reset command");

        let mut ctx = open_knowledge(config, &OpenOptions::new(ModelNeed::Optional)).await?;
        let generation = ctx
            .coordinator
            .initialize(true)
            .await
            .map_err(knowledge_error)?;

        if self.json {
            return print_json(&ctx.coordinator.status().await);
        }
        println!(
            "Knowledge base '{}' reset (handle #{})",
            ctx.knowledge.name, generation
        );
        Ok(())
    }
}
