//! Purge command handler.

use super::{knowledge_error, print_json};
use crate::context::{open_knowledge, ModelNeed, OpenOptions};
use bocs_core::{config::AppConfig, AppResult};
use clap::Args;

/// Clear and physically remove the index, then reopen it
#[derive(Args, Debug)]
pub struct PurgeCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl PurgeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing purge command");

        let mut ctx = open_knowledge(config, &OpenOptions::new(ModelNeed::Optional)).await?;
        if let Err(e) = ctx.coordinator.initialize(false).await {
            tracing::warn!("Purging a store that failed to open: {}", e);
        }

        let generation = ctx
            .coordinator
            .force_cleanup()
            .await
            .map_err(knowledge_error)?;

        if self.json {
            return print_json(&ctx.coordinator.status().await);
        }
        println!(
            "Knowledge base '{}' purged (handle #{})",
            ctx.knowledge.name, generation
        );
        Ok(())
    }
}
