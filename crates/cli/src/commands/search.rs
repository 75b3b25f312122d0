//! Search command handler.

use super::{knowledge_error, print_json};
use crate::context::{open_knowledge, ModelNeed, OpenOptions};
use bocs_core::{config::AppConfig, AppResult};
use bocs_knowledge::session::{format_source, preview, LATEST_PREVIEW_CHARS};
use clap::Args;

/// Retrieve the passages nearest to a query
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// The search query
    pub query: String,

    /// Maximum number of passages
    #[arg(short, long, default_value = "5")]
    pub limit: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing search command");

        let mut ctx = open_knowledge(config, &OpenOptions::new(ModelNeed::Optional)).await?;
        ctx.coordinator
            .initialize(false)
            .await
            .map_err(knowledge_error)?;

        let results = ctx
            .coordinator
            .try_search(&self.query, self.limit.max(1))
            .await
            .map_err(knowledge_error)?;

        if self.json {
            return print_json(&results);
        }

        if results.is_empty() {
            println!("No passage found for '{}'", self.query);
            return Ok(());
        }
        for (i, result) in results.iter().enumerate() {
            println!("{}. {}", i + 1, format_source(result));
            println!("   {}", preview(result.text.trim(), LATEST_PREVIEW_CHARS));
        }
        Ok(())
    }
}
