//! Add command handler.

use super::{knowledge_error, print_json};
use crate::context::{open_knowledge, ModelNeed, OpenOptions};
use bocs_core::{config::AppConfig, AppResult};
use clap::Args;
use std::path::PathBuf;

/// Index a single document
#[derive(Args, Debug)]
pub struct AddCommand {
    /// Path to the document
    pub file: PathBuf,

    /// Logical document name (default: the file stem)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Skip the reload after indexing
    #[arg(long)]
    pub no_reload: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AddCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing add command");
        tracing::debug!("Add command options: {:?}", self);

        let options = OpenOptions::new(ModelNeed::Optional).with_progress(!self.json);
        let mut ctx = open_knowledge(config, &options).await?;
        ctx.coordinator
            .initialize(false)
            .await
            .map_err(knowledge_error)?;

        let indexed = ctx
            .coordinator
            .add_document(&self.file, self.name.as_deref(), !self.no_reload)
            .await
            .map_err(knowledge_error)?;
        ctx.coordinator.mark_as_indexed(&indexed.file_name);

        if self.json {
            return print_json(&indexed);
        }
        println!(
            "Indexed '{}' ({} page(s), {} chunk(s), handle #{})",
            indexed.doc_name, indexed.pages, indexed.chunks, indexed.generation
        );
        Ok(())
    }
}
