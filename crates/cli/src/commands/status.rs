//! Status command handler.

use super::{format_status, print_json};
use crate::context::{open_knowledge, ModelNeed, OpenOptions};
use bocs_core::{config::AppConfig, AppResult};
use clap::Args;

/// Show the state of the knowledge base
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Also list PDFs of the upload directory not indexed in this session
    #[arg(long)]
    pub new: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing status command");

        let mut ctx = open_knowledge(config, &OpenOptions::new(ModelNeed::Optional)).await?;
        // A failed initialization is part of the status, not an error.
        if let Err(e) = ctx.coordinator.initialize(false).await {
            tracing::debug!("Status of a store that failed to open: {}", e);
        }

        let status = ctx.coordinator.status().await;
        let new_files = if self.new {
            Some(ctx.coordinator.check_for_new_documents(None))
        } else {
            None
        };

        if self.json {
            let mut output = serde_json::to_value(&status)?;
            if let (Some(files), Some(map)) = (&new_files, output.as_object_mut()) {
                map.insert("newDocuments".to_string(), serde_json::json!(files));
            }
            return print_json(&output);
        }

        println!("Knowledge base: {}", ctx.knowledge.name);
        println!("{}", format_status(&status));
        println!("Upload dir: {}", ctx.coordinator.upload_dir().display());
        if let Some(files) = new_files {
            println!("New PDFs:   {}", files.len());
            for name in files {
                println!("  - {}", name);
            }
        }
        Ok(())
    }
}
