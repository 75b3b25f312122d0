//! Index command handler.
//!
//! Indexes every PDF of a directory (the upload directory by default)
//! into the knowledge base.

use super::{knowledge_error, print_json};
use crate::context::{open_knowledge, ModelNeed, OpenOptions};
use bocs_core::{config::AppConfig, AppResult};
use bocs_knowledge::{ScanOutcome, ScanReport};
use clap::Args;
use std::path::PathBuf;

/// Index the PDFs of a directory
#[derive(Args, Debug)]
pub struct IndexCommand {
    /// Directory to scan (default: the upload directory)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Only list PDFs that have not been indexed yet
    #[arg(long)]
    pub check: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IndexCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing index command");

        let options = OpenOptions::new(ModelNeed::Optional).with_progress(!self.json);
        let mut ctx = open_knowledge(config, &options).await?;

        if self.check {
            let new_files = ctx.coordinator.check_for_new_documents(self.dir.as_deref());
            if self.json {
                return print_json(&new_files);
            }
            if new_files.is_empty() {
                println!("No new PDF");
            }
            for name in new_files {
                println!("{}", name);
            }
            return Ok(());
        }

        ctx.coordinator
            .initialize(false)
            .await
            .map_err(knowledge_error)?;

        let report = ctx
            .coordinator
            .auto_index_directory(self.dir.as_deref())
            .await;
        for name in &report.indexed {
            ctx.coordinator.mark_as_indexed(name);
        }

        if self.json {
            return print_json(&report);
        }
        println!("{}", summarize(&report));
        Ok(())
    }
}

/// One-paragraph summary of a directory scan.
pub(crate) fn summarize(report: &ScanReport) -> String {
    let dir = report.directory.display();
    let mut text = match &report.outcome {
        ScanOutcome::DirectoryMissing => format!("Directory {} does not exist", dir),
        ScanOutcome::Empty => format!("No PDF found in {}", dir),
        ScanOutcome::NotReady { state } => {
            format!("Knowledge store is {}; nothing indexed", state)
        }
        ScanOutcome::ListingFailed { reason } => format!("Could not list {}: {}", dir, reason),
        ScanOutcome::Scanned => format!("Indexed {} document(s) from {}", report.count(), dir),
    };
    for failure in &report.failures {
        text.push_str(&format!("\n  failed: {} ({})", failure.file, failure.error));
    }
    if let Some(error) = &report.reload_error {
        text.push_str(&format!("\nReload failed: {}", error));
    }
    text
}
