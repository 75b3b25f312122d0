//! Ask command handler.
//!
//! Answers a single question from the knowledge base and prints the
//! sources the answer was grounded on.

use super::{knowledge_error, print_json};
use crate::context::{open_knowledge, ModelNeed, OpenOptions};
use bocs_core::{config::AppConfig, AppError, AppResult};
use bocs_knowledge::session::{format_source, preview, LATEST_PREVIEW_CHARS};
use bocs_knowledge::{ChatSession, LatencyBadge};
use clap::Args;
use std::path::PathBuf;

/// Ask a question about the indexed documents
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Persona used to answer (default: the knowledge base persona)
    #[arg(long)]
    pub persona: Option<String>,

    /// Number of passages retrieved (1-50)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self
            .get_question()?
            .ok_or_else(|| AppError::Config("No question provided".to_string()))?;

        let mut options = OpenOptions::new(ModelNeed::Required);
        options.persona = self.persona.clone();
        let mut ctx = open_knowledge(config, &options).await?;
        ctx.coordinator
            .initialize(false)
            .await
            .map_err(knowledge_error)?;

        let top_k = self.top_k.unwrap_or(ctx.knowledge.retrieval.top_k);
        let mut session = ChatSession::new(top_k, 0)?;
        let turn = session
            .ask(&ctx.coordinator, &question)
            .await
            .map_err(knowledge_error)?;

        if !turn.success {
            return Err(AppError::Llm(
                turn.error
                    .clone()
                    .unwrap_or_else(|| "generation failed".to_string()),
            ));
        }

        if self.json {
            let output = serde_json::json!({
                "question": turn.user,
                "answer": turn.assistant,
                "durationSeconds": turn.duration_secs,
                "latency": LatencyBadge::from_secs(turn.duration_secs).to_string(),
                "generation": ctx.coordinator.generation(),
                "sources": turn.retrieved,
            });
            return print_json(&output);
        }

        println!("{}", turn.assistant);
        if !turn.retrieved.is_empty() {
            println!();
            println!("Sources:");
            for result in &turn.retrieved {
                println!("  - {}", format_source(result));
                println!("    {}", preview(result.text.trim(), LATEST_PREVIEW_CHARS));
            }
        }
        tracing::debug!(
            "Answered in {:.2}s ({})",
            turn.duration_secs,
            LatencyBadge::from_secs(turn.duration_secs)
        );

        Ok(())
    }

    /// The question from the positional argument or `--file`.
    fn get_question(&self) -> AppResult<Option<String>> {
        if let Some(question) = &self.question {
            return Ok(Some(question.clone()));
        }
        match &self.file {
            Some(path) => Ok(Some(std::fs::read_to_string(path)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn command(question: Option<&str>, file: Option<PathBuf>) -> AskCommand {
        AskCommand {
            question: question.map(str::to_string),
            file,
            persona: None,
            top_k: None,
            json: false,
        }
    }

    #[test]
    fn test_question_sources() {
        assert_eq!(
            command(Some("Which decree?"), None).get_question().unwrap(),
            Some("Which decree?".to_string())
        );
        assert_eq!(command(None, None).get_question().unwrap(), None);

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("q.txt");
        std::fs::write(&path, "From a file").unwrap();
        assert_eq!(
            command(None, Some(path)).get_question().unwrap(),
            Some("From a file".to_string())
        );
        assert!(command(None, Some(temp.path().join("absent.txt")))
            .get_question()
            .is_err());
    }
}
