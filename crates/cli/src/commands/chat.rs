//! Interactive chat command.
//!
//! A line-oriented dashboard: plain lines are questions, lines starting
//! with `/` manage the knowledge base and the session.

use super::index::summarize;
use super::{format_status, knowledge_error};
use crate::context::{open_knowledge, ModelNeed, OpenOptions};
use bocs_core::{config::AppConfig, AppResult};
use bocs_knowledge::documents::{doc_name_for, persist_upload};
use bocs_knowledge::session::{
    format_source, preview, HISTORY_PREVIEW_CHARS, LATEST_PREVIEW_CHARS,
};
use bocs_knowledge::{ChatSession, ConversationTurn, KnowledgeCoordinator, LatencyBadge};
use clap::Args;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

/// How many new file names the startup notice lists.
const NEW_FILES_SHOWN: usize = 3;

const HELP: &str = "\
Commands:
  /reset            destroy the index and start empty
  /purge            clear, remove and reopen the index
  /reload           reopen the index to pick up new content
  /new              list PDFs of the upload directory not yet indexed
  /index            index the new PDFs of the upload directory
  /upload <file>... index the given PDFs
  /search <query>   show the passages nearest to a query
  /history          show the conversation
  /clear            forget the conversation
  /status           show the knowledge base state
  /topk <n>         passages retrieved per question (1-50)
  /memory <n>       previous turns sent with a question (0-20)
  /help             show this help
  /quit             leave
Anything else is a question.";

/// Chat with the knowledge base interactively
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Persona used to answer (default: the knowledge base persona)
    #[arg(long)]
    pub persona: Option<String>,

    /// Passages retrieved per question (1-50)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Previous turns sent with each question (0-20)
    #[arg(long)]
    pub memory: Option<usize>,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command");

        let mut options = OpenOptions::new(ModelNeed::Required);
        options.persona = self.persona.clone();
        let ctx = open_knowledge(config, &options).await?;

        let retrieval = ctx.knowledge.retrieval;
        let session = ChatSession::new(
            self.top_k.unwrap_or(retrieval.top_k),
            self.memory.unwrap_or(retrieval.memory_depth),
        )?;
        let mut dashboard = Dashboard::new(ctx.coordinator, session);

        println!("chatBOCS - knowledge base '{}'", ctx.knowledge.name);
        println!("{}", dashboard.start().await);
        println!("Type /help for commands.");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            match dashboard.handle(&line).await {
                Reply::Text(text) if text.is_empty() => {}
                Reply::Text(text) => println!("{}", text),
                Reply::Quit => break,
            }
        }

        tracing::info!("Chat session {} ended", dashboard.session.id());
        Ok(())
    }
}

/// What the loop does after a line.
#[derive(Debug, PartialEq)]
pub(crate) enum Reply {
    Text(String),
    Quit,
}

/// Interactive state: the coordinator plus one conversation.
pub(crate) struct Dashboard {
    coordinator: KnowledgeCoordinator,
    session: ChatSession,
}

impl Dashboard {
    pub(crate) fn new(coordinator: KnowledgeCoordinator, session: ChatSession) -> Self {
        Self {
            coordinator,
            session,
        }
    }

    /// Initialize the store and report new documents.
    pub(crate) async fn start(&mut self) -> String {
        let mut text = match self.coordinator.initialize(false).await {
            Ok(generation) => format!("Knowledge store ready (handle #{})", generation),
            Err(e) => format!("Knowledge store not initialized: {}\nUse /reset to retry.", e),
        };
        text.push_str(&self.new_documents_notice());
        text
    }

    pub(crate) async fn handle(&mut self, line: &str) -> Reply {
        let line = line.trim();
        if line.is_empty() {
            return Reply::Text(String::new());
        }
        if !line.starts_with('/') {
            return Reply::Text(self.ask(line).await);
        }

        let (command, argument) = match line.split_once(char::is_whitespace) {
            Some((command, argument)) => (command, argument.trim()),
            None => (line, ""),
        };
        tracing::debug!("Dashboard command {}", command);

        let text = match command {
            "/quit" | "/exit" => return Reply::Quit,
            "/help" => HELP.to_string(),
            "/reset" => match self.coordinator.initialize(true).await {
                Ok(generation) => format!("Index reset (handle #{})", generation),
                Err(e) => format!("Reset failed: {}", e),
            },
            "/purge" => match self.coordinator.force_cleanup().await {
                Ok(generation) => format!("Index purged (handle #{})", generation),
                Err(e) => format!("Purge failed: {}", e),
            },
            "/reload" => match self.coordinator.reload_knowledge_base().await {
                Ok(generation) => format!("Knowledge base reloaded (handle #{})", generation),
                Err(e) => format!("Reload failed: {}", e),
            },
            "/new" => self.list_new(),
            "/index" => self.index_new().await,
            "/upload" => self.upload(argument).await,
            "/search" => self.search(argument).await,
            "/history" => self.history(),
            "/clear" => {
                self.session.clear();
                "Conversation cleared".to_string()
            }
            "/status" => format_status(&self.coordinator.status().await),
            "/topk" => match parse_number(argument).map(|n| self.session.set_top_k(n)) {
                Some(Ok(())) => format!("top_k = {}", self.session.top_k()),
                Some(Err(e)) => e.to_string(),
                None => "Usage: /topk <n>".to_string(),
            },
            "/memory" => match parse_number(argument).map(|n| self.session.set_memory_depth(n)) {
                Some(Ok(())) => format!("memory = {} turn(s)", self.session.memory_depth()),
                Some(Err(e)) => e.to_string(),
                None => "Usage: /memory <n>".to_string(),
            },
            other => format!("Unknown command {}. Type /help.", other),
        };
        Reply::Text(text)
    }

    async fn ask(&mut self, question: &str) -> String {
        match self.session.ask(&self.coordinator, question).await {
            Ok(turn) => render_latest(turn),
            Err(e) => knowledge_error(e).to_string(),
        }
    }

    fn new_documents_notice(&self) -> String {
        let new_files = self.coordinator.check_for_new_documents(None);
        if new_files.is_empty() {
            return String::new();
        }
        let mut text = format!("\n{} new PDF(s) detected", new_files.len());
        for name in new_files.iter().take(NEW_FILES_SHOWN) {
            text.push_str(&format!("\n  - {}", name));
        }
        if new_files.len() > NEW_FILES_SHOWN {
            text.push_str(&format!("\n  ... and {} more", new_files.len() - NEW_FILES_SHOWN));
        }
        text.push_str("\nUse /index to index them.");
        text
    }

    fn list_new(&self) -> String {
        let new_files = self.coordinator.check_for_new_documents(None);
        if new_files.is_empty() {
            return "No new PDF".to_string();
        }
        new_files
            .iter()
            .map(|name| format!("  - {}", name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn index_new(&mut self) -> String {
        let report = self.coordinator.auto_index_directory(None).await;
        for name in &report.indexed {
            self.coordinator.mark_as_indexed(name);
        }
        summarize(&report)
    }

    async fn upload(&mut self, argument: &str) -> String {
        if argument.is_empty() {
            return "Usage: /upload <file>...".to_string();
        }
        if !self.coordinator.is_ready() {
            return format!(
                "Knowledge store is {}; use /reset first",
                self.coordinator.state()
            );
        }

        let files: Vec<&str> = argument.split_whitespace().collect();
        let mut lines = Vec::with_capacity(files.len() + 1);
        let mut indexed = 0;
        for file in &files {
            match self.upload_one(Path::new(file)).await {
                Ok(line) => {
                    indexed += 1;
                    lines.push(line);
                }
                Err(reason) => lines.push(format!("failed: {} ({})", file, reason)),
            }
        }
        lines.push(format!("{}/{} PDF(s) indexed", indexed, files.len()));
        lines.join("\n")
    }

    /// Stage a copy under the upload directory, index it under its stem and
    /// remove the staging directory.
    async fn upload_one(&mut self, source: &Path) -> Result<String, String> {
        let file_name = source
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .ok_or_else(|| "not a file".to_string())?;
        let bytes = tokio::fs::read(source).await.map_err(|e| e.to_string())?;
        let staged = persist_upload(self.coordinator.upload_dir(), &file_name, &bytes)
            .map_err(|e| e.to_string())?;

        let doc_name = doc_name_for(source);
        let result = self
            .coordinator
            .add_document(staged.path(), Some(&doc_name), true)
            .await;
        if let Err(e) = staged.cleanup() {
            tracing::warn!("{}", e);
        }

        match result {
            Ok(doc) => {
                self.coordinator.mark_as_indexed(&file_name);
                Ok(format!("indexed: {} ({} chunk(s))", file_name, doc.chunks))
            }
            Err(e) => Err(e.to_string()),
        }
    }

    async fn search(&self, query: &str) -> String {
        if query.is_empty() {
            return "Usage: /search <query>".to_string();
        }
        match self.coordinator.try_search(query, self.session.top_k()).await {
            Ok(results) if results.is_empty() => "No passage found".to_string(),
            Ok(results) => results
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    format!(
                        "{}. {}\n   {}",
                        i + 1,
                        format_source(r),
                        preview(r.text.trim(), LATEST_PREVIEW_CHARS)
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => format!("Search failed: {}", e),
        }
    }

    fn history(&self) -> String {
        let turns = self.session.history();
        if turns.is_empty() {
            return "No conversation yet".to_string();
        }
        turns
            .iter()
            .enumerate()
            .rev()
            .map(|(i, turn)| render_history_turn(i + 1, turn))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn parse_number(argument: &str) -> Option<usize> {
    argument.parse().ok()
}

fn answer_block(turn: &ConversationTurn) -> String {
    if turn.success {
        format!(
            "{}\n[{}] {:.2}s",
            turn.assistant,
            LatencyBadge::from_secs(turn.duration_secs),
            turn.duration_secs
        )
    } else {
        format!(
            "Error: {}",
            turn.error.as_deref().unwrap_or("generation failed")
        )
    }
}

fn sources_block(turn: &ConversationTurn, max_chars: usize) -> String {
    if turn.retrieved.is_empty() {
        return "No relevant source found".to_string();
    }
    turn.retrieved
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "  [{}] {}\n      {}",
                i + 1,
                format_source(r),
                preview(r.text.trim(), max_chars)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_latest(turn: &ConversationTurn) -> String {
    format!(
        "{}\n\nSources:\n{}",
        answer_block(turn),
        sources_block(turn, LATEST_PREVIEW_CHARS)
    )
}

fn render_history_turn(number: usize, turn: &ConversationTurn) -> String {
    format!(
        "Question {}: {}\n{}\n{}",
        number,
        turn.user,
        answer_block(turn),
        sources_block(turn, HISTORY_PREVIEW_CHARS)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use tempfile::TempDir;

    fn text(reply: Reply) -> String {
        match reply {
            Reply::Text(text) => text,
            Reply::Quit => panic!("unexpected quit"),
        }
    }

    async fn dashboard(upload_dir: &Path) -> Dashboard {
        let mut dashboard = Dashboard::new(
            testing::coordinator(upload_dir),
            ChatSession::new(3, 2).unwrap(),
        );
        dashboard.start().await;
        dashboard
    }

    #[tokio::test]
    async fn test_start_reports_new_documents() {
        let docs = TempDir::new().unwrap();
        for name in ["a.pdf", "b.pdf", "c.pdf", "d.pdf"] {
            std::fs::write(docs.path().join(name), "text").unwrap();
        }
        let mut dashboard = Dashboard::new(
            testing::coordinator(docs.path()),
            ChatSession::new(3, 2).unwrap(),
        );

        let notice = dashboard.start().await;
        assert!(notice.starts_with("Knowledge store ready (handle #1)"));
        assert!(notice.contains("4 new PDF(s) detected"));
        assert!(notice.contains("... and 1 more"));
    }

    #[tokio::test]
    async fn test_index_marks_and_search_finds() {
        let docs = TempDir::new().unwrap();
        std::fs::write(
            docs.path().join("decree_12.pdf"),
            "Decree 12 creates the monitoring and evaluation office.",
        )
        .unwrap();
        let mut dashboard = dashboard(docs.path()).await;

        assert!(text(dashboard.handle("/new").await).contains("decree_12.pdf"));
        let summary = text(dashboard.handle("/index").await);
        assert!(summary.starts_with("Indexed 1 document(s)"));
        assert_eq!(text(dashboard.handle("/new").await), "No new PDF");

        let found = text(dashboard.handle("/search decree 12").await);
        assert!(found.starts_with("1. decree_12 (score: "));
    }

    #[tokio::test]
    async fn test_questions_build_history() {
        let docs = TempDir::new().unwrap();
        let mut dashboard = dashboard(docs.path()).await;

        let answer = text(dashboard.handle("Which office?").await);
        assert!(answer.starts_with("#1 Which office?"));
        assert!(answer.contains("No relevant source found"));

        let failed = text(dashboard.handle("explode").await);
        assert!(failed.starts_with("Error: "));
        assert!(failed.contains("model overloaded"));

        let history = text(dashboard.handle("/history").await);
        assert!(history.starts_with("Question 2: explode"));
        assert!(history.contains("Question 1: Which office?"));

        assert_eq!(text(dashboard.handle("/clear").await), "Conversation cleared");
        assert_eq!(text(dashboard.handle("/history").await), "No conversation yet");
    }

    #[tokio::test]
    async fn test_settings_commands() {
        let docs = TempDir::new().unwrap();
        let mut dashboard = dashboard(docs.path()).await;

        assert_eq!(text(dashboard.handle("/topk 7").await), "top_k = 7");
        assert!(text(dashboard.handle("/topk 99").await).contains("between 1 and 50"));
        assert_eq!(text(dashboard.handle("/topk seven").await), "Usage: /topk <n>");
        assert_eq!(text(dashboard.handle("/memory 0").await), "memory = 0 turn(s)");
        assert!(text(dashboard.handle("/bogus").await).starts_with("Unknown command /bogus"));
        assert_eq!(dashboard.handle("/quit").await, Reply::Quit);
    }

    #[tokio::test]
    async fn test_reset_reload_purge_advance_handles() {
        let docs = TempDir::new().unwrap();
        let mut dashboard = dashboard(docs.path()).await;

        assert_eq!(text(dashboard.handle("/reset").await), "Index reset (handle #2)");
        assert_eq!(
            text(dashboard.handle("/reload").await),
            "Knowledge base reloaded (handle #3)"
        );
        assert_eq!(text(dashboard.handle("/purge").await), "Index purged (handle #4)");
        assert!(text(dashboard.handle("/status").await).contains("State:      ready"));
    }

    #[tokio::test]
    async fn test_upload_stages_indexes_and_marks() {
        let docs = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let source = outside.path().join("report_2024.pdf");
        std::fs::write(&source, "Annual report of the monitoring office.").unwrap();
        let mut dashboard = dashboard(docs.path()).await;

        let reply = text(
            dashboard
                .handle(&format!("/upload {}", source.display()))
                .await,
        );
        assert!(reply.contains("indexed: report_2024.pdf"));
        assert!(reply.ends_with("1/1 PDF(s) indexed"));

        // Staging directories are gone; only the upload root remains.
        let leftovers: Vec<_> = std::fs::read_dir(docs.path()).unwrap().collect();
        assert!(leftovers.is_empty());

        let found = text(dashboard.handle("/search annual report").await);
        assert!(found.contains("report_2024"));

        let missing = text(dashboard.handle("/upload /nonexistent/x.pdf").await);
        assert!(missing.ends_with("0/1 PDF(s) indexed"));
    }
}
