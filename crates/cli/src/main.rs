//! chatBOCS CLI
//!
//! Main entry point for the bocs command-line tool: interactive chat over
//! the indexed PDFs, one-shot knowledge base commands and the HTTP/WebSocket
//! service.

mod commands;
mod context;
mod server;
#[cfg(test)]
mod testing;

use bocs_core::{config::AppConfig, logging, AppError, AppResult, ConfigOverrides, LogFormat};
use clap::{Parser, Subcommand};
use commands::{
    AddCommand, AskCommand, ChatCommand, IndexCommand, PurgeCommand, ResetCommand, SearchCommand,
    ServeCommand, StatusCommand,
};
use std::path::PathBuf;

/// chatBOCS - chat with your official documents
#[derive(Parser, Debug)]
#[command(name = "bocs")]
#[command(about = "Retrieval-augmented chat over a corpus of PDF documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "BOCS_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "BOCS_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Log format (text, json)
    #[arg(long, global = true, env = "BOCS_LOG_FORMAT")]
    log_format: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Chat provider (groq, openai, ollama)
    #[arg(short, long, global = true, env = "BOCS_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "BOCS_MODEL")]
    model: Option<String>,

    /// Knowledge base name
    #[arg(long, global = true, env = "BOCS_KNOWLEDGE_BASE")]
    knowledge_base: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chat interactively with the knowledge base
    Chat(ChatCommand),

    /// Ask a single question
    Ask(AskCommand),

    /// Retrieve the passages nearest to a query
    Search(SearchCommand),

    /// Index the PDFs of a directory
    Index(IndexCommand),

    /// Index a single document
    Add(AddCommand),

    /// Show the knowledge base state
    Status(StatusCommand),

    /// Destroy the index and start empty
    Reset(ResetCommand),

    /// Clear, remove and reopen the index
    Purge(PurgeCommand),

    /// Run the HTTP and WebSocket service
    Serve(ServeCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Chat(_) => "chat",
            Commands::Ask(_) => "ask",
            Commands::Search(_) => "search",
            Commands::Index(_) => "index",
            Commands::Add(_) => "add",
            Commands::Status(_) => "status",
            Commands::Reset(_) => "reset",
            Commands::Purge(_) => "purge",
            Commands::Serve(_) => "serve",
        }
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let log_format = match cli.log_format.as_deref() {
        Some(raw) => Some(LogFormat::parse(raw).ok_or_else(|| {
            AppError::Config(format!("Unknown log format '{}' (use text or json)", raw))
        })?),
        None => None,
    };

    // Load base configuration from file and environment, then apply CLI overrides
    let config = AppConfig::load_from(cli.workspace, cli.config)?.with_overrides(ConfigOverrides {
        provider: cli.provider,
        model: cli.model,
        knowledge_base: cli.knowledge_base,
        log_level: cli.log_level,
        log_format,
        verbose: cli.verbose,
        no_color: cli.no_color,
        ..Default::default()
    });

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_format)?;

    tracing::info!("chatBOCS CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);
    tracing::debug!("Knowledge base: {}", config.knowledge_base);

    config.ensure_state_dir()?;

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = match cli.command {
        Commands::Chat(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Index(cmd) => cmd.execute(&config).await,
        Commands::Add(cmd) => cmd.execute(&config).await,
        Commands::Status(cmd) => cmd.execute(&config).await,
        Commands::Reset(cmd) => cmd.execute(&config).await,
        Commands::Purge(cmd) => cmd.execute(&config).await,
        Commands::Serve(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_one_shot_commands() {
        let cli = Cli::parse_from(["bocs", "add", "decree_12.pdf", "--name", "decree", "--no-reload"]);
        match cli.command {
            Commands::Add(cmd) => {
                assert_eq!(cmd.file, PathBuf::from("decree_12.pdf"));
                assert_eq!(cmd.name.as_deref(), Some("decree"));
                assert!(cmd.no_reload);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::parse_from(["bocs", "--knowledge-base", "legal", "index", "--dir", "pdfs", "--json"]);
        assert_eq!(cli.knowledge_base.as_deref(), Some("legal"));
        assert_eq!(cli.command.name(), "index");
    }
}
