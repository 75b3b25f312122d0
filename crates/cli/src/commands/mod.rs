//! Command handlers for the chatBOCS CLI.
//!
//! Each subcommand lives in its own module and opens the knowledge base
//! through [`crate::context`].

pub mod add;
pub mod ask;
pub mod chat;
pub mod index;
pub mod purge;
pub mod reset;
pub mod search;
pub mod serve;
pub mod status;

pub use add::AddCommand;
pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use index::IndexCommand;
pub use purge::PurgeCommand;
pub use reset::ResetCommand;
pub use search::SearchCommand;
pub use serve::ServeCommand;
pub use status::StatusCommand;

use bocs_core::{AppError, AppResult};
use bocs_knowledge::StatusReport;
use serde::Serialize;

/// Render a coordinator failure for the command line.
pub(crate) fn knowledge_error(err: impl std::fmt::Display) -> AppError {
    AppError::Knowledge(err.to_string())
}

/// Print `value` as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> AppResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Human-readable status block.
pub(crate) fn format_status(status: &StatusReport) -> String {
    let mut lines = vec![
        format!("State:      {}", status.state),
        format!("Handle:     #{}", status.generation),
        format!("Backend:    {} ({})", status.backend, status.location),
        format!("Table:      {}", status.table),
    ];
    if let Some(embedder) = &status.embedder {
        lines.push(format!("Embedder:   {}", embedder));
    }
    if let Some(rows) = status.rows {
        lines.push(format!("Chunks:     {}", rows));
    }
    lines.push(format!("Registered: {} file(s)", status.registry_size));
    if let Some(error) = &status.last_error {
        lines.push(format!("Last error: {}", error));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bocs_knowledge::CoordinatorState;

    #[test]
    fn test_format_status_skips_missing_fields() {
        let status = StatusReport {
            state: CoordinatorState::Failed,
            generation: 0,
            backend: "lancedb".to_string(),
            location: "tmp/lancedb".to_string(),
            table: "vectors".to_string(),
            embedder: None,
            rows: None,
            registry_size: 2,
            last_error: Some("embedder 'ollama' unavailable".to_string()),
        };

        let text = format_status(&status);
        assert!(text.contains("State:      failed"));
        assert!(text.contains("Registered: 2 file(s)"));
        assert!(text.contains("Last error: embedder 'ollama' unavailable"));
        assert!(!text.contains("Embedder:"));
        assert!(!text.contains("Chunks:"));
    }
}
