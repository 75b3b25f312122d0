//! Progress reporting for indexing.
//!
//! The coordinator emits one event per pipeline step so the CLI can print
//! incremental feedback while a directory is being indexed.

use std::sync::Arc;
use std::time::Instant;

/// Pipeline step an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scan,
    Read,
    Chunk,
    Embed,
    Index,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Scan => "scan",
            Phase::Read => "read",
            Phase::Chunk => "chunk",
            Phase::Embed => "embed",
            Phase::Index => "index",
        }
    }
}

/// Progress event emitted during indexing.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,

    /// Units done so far (files, chunks)
    pub current: u64,

    /// Total expected work, if known
    pub total: Option<u64>,

    pub message: String,

    /// Seconds since the reporter was created
    pub elapsed_secs: f64,
}

impl ProgressEvent {
    pub fn percentage(&self) -> Option<f64> {
        self.total.map(|t| {
            if t > 0 {
                (self.current as f64 / t as f64) * 100.0
            } else {
                0.0
            }
        })
    }

    /// Format as a simple user-facing line.
    pub fn format_simple(&self) -> String {
        let progress = match self.total {
            Some(total) => format!("{}/{}", self.current, total),
            None => self.current.to_string(),
        };
        let pct = self
            .percentage()
            .map(|p| format!(" ({:.0}%)", p))
            .unwrap_or_default();

        format!("[{}] {}{} - {}", self.phase.as_str(), progress, pct, self.message)
    }
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Emits events through an optional callback; always traces at debug.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    start_time: Instant,
}

impl ProgressReporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
            start_time: Instant::now(),
        }
    }

    /// A reporter that only traces.
    pub fn noop() -> Self {
        Self {
            callback: None,
            start_time: Instant::now(),
        }
    }

    fn emit(&self, phase: Phase, current: u64, total: Option<u64>, message: String) {
        let event = ProgressEvent {
            phase,
            current,
            total,
            message,
            elapsed_secs: self.start_time.elapsed().as_secs_f64(),
        };

        tracing::debug!(
            phase = event.phase.as_str(),
            current = event.current,
            total = ?event.total,
            message = %event.message,
            elapsed_secs = event.elapsed_secs,
            "Progress event"
        );

        if let Some(callback) = &self.callback {
            callback(event);
        }
    }

    pub fn scan(&self, found: u64, directory: &str) {
        self.emit(Phase::Scan, found, None, format!("{} PDF(s) in {}", found, directory));
    }

    pub fn read(&self, current: u64, total: Option<u64>, file: &str) {
        self.emit(Phase::Read, current, total, format!("reading {}", file));
    }

    pub fn chunk(&self, pages: u64, chunks: u64, doc_name: &str) {
        self.emit(
            Phase::Chunk,
            chunks,
            None,
            format!("{}: {} page(s), {} chunk(s)", doc_name, pages, chunks),
        );
    }

    pub fn embed(&self, current: u64, total: u64, model: &str) {
        self.emit(Phase::Embed, current, Some(total), format!("model={}", model));
    }

    pub fn index(&self, written: u64, backend: &str) {
        self.emit(Phase::Index, written, None, format!("written to {}", backend));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_progress_event_format() {
        let event = ProgressEvent {
            phase: Phase::Embed,
            current: 5,
            total: Some(10),
            message: "model=trigram-v1".to_string(),
            elapsed_secs: 0.0,
        };
        let formatted = event.format_simple();
        assert!(formatted.contains("[embed]"));
        assert!(formatted.contains("5/10"));
        assert!(formatted.contains("50%"));
    }

    #[test]
    fn test_progress_reporter_emit() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();

        let reporter = ProgressReporter::new(Arc::new(move |event| {
            events_clone.lock().unwrap().push(event);
        }));

        reporter.read(1, Some(3), "decree_12.pdf");
        reporter.chunk(2, 7, "decree_12");

        let captured = events.lock().unwrap();
        assert_eq!(captured.len(), 2);
        assert_eq!(captured[0].phase, Phase::Read);
        assert_eq!(captured[1].current, 7);
        assert!(captured[1].message.contains("2 page(s)"));
    }

    #[test]
    fn test_noop_reporter() {
        ProgressReporter::noop().scan(0, "documents_pdf");
    }
}
