//! Session-scoped registry of indexed file names.
//!
//! Keyed by file name only: a file replaced under the same name is not seen
//! as new. Never persisted; a new session starts empty.

use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct IndexedFileRegistry {
    names: BTreeSet<String>,
}

impl IndexedFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name`. Returns `false` if it was already present.
    pub fn mark(&mut self, name: impl Into<String>) -> bool {
        self.names.insert(name.into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Entries of `listing` not yet recorded, in listing order.
    pub fn unmarked<'a, I>(&self, listing: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        listing
            .into_iter()
            .filter(|name| !self.names.contains(name.as_str()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_is_idempotent() {
        let mut registry = IndexedFileRegistry::new();
        assert!(registry.mark("decree_12.pdf"));
        assert!(!registry.mark("decree_12.pdf"));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("decree_12.pdf"));
    }

    #[test]
    fn test_unmarked_preserves_listing_order() {
        let mut registry = IndexedFileRegistry::new();
        registry.mark("b.pdf");

        let listing = vec!["c.pdf".to_string(), "b.pdf".to_string(), "a.pdf".to_string()];
        assert_eq!(registry.unmarked(&listing), vec!["c.pdf", "a.pdf"]);
    }

    #[test]
    fn test_names_are_exact() {
        let mut registry = IndexedFileRegistry::new();
        registry.mark("Report.PDF");
        assert!(!registry.contains("report.pdf"));
        assert!(registry.contains("Report.PDF"));
        assert_eq!(registry.len(), 1);
    }
}
