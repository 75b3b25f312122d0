//! Page text chunking with configurable size and overlap.

use crate::config::ChunkingConfig;
use crate::reader::DocumentPage;
use bocs_core::{AppError, AppResult};
use text_splitter::{ChunkConfig, TextSplitter};

/// A chunk of one page, ready for embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct PageChunk {
    pub page: u32,
    /// Position within the whole document, from 0
    pub position: u32,
    pub text: String,
}

/// Splits page text at semantic boundaries (paragraphs, sentences, words)
/// into chunks of at most `chunk_size` characters.
pub struct Chunker {
    splitter: TextSplitter<text_splitter::Characters>,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> AppResult<Self> {
        let chunk_config = ChunkConfig::new(config.chunk_size)
            .with_overlap(config.chunk_overlap)
            .map_err(|e| AppError::Knowledge(format!("Invalid chunking config: {}", e)))?;

        Ok(Self {
            splitter: TextSplitter::new(chunk_config),
        })
    }

    /// Chunk every page, numbering chunks across the document.
    pub fn chunk_pages(&self, pages: &[DocumentPage]) -> Vec<PageChunk> {
        let mut chunks = Vec::new();
        let mut position = 0u32;

        for page in pages {
            for text in self.splitter.chunks(&page.text) {
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                chunks.push(PageChunk {
                    page: page.number,
                    position,
                    text: text.to_string(),
                });
                position += 1;
            }
        }

        tracing::debug!(
            "Chunked {} page(s) into {} chunks",
            pages.len(),
            chunks.len()
        );

        chunks
    }
}
