//! Text chunking for downstream indexing.

pub mod markdown;
pub mod recursive;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metadata::Metadata;

pub use markdown::{split_sections, Section};
pub use recursive::RecursiveSplitter;

/// A bounded slice of text sized for indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub text: String,
    /// Position within one chunking call, contiguous from 0.
    pub chunk_index: usize,
    pub metadata: Metadata,
}

impl Chunk {
    /// Builds a chunk whose metadata also records `chunkIndex`.
    pub fn new(text: String, chunk_index: usize, mut metadata: Metadata) -> Self {
        metadata.insert_new("chunkIndex", chunk_index);
        Self {
            text,
            chunk_index,
            metadata,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkMode {
    Plain,
    /// Split on headers first, then re-split long sections.
    Markdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkSettings {
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.chunk_size == 0 {
            return Err(ChunkError::InvalidSettings(
                "chunk size must be at least 1".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkError::InvalidSettings(format!(
                "chunk overlap {} must be smaller than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("Invalid chunk settings: {0}")]
    InvalidSettings(String),
}

pub trait Chunker: Send + Sync {
    /// Empty or whitespace-only text yields no chunks.
    fn chunk(
        &self,
        text: &str,
        base_metadata: &Metadata,
        mode: ChunkMode,
        settings: ChunkSettings,
    ) -> Result<Vec<Chunk>, ChunkError>;
}

/// Recursive character splitter with an optional markdown header pass.
#[derive(Debug, Clone, Default)]
pub struct TextChunker;

impl TextChunker {
    pub fn new() -> Self {
        Self
    }

    fn chunk_plain(&self, text: &str, base: &Metadata, settings: ChunkSettings) -> Vec<Chunk> {
        RecursiveSplitter::new(settings.chunk_size, settings.chunk_overlap)
            .split(text)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| Chunk::new(text, chunk_index, base.clone()))
            .collect()
    }

    fn chunk_markdown(&self, text: &str, base: &Metadata, settings: ChunkSettings) -> Vec<Chunk> {
        let splitter = RecursiveSplitter::new(settings.chunk_size, settings.chunk_overlap);
        let mut chunks: Vec<Chunk> = Vec::new();

        for section in split_sections(text) {
            let mut metadata = base.clone();
            metadata.extend_new(&section.headers);

            let pieces = if section.text.chars().count() > settings.chunk_size {
                splitter.split(&section.text)
            } else {
                vec![section.text]
            };

            // indices continue across sections
            for piece in pieces {
                let chunk_index = chunks.len();
                chunks.push(Chunk::new(piece, chunk_index, metadata.clone()));
            }
        }

        chunks
    }
}

impl Chunker for TextChunker {
    fn chunk(
        &self,
        text: &str,
        base_metadata: &Metadata,
        mode: ChunkMode,
        settings: ChunkSettings,
    ) -> Result<Vec<Chunk>, ChunkError> {
        settings.validate()?;

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let chunks = match mode {
            ChunkMode::Plain => self.chunk_plain(text, base_metadata, settings),
            ChunkMode::Markdown => self.chunk_markdown(text, base_metadata, settings),
        };

        tracing::debug!(count = chunks.len(), ?mode, "Chunked text");
        Ok(chunks)
    }
}
