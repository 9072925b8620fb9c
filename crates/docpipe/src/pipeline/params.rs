use serde::{Deserialize, Serialize};

use crate::chunker::{ChunkMode, ChunkSettings};
use crate::config::Config;
use crate::task::OutputFormat;

/// Per-run processing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessParams {
    #[serde(default)]
    pub output_format: OutputFormat,
    /// OCR language hints; empty selects the configured languages.
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default = "default_true")]
    pub enable_vlm: bool,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_true")]
    pub store_in_index: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    50
}

impl Default for ProcessParams {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::default(),
            languages: Vec::new(),
            enable_vlm: true,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            store_in_index: true,
            collection: None,
        }
    }
}

impl ProcessParams {
    /// Defaults taken from the configuration file.
    pub fn from_config(config: &Config) -> Self {
        Self {
            enable_vlm: config.enhancer.enabled,
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            store_in_index: config.index.enabled,
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn chunk_settings(&self) -> ChunkSettings {
        ChunkSettings {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }

    /// Header-aware chunking is only used for markdown output.
    pub fn chunk_mode(&self) -> ChunkMode {
        match self.output_format {
            OutputFormat::Markdown => ChunkMode::Markdown,
            OutputFormat::Json => ChunkMode::Plain,
        }
    }
}
