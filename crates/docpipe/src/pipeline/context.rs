use std::path::{Path, PathBuf};

use crate::chunker::Chunk;
use crate::metadata::Metadata;
use crate::processor::{self, InputKind};
use crate::sanitize;

use super::params::ProcessParams;

/// Working state of one pipeline run.
pub struct PipelineContext {
    // Input
    pub task_id: String,
    pub path: PathBuf,
    pub source_name: String,
    pub input_kind: InputKind,
    pub params: ProcessParams,

    // Accumulated across steps; keys are only ever added
    pub metadata: Metadata,

    // Merged text, replaced by the enhanced text when enhancement succeeds
    pub text: String,

    // Chunk step result
    pub chunks: Vec<Chunk>,

    // Index step result
    pub vector_ids: Vec<String>,
}

impl PipelineContext {
    pub fn new(task_id: &str, path: &Path, params: ProcessParams) -> Self {
        let source_name = sanitize::redact_path(path);
        let input_kind = InputKind::from_path(path);

        let mut metadata = Metadata::new();
        metadata.insert_new("source", source_name.clone());
        metadata.insert_new("fileType", input_kind.as_str());
        metadata.insert_new("mimeType", processor::mime_type(path));

        Self {
            task_id: task_id.to_string(),
            path: path.to_path_buf(),
            source_name,
            input_kind,
            params,
            metadata,
            text: String::new(),
            chunks: Vec::new(),
            vector_ids: Vec::new(),
        }
    }

    /// Metadata every chunk starts from.
    pub fn chunk_base_metadata(&self) -> Metadata {
        [("source", self.source_name.clone())].into_iter().collect()
    }
}
