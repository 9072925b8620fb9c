//! Builders for test inputs.

#![allow(dead_code)]

use docpipe::{OutputFormat, ProcessParams};

/// Fluent builder for `ProcessParams`.
pub struct ParamsBuilder {
    params: ProcessParams,
}

impl ParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: ProcessParams::default(),
        }
    }

    pub fn json(mut self) -> Self {
        self.params.output_format = OutputFormat::Json;
        self
    }

    pub fn no_vlm(mut self) -> Self {
        self.params.enable_vlm = false;
        self
    }

    pub fn no_index(mut self) -> Self {
        self.params.store_in_index = false;
        self
    }

    pub fn chunking(mut self, size: usize, overlap: usize) -> Self {
        self.params.chunk_size = size;
        self.params.chunk_overlap = overlap;
        self
    }

    pub fn collection(mut self, name: &str) -> Self {
        self.params.collection = Some(name.to_string());
        self
    }

    pub fn build(self) -> ProcessParams {
        self.params
    }
}

impl Default for ParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent builder for JSON config documents.
pub struct ConfigBuilder {
    output_directory: String,
    max_concurrent_tasks: usize,
    chunk_size: usize,
    chunk_overlap: usize,
    index_enabled: bool,
    collection: String,
}

impl ConfigBuilder {
    pub fn new(output_directory: &str) -> Self {
        Self {
            output_directory: output_directory.to_string(),
            max_concurrent_tasks: 2,
            chunk_size: 512,
            chunk_overlap: 50,
            index_enabled: true,
            collection: "idp_documents".to_string(),
        }
    }

    pub fn max_concurrent_tasks(mut self, n: usize) -> Self {
        self.max_concurrent_tasks = n;
        self
    }

    pub fn chunking(mut self, size: usize, overlap: usize) -> Self {
        self.chunk_size = size;
        self.chunk_overlap = overlap;
        self
    }

    pub fn index_disabled(mut self) -> Self {
        self.index_enabled = false;
        self
    }

    pub fn collection(mut self, name: &str) -> Self {
        self.collection = name.to_string();
        self
    }

    /// OCR and enhancement are always disabled so no external engine is needed.
    pub fn build(self) -> String {
        serde_json::json!({
            "version": "1.0",
            "outputDirectory": self.output_directory,
            "uploadDirectory": format!("{}/uploads", self.output_directory),
            "maxConcurrentTasks": self.max_concurrent_tasks,
            "ocr": { "enabled": false },
            "enhancer": { "enabled": false },
            "chunking": {
                "chunkSize": self.chunk_size,
                "chunkOverlap": self.chunk_overlap
            },
            "index": {
                "enabled": self.index_enabled,
                "defaultCollection": self.collection
            }
        })
        .to_string()
    }
}
