pub mod filesystem;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::task::ProcessingResult;

pub use filesystem::{FileSink, FileStorage};

/// Where a persisted result ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOutput {
    pub location: PathBuf,
    pub metadata_location: Option<PathBuf>,
}

#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Writes the rendered result for `task_id`. `source_name` is the
    /// uploaded file name and is used to derive output names.
    async fn persist(
        &self,
        task_id: &str,
        source_name: &str,
        result: &ProcessingResult,
    ) -> Result<StoredOutput, StorageError>;
}
