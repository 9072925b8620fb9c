use std::fmt;

use thiserror::Error;

use crate::error::StageError;
use crate::task::PipelineStage;

/// Required steps whose failure aborts a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalStage {
    StructuralParse,
    Ocr,
    Chunk,
    Persist,
}

impl FatalStage {
    pub fn stage(self) -> PipelineStage {
        match self {
            FatalStage::StructuralParse => PipelineStage::StructuralParse,
            FatalStage::Ocr => PipelineStage::Ocr,
            FatalStage::Chunk => PipelineStage::Chunk,
            FatalStage::Persist => PipelineStage::Done,
        }
    }
}

impl fmt::Display for FatalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalStage::StructuralParse => write!(f, "structural parse"),
            FatalStage::Ocr => write!(f, "OCR"),
            FatalStage::Chunk => write!(f, "chunking"),
            FatalStage::Persist => write!(f, "persist"),
        }
    }
}

/// Fatal outcome of a pipeline run. The `Display` text is what gets
/// recorded on the failed task.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Pipeline error: {stage}: {source}")]
    Stage {
        stage: FatalStage,
        #[source]
        source: StageError,
    },

    #[error("Pipeline error: cancelled during {stage}")]
    Cancelled { stage: PipelineStage },

    /// A collaborator panicked; the run was torn down.
    #[error("Pipeline error: panicked: {0}")]
    Panicked(String),
}

impl PipelineError {
    pub fn stage(stage: FatalStage, source: impl Into<StageError>) -> Self {
        PipelineError::Stage {
            stage,
            source: source.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled { .. })
    }
}
