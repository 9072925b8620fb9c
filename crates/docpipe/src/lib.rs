pub mod chunker;
pub mod config;
pub mod engine;
pub mod enhancer;
pub mod error;
pub mod index;
pub mod merge;
pub mod metadata;
pub mod pipeline;
pub mod processor;
pub mod render;
pub mod sanitize;
pub mod storage;
pub mod task;
pub mod telemetry;

pub use chunker::{Chunk, ChunkMode, ChunkSettings, Chunker, TextChunker};
pub use config::{load_config, Config};
pub use engine::{Engine, ServiceHealth};
pub use enhancer::{Enhancement, Enhancer};
pub use error::{
    ConfigError, DocpipeError, Result, StageError, StorageError, TaskError, TelemetryError,
};
pub use index::{SearchHit, VectorIndex};
pub use merge::MergePolicy;
pub use metadata::Metadata;
pub use pipeline::{Pipeline, PipelineError, ProcessParams, Services};
pub use storage::{OutputSink, StoredOutput};
pub use task::{
    InMemoryTaskStore, OutputFormat, PipelineStage, ProcessingResult, Task, TaskStatus, TaskStore,
};
