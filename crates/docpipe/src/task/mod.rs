pub mod events;
pub mod model;
pub mod store;

pub use events::{TaskEvent, TaskEventBroadcaster, TaskEventKind};
pub use model::{OutputFormat, PipelineStage, ProcessingResult, Task, TaskStatus};
pub use store::{InMemoryTaskStore, TaskStore};
