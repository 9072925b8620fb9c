pub mod context;
pub mod error;
pub mod params;
pub mod runner;
pub mod services;

pub use context::PipelineContext;
pub use error::{FatalStage, PipelineError};
pub use params::ProcessParams;
pub use runner::Pipeline;
pub use services::{Services, ServicesBuilder};
