pub mod config;
pub mod context;
pub mod error;
pub mod notifier;
pub mod progress;
pub mod runner;

pub use config::PipelineConfig;
pub use context::{PipelineContext, WorkflowState};
pub use error::PipelineError;
pub use notifier::{JobNotifier, NoopNotifier};
pub use progress::JobPhase;
pub use runner::{JobOutcome, Pipeline};
