use thiserror::Error;

use super::context::WorkflowState;
use crate::automation::AutomationError;
use crate::error::StorageError;
use crate::jobs::JobStoreError;

/// Anything that ends a job as failed.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Automation failed: {0}")]
    Automation(#[from] AutomationError),

    #[error("Upload failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Job store update failed: {0}")]
    Store(#[from] JobStoreError),

    #[error("Workflow cannot move from {from} to {to}")]
    IllegalTransition {
        from: WorkflowState,
        to: WorkflowState,
    },

    #[error("Pipeline panicked: {0}")]
    Panicked(String),
}
