use std::time::Duration;

use thiserror::Error;

use crate::jobs::MediaKind;

/// Failures raised while driving the external generation service.
#[derive(Error, Debug)]
pub enum AutomationError {
    /// The browser session could not be established, e.g. missing
    /// authentication state. Never retried.
    #[error("Failed to open automation session: {0}")]
    SessionInit(String),

    /// A UI interaction failed. Transient; eligible for retry.
    #[error("Step '{step}' failed: {reason}")]
    WorkflowStep { step: &'static str, reason: String },

    #[error("{kind} generation did not finish within {}s", timeout.as_secs())]
    GenerationTimeout { kind: MediaKind, timeout: Duration },

    #[error("No {kind} artifact found after generation finished")]
    ArtifactNotFound { kind: MediaKind },

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: Box<AutomationError>,
    },

    /// A workflow method was called without an open session.
    #[error("No automation session is open")]
    NotOpen,
}

impl AutomationError {
    pub fn step(step: &'static str, reason: impl ToString) -> Self {
        AutomationError::WorkflowStep {
            step,
            reason: reason.to_string(),
        }
    }

    /// Whether the retry supervisor may try the operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AutomationError::WorkflowStep { .. })
    }
}
