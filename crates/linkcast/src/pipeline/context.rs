use std::fmt;

use crate::automation::FetchedArtifact;
use crate::jobs::{Artifact, Job, MediaKind};

use super::error::PipelineError;

/// Where a job stands in the generation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Init,
    WorkspaceCreated,
    SourceAttached,
    GeneratingBoth,
    ArtifactsReady,
    Uploaded,
    Done,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Done | WorkflowState::Failed)
    }

    /// The single state that follows this one on the success path.
    fn successor(&self) -> Option<WorkflowState> {
        match self {
            WorkflowState::Init => Some(WorkflowState::WorkspaceCreated),
            WorkflowState::WorkspaceCreated => Some(WorkflowState::SourceAttached),
            WorkflowState::SourceAttached => Some(WorkflowState::GeneratingBoth),
            WorkflowState::GeneratingBoth => Some(WorkflowState::ArtifactsReady),
            WorkflowState::ArtifactsReady => Some(WorkflowState::Uploaded),
            WorkflowState::Uploaded => Some(WorkflowState::Done),
            WorkflowState::Done | WorkflowState::Failed => None,
        }
    }

    pub fn can_advance_to(&self, next: WorkflowState) -> bool {
        if next == WorkflowState::Failed {
            return !self.is_terminal();
        }
        self.successor() == Some(next)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::Init => "init",
            WorkflowState::WorkspaceCreated => "workspace_created",
            WorkflowState::SourceAttached => "source_attached",
            WorkflowState::GeneratingBoth => "generating_both",
            WorkflowState::ArtifactsReady => "artifacts_ready",
            WorkflowState::Uploaded => "uploaded",
            WorkflowState::Done => "done",
            WorkflowState::Failed => "failed",
        };
        f.write_str(name)
    }
}

pub struct PipelineContext {
    pub job: Job,
    state: WorkflowState,

    // Filled once both generations are downloaded
    pub fetched: Vec<(MediaKind, FetchedArtifact)>,

    // Filled as uploads are recorded
    pub artifacts: Vec<Artifact>,
}

impl PipelineContext {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            state: WorkflowState::Init,
            fetched: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn advance(&mut self, next: WorkflowState) -> Result<(), PipelineError> {
        if !self.state.can_advance_to(next) {
            return Err(PipelineError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobStatus, OriginRef};
    use chrono::Utc;

    fn job() -> Job {
        Job {
            id: 1,
            url: "https://example.com/a".to_string(),
            origin: OriginRef {
                channel: "C1".to_string(),
                thread: "1700000000.000100".to_string(),
                user: "U1".to_string(),
                workspace: None,
            },
            status: JobStatus::Processing,
            progress: 0,
            current_step: None,
            error_message: None,
            ack_message_ref: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_success_path() {
        let mut ctx = PipelineContext::new(job());
        for next in [
            WorkflowState::WorkspaceCreated,
            WorkflowState::SourceAttached,
            WorkflowState::GeneratingBoth,
            WorkflowState::ArtifactsReady,
            WorkflowState::Uploaded,
            WorkflowState::Done,
        ] {
            ctx.advance(next).unwrap();
        }
        assert_eq!(ctx.state(), WorkflowState::Done);
    }

    #[test]
    fn test_cannot_skip_states() {
        let mut ctx = PipelineContext::new(job());
        let err = ctx.advance(WorkflowState::GeneratingBoth).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::IllegalTransition {
                from: WorkflowState::Init,
                to: WorkflowState::GeneratingBoth
            }
        ));
        assert_eq!(ctx.state(), WorkflowState::Init);
    }

    #[test]
    fn test_failed_reachable_from_non_terminal_only() {
        let mut ctx = PipelineContext::new(job());
        ctx.advance(WorkflowState::WorkspaceCreated).unwrap();
        ctx.advance(WorkflowState::Failed).unwrap();
        assert!(ctx.advance(WorkflowState::Failed).is_err());
        assert!(ctx.advance(WorkflowState::SourceAttached).is_err());

        assert!(!WorkflowState::Done.can_advance_to(WorkflowState::Failed));
    }
}
