use async_trait::async_trait;

use crate::chat::ChatError;
use crate::jobs::{Artifact, Job};

/// Tells the requester how their job ended.
///
/// Calls are best effort: the pipeline logs a failed notification and moves
/// on, the job's terminal status stands either way.
#[async_trait]
pub trait JobNotifier: Send + Sync {
    async fn notify_completion(&self, job: &Job, artifacts: &[Artifact]) -> Result<(), ChatError>;

    async fn notify_failure(&self, job: &Job) -> Result<(), ChatError>;
}

/// Notifier that drops every message. Used by the CLI and unit tests.
pub struct NoopNotifier;

#[async_trait]
impl JobNotifier for NoopNotifier {
    async fn notify_completion(
        &self,
        _job: &Job,
        _artifacts: &[Artifact],
    ) -> Result<(), ChatError> {
        Ok(())
    }

    async fn notify_failure(&self, _job: &Job) -> Result<(), ChatError> {
        Ok(())
    }
}
