use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::workspace::{WorkspaceContext, WorkspaceRegistry};
use super::{messages, ChatError};
use crate::jobs::{Artifact, Job};
use crate::pipeline::JobNotifier;

/// Posts job results back into the originating thread.
pub struct SlackNotifier {
    registry: Arc<WorkspaceRegistry>,
}

impl SlackNotifier {
    pub fn new(registry: Arc<WorkspaceRegistry>) -> Self {
        Self { registry }
    }

    fn workspace_for(&self, job: &Job) -> Result<&WorkspaceContext, ChatError> {
        let team = job.origin.workspace.as_deref();
        self.registry
            .get(team)
            .ok_or_else(|| ChatError::UnknownWorkspace(team.unwrap_or("<default>").to_string()))
    }

    /// The "queued" message is stale once a result exists.
    async fn remove_acknowledgement(&self, workspace: &WorkspaceContext, job: &Job) {
        let Some(ref ack_ts) = job.ack_message_ref else {
            return;
        };
        if let Err(e) = workspace
            .api()
            .delete_message(&job.origin.channel, ack_ts)
            .await
        {
            warn!(job_id = job.id, error = %e, "Failed to delete acknowledgement");
        }
    }

    async fn post(&self, job: &Job, text: &str) -> Result<(), ChatError> {
        let workspace = self.workspace_for(job)?;
        self.remove_acknowledgement(workspace, job).await;
        workspace
            .api()
            .post_message(&job.origin.channel, &job.origin.thread, text)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobNotifier for SlackNotifier {
    async fn notify_completion(&self, job: &Job, artifacts: &[Artifact]) -> Result<(), ChatError> {
        self.post(job, &messages::completion(artifacts)).await?;
        info!(job_id = job.id, channel = %job.origin.channel, "Posted completion results");
        Ok(())
    }

    async fn notify_failure(&self, job: &Job) -> Result<(), ChatError> {
        self.post(job, &messages::failure()).await?;
        info!(job_id = job.id, channel = %job.origin.channel, "Posted failure notice");
        Ok(())
    }
}
