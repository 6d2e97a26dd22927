use tracing::{error, info, warn};

use super::url_extractor::{extract_and_validate_url, extract_url_from_thread};
use super::workspace::WorkspaceContext;
use super::{messages, ChatError, MentionEvent};
use crate::jobs::{JobId, JobStore, OriginRef};
use crate::sanitize;

/// Turns mentions into queued jobs and acknowledges them in the thread.
#[derive(Clone)]
pub struct Ingestor {
    store: JobStore,
}

impl Ingestor {
    pub fn new(store: JobStore) -> Self {
        Self { store }
    }

    /// Handles one mention. Returns the queued job id, or `None` when the
    /// message carried no usable URL (a usage hint is posted instead).
    pub async fn handle_mention(
        &self,
        workspace: &WorkspaceContext,
        event: MentionEvent,
    ) -> Result<Option<JobId>, ChatError> {
        let api = workspace.api();
        let thread = event.thread().to_string();
        info!(
            team_id = %workspace.team_id,
            channel = %event.channel,
            user = %event.user,
            "Received mention"
        );

        let url = match extract_and_validate_url(&event.text) {
            Some(url) => Some(url),
            None => match event.thread_ts.as_deref() {
                Some(parent_ts) => {
                    let parent = api
                        .thread_parent_text(&event.channel, parent_ts)
                        .await
                        .unwrap_or_else(|e| {
                            warn!(error = %e, "Failed to read thread parent");
                            None
                        });
                    extract_url_from_thread(&event.text, parent.as_deref())
                }
                None => None,
            },
        };

        let Some(url) = url else {
            api.post_message(&event.channel, &thread, &messages::usage_hint())
                .await?;
            return Ok(None);
        };

        let origin = OriginRef {
            channel: event.channel.clone(),
            thread: thread.clone(),
            user: event.user.clone(),
            workspace: Some(workspace.team_id.clone()),
        };

        let job_id = match self.store.enqueue(&url, &origin) {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, "Failed to enqueue job");
                if let Err(reply_err) = api
                    .post_message(&event.channel, &thread, &messages::intake_error())
                    .await
                {
                    error!(error = %reply_err, "Failed to send error reply");
                }
                return Err(e.into());
            }
        };
        info!(job_id, url = %sanitize::redact_url(&url), "Job queued");

        let ack_ts = api
            .post_message(&event.channel, &thread, &messages::acknowledgement(&url, job_id))
            .await?;
        if let Err(e) = self.store.set_ack_message(job_id, &ack_ts) {
            warn!(job_id, error = %e, "Failed to remember acknowledgement message");
        }

        Ok(Some(job_id))
    }
}
