//! In-process fan-out of job status changes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::model::{Job, JobId, JobStatus};

/// Snapshot of a job emitted after every accepted status update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl JobProgressEvent {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            current_step: job.current_step.clone(),
            error: job.error_message.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Broadcasts job progress events to any number of subscribers.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobProgressEvent) {
        // No active receivers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::model::OriginRef;

    fn job(status: JobStatus, progress: u8) -> Job {
        Job {
            id: 3,
            url: "https://a.example".into(),
            origin: OriginRef {
                channel: "C".into(),
                thread: "1.1".into(),
                user: "U".into(),
                workspace: None,
            },
            status,
            progress,
            current_step: Some("Attaching source".into()),
            error_message: None,
            ack_message_ref: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let broadcaster = JobProgressBroadcaster::default();
        let mut rx = broadcaster.subscribe();

        broadcaster.send(JobProgressEvent::from_job(&job(JobStatus::Processing, 30)));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.job_id, 3);
        assert_eq!(event.progress, 30);
        assert_eq!(event.current_step.as_deref(), Some("Attaching source"));
    }

    #[test]
    fn test_send_without_receivers_is_silent() {
        let broadcaster = JobProgressBroadcaster::new(4);
        broadcaster.send(JobProgressEvent::from_job(&job(JobStatus::Pending, 0)));
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let event = JobProgressEvent::from_job(&job(JobStatus::Processing, 40));
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["jobId"], 3);
        assert_eq!(json["status"], "processing");
        assert!(json.get("error").is_none());
    }
}
