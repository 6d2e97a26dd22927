//! Domain types for queued jobs and their generated artifacts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a queued job. Assigned by the store, monotonically increasing.
pub type JobId = i64;

/// Lifecycle status of a job.
///
/// `pending → processing → (completed | failed)`. Terminal states are final
/// and no job ever re-enters `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Statuses a job may be in for a move into `self` to be legal.
    ///
    /// `processing → processing` is allowed so progress can be reported
    /// repeatedly while the job runs.
    pub fn allowed_predecessors(&self) -> &'static [&'static str] {
        match self {
            JobStatus::Pending => &[],
            JobStatus::Processing => &["pending", "processing"],
            JobStatus::Completed | JobStatus::Failed => &["processing"],
        }
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        next.allowed_predecessors().contains(&self.as_str())
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of generated media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub const ALL: [MediaKind; 2] = [MediaKind::Audio, MediaKind::Video];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Audio => "m4a",
            MediaKind::Video => "mp4",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio/mp4",
            MediaKind::Video => "video/mp4",
        }
    }

    /// Canonical artifact filename for a job, e.g. `audio-12.m4a`.
    pub fn filename_for(&self, job_id: JobId) -> String {
        format!("{}-{}.{}", self.as_str(), job_id, self.extension())
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a request came from, so results can be posted back to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginRef {
    pub channel: String,
    /// Thread the conversation lives in (chat message timestamp).
    pub thread: String,
    pub user: String,
    /// Chat workspace (team) id. `None` for single-workspace deployments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

/// A queued request as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub url: String,
    pub origin: OriginRef,
    pub status: JobStatus,
    pub progress: u8,
    pub current_step: Option<String>,
    pub error_message: Option<String>,
    pub ack_message_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A generated file uploaded to object storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: i64,
    pub job_id: JobId,
    pub kind: MediaKind,
    pub filename: String,
    pub storage_key: String,
    pub public_url: String,
    pub byte_size: u64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Size in megabytes with two decimals, as shown to users.
    pub fn size_mb(&self) -> String {
        format!("{:.2}", self.byte_size as f64 / 1024.0 / 1024.0)
    }
}

/// Metadata for an artifact about to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArtifact {
    pub kind: MediaKind,
    pub filename: String,
    pub storage_key: String,
    pub public_url: String,
    pub byte_size: u64,
}

/// Optional fields carried by a status update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub progress: Option<u8>,
    pub current_step: Option<String>,
    pub error_message: Option<String>,
}

impl StatusUpdate {
    pub fn step(progress: u8, current_step: impl Into<String>) -> Self {
        Self {
            progress: Some(progress),
            current_step: Some(current_step.into()),
            error_message: None,
        }
    }

    pub fn failure(error_message: impl Into<String>) -> Self {
        Self {
            error_message: Some(error_message.into()),
            ..Self::default()
        }
    }
}

/// Job counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_names() {
        for status in JobStatus::ALL {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("queued"), None);
    }

    #[test]
    fn test_transitions() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Processing.can_transition_to(Pending));
        for terminal in [Completed, Failed] {
            for next in JobStatus::ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_media_kind_filenames() {
        assert_eq!(MediaKind::Audio.filename_for(7), "audio-7.m4a");
        assert_eq!(MediaKind::Video.filename_for(7), "video-7.mp4");
        assert_eq!(MediaKind::Audio.content_type(), "audio/mp4");
        assert_eq!(MediaKind::Video.content_type(), "video/mp4");
    }

    #[test]
    fn test_size_mb() {
        let artifact = Artifact {
            id: 1,
            job_id: 1,
            kind: MediaKind::Audio,
            filename: "audio-1.m4a".into(),
            storage_key: "k".into(),
            public_url: "u".into(),
            byte_size: 5 * 1024 * 1024 + 512 * 1024,
            expires_at: Utc::now(),
            created_at: Utc::now(),
        };
        assert_eq!(artifact.size_mb(), "5.50");
    }

    #[test]
    fn test_origin_serializes_without_workspace() {
        let origin = OriginRef {
            channel: "C1".into(),
            thread: "1.2".into(),
            user: "U1".into(),
            workspace: None,
        };
        let json = serde_json::to_value(&origin).unwrap();
        assert_eq!(json, serde_json::json!({"channel": "C1", "thread": "1.2", "user": "U1"}));
    }
}
