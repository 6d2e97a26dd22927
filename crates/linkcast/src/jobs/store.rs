use std::sync::LazyLock;

use chrono::{Duration, Utc};
use regex::Regex;
use tracing::{debug, info};

use crate::db::{
    self, format_timestamp, media_repo, media_repo::MediaRow, parse_timestamp, request_repo,
    request_repo::NewRequest, request_repo::RequestRow, request_repo::StatusChange, Database,
    DatabaseError,
};

use super::model::{
    Artifact, Job, JobId, JobStatus, MediaKind, NewArtifact, OriginRef, QueueStats, StatusUpdate,
};
use super::progress::{JobProgressBroadcaster, JobProgressEvent};
use super::JobStoreError;

/// Days a recorded artifact stays downloadable.
pub const ARTIFACT_TTL_DAYS: i64 = 7;

static RE_MESSAGE_REF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.\d+$").unwrap());

/// Persistent FIFO job queue with guarded status transitions.
///
/// Cheap to clone. Every accepted status update is also published on the
/// attached [`JobProgressBroadcaster`], if any.
#[derive(Clone)]
pub struct JobStore {
    db: Database,
    progress: Option<JobProgressBroadcaster>,
}

impl JobStore {
    pub fn new(db: Database) -> Self {
        Self { db, progress: None }
    }

    pub fn with_broadcaster(mut self, broadcaster: JobProgressBroadcaster) -> Self {
        self.progress = Some(broadcaster);
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Subscribes to progress events, if a broadcaster is attached.
    pub fn subscribe(&self) -> Option<tokio::sync::broadcast::Receiver<JobProgressEvent>> {
        self.progress.as_ref().map(|b| b.subscribe())
    }

    /// Persists a new pending job and returns its id.
    pub fn enqueue(&self, url: &str, origin: &OriginRef) -> Result<JobId, JobStoreError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(JobStoreError::InvalidInput("url must not be empty".into()));
        }

        let now = format_timestamp(&Utc::now());
        let id = request_repo::insert(
            &self.db,
            &NewRequest {
                url,
                origin_channel: &origin.channel,
                origin_thread: &origin.thread,
                origin_user: &origin.user,
                workspace_id: origin.workspace.as_deref(),
                created_at: &now,
            },
        )?;

        info!(job_id = id, "Job enqueued");
        Ok(id)
    }

    /// Returns the oldest pending job without changing it.
    ///
    /// The caller is expected to move it to `processing` right away; the
    /// single-consumer dispatcher makes the gap between the two harmless.
    pub fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        request_repo::find_oldest_with_status(&self.db, JobStatus::Pending.as_str())?
            .map(row_to_job)
            .transpose()
    }

    /// Moves a job to `status`, applying the optional fields in `update`.
    ///
    /// Progress never decreases and is capped at 100. Moving into
    /// `processing` stamps `started_at` once; terminal states stamp
    /// `completed_at`.
    pub fn update_status(
        &self,
        job_id: JobId,
        status: JobStatus,
        update: StatusUpdate,
    ) -> Result<Job, JobStoreError> {
        let now = format_timestamp(&Utc::now());
        let change = StatusChange {
            status: status.as_str(),
            allowed_from: status.allowed_predecessors(),
            progress: update.progress.map(|p| i64::from(p.min(100))),
            current_step: update.current_step.as_deref(),
            error_message: update.error_message.as_deref(),
            now: &now,
        };

        match request_repo::apply_status_change(&self.db, job_id, &change)? {
            Some(row) => {
                let job = row_to_job(row)?;
                debug!(
                    job_id,
                    status = %job.status,
                    progress = job.progress,
                    step = job.current_step.as_deref().unwrap_or(""),
                    "Job status updated"
                );
                if let Some(ref broadcaster) = self.progress {
                    broadcaster.send(JobProgressEvent::from_job(&job));
                }
                Ok(job)
            }
            None => match request_repo::find_by_id(&self.db, job_id)? {
                None => Err(JobStoreError::NotFound(job_id)),
                Some(row) => {
                    let current = row_to_job(row)?;
                    Err(JobStoreError::InvalidTransition {
                        job_id,
                        from: current.status,
                        to: status,
                    })
                }
            },
        }
    }

    /// Records an uploaded artifact. Expiry is fixed at creation + 7 days.
    pub fn record_artifact(
        &self,
        job_id: JobId,
        artifact: NewArtifact,
    ) -> Result<Artifact, JobStoreError> {
        if request_repo::find_by_id(&self.db, job_id)?.is_none() {
            return Err(JobStoreError::NotFound(job_id));
        }

        let created = Utc::now();
        let expires = created + Duration::days(ARTIFACT_TTL_DAYS);
        let row = media_repo::upsert(
            &self.db,
            &MediaRow {
                id: 0,
                request_id: job_id,
                media_type: artifact.kind.as_str().to_string(),
                filename: artifact.filename,
                storage_key: artifact.storage_key,
                public_url: artifact.public_url,
                size_bytes: i64::try_from(artifact.byte_size).unwrap_or(i64::MAX),
                expires_at: format_timestamp(&expires),
                created_at: format_timestamp(&created),
            },
        )?;

        info!(job_id, kind = %artifact.kind, "Artifact recorded");
        row_to_artifact(row)
    }

    pub fn get_artifacts(&self, job_id: JobId) -> Result<Vec<Artifact>, JobStoreError> {
        media_repo::list_for_request(&self.db, job_id)?
            .into_iter()
            .map(row_to_artifact)
            .collect()
    }

    pub fn get_job(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        request_repo::find_by_id(&self.db, job_id)?
            .map(row_to_job)
            .transpose()
    }

    pub fn stats(&self) -> Result<QueueStats, JobStoreError> {
        let mut stats = QueueStats::default();
        for (status, count) in request_repo::count_by_status(&self.db)? {
            match JobStatus::parse(&status) {
                Some(JobStatus::Pending) => stats.pending = count,
                Some(JobStatus::Processing) => stats.processing = count,
                Some(JobStatus::Completed) => stats.completed = count,
                Some(JobStatus::Failed) => stats.failed = count,
                None => log::warn!("Ignoring {} rows with unknown status '{}'", count, status),
            }
        }
        Ok(stats)
    }

    /// Associates the chat acknowledgement message with a job.
    pub fn set_ack_message(&self, job_id: JobId, ack_ref: &str) -> Result<(), JobStoreError> {
        if !RE_MESSAGE_REF.is_match(ack_ref) {
            return Err(JobStoreError::InvalidAckRef(ack_ref.to_string()));
        }
        match request_repo::set_ack_message_ref(&self.db, job_id, ack_ref)? {
            0 => Err(JobStoreError::NotFound(job_id)),
            _ => Ok(()),
        }
    }

    /// Jobs currently marked `processing`, oldest first.
    ///
    /// With a single dispatcher, any such job seen at startup was orphaned
    /// by a crash.
    pub fn in_flight(&self) -> Result<Vec<Job>, JobStoreError> {
        request_repo::list_by_status(&self.db, JobStatus::Processing.as_str(), 1000)?
            .into_iter()
            .map(row_to_job)
            .collect()
    }

    /// Most recently created jobs, newest first.
    pub fn recent(&self, limit: u64) -> Result<Vec<Job>, JobStoreError> {
        request_repo::list_recent(&self.db, limit)?
            .into_iter()
            .map(row_to_job)
            .collect()
    }
}

fn row_to_job(row: RequestRow) -> Result<Job, JobStoreError> {
    let status = JobStatus::parse(&row.status).ok_or_else(|| DatabaseError::CorruptRow {
        table: "requests",
        id: row.id,
        reason: format!("unknown status '{}'", row.status),
    })?;

    Ok(Job {
        id: row.id,
        url: row.url,
        origin: OriginRef {
            channel: row.origin_channel,
            thread: row.origin_thread,
            user: row.origin_user,
            workspace: row.workspace_id,
        },
        status,
        progress: row.progress.clamp(0, 100) as u8,
        current_step: row.current_step,
        error_message: row.error_message,
        ack_message_ref: row.ack_message_ref,
        created_at: parse_timestamp(&row.created_at),
        started_at: row.started_at.as_deref().map(db::parse_timestamp),
        completed_at: row.completed_at.as_deref().map(db::parse_timestamp),
    })
}

fn row_to_artifact(row: MediaRow) -> Result<Artifact, JobStoreError> {
    let kind = MediaKind::parse(&row.media_type).ok_or_else(|| DatabaseError::CorruptRow {
        table: "media",
        id: row.id,
        reason: format!("unknown media type '{}'", row.media_type),
    })?;

    Ok(Artifact {
        id: row.id,
        job_id: row.request_id,
        kind,
        filename: row.filename,
        storage_key: row.storage_key,
        public_url: row.public_url,
        byte_size: u64::try_from(row.size_bytes).unwrap_or(0),
        expires_at: parse_timestamp(&row.expires_at),
        created_at: parse_timestamp(&row.created_at),
    })
}
