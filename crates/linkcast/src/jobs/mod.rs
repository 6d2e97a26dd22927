//! Durable job queue: the single source of truth for request state.

pub mod model;
pub mod progress;
pub mod store;

use thiserror::Error;

use crate::db::DatabaseError;

pub use model::{
    Artifact, Job, JobId, JobStatus, MediaKind, NewArtifact, OriginRef, QueueStats, StatusUpdate,
};
pub use progress::{JobProgressBroadcaster, JobProgressEvent};
pub use store::{JobStore, ARTIFACT_TTL_DAYS};

#[derive(Error, Debug)]
pub enum JobStoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Invalid message reference '{0}': expected '<seconds>.<fraction>'")]
    InvalidAckRef(String),

    #[error("Invalid job input: {0}")]
    InvalidInput(String),
}
