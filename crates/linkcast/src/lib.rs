pub mod automation;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod pipeline;
pub mod sanitize;
pub mod secrets;
pub mod storage;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use automation::{AutomationError, RetrySupervisor, SessionDriver, WebDriverSession};
pub use chat::{ChatError, Ingestor, SlackNotifier, WorkspaceRegistry};
pub use config::{load_config, load_or_default, Config};
pub use db::Database;
pub use error::{ConfigError, LinkcastError, Result, StorageError};
pub use jobs::{Job, JobId, JobStatus, JobStore, JobStoreError, MediaKind, OriginRef};
pub use pipeline::{JobNotifier, JobOutcome, Pipeline, PipelineConfig};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError, TokenEncryptor};
pub use storage::{FilesystemStorage, ObjectStorage, S3Storage};
pub use worker::Dispatcher;
