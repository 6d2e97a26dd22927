use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Job store error: {0}")]
    JobStore(#[from] crate::jobs::JobStoreError),

    #[error("Automation error: {0}")]
    Automation(#[from] crate::automation::AutomationError),

    #[error("Chat error: {0}")]
    Chat(#[from] crate::chat::ChatError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),

    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage is misconfigured: {0}")]
    Config(String),

    #[error("Upload of '{key}' failed: {source}")]
    Request {
        key: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Upload of '{key}' was rejected with HTTP {status}: {body}")]
    Rejected { key: String, status: u16, body: String },

    #[error("Link lifetime of {0}s is outside what presigned URLs support")]
    InvalidTtl(u64),
}

pub type Result<T> = std::result::Result<T, LinkcastError>;
