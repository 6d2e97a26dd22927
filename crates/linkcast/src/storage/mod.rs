//! Object storage for generated artifacts.

pub mod filesystem;
pub mod s3;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::StorageError;

pub use filesystem::FilesystemStorage;
pub use s3::S3Storage;

/// Where uploaded artifacts live and how users reach them.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores `bytes` and returns the opaque key they are stored under.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Returns a URL at which `key` can be fetched for at least `ttl`.
    async fn public_reference(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;
}

/// Builds the backend selected by `config.backend`.
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn ObjectStorage>, StorageError> {
    match config.backend {
        StorageBackend::Filesystem => Ok(Arc::new(FilesystemStorage::new(
            &config.root,
            &config.public_base_url,
        ))),
        StorageBackend::S3 => Ok(Arc::new(S3Storage::from_config(&config.s3)?)),
    }
}

/// Replaces every character outside `[A-Za-z0-9.-]` with `_`.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    // Leading dots would produce hidden files or `..` path segments.
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Builds a storage key: `media/<millis>-<sanitized filename>`.
pub fn storage_key(timestamp_millis: i64, filename: &str) -> String {
    format!("media/{}-{}", timestamp_millis, sanitize_filename(filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("audio-12.m4a"), "audio-12.m4a");
        assert_eq!(sanitize_filename("my video (1).mp4"), "my_video__1_.mp4");
        assert_eq!(sanitize_filename("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_filename("音声.m4a"), "__.m4a");
        assert_eq!(sanitize_filename("..."), "file");
    }

    #[test]
    fn test_from_config_defaults_to_filesystem() {
        assert!(from_config(&StorageConfig::default()).is_ok());
    }

    #[test]
    fn test_from_config_s3_needs_credentials() {
        let mut config = StorageConfig {
            backend: StorageBackend::S3,
            ..StorageConfig::default()
        };
        config.s3.account_id = Some("acct".to_string());
        config.s3.bucket = "overviews".to_string();
        config.s3.access_key_id_env_var = Some("LINKCAST_TEST_UNSET_S3_KEY".to_string());

        assert!(matches!(from_config(&config), Err(StorageError::Config(_))));

        config.s3.access_key_id = Some("AKIDTEST".to_string());
        config.s3.secret_access_key = Some("shh".to_string());
        assert!(from_config(&config).is_ok());
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(
            storage_key(1_700_000_000_123, "video-4.mp4"),
            "media/1700000000123-video-4.mp4"
        );
    }
}
