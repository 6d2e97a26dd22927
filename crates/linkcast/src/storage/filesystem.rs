use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{storage_key, ObjectStorage};
use crate::error::StorageError;

/// Stores artifacts on a local directory that a web server exposes.
///
/// Keys are relative paths below `root`; public URLs are `base_url/key`.
/// The filesystem cannot enforce expiry, so the TTL only appears as an
/// `expires` hint on the URL.
pub struct FilesystemStorage {
    root: PathBuf,
    base_url: String,
}

impl FilesystemStorage {
    pub fn new<P: AsRef<Path>>(root: P, base_url: &str) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })
    }

    /// Creates the file exclusively so concurrent writers never clobber each
    /// other; on collision a numbered variant of the key is tried.
    async fn write_new(&self, key: &str, content: &[u8]) -> Result<String, StorageError> {
        let (base, ext) = match key.rfind('.') {
            Some(dot) if dot > key.rfind('/').map_or(0, |s| s + 1) => (&key[..dot], &key[dot..]),
            _ => (key, ""),
        };

        for counter in 1..=100 {
            let candidate = if counter == 1 {
                key.to_string()
            } else {
                format!("{}_{}{}", base, counter, ext)
            };
            let path = self.resolve(&candidate)?;

            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    let write = async {
                        file.write_all(content).await?;
                        file.flush().await
                    };
                    write.await.map_err(|e| StorageError::WriteFile {
                        path: path.clone(),
                        source: e,
                    })?;
                    return Ok(candidate);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StorageError::WriteFile { path, source: e }),
            }
        }

        Err(StorageError::FileExists(self.root.join(key)))
    }
}

#[async_trait]
impl ObjectStorage for FilesystemStorage {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let key = storage_key(Utc::now().timestamp_millis(), filename);
        let path = self.resolve(&key)?;
        if let Some(parent) = path.parent() {
            self.ensure_directory(parent).await?;
        }

        let key = self.write_new(&key, &bytes).await?;
        debug!(key = %key, bytes = bytes.len(), content_type, "Stored object");
        Ok(key)
    }

    async fn public_reference(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        let path = self.resolve(key)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(format!("{}/{}?expires={}", self.base_url, key, expires))
    }
}
