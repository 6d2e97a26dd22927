//! S3-compatible bucket storage. Links are presigned GET URLs, so the
//! bucket enforces their expiry.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use rusty_s3::{Bucket, Credentials, S3Action, UrlStyle};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use super::{storage_key, ObjectStorage};
use crate::config::S3Config;
use crate::error::StorageError;
use crate::secrets;

/// Longest lifetime SigV4 allows for a presigned URL.
pub const MAX_LINK_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Lifetime of the presigned PUT used for a single upload.
const UPLOAD_SIGNATURE_TTL: Duration = Duration::from_secs(15 * 60);

/// Error bodies are cut to this many characters before they reach logs.
const MAX_ERROR_BODY: usize = 512;

pub struct S3Storage {
    bucket: Bucket,
    credentials: Credentials,
    http: Client,
}

impl S3Storage {
    pub fn new(
        config: &S3Config,
        access_key_id: &str,
        secret_access_key: &SecretString,
    ) -> Result<Self, StorageError> {
        let endpoint = config
            .endpoint_url()
            .ok_or_else(|| StorageError::Config("no endpoint or account id".to_string()))?;
        let endpoint = url::Url::parse(&endpoint)
            .map_err(|e| StorageError::Config(format!("endpoint {}: {}", endpoint, e)))?;
        let style = if config.path_style {
            UrlStyle::Path
        } else {
            UrlStyle::VirtualHost
        };
        let bucket = Bucket::new(endpoint, style, config.bucket.clone(), config.region.clone())
            .map_err(|e| StorageError::Config(e.to_string()))?;
        let http = Client::builder()
            .timeout(config.upload_timeout())
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        info!(bucket = %config.bucket, "Object storage bucket configured");
        Ok(Self {
            bucket,
            credentials: Credentials::new(access_key_id, secret_access_key.expose_secret()),
            http,
        })
    }

    /// Resolves the access keys from their configured sources.
    pub fn from_config(config: &S3Config) -> Result<Self, StorageError> {
        let secret = |value: &Option<String>, file: &Option<String>, env: &Option<String>| {
            secrets::resolve_secret(value.as_deref(), file.as_deref(), env.as_deref())
                .map_err(|e| StorageError::Config(e.to_string()))
        };
        let access_key_id = secret(
            &config.access_key_id,
            &config.access_key_id_file,
            &config.access_key_id_env_var,
        )?;
        let secret_access_key = secret(
            &config.secret_access_key,
            &config.secret_access_key_file,
            &config.secret_access_key_env_var,
        )?;
        Self::new(config, access_key_id.expose_secret(), &secret_access_key)
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let key = storage_key(Utc::now().timestamp_millis(), filename);
        let url = self
            .bucket
            .put_object(Some(&self.credentials), &key)
            .sign(UPLOAD_SIGNATURE_TTL);
        let size = bytes.len();

        let response = self
            .http
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|source| StorageError::Request {
                key: key.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                key,
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        info!(key = %key, bytes = size, content_type, "Uploaded object");
        Ok(key)
    }

    async fn public_reference(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        if ttl.is_zero() || ttl > MAX_LINK_TTL {
            return Err(StorageError::InvalidTtl(ttl.as_secs()));
        }
        let url = self
            .bucket
            .get_object(Some(&self.credentials), key)
            .sign(ttl);
        debug!(key, ttl_secs = ttl.as_secs(), "Presigned download link");
        Ok(url.to_string())
    }
}
