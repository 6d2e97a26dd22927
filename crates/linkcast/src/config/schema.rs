use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::automation::{RetryConfig, UiMarkers};
use crate::jobs::MediaKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            database: DatabaseConfig::default(),
            automation: AutomationConfig::default(),
            storage: StorageConfig::default(),
            slack: SlackConfig::default(),
            dispatcher: DispatcherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file. Defaults to `~/.linkcast/data/linkcast.db`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// W3C WebDriver endpoint, e.g. a local chromedriver.
    pub webdriver_url: String,
    /// Persistent browser profile holding the service sign-in.
    pub user_data_dir: PathBuf,
    pub download_dir: PathBuf,
    pub headless: bool,
    pub locale: String,
    pub poll_interval_ms: u64,
    pub generation_poll_interval_ms: u64,
    /// Pause after clicks that open dialogs or navigate.
    pub settle_delay_ms: u64,
    pub element_timeout_secs: u64,
    pub source_ready_timeout_secs: u64,
    /// Wait after attaching a source so the service can index it.
    pub indexing_delay_secs: u64,
    pub audio_timeout_secs: u64,
    pub video_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub retry: RetryConfig,
    pub markers: UiMarkers,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            user_data_dir: PathBuf::from("./user-data"),
            download_dir: PathBuf::from("./downloads"),
            headless: false,
            locale: "ja-JP".to_string(),
            poll_interval_ms: 500,
            generation_poll_interval_ms: 5_000,
            settle_delay_ms: 2_000,
            element_timeout_secs: 10,
            source_ready_timeout_secs: 60,
            indexing_delay_secs: 10,
            audio_timeout_secs: 30 * 60,
            video_timeout_secs: 30 * 60,
            download_timeout_secs: 120,
            retry: RetryConfig::default(),
            markers: UiMarkers::default(),
        }
    }
}

impl AutomationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn generation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.generation_poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    pub fn source_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.source_ready_timeout_secs)
    }

    pub fn indexing_delay(&self) -> Duration {
        Duration::from_secs(self.indexing_delay_secs)
    }

    pub fn generation_timeout(&self, kind: MediaKind) -> Duration {
        match kind {
            MediaKind::Audio => Duration::from_secs(self.audio_timeout_secs),
            MediaKind::Video => Duration::from_secs(self.video_timeout_secs),
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Which [`ObjectStorage`](crate::storage::ObjectStorage) backend to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Local directory behind a web server. Link expiry is not enforced.
    #[default]
    Filesystem,
    /// S3-compatible bucket (Cloudflare R2, MinIO, AWS) with presigned links.
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory uploaded artifacts are written under.
    pub root: PathBuf,
    /// Base URL the root directory is served from.
    pub public_base_url: String,
    pub s3: S3Config,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Filesystem,
            root: PathBuf::from("./public"),
            public_base_url: "http://localhost:8080".to_string(),
            s3: S3Config::default(),
        }
    }
}

/// Bucket settings for [`StorageBackend::S3`]. Keys resolve from an inline
/// value, a file, or an env var.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Full endpoint URL. When unset, `account_id` selects the Cloudflare R2
    /// endpoint for that account.
    pub endpoint: Option<String>,
    pub account_id: Option<String>,
    pub bucket: String,
    pub region: String,
    /// `https://endpoint/bucket/key` instead of `https://bucket.endpoint/key`.
    pub path_style: bool,
    pub access_key_id: Option<String>,
    pub access_key_id_file: Option<String>,
    pub access_key_id_env_var: Option<String>,
    pub secret_access_key: Option<String>,
    pub secret_access_key_file: Option<String>,
    pub secret_access_key_env_var: Option<String>,
    pub upload_timeout_secs: u64,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            account_id: None,
            bucket: String::new(),
            region: "auto".to_string(),
            path_style: true,
            access_key_id: None,
            access_key_id_file: None,
            access_key_id_env_var: Some("R2_ACCESS_KEY_ID".to_string()),
            secret_access_key: None,
            secret_access_key_file: None,
            secret_access_key_env_var: Some("R2_SECRET_ACCESS_KEY".to_string()),
            upload_timeout_secs: 300,
        }
    }
}

impl S3Config {
    pub fn endpoint_url(&self) -> Option<String> {
        match (&self.endpoint, &self.account_id) {
            (Some(endpoint), _) if !endpoint.trim().is_empty() => {
                Some(endpoint.trim().to_string())
            }
            (_, Some(account)) if !account.trim().is_empty() => {
                Some(format!("https://{}.r2.cloudflarestorage.com", account.trim()))
            }
            _ => None,
        }
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

/// Credentials for one chat workspace, each resolvable from an inline
/// value, a file, or an env var.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceCredentials {
    pub bot_token: Option<String>,
    pub bot_token_file: Option<String>,
    pub bot_token_env_var: Option<String>,
    pub app_token: Option<String>,
    pub app_token_file: Option<String>,
    pub app_token_env_var: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub api_base_url: String,
    /// Explicit workspaces. `SLACK_WS<n>_*` variables are discovered in
    /// addition to these.
    pub workspaces: Vec<WorkspaceCredentials>,
    /// Key for encrypting stored bot credentials. Without one,
    /// installations are not persisted.
    pub token_key: Option<String>,
    pub token_key_file: Option<String>,
    pub token_key_env_var: Option<String>,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://slack.com/api".to_string(),
            workspaces: Vec::new(),
            token_key: None,
            token_key_file: None,
            token_key_env_var: Some(crate::secrets::TOKEN_KEY_ENV_VAR.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Wait when the queue is empty.
    pub idle_interval_secs: u64,
    /// Pause between consecutive jobs.
    pub between_jobs_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            idle_interval_secs: 5,
            between_jobs_secs: 1,
        }
    }
}

impl DispatcherConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }

    pub fn between_jobs(&self) -> Duration {
        Duration::from_secs(self.between_jobs_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
    /// Directory for daily rotated log files. `null` logs to stdout only.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            directory: Some(PathBuf::from("logs")),
        }
    }
}
