use std::path::Path;

use crate::automation::{RetryPolicy, Selector};
use crate::config::schema::{Config, StorageBackend};
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Loads `path` if it exists, otherwise starts from defaults. Environment
/// overrides are applied and the result validated either way.
pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        load_config(path)?
    } else {
        log::info!("No config at {}, using defaults", path.display());
        Config::default()
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    validate_config(&config)?;
    Ok(config)
}

/// Applies `LINKCAST_*` overrides. `lookup` is the environment.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("LINKCAST_DATABASE") {
        config.database.path = Some(v.into());
    }
    if let Some(v) = lookup("LINKCAST_WEBDRIVER_URL") {
        config.automation.webdriver_url = v;
    }
    if let Some(v) = lookup("LINKCAST_USER_DATA_DIR") {
        config.automation.user_data_dir = v.into();
    }
    if let Some(v) = lookup("LINKCAST_DOWNLOAD_DIR") {
        config.automation.download_dir = v.into();
    }
    if let Some(v) = lookup("LINKCAST_HEADLESS") {
        config.automation.headless = matches!(v.trim(), "1" | "true" | "yes");
    }
    if let Some(v) = lookup("LINKCAST_STORAGE_ROOT") {
        config.storage.root = v.into();
    }
    if let Some(v) = lookup("LINKCAST_PUBLIC_BASE_URL") {
        config.storage.public_base_url = v;
    }
    if let Some(v) = lookup("LINKCAST_STORAGE_BACKEND") {
        match v.trim() {
            "s3" => config.storage.backend = StorageBackend::S3,
            "filesystem" => config.storage.backend = StorageBackend::Filesystem,
            other => log::warn!("Ignoring unknown LINKCAST_STORAGE_BACKEND '{}'", other),
        }
    }
    if let Some(v) = lookup("R2_ACCOUNT_ID") {
        config.storage.s3.account_id = Some(v);
    }
    if let Some(v) = lookup("R2_BUCKET_NAME") {
        config.storage.s3.bucket = v;
    }
    if let Some(v) = lookup("LINKCAST_LOG") {
        config.logging.level = v;
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return invalid(format!("Unsupported config version: {}", config.version));
    }

    let automation = &config.automation;
    if url::Url::parse(&automation.webdriver_url).is_err() {
        return invalid(format!(
            "automation.webdriver_url is not a URL: {}",
            automation.webdriver_url
        ));
    }
    for (name, value) in [
        ("poll_interval_ms", automation.poll_interval_ms),
        ("generation_poll_interval_ms", automation.generation_poll_interval_ms),
        ("element_timeout_secs", automation.element_timeout_secs),
        ("source_ready_timeout_secs", automation.source_ready_timeout_secs),
        ("audio_timeout_secs", automation.audio_timeout_secs),
        ("video_timeout_secs", automation.video_timeout_secs),
        ("download_timeout_secs", automation.download_timeout_secs),
    ] {
        if value == 0 {
            return invalid(format!("automation.{} must be positive", name));
        }
    }
    validate_policy("cheap", &automation.retry.cheap)?;
    validate_policy("expensive", &automation.retry.expensive)?;

    let markers = &automation.markers;
    let mut selectors = vec![
        ("create_workspace", &markers.create_workspace),
        ("source_type_website", &markers.source_type_website),
        ("source_url_input", &markers.source_url_input),
        ("source_submit", &markers.source_submit),
        ("source_ready", &markers.source_ready),
        ("download_action", &markers.download_action),
    ];
    for (prefix, generation) in [("audio", &markers.audio), ("video", &markers.video)] {
        selectors.push((prefix, &generation.trigger));
        selectors.push((prefix, &generation.in_progress));
        selectors.push((prefix, &generation.artifact_card));
    }
    for (name, selector) in selectors {
        let value = match selector {
            Selector::Css(s)
            | Selector::Text(s)
            | Selector::ContainsText(s)
            | Selector::Xpath(s) => s,
        };
        if value.trim().is_empty() {
            return invalid(format!("automation.markers.{} must not be empty", name));
        }
    }

    let storage = &config.storage;
    match storage.backend {
        StorageBackend::Filesystem => {
            if url::Url::parse(&storage.public_base_url).is_err() {
                return invalid(format!(
                    "storage.public_base_url is not a URL: {}",
                    storage.public_base_url
                ));
            }
        }
        StorageBackend::S3 => {
            if storage.s3.bucket.trim().is_empty() {
                return invalid("storage.s3.bucket must be set".to_string());
            }
            let Some(endpoint) = storage.s3.endpoint_url() else {
                return invalid("storage.s3 needs an endpoint or account_id".to_string());
            };
            if url::Url::parse(&endpoint).is_err() {
                return invalid(format!("storage.s3.endpoint is not a URL: {}", endpoint));
            }
            if storage.s3.upload_timeout_secs == 0 {
                return invalid("storage.s3.upload_timeout_secs must be positive".to_string());
            }
        }
    }

    Ok(())
}

fn validate_policy(name: &str, policy: &RetryPolicy) -> Result<(), ConfigError> {
    if policy.max_attempts == 0 {
        return invalid(format!("automation.retry.{}.max_attempts must be at least 1", name));
    }
    if policy.max_delay_ms < policy.base_delay_ms {
        return invalid(format!(
            "automation.retry.{}.max_delay_ms must not be below base_delay_ms",
            name
        ));
    }
    Ok(())
}

fn invalid<T>(message: String) -> Result<T, ConfigError> {
    Err(ConfigError::Validation { message })
}
