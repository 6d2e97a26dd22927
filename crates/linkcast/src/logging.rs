//! Process-wide tracing setup.

use std::path::Path;

use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use tracing_appender::non_blocking::WorkerGuard;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::LinkcastError;

/// Log files are named `system.YYYY-MM-DD.log`.
const LOG_FILE_PREFIX: &str = "system";
const LOG_FILE_SUFFIX: &str = "log";

/// Builds the filter: `RUST_LOG` wins, then the configured level.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Opens a daily rotating file writer under `dir`, creating it if needed.
pub fn file_writer(dir: &Path) -> Result<(NonBlocking, WorkerGuard), LinkcastError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        LinkcastError::Logging(format!("cannot create log directory {}: {}", dir.display(), e))
    })?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .build(dir)
        .map_err(|e| LinkcastError::Logging(e.to_string()))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Installs the global subscriber and bridges `log` records into it.
///
/// When a log directory is configured, records are also written to a daily
/// file; keep the returned guard alive until exit so buffered lines flush.
/// Fails if a subscriber or logger was already installed.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LinkcastError> {
    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let (writer, guard) = file_writer(dir)?;
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_log::LogTracer::init().map_err(|e| LinkcastError::Logging(e.to_string()))?;

    let registry = tracing_subscriber::registry()
        .with(build_filter(config))
        .with(file_layer);
    let result = match config.format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init(),
    };
    result.map_err(|e| LinkcastError::Logging(e.to_string()))?;
    Ok(guard)
}
