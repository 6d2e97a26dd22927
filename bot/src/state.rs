//! Shared handles built once at startup.

use std::path::Path;

use linkcast::config::{load_or_default, Config};
use linkcast::db::{default_database_path, Database};
use linkcast::error::ConfigError;
use linkcast::jobs::{JobProgressBroadcaster, JobStore};
use linkcast::logging::{self, WorkerGuard};
use linkcast::LinkcastError;
use log::info;

pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub store: JobStore,
    /// Flushes the log file on drop.
    _log_guard: Option<WorkerGuard>,
}

impl AppState {
    /// Loads config, starts logging and opens the database.
    pub fn load(config_path: &Path) -> Result<Self, LinkcastError> {
        let config = load_or_default(config_path)?;
        let log_guard = logging::init(&config.logging)?;

        let db_path = config
            .database
            .path
            .clone()
            .or_else(default_database_path)
            .ok_or_else(|| ConfigError::Validation {
                message: "database.path is not set and no home directory was found".to_string(),
            })?;
        info!("Using database at {}", db_path.display());

        let db = Database::open(&db_path)?;
        let store = JobStore::new(db.clone()).with_broadcaster(JobProgressBroadcaster::default());

        Ok(Self {
            config,
            db,
            store,
            _log_guard: log_guard,
        })
    }
}
