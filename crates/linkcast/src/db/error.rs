use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored row holds a value the domain types cannot represent.
    #[error("Corrupt row {id} in '{table}': {reason}")]
    CorruptRow {
        table: &'static str,
        id: i64,
        reason: String,
    },

    #[error("Database lock poisoned")]
    LockPoisoned,
}
