//! Versioned schema upgrades for the SQLite store.
//!
//! Versions live in `_migrations`. Column additions check the live schema
//! first so a database touched by an older build can still be upgraded.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    kind: MigrationKind,
}

enum MigrationKind {
    /// Execute the SQL directly.
    Standard,
    /// ALTER TABLE ADD COLUMN, skipped if the column already exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
    },
}

/// Ordered by version; the SQL lives in `db/sql/`.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_requests_table",
        sql: include_str!("sql/001_create_requests.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 2,
        description: "create_media_table",
        sql: include_str!("sql/002_create_media.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 3,
        description: "create_installations_table",
        sql: include_str!("sql/003_create_installations.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 4,
        description: "add_ack_message_ref_to_requests",
        sql: include_str!("sql/004_add_ack_message_ref.sql"),
        kind: MigrationKind::AddColumn {
            table: "requests",
            column: "ack_message_ref",
        },
    },
];

/// Brings the schema up to date.
///
/// Each pending migration is applied and recorded in one transaction, so an
/// interrupted upgrade never leaves a half-applied version behind.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let applied: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        apply(conn, migration)?;
    }
    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let failed = |e: rusqlite::Error| DatabaseError::Migration {
        version: migration.version,
        reason: e.to_string(),
    };

    let tx = conn.unchecked_transaction().map_err(failed)?;
    let needed = match migration.kind {
        MigrationKind::Standard => true,
        MigrationKind::AddColumn { table, column } => !has_column(&tx, table, column)?,
    };

    if needed {
        log::info!("Applying schema v{} ({})", migration.version, migration.description);
        tx.execute_batch(migration.sql).map_err(failed)?;
    } else {
        log::info!("Schema v{} already present, recording only", migration.version);
    }

    tx.execute(
        "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
        rusqlite::params![migration.version, migration.description],
    )
    .map_err(failed)?;
    tx.commit().map_err(failed)
}

/// `PRAGMA table_info` lookup. Table names are interpolated, so only plain
/// identifiers are accepted.
fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("refusing to inspect table '{}'", table),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    Ok(names.any(|name| matches!(name, Ok(ref n) if n == column)))
}
