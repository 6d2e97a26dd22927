//! Installation repository: chat workspaces the bot is installed in.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw installation row. The bot credential is stored encrypted.
#[derive(Debug, Clone)]
pub struct InstallationRow {
    pub team_id: String,
    pub team_name: Option<String>,
    pub enterprise_id: String,
    pub bot_user_id: Option<String>,
    pub bot_id: Option<String>,
    pub bot_token_encrypted: String,
    pub installed_at: String,
    pub updated_at: String,
}

impl InstallationRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            team_id: row.get("team_id")?,
            team_name: row.get("team_name")?,
            enterprise_id: row.get("enterprise_id")?,
            bot_user_id: row.get("bot_user_id")?,
            bot_id: row.get("bot_id")?,
            bot_token_encrypted: row.get("bot_token_encrypted")?,
            installed_at: row.get("installed_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts or updates an installation keyed by (team, enterprise).
pub fn upsert(db: &Database, row: &InstallationRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO installations (team_id, team_name, enterprise_id, bot_user_id, bot_id,
             bot_token_encrypted, installed_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(team_id, enterprise_id) DO UPDATE SET
               team_name = ?2,
               bot_user_id = ?4,
               bot_id = ?5,
               bot_token_encrypted = ?6,
               updated_at = ?8",
            params![
                row.team_id,
                row.team_name,
                row.enterprise_id,
                row.bot_user_id,
                row.bot_id,
                row.bot_token_encrypted,
                row.installed_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds an installation by team id (outside any enterprise grid).
pub fn find(db: &Database, team_id: &str) -> Result<Option<InstallationRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM installations WHERE team_id = ?1 AND enterprise_id = ''",
        )?;
        let mut rows = stmt.query_map(params![team_id], InstallationRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists all installations ordered by team id.
pub fn list(db: &Database) -> Result<Vec<InstallationRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM installations ORDER BY team_id ASC")?;
        let rows = stmt
            .query_map([], InstallationRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
