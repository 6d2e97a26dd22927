//! Media repository: generated artifacts stored per request.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw media row from the database.
#[derive(Debug, Clone)]
pub struct MediaRow {
    pub id: i64,
    pub request_id: i64,
    pub media_type: String,
    pub filename: String,
    pub storage_key: String,
    pub public_url: String,
    pub size_bytes: i64,
    pub expires_at: String,
    pub created_at: String,
}

impl MediaRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            request_id: row.get("request_id")?,
            media_type: row.get("media_type")?,
            filename: row.get("filename")?,
            storage_key: row.get("storage_key")?,
            public_url: row.get("public_url")?,
            size_bytes: row.get("size_bytes")?,
            expires_at: row.get("expires_at")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Inserts or replaces the artifact of one media type for a request.
///
/// There is at most one row per (request, media type); re-recording after a
/// retry overwrites the earlier upload's metadata.
pub fn upsert(db: &Database, row: &MediaRow) -> Result<MediaRow, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO media (request_id, media_type, filename, storage_key, public_url,
             size_bytes, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(request_id, media_type) DO UPDATE SET
               filename = ?3,
               storage_key = ?4,
               public_url = ?5,
               size_bytes = ?6,
               expires_at = ?7,
               created_at = ?8",
            params![
                row.request_id,
                row.media_type,
                row.filename,
                row.storage_key,
                row.public_url,
                row.size_bytes,
                row.expires_at,
                row.created_at,
            ],
        )?;
        let stored = conn.query_row(
            "SELECT * FROM media WHERE request_id = ?1 AND media_type = ?2",
            params![row.request_id, row.media_type],
            MediaRow::from_row,
        )?;
        Ok(stored)
    })
}

/// Lists all artifacts recorded for a request, audio before video.
pub fn list_for_request(db: &Database, request_id: i64) -> Result<Vec<MediaRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM media WHERE request_id = ?1 ORDER BY media_type ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![request_id], MediaRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
