//! Request repository: the `requests` table backing the job queue.

use rusqlite::{params, Connection, Row};

use super::{Database, DatabaseError};

/// A raw request row from the database.
#[derive(Debug, Clone)]
pub struct RequestRow {
    pub id: i64,
    pub url: String,
    pub origin_channel: String,
    pub origin_thread: String,
    pub origin_user: String,
    pub workspace_id: Option<String>,
    pub status: String,
    pub progress: i64,
    pub current_step: Option<String>,
    pub error_message: Option<String>,
    pub ack_message_ref: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl RequestRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            url: row.get("url")?,
            origin_channel: row.get("origin_channel")?,
            origin_thread: row.get("origin_thread")?,
            origin_user: row.get("origin_user")?,
            workspace_id: row.get("workspace_id")?,
            status: row.get("status")?,
            progress: row.get("progress")?,
            current_step: row.get("current_step")?,
            error_message: row.get("error_message")?,
            ack_message_ref: row.get("ack_message_ref")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Values for a freshly enqueued request. Status starts at `pending`.
#[derive(Debug, Clone)]
pub struct NewRequest<'a> {
    pub url: &'a str,
    pub origin_channel: &'a str,
    pub origin_thread: &'a str,
    pub origin_user: &'a str,
    pub workspace_id: Option<&'a str>,
    pub created_at: &'a str,
}

/// A guarded status change.
///
/// The update only applies while the row's current status is one of
/// `allowed_from`. `progress` never lowers the stored value, and
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone)]
pub struct StatusChange<'a> {
    pub status: &'a str,
    pub allowed_from: &'a [&'a str],
    pub progress: Option<i64>,
    pub current_step: Option<&'a str>,
    pub error_message: Option<&'a str>,
    pub now: &'a str,
}

/// Inserts a new request row and returns its id.
pub fn insert(db: &Database, req: &NewRequest<'_>) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO requests (url, origin_channel, origin_thread, origin_user, workspace_id,
             status, progress, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0, ?6)",
            params![
                req.url,
                req.origin_channel,
                req.origin_thread,
                req.origin_user,
                req.workspace_id,
                req.created_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

fn find_with(conn: &Connection, id: i64) -> Result<Option<RequestRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM requests WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], RequestRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Finds a request by its id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<RequestRow>, DatabaseError> {
    db.with_conn(|conn| find_with(conn, id))
}

/// Returns the oldest request in the given status, ties broken by id.
pub fn find_oldest_with_status(
    db: &Database,
    status: &str,
) -> Result<Option<RequestRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM requests WHERE status = ?1 ORDER BY created_at ASC, id ASC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![status], RequestRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists requests in the given status, oldest first.
pub fn list_by_status(
    db: &Database,
    status: &str,
    limit: u64,
) -> Result<Vec<RequestRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM requests WHERE status = ?1 ORDER BY created_at ASC, id ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![status, limit as i64], RequestRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Lists the most recently created requests, newest first.
pub fn list_recent(db: &Database, limit: u64) -> Result<Vec<RequestRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM requests ORDER BY created_at DESC, id DESC LIMIT ?1")?;
        let rows = stmt
            .query_map(params![limit as i64], RequestRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Applies a guarded status change.
///
/// Returns the updated row, or `Ok(None)` when the guard rejected the change
/// (the row is missing or not in an allowed status). The check and the write
/// happen under the same connection lock.
pub fn apply_status_change(
    db: &Database,
    id: i64,
    change: &StatusChange<'_>,
) -> Result<Option<RequestRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
            Box::new(id),
            Box::new(change.status.to_string()),
            Box::new(change.progress),
            Box::new(change.current_step.map(str::to_string)),
            Box::new(change.error_message.map(str::to_string)),
            Box::new(change.now.to_string()),
        ];

        let mut guard = Vec::with_capacity(change.allowed_from.len());
        for status in change.allowed_from {
            param_values.push(Box::new(status.to_string()));
            guard.push(format!("?{}", param_values.len()));
        }
        if guard.is_empty() {
            return Ok(None);
        }

        let sql = format!(
            "UPDATE requests SET
                status = ?2,
                progress = CASE WHEN ?3 IS NULL THEN progress ELSE MAX(progress, ?3) END,
                current_step = COALESCE(?4, current_step),
                error_message = COALESCE(?5, error_message),
                started_at = CASE WHEN ?2 = 'processing' THEN COALESCE(started_at, ?6)
                             ELSE started_at END,
                completed_at = CASE WHEN ?2 IN ('completed', 'failed')
                               THEN COALESCE(completed_at, ?6)
                               ELSE completed_at END
             WHERE id = ?1 AND status IN ({})",
            guard.join(", ")
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let changed = conn.execute(&sql, params_ref.as_slice())?;
        if changed == 0 {
            return Ok(None);
        }
        find_with(conn, id)
    })
}

/// Stores the chat reference of the acknowledgement message for a request.
/// Returns the number of rows touched (0 when the id is unknown).
pub fn set_ack_message_ref(db: &Database, id: i64, ack_ref: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE requests SET ack_message_ref = ?2 WHERE id = ?1",
            params![id, ack_ref],
        )?;
        Ok(changed)
    })
}

/// Counts requests grouped by status.
pub fn count_by_status(db: &Database) -> Result<Vec<(String, u64)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM requests GROUP BY status ORDER BY status")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
