//! Persistence for the `import_jobs` table.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// `import_jobs` row as stored; the tracker owns the typed view.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub batch_id: String,
    pub kind: String,
    pub filename: String,
    pub status: String,
    pub total: u64,
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
    /// JSON array of `{key, reason}` objects.
    pub errors: String,
    pub message: Option<String>,
    pub cancel_requested: bool,
    pub operator: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            batch_id: row.get("batch_id")?,
            kind: row.get("kind")?,
            filename: row.get("filename")?,
            status: row.get("status")?,
            total: row.get::<_, i64>("total")?.max(0) as u64,
            processed: row.get::<_, i64>("processed")?.max(0) as u64,
            failed: row.get::<_, i64>("failed")?.max(0) as u64,
            skipped: row.get::<_, i64>("skipped")?.max(0) as u64,
            errors: row.get("errors")?,
            message: row.get("message")?,
            cancel_requested: row.get::<_, i64>("cancel_requested")? != 0,
            operator: row.get("operator")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

const INSERT_SQL: &str = "INSERT INTO import_jobs (id, batch_id, kind, filename, status, total,
     processed, failed, skipped, errors, message, cancel_requested, operator, created_at,
     updated_at, completed_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)";

/// Inserts all rows in one transaction: either every job exists afterwards
/// or none does.
pub fn insert_all(db: &Database, jobs: &[JobRow]) -> Result<(), DatabaseError> {
    db.with_transaction(|tx| {
        let mut stmt = tx.prepare_cached(INSERT_SQL)?;
        for job in jobs {
            stmt.execute(params![
                job.id,
                job.batch_id,
                job.kind,
                job.filename,
                job.status,
                job.total as i64,
                job.processed as i64,
                job.failed as i64,
                job.skipped as i64,
                job.errors,
                job.message,
                job.cancel_requested as i64,
                job.operator,
                job.created_at,
                job.updated_at,
                job.completed_at,
            ])?;
        }
        Ok(())
    })
}

/// Updates the mutable state of a job. The cancel flag is owned by
/// [`request_cancel`] and is never written here.
pub fn update(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE import_jobs SET status=?2, total=?3, processed=?4, failed=?5, skipped=?6,
             errors=?7, message=?8, updated_at=?9, completed_at=?10
             WHERE id=?1",
            params![
                job.id,
                job.status,
                job.total as i64,
                job.processed as i64,
                job.failed as i64,
                job.skipped as i64,
                job.errors,
                job.message,
                job.updated_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM import_jobs WHERE id = ?1",
                params![id],
                JobRow::from_row,
            )
            .optional()?)
    })
}

/// Lists the jobs of one batch in creation order.
pub fn list_by_batch(db: &Database, batch_id: &str) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM import_jobs WHERE batch_id = ?1 ORDER BY created_at, rowid",
        )?;
        let rows = stmt
            .query_map(params![batch_id], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Sets the advisory cancel flag on a pending or processing job. Returns
/// false if no such job matched.
pub fn request_cancel(db: &Database, id: &str, updated_at: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE import_jobs SET cancel_requested = 1, updated_at = ?2
             WHERE id = ?1 AND status IN ('pending', 'processing')",
            params![id, updated_at],
        )?;
        Ok(changed > 0)
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM import_jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
