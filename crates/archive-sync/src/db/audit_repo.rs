//! Append-only `audit_log` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw audit row.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRow {
    pub operator: String,
    pub operation: String,
    pub target: String,
    pub ip: Option<String>,
    pub detail: Option<String>,
    pub created_at: String,
}

impl AuditRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            operator: row.get("operator")?,
            operation: row.get("operation")?,
            target: row.get("target")?,
            ip: row.get("ip")?,
            detail: row.get("detail")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Appends one audit row.
pub fn insert(db: &Database, row: &AuditRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO audit_log (operator, operation, target, ip, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.operator,
                row.operation,
                row.target,
                row.ip,
                row.detail,
                row.created_at,
            ],
        )?;
        Ok(())
    })
}

/// Lists rows for one operation, oldest first.
pub fn list_by_operation(db: &Database, operation: &str) -> Result<Vec<AuditRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM audit_log WHERE operation = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![operation], AuditRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
