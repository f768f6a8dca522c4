//! Audit trail for state-changing steps.
//!
//! Writing an audit entry never fails the operation it describes: storage
//! errors are logged and swallowed.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::audit_repo::{self, AuditRow};
use crate::db::Database;

/// Who triggered an operation and from where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperatorContext {
    pub operator: String,
    pub ip: Option<String>,
}

impl OperatorContext {
    pub fn new(operator: impl Into<String>, ip: Option<String>) -> Self {
        Self {
            operator: operator.into(),
            ip,
        }
    }

    /// Context for jobs started by the process itself.
    pub fn system() -> Self {
        Self::new("system", None)
    }
}

/// Operation names written to the audit log.
pub mod operation {
    pub const IMPORT: &str = "import";
    pub const IMPORT_SKIPPED: &str = "import_skipped";
    pub const IMPORT_FAILED: &str = "import_failed";
    pub const CSV_ENRICH: &str = "csv_enrich";
    pub const CSV_ENRICH_FAILED: &str = "csv_enrich_failed";
}

/// One audit entry: `{operator, operation, target, ip, timestamp}`.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub operator: String,
    pub operation: &'static str,
    pub target: String,
    pub ip: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEntry {
    pub fn new(ctx: &OperatorContext, operation: &'static str, target: impl Into<String>) -> Self {
        Self {
            operator: ctx.operator.clone(),
            operation,
            target: target.into(),
            ip: ctx.ip.clone(),
            timestamp: Utc::now(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Audit log writer backed by the relational store.
#[derive(Clone)]
pub struct AuditLog {
    db: Database,
}

impl AuditLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Records an entry. Failures are logged, never returned.
    pub fn record(&self, entry: AuditEntry) {
        let row = AuditRow {
            operator: entry.operator,
            operation: entry.operation.to_string(),
            target: entry.target,
            ip: entry.ip,
            detail: entry.detail,
            created_at: entry.timestamp.to_rfc3339(),
        };
        if let Err(e) = audit_repo::insert(&self.db, &row) {
            log::warn!(
                "Failed to write audit entry {} for '{}': {}",
                row.operation,
                row.target,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_persists_entry() {
        let db = Database::open_in_memory().unwrap();
        let audit = AuditLog::new(db.clone());
        let ctx = OperatorContext::new("alice", Some("192.168.1.5".to_string()));

        audit.record(AuditEntry::new(&ctx, operation::IMPORT, "A-001").with_detail("1 KB"));

        let rows = audit_repo::list_by_operation(&db, operation::IMPORT).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].operator, "alice");
        assert_eq!(rows[0].ip.as_deref(), Some("192.168.1.5"));
        assert_eq!(rows[0].detail.as_deref(), Some("1 KB"));
    }

    #[test]
    fn test_record_swallows_storage_errors() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE audit_log;")?;
            Ok(())
        })
        .unwrap();
        let audit = AuditLog::new(db);

        // Must not panic or propagate.
        audit.record(AuditEntry::new(
            &OperatorContext::system(),
            operation::IMPORT,
            "A-001",
        ));
    }
}
