//! Schema migrations keyed on SQLite's `user_version` pragma.
//!
//! Migration `n` (1-based) is the `n`-th entry of [`MIGRATIONS`]. Each one
//! runs in its own transaction together with the version bump, so a failed
//! step leaves the store at the previous version.

use rusqlite::Connection;

use super::error::DatabaseError;

const MIGRATIONS: &[&str] = &[
    include_str!("sql/001_create_archive_records.sql"),
    include_str!("sql/002_create_import_jobs.sql"),
    include_str!("sql/003_create_audit_log.sql"),
];

/// Schema version this build expects.
pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}

pub fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Brings the schema up to [`latest_version`]. Returns the number of
/// migrations applied.
pub fn migrate(conn: &mut Connection) -> Result<u32, DatabaseError> {
    let current = schema_version(conn)?;
    let latest = latest_version();
    if current > latest {
        return Err(DatabaseError::Migration {
            version: current,
            reason: format!("store is newer than this build (expects v{})", latest),
        });
    }

    for (index, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let version = index as u32 + 1;
        let tx = conn.transaction()?;
        tx.execute_batch(sql).map_err(|e| DatabaseError::Migration {
            version,
            reason: e.to_string(),
        })?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        log::info!("Applied schema migration v{}", version);
    }

    Ok(latest - current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_store_reaches_latest() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(migrate(&mut conn).unwrap(), latest_version());
        assert_eq!(schema_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn test_second_run_applies_nothing() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        assert_eq!(migrate(&mut conn).unwrap(), 0);
    }

    #[test]
    fn test_newer_store_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", latest_version() + 1)
            .unwrap();
        assert!(matches!(
            migrate(&mut conn),
            Err(DatabaseError::Migration { .. })
        ));
    }

    #[test]
    fn test_archive_no_is_unique() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let insert = "INSERT INTO archive_records (archive_no, file_path, created_at, updated_at)
                      VALUES ('A-1', '/x.pdf', '2026-01-01', '2026-01-01')";
        conn.execute(insert, []).unwrap();
        let err = conn.execute(insert, []).unwrap_err();
        assert!(DatabaseError::is_constraint_violation(&err));
    }
}
