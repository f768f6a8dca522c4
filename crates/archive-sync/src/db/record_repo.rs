//! Queries over the `archive_records` table.

use std::collections::HashSet;

use rusqlite::{params, params_from_iter, Row};

use super::{now_timestamp, Database, DatabaseError};
use crate::records::{ArchiveRecord, FieldUpdate, MetadataField};

/// SQLite's default host parameter limit is 999; stay well below it.
const KEY_CHUNK: usize = 500;

/// Columns searched by the relational fallback query.
const FALLBACK_COLUMNS: &[&str] = &[
    "archive_no",
    "title",
    "fonds_no",
    "responsible",
    "doc_number",
    "keywords",
    "remarks",
];

/// Fields required to create a skeleton record.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub archive_no: String,
    pub file_path: String,
    pub file_size: u64,
    pub created_by: Option<String>,
}

fn record_from_row(row: &Row<'_>) -> Result<ArchiveRecord, rusqlite::Error> {
    let file_size: i64 = row.get("file_size")?;
    Ok(ArchiveRecord {
        id: row.get("id")?,
        archive_no: row.get("archive_no")?,
        title: row.get("title")?,
        fonds_no: row.get("fonds_no")?,
        year: row.get("year")?,
        retention_period: row.get("retention_period")?,
        responsible: row.get("responsible")?,
        doc_number: row.get("doc_number")?,
        doc_date: row.get("doc_date")?,
        security_level: row.get("security_level")?,
        keywords: row.get("keywords")?,
        remarks: row.get("remarks")?,
        file_path: row.get("file_path")?,
        file_size: file_size.max(0) as u64,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn find_by_key_in(
    conn: &rusqlite::Connection,
    key: &str,
) -> Result<Option<ArchiveRecord>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM archive_records WHERE archive_no = ?1")?;
    let mut rows = stmt.query_map(params![key], record_from_row)?;
    match rows.next() {
        Some(Ok(record)) => Ok(Some(record)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Inserts a skeleton record: archive number and file pointer only.
///
/// Returns [`DatabaseError::DuplicateKey`] when the archive number is taken.
pub fn insert_skeleton(db: &Database, record: &NewRecord) -> Result<ArchiveRecord, DatabaseError> {
    db.with_conn(|conn| {
        let now = now_timestamp();
        let inserted = conn.execute(
            "INSERT INTO archive_records (archive_no, file_path, file_size, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                record.archive_no,
                record.file_path,
                record.file_size as i64,
                record.created_by,
                now,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if DatabaseError::is_constraint_violation(&e) => {
                return Err(DatabaseError::DuplicateKey(record.archive_no.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        find_by_key_in(conn, &record.archive_no)?.ok_or_else(|| DatabaseError::Corrupt {
            column: "archive_no",
            reason: format!("inserted record '{}' not readable", record.archive_no),
        })
    })
}

/// Finds a record by its archive number.
pub fn find_by_key(db: &Database, key: &str) -> Result<Option<ArchiveRecord>, DatabaseError> {
    db.with_conn(|conn| find_by_key_in(conn, key))
}

/// Returns true if a record with the given archive number exists.
pub fn exists(db: &Database, key: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM archive_records WHERE archive_no = ?1)",
            params![key],
            |r| r.get(0),
        )?;
        Ok(found)
    })
}

/// Returns the subset of `keys` that exist in the store.
pub fn existing_keys(db: &Database, keys: &[String]) -> Result<HashSet<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut found = HashSet::new();
        for chunk in keys.chunks(KEY_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT archive_no FROM archive_records WHERE archive_no IN ({})",
                placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |r| r.get::<_, String>(0))?;
            for row in rows {
                found.insert(row?);
            }
        }
        Ok(found)
    })
}

/// Loads records by surrogate id. Order of the result is unspecified;
/// ids without a record are silently absent.
pub fn find_by_ids(db: &Database, ids: &[i64]) -> Result<Vec<ArchiveRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut records = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(KEY_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("SELECT * FROM archive_records WHERE id IN ({})", placeholders);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), record_from_row)?;
            for row in rows {
                records.push(row?);
            }
        }
        Ok(records)
    })
}

/// Applies a sparse update inside one transaction. Only the listed fields
/// are written; every other column keeps its value.
///
/// Returns the updated record, or `None` if no record has this key.
pub fn apply_updates(
    db: &Database,
    key: &str,
    updates: &[FieldUpdate],
) -> Result<Option<ArchiveRecord>, DatabaseError> {
    db.with_transaction(|tx| {
        let Some(_) = find_by_key_in(tx, key)? else {
            return Ok(None);
        };

        if !updates.is_empty() {
            let assignments: Vec<String> = updates
                .iter()
                .enumerate()
                .map(|(i, (field, _))| format!("{} = ?{}", field.column(), i + 1))
                .collect();
            let sql = format!(
                "UPDATE archive_records SET {}, updated_at = ?{} WHERE archive_no = ?{}",
                assignments.join(", "),
                updates.len() + 1,
                updates.len() + 2
            );

            let mut values: Vec<String> = updates.iter().map(|(_, v)| v.clone()).collect();
            values.push(now_timestamp());
            values.push(key.to_string());
            tx.execute(&sql, params_from_iter(values.iter()))?;
        }

        find_by_key_in(tx, key)
    })
}

fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Relational equivalent of the engine search: case-insensitive substring
/// match over a fixed column set, newest first. Returns (rows, total).
pub fn search_fallback(
    db: &Database,
    query: &str,
    limit: u64,
    offset: u64,
) -> Result<(Vec<ArchiveRecord>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let pattern = escape_like(query.trim());
        let where_clause = FALLBACK_COLUMNS
            .iter()
            .map(|c| format!("LOWER(COALESCE({}, '')) LIKE ?1 ESCAPE '\\'", c))
            .collect::<Vec<_>>()
            .join(" OR ");

        let count_sql = format!("SELECT COUNT(*) FROM archive_records WHERE {}", where_clause);
        let total: u64 = conn.query_row(&count_sql, params![pattern], |r| r.get(0))?;

        let query_sql = format!(
            "SELECT * FROM archive_records WHERE {} ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
            where_clause
        );
        let mut stmt = conn.prepare(&query_sql)?;
        let rows = stmt
            .query_map(
                params![
                    pattern,
                    i64::try_from(limit).unwrap_or(i64::MAX),
                    i64::try_from(offset).unwrap_or(i64::MAX)
                ],
                record_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Lists records that carry at least one descriptive field.
pub fn list_enriched(db: &Database) -> Result<Vec<ArchiveRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let condition = MetadataField::ALL
            .iter()
            .map(|f| format!("TRIM(COALESCE({}, '')) != ''", f.column()))
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!("SELECT * FROM archive_records WHERE {} ORDER BY id", condition);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts all records.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM archive_records", [], |r| r.get(0))?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn new_record(key: &str) -> NewRecord {
        NewRecord {
            archive_no: key.to_string(),
            file_path: format!("/store/{}.pdf", key),
            file_size: 1024,
            created_by: Some("admin".to_string()),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        let inserted = insert_skeleton(&db, &new_record("A-001")).unwrap();
        assert!(inserted.id > 0);
        assert!(inserted.is_skeleton());

        let found = find_by_key(&db, "A-001").unwrap().unwrap();
        assert_eq!(found, inserted);
        assert_eq!(found.file_size, 1024);
        assert!(exists(&db, "A-001").unwrap());
        assert!(!exists(&db, "A-002").unwrap());
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let db = test_db();
        insert_skeleton(&db, &new_record("A-001")).unwrap();
        let err = insert_skeleton(&db, &new_record("A-001")).unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateKey(ref k) if k == "A-001"));
        assert_eq!(count(&db).unwrap(), 1);
    }

    #[test]
    fn test_existing_keys() {
        let db = test_db();
        insert_skeleton(&db, &new_record("A-001")).unwrap();
        insert_skeleton(&db, &new_record("A-002")).unwrap();

        let keys = vec!["A-001".to_string(), "A-002".to_string(), "A-404".to_string()];
        let found = existing_keys(&db, &keys).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains("A-001"));
        assert!(!found.contains("A-404"));
    }

    #[test]
    fn test_apply_updates_is_sparse() {
        let db = test_db();
        insert_skeleton(&db, &new_record("A-001")).unwrap();
        apply_updates(
            &db,
            "A-001",
            &[
                (MetadataField::Title, "Old".to_string()),
                (MetadataField::Year, "2020".to_string()),
            ],
        )
        .unwrap();

        let updated = apply_updates(&db, "A-001", &[(MetadataField::Year, "2021".to_string())])
            .unwrap()
            .unwrap();
        assert_eq!(updated.title.as_deref(), Some("Old"));
        assert_eq!(updated.year.as_deref(), Some("2021"));
    }

    #[test]
    fn test_apply_updates_missing_record() {
        let db = test_db();
        let result = apply_updates(&db, "nope", &[(MetadataField::Title, "x".to_string())]).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_find_by_ids() {
        let db = test_db();
        let a = insert_skeleton(&db, &new_record("A-001")).unwrap();
        let b = insert_skeleton(&db, &new_record("A-002")).unwrap();

        let found = find_by_ids(&db, &[b.id, a.id, 9999]).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_search_fallback_case_insensitive_and_recent_first() {
        let db = test_db();
        insert_skeleton(&db, &new_record("A-001")).unwrap();
        insert_skeleton(&db, &new_record("A-002")).unwrap();
        insert_skeleton(&db, &new_record("B-001")).unwrap();
        apply_updates(&db, "B-001", &[(MetadataField::Title, "Annual Report".to_string())]).unwrap();

        let (rows, total) = search_fallback(&db, "a-00", 10, 0).unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows[0].archive_no, "A-002");
        assert_eq!(rows[1].archive_no, "A-001");

        let (rows, total) = search_fallback(&db, "REPORT", 10, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].archive_no, "B-001");
    }

    #[test]
    fn test_search_fallback_escapes_wildcards() {
        let db = test_db();
        insert_skeleton(&db, &new_record("A-001")).unwrap();
        let (_, total) = search_fallback(&db, "%", 10, 0).unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn test_search_fallback_pagination() {
        let db = test_db();
        for i in 0..5 {
            insert_skeleton(&db, &new_record(&format!("P-{}", i))).unwrap();
        }
        let (rows, total) = search_fallback(&db, "p-", 2, 2).unwrap();
        assert_eq!(total, 5);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_list_enriched_skips_skeletons() {
        let db = test_db();
        insert_skeleton(&db, &new_record("A-001")).unwrap();
        insert_skeleton(&db, &new_record("A-002")).unwrap();
        apply_updates(&db, "A-002", &[(MetadataField::Keywords, "tax".to_string())]).unwrap();

        let enriched = list_enriched(&db).unwrap();
        assert_eq!(enriched.len(), 1);
        assert_eq!(enriched[0].archive_no, "A-002");
    }
}
