use serde::Serialize;

use crate::db::{record_repo, Database, DatabaseError};

/// Result of checking CSV keys against the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistenceReport {
    pub total: usize,
    pub exist_count: usize,
    pub not_exist_count: usize,
    /// Missing keys in CSV order.
    pub missing_keys: Vec<String>,
}

impl ExistenceReport {
    pub fn passed(&self) -> bool {
        self.not_exist_count == 0
    }
}

/// Checks every key against stored records.
pub fn check_existence(db: &Database, keys: &[String]) -> Result<ExistenceReport, DatabaseError> {
    let found = record_repo::existing_keys(db, keys)?;
    let missing_keys: Vec<String> = keys
        .iter()
        .filter(|k| !found.contains(*k))
        .cloned()
        .collect();

    Ok(ExistenceReport {
        total: keys.len(),
        exist_count: keys.len() - missing_keys.len(),
        not_exist_count: missing_keys.len(),
        missing_keys,
    })
}
