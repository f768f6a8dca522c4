use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot prepare store folder '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema migration v{version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// The unique archive number index rejected an insert.
    #[error("Archive number already exists: {0}")]
    DuplicateKey(String),

    #[error("Corrupt column '{column}': {reason}")]
    Corrupt { column: &'static str, reason: String },

    #[error("Store connection lock poisoned")]
    LockPoisoned,
}

impl DatabaseError {
    pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}
