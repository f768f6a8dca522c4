//! CSV enrichment of skeleton records.
//!
//! An upload goes through format validation, then existence validation,
//! and only then through an asynchronous commit that applies sparse field
//! updates row by row.

pub mod existence;
pub mod format;
pub mod processor;

use thiserror::Error;

pub use existence::{check_existence, ExistenceReport};
pub use format::{parse_csv, validate_format, CsvRow, FormatReport, ParsedCsv};
pub use processor::{CommitHandle, EnrichmentProcessor, FormatValidation};

#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV has no '{0}' column")]
    MissingKeyColumn(String),

    #[error("CSV format validation has not passed for batch {0}")]
    FormatInvalid(String),

    #[error("Existence validation has not been run for batch {0}")]
    ExistenceNotChecked(String),

    #[error("{} archive numbers do not exist: {}", missing.len(), missing.join(", "))]
    KeysMissing { missing: Vec<String> },

    #[error("Unknown or expired enrichment batch: {0}")]
    UnknownBatch(String),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Job error: {0}")]
    Job(#[from] crate::jobs::JobError),
}
