use std::path::PathBuf;
use thiserror::Error;

/// Any failure the pipeline surfaces to its caller.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Job error: {0}")]
    Job(#[from] crate::jobs::JobError),

    #[error("Enrichment error: {0}")]
    Enrich(#[from] crate::enrich::EnrichError),

    #[error("Search error: {0}")]
    Search(#[from] crate::search::SearchError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config is not valid JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Invalid config: {message}")]
    Validation { message: String },

    #[error("Config does not match schema: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read metadata of '{path}': {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy '{from}' to '{to}': {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Transfer tool '{tool}' failed for '{from}': {message}")]
    TransferTool {
        tool: String,
        from: PathBuf,
        message: String,
    },

    #[error("Directory scan failed for '{path}': {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
