pub mod app;
pub mod audit;
pub mod cache;
pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod records;
pub mod search;
pub mod telemetry;

pub use app::ArchiveSync;
pub use audit::{AuditLog, OperatorContext};
pub use cache::SettingsCache;
pub use config::{load_config, Config};
pub use db::{Database, DatabaseError};
pub use enrich::{EnrichError, EnrichmentProcessor};
pub use error::{ArchiveError, ConfigError, Result, StorageError};
pub use ingest::{ConcurrencyLimiter, FileDescriptor, ImportService, IngestOutcome};
pub use jobs::{ImportJob, JobProgress, JobStatus, JobTracker};
pub use records::{ArchiveRecord, MetadataField};
pub use search::{IndexSynchronizer, QueryRouter, SearchEngine, SearchError};
