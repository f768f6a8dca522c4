//! Bulk ingestion of PDF files into managed storage.

pub mod copy;
pub mod limiter;
pub mod scanner;
pub mod service;
pub mod worker;

pub use copy::{CopyMethod, CopyOutcome, CopyStrategySelector, CopyTier};
pub use limiter::{ConcurrencyLimiter, LimiterError, Permit};
pub use scanner::{scan_folder, FolderScanner};
pub use service::{BatchReport, ImportBatch, ImportService};
pub use worker::{derive_business_key, FileDescriptor, FileIngestionWorker, IngestOutcome};
