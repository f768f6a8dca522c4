//! Import job tracking.
//!
//! One job exists per ingested file and per CSV batch. Jobs carry
//! `total/processed/failed/skipped` counters and a forward-only status.

pub mod tracker;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use tracker::{BatchSummary, JobTracker};

/// Status of an import job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "skipped" => Some(JobStatus::Skipped),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Skipped | JobStatus::Cancelled
        )
    }

    /// Forward-only transition table. `Processing -> Processing` is allowed
    /// so progress updates can be written without a status change.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Processing | Failed | Cancelled) => true,
            (Processing, Processing | Completed | Failed | Skipped | Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a job processes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    File,
    Csv,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::File => "file",
            JobKind::Csv => "csv",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(JobKind::File),
            "csv" => Some(JobKind::Csv),
            _ => None,
        }
    }
}

/// A per-item failure recorded on a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub key: String,
    pub reason: String,
}

impl ItemError {
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Full job view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: String,
    pub batch_id: String,
    pub kind: JobKind,
    pub filename: String,
    /// Effective status: `cancelled` once a cancel has been requested.
    pub status: JobStatus,
    pub total: u64,
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub errors: Vec<ItemError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub cancel_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

/// Polling response: `{status, total, processed, failed, skipped, errors[]}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub status: JobStatus,
    pub total: u64,
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub errors: Vec<ItemError>,
}

impl From<&ImportJob> for JobProgress {
    fn from(job: &ImportJob) -> Self {
        Self {
            status: job.status,
            total: job.total,
            processed: job.processed,
            failed: job.failed,
            skipped: job.skipped,
            errors: job.errors.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Import job not found: {0}")]
    NotFound(String),

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job {id} already finished as {status}")]
    AlreadyFinished { id: String, status: JobStatus },

    #[error("Job {id} counters would violate invariants: {reason}")]
    CounterOverflow { id: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}
