//! Staged CSV enrichment.
//!
//! `validate_format` parses an upload and stages it under a batch id.
//! `validate_existence` checks the staged keys against the store. `commit`
//! is only accepted once both have passed; it takes the batch out of the
//! staging area and applies it in a background task tracked by a CSV job.
//! Batches that are never committed or discarded expire from staging.

use std::sync::Arc;
use std::time::Duration;

use moka::ops::compute::Op;
use moka::sync::Cache;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::existence::{check_existence, ExistenceReport};
use super::format::{parse_csv, validate_format, CsvRow, FormatReport, ParsedCsv};
use super::EnrichError;
use crate::audit::{operation, AuditEntry, AuditLog, OperatorContext};
use crate::db::{record_repo, Database};
use crate::jobs::{ItemError, JobError, JobProgress, JobTracker};
use crate::search::IndexQueue;

pub const REASON_NOT_FOUND: &str = "record not found";

/// How long an uncommitted batch stays staged unless configured otherwise.
pub const DEFAULT_STAGING_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
struct StagedBatch {
    filename: String,
    parsed: Arc<ParsedCsv>,
    format: FormatReport,
    existence: Option<ExistenceReport>,
}

impl StagedBatch {
    fn ensure_committable(&self, batch_id: &str) -> Result<(), EnrichError> {
        if !self.format.valid {
            return Err(EnrichError::FormatInvalid(batch_id.to_string()));
        }
        match &self.existence {
            None => Err(EnrichError::ExistenceNotChecked(batch_id.to_string())),
            Some(report) if !report.passed() => Err(EnrichError::KeysMissing {
                missing: report.missing_keys.clone(),
            }),
            Some(_) => Ok(()),
        }
    }
}

/// Returned by format validation; the batch id addresses the later phases.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatValidation {
    pub batch_id: String,
    pub report: FormatReport,
}

/// A running commit.
#[derive(Debug)]
pub struct CommitHandle {
    pub batch_id: String,
    pub job_id: String,
    handle: JoinHandle<()>,
}

impl CommitHandle {
    /// Waits for the commit task. Progress is read through the job.
    pub async fn wait(self) {
        if let Err(e) = self.handle.await {
            tracing::error!(job_id = %self.job_id, error = %e, "CSV commit task did not finish");
        }
    }
}

#[derive(Clone)]
pub struct EnrichmentProcessor {
    db: Database,
    tracker: JobTracker,
    audit: AuditLog,
    queue: IndexQueue,
    key_column: String,
    batches: Cache<String, StagedBatch>,
}

fn staging_area(ttl: Duration) -> Cache<String, StagedBatch> {
    Cache::builder().time_to_live(ttl).build()
}

impl EnrichmentProcessor {
    pub fn new(db: Database, queue: IndexQueue, key_column: impl Into<String>) -> Self {
        Self {
            tracker: JobTracker::new(db.clone()),
            audit: AuditLog::new(db.clone()),
            db,
            queue,
            key_column: key_column.into(),
            batches: staging_area(DEFAULT_STAGING_TTL),
        }
    }

    /// Replaces the staging area with one whose batches expire after `ttl`.
    pub fn with_staging_ttl(mut self, ttl: Duration) -> Self {
        self.batches = staging_area(ttl);
        self
    }

    /// Phase one. Unparsable input or a missing key column is an error;
    /// empty and duplicate keys are reported in the returned diagnostics.
    pub fn validate_format(
        &self,
        filename: &str,
        content: &str,
    ) -> Result<FormatValidation, EnrichError> {
        let parsed = parse_csv(content, &self.key_column)?;
        let report = validate_format(&parsed);
        let batch_id = uuid::Uuid::new_v4().to_string();

        log::info!(
            "Staged CSV batch {} from '{}': {} rows, valid={}",
            batch_id,
            filename,
            report.total_rows,
            report.valid
        );
        self.batches.insert(
            batch_id.clone(),
            StagedBatch {
                filename: filename.to_string(),
                parsed: Arc::new(parsed),
                format: report.clone(),
                existence: None,
            },
        );

        Ok(FormatValidation { batch_id, report })
    }

    /// Phase two. Requires a batch whose format validation passed.
    pub fn validate_existence(&self, batch_id: &str) -> Result<ExistenceReport, EnrichError> {
        let staged = self
            .batches
            .get(batch_id)
            .ok_or_else(|| EnrichError::UnknownBatch(batch_id.to_string()))?;
        if !staged.format.valid {
            return Err(EnrichError::FormatInvalid(batch_id.to_string()));
        }

        let report = check_existence(&self.db, &staged.parsed.keys())?;
        // A batch committed or discarded meanwhile stays gone.
        self.batches
            .entry_by_ref(batch_id)
            .and_compute_with(|entry| match entry {
                Some(entry) => {
                    let mut staged = entry.into_value();
                    staged.existence = Some(report.clone());
                    Op::Put(staged)
                }
                None => Op::Nop,
            });
        Ok(report)
    }

    /// Drops a staged batch. Returns false if it was not staged.
    pub fn discard(&self, batch_id: &str) -> bool {
        self.batches.remove(batch_id).is_some()
    }

    /// Number of batches currently staged.
    pub fn staged_count(&self) -> u64 {
        self.batches.run_pending_tasks();
        self.batches.entry_count()
    }

    /// Starts applying a fully validated batch. The batch leaves the
    /// staging area; progress is polled through the returned job id.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn commit(&self, batch_id: &str, ctx: &OperatorContext) -> Result<CommitHandle, EnrichError> {
        self.batches
            .get(batch_id)
            .ok_or_else(|| EnrichError::UnknownBatch(batch_id.to_string()))?
            .ensure_committable(batch_id)?;
        let staged = self
            .batches
            .remove(batch_id)
            .ok_or_else(|| EnrichError::UnknownBatch(batch_id.to_string()))?;

        let job = self.tracker.create_csv_job(
            batch_id,
            &staged.filename,
            staged.parsed.rows.len() as u64,
            Some(&ctx.operator),
        )?;

        let this = self.clone();
        let ctx = ctx.clone();
        let job_id = job.id.clone();
        let span = tracing::info_span!("csv_commit", job_id = %job.id, batch_id = %batch_id);
        let handle = tokio::spawn(
            async move {
                if let Err(e) = this.apply_rows(&job_id, &staged.parsed.rows, &ctx).await {
                    tracing::error!(error = %e, "CSV commit aborted");
                    if let Err(close_err) = this.tracker.abort(&job_id, &e.to_string()) {
                        tracing::error!(error = %close_err, "Could not close CSV job");
                    }
                }
            }
            .instrument(span),
        );

        Ok(CommitHandle {
            batch_id: batch_id.to_string(),
            job_id: job.id,
            handle,
        })
    }

    /// Applies every row. A row that fails is recorded and the loop moves on.
    async fn apply_rows(
        &self,
        job_id: &str,
        rows: &[CsvRow],
        ctx: &OperatorContext,
    ) -> Result<(), JobError> {
        self.tracker.start(job_id)?;

        for row in rows {
            match record_repo::apply_updates(&self.db, &row.key, &row.updates) {
                Ok(Some(record)) => {
                    self.tracker.record_success(job_id)?;
                    self.audit.record(
                        AuditEntry::new(ctx, operation::CSV_ENRICH, &row.key)
                            .with_detail(format!("row {}: {} fields", row.row, row.updates.len())),
                    );
                    if !record.is_skeleton() {
                        self.queue.enqueue_upsert(record);
                    }
                }
                Ok(None) => self.record_row_failure(job_id, row, REASON_NOT_FOUND, ctx)?,
                Err(e) => self.record_row_failure(job_id, row, &e.to_string(), ctx)?,
            }
            tokio::task::yield_now().await;
        }

        let job = self.tracker.finish(job_id)?;
        tracing::info!(
            status = %job.status,
            processed = job.processed,
            failed = job.failed,
            "CSV commit finished"
        );
        Ok(())
    }

    fn record_row_failure(
        &self,
        job_id: &str,
        row: &CsvRow,
        reason: &str,
        ctx: &OperatorContext,
    ) -> Result<(), JobError> {
        tracing::warn!(key = %row.key, row = row.row, reason, "CSV row not applied");
        self.tracker
            .record_failure(job_id, ItemError::new(&row.key, reason))?;
        self.audit.record(
            AuditEntry::new(ctx, operation::CSV_ENRICH_FAILED, &row.key)
                .with_detail(format!("row {}: {}", row.row, reason)),
        );
        Ok(())
    }

    pub fn progress(&self, job_id: &str) -> Result<JobProgress, EnrichError> {
        Ok(self.tracker.progress(job_id)?)
    }
}
