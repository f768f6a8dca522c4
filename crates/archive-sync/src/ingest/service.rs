//! Batch submission: creates every job of a batch up front, then runs the
//! files concurrently under the shared limiter.

use std::path::Path;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::limiter::ConcurrencyLimiter;
use super::scanner::scan_folder;
use super::worker::{FileDescriptor, FileIngestionWorker, IngestOutcome};
use crate::audit::OperatorContext;
use crate::cache::{SettingsCache, IMPORT_CONCURRENCY_KEY};
use crate::error::ArchiveError;
use crate::jobs::{BatchSummary, ImportJob, JobError, JobTracker};

/// A submitted batch. Every job exists before the first file is touched,
/// so `jobs` can be polled immediately.
pub struct ImportBatch {
    pub batch_id: String,
    pub jobs: Vec<ImportJob>,
    handles: Vec<JoinHandle<IngestOutcome>>,
}

impl ImportBatch {
    pub fn job_ids(&self) -> Vec<String> {
        self.jobs.iter().map(|j| j.id.clone()).collect()
    }

    /// Waits for every file of the batch. Outcomes are in submission order.
    pub async fn wait(self) -> BatchReport {
        let results = join_all(self.handles).await;
        let mut report = BatchReport {
            batch_id: self.batch_id,
            ..BatchReport::default()
        };
        for result in results {
            let outcome = result.unwrap_or_else(|e| {
                tracing::error!(error = %e, "Ingestion task did not finish");
                IngestOutcome::Failed {
                    reason: format!("ingestion task aborted: {}", e),
                }
            });
            match &outcome {
                IngestOutcome::Completed { .. } => report.completed += 1,
                IngestOutcome::Skipped { .. } => report.skipped += 1,
                IngestOutcome::Failed { .. } => report.failed += 1,
                IngestOutcome::Cancelled => report.cancelled += 1,
            }
            report.outcomes.push(outcome);
        }
        report
    }
}

/// Outcome counts of a finished batch.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batch_id: String,
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub outcomes: Vec<IngestOutcome>,
}

/// Entry point for bulk ingestion.
#[derive(Clone)]
pub struct ImportService {
    worker: Arc<FileIngestionWorker>,
    limiter: ConcurrencyLimiter,
    tracker: JobTracker,
    cache: SettingsCache,
}

impl ImportService {
    pub fn new(
        worker: Arc<FileIngestionWorker>,
        limiter: ConcurrencyLimiter,
        tracker: JobTracker,
        cache: SettingsCache,
    ) -> Self {
        Self {
            worker,
            limiter,
            tracker,
            cache,
        }
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Applies the cached `import.concurrency` override, if any, to the
    /// limiter. Returns the capacity in effect afterwards.
    pub fn refresh_concurrency(&self) -> usize {
        if let Some(wanted) = self.cache.get_parsed::<usize>(IMPORT_CONCURRENCY_KEY) {
            if wanted != self.limiter.capacity() {
                if let Err(e) = self.limiter.resize(wanted) {
                    tracing::warn!(value = wanted, error = %e, "Ignoring concurrency override");
                }
            }
        }
        self.limiter.capacity()
    }

    /// Creates one pending job per file, in input order, then spawns one
    /// task per file. Each task waits for a permit before doing anything.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit_batch(
        &self,
        files: Vec<FileDescriptor>,
        ctx: &OperatorContext,
    ) -> Result<ImportBatch, JobError> {
        self.refresh_concurrency();

        let batch_id = uuid::Uuid::new_v4().to_string();
        let names: Vec<String> = files.iter().map(|f| f.name.clone()).collect();
        let jobs = self
            .tracker
            .create_file_jobs(&batch_id, &names, Some(&ctx.operator))?;
        tracing::info!(
            batch_id = %batch_id,
            files = jobs.len(),
            concurrency = self.limiter.capacity(),
            "Import batch submitted"
        );

        let handles = jobs
            .iter()
            .zip(files)
            .map(|(job, file)| {
                let worker = Arc::clone(&self.worker);
                let limiter = self.limiter.clone();
                let job_id = job.id.clone();
                let ctx = ctx.clone();
                let span = tracing::info_span!("import_task", batch_id = %batch_id);
                tokio::spawn(
                    async move {
                        let _permit = match limiter.acquire().await {
                            Ok(permit) => permit,
                            Err(e) => {
                                tracing::error!(job_id = %job_id, error = %e, "No permit");
                                return IngestOutcome::Failed {
                                    reason: e.to_string(),
                                };
                            }
                        };
                        worker.ingest(&job_id, &file, &ctx).await
                    }
                    .instrument(span),
                )
            })
            .collect();

        Ok(ImportBatch {
            batch_id,
            jobs,
            handles,
        })
    }

    /// Scans a folder for PDFs and submits them as one batch.
    pub fn import_folder(
        &self,
        dir: &Path,
        ctx: &OperatorContext,
    ) -> Result<ImportBatch, ArchiveError> {
        let files = scan_folder(dir)?;
        Ok(self.submit_batch(files, ctx)?)
    }

    pub fn batch_summary(&self, batch_id: &str) -> Result<BatchSummary, JobError> {
        self.tracker.batch_summary(batch_id)
    }
}
