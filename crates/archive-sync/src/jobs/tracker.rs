//! Job store backed by the relational store.

use serde::Serialize;

use super::{ImportJob, ItemError, JobError, JobKind, JobProgress, JobStatus};
use crate::db::job_repo::{self, JobRow};
use crate::db::{now_timestamp, Database};

fn job_from_row(row: JobRow) -> ImportJob {
    let stored = JobStatus::parse(&row.status).unwrap_or_else(|| {
        log::warn!(
            "Unknown job status '{}' for job {}, defaulting to pending",
            row.status,
            row.id
        );
        JobStatus::Pending
    });
    // The flag only masks work that has not reached a final state.
    let status = if row.cancel_requested && !stored.is_terminal() {
        JobStatus::Cancelled
    } else {
        stored
    };
    let errors: Vec<ItemError> = serde_json::from_str(&row.errors).unwrap_or_else(|e| {
        log::warn!("Unreadable error list for job {}: {}", row.id, e);
        Vec::new()
    });
    let kind = JobKind::parse(&row.kind).unwrap_or(JobKind::File);

    ImportJob {
        id: row.id,
        batch_id: row.batch_id,
        kind,
        filename: row.filename,
        status,
        total: row.total,
        processed: row.processed,
        failed: row.failed,
        skipped: row.skipped,
        errors,
        message: row.message,
        cancel_requested: row.cancel_requested,
        operator: row.operator,
        created_at: row.created_at,
        updated_at: row.updated_at,
        completed_at: row.completed_at,
    }
}

/// Aggregated view over the file jobs of one ingestion batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub cancelled: u64,
}

impl BatchSummary {
    pub fn is_finished(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }
}

/// Import job tracker.
///
/// Each job is written by exactly one worker, so read-modify-write on a
/// single row needs no extra locking. The cancel flag is written through a
/// separate statement and is never clobbered by progress updates.
#[derive(Clone)]
pub struct JobTracker {
    db: Database,
}

impl JobTracker {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn load_row(&self, id: &str) -> Result<JobRow, JobError> {
        job_repo::find_by_id(&self.db, id)?.ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    fn new_row(
        batch_id: &str,
        kind: JobKind,
        filename: &str,
        total: u64,
        operator: Option<&str>,
    ) -> JobRow {
        let now = now_timestamp();
        JobRow {
            id: uuid::Uuid::new_v4().to_string(),
            batch_id: batch_id.to_string(),
            kind: kind.as_str().to_string(),
            filename: filename.to_string(),
            status: JobStatus::Pending.as_str().to_string(),
            total,
            processed: 0,
            failed: 0,
            skipped: 0,
            errors: "[]".to_string(),
            message: None,
            cancel_requested: false,
            operator: operator.map(str::to_string),
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        }
    }

    /// Creates one pending job per file name, in input order, atomically.
    pub fn create_file_jobs(
        &self,
        batch_id: &str,
        filenames: &[String],
        operator: Option<&str>,
    ) -> Result<Vec<ImportJob>, JobError> {
        let rows: Vec<JobRow> = filenames
            .iter()
            .map(|name| Self::new_row(batch_id, JobKind::File, name, 1, operator))
            .collect();
        job_repo::insert_all(&self.db, &rows)?;
        Ok(rows.into_iter().map(job_from_row).collect())
    }

    /// Creates the pending job for a CSV commit of `total` rows.
    pub fn create_csv_job(
        &self,
        batch_id: &str,
        filename: &str,
        total: u64,
        operator: Option<&str>,
    ) -> Result<ImportJob, JobError> {
        let row = Self::new_row(batch_id, JobKind::Csv, filename, total, operator);
        job_repo::insert_all(&self.db, std::slice::from_ref(&row))?;
        Ok(job_from_row(row))
    }

    /// Applies a mutation to a job after checking the status transition and
    /// counter invariants.
    fn transition<F>(&self, id: &str, next: JobStatus, mutate: F) -> Result<ImportJob, JobError>
    where
        F: FnOnce(&mut JobRow),
    {
        let mut row = self.load_row(id)?;
        let current = JobStatus::parse(&row.status).unwrap_or(JobStatus::Pending);
        if !current.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                id: id.to_string(),
                from: current,
                to: next,
            });
        }

        mutate(&mut row);

        if row.processed > row.total {
            return Err(JobError::CounterOverflow {
                id: id.to_string(),
                reason: format!("processed {} > total {}", row.processed, row.total),
            });
        }
        if row.failed + row.skipped > row.processed {
            return Err(JobError::CounterOverflow {
                id: id.to_string(),
                reason: format!(
                    "failed {} + skipped {} > processed {}",
                    row.failed, row.skipped, row.processed
                ),
            });
        }

        let now = now_timestamp();
        row.status = next.as_str().to_string();
        row.updated_at = now.clone();
        if next.is_terminal() {
            row.completed_at = Some(now);
        }
        job_repo::update(&self.db, &row)?;
        Ok(job_from_row(row))
    }

    fn push_error(row: &mut JobRow, error: ItemError) {
        let mut errors: Vec<ItemError> = serde_json::from_str(&row.errors).unwrap_or_default();
        errors.push(error);
        row.errors = serde_json::to_string(&errors).unwrap_or_else(|_| "[]".to_string());
    }

    pub fn start(&self, id: &str) -> Result<ImportJob, JobError> {
        self.transition(id, JobStatus::Processing, |row| {
            row.message = Some("Processing".to_string());
        })
    }

    /// Marks a single-item job completed.
    pub fn complete(&self, id: &str, message: &str) -> Result<ImportJob, JobError> {
        self.transition(id, JobStatus::Completed, |row| {
            row.processed = row.total;
            row.message = Some(message.to_string());
        })
    }

    /// Marks a single-item job skipped with a reason.
    pub fn skip(&self, id: &str, key: &str, reason: &str) -> Result<ImportJob, JobError> {
        self.transition(id, JobStatus::Skipped, |row| {
            row.processed = row.total;
            row.skipped = row.total;
            row.message = Some(reason.to_string());
            Self::push_error(row, ItemError::new(key, reason));
        })
    }

    /// Marks a single-item job failed with a reason.
    pub fn fail(&self, id: &str, key: &str, reason: &str) -> Result<ImportJob, JobError> {
        self.transition(id, JobStatus::Failed, |row| {
            row.processed = row.total;
            row.failed = row.total;
            row.message = Some(reason.to_string());
            Self::push_error(row, ItemError::new(key, reason));
        })
    }

    /// Records a successfully processed row of a multi-row job.
    pub fn record_success(&self, id: &str) -> Result<ImportJob, JobError> {
        self.transition(id, JobStatus::Processing, |row| {
            row.processed += 1;
        })
    }

    /// Records a failed row of a multi-row job. Siblings keep going.
    pub fn record_failure(&self, id: &str, error: ItemError) -> Result<ImportJob, JobError> {
        self.transition(id, JobStatus::Processing, |row| {
            row.processed += 1;
            row.failed += 1;
            Self::push_error(row, error);
        })
    }

    /// Closes a multi-row job: `failed` if every row failed, `completed`
    /// otherwise.
    pub fn finish(&self, id: &str) -> Result<ImportJob, JobError> {
        let row = self.load_row(id)?;
        let next = if row.total > 0 && row.failed == row.total {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        self.transition(id, next, |row| {
            row.message = Some(format!(
                "{} of {} rows applied, {} failed",
                row.processed - row.failed,
                row.total,
                row.failed
            ));
        })
    }

    /// Closes a multi-row job that stopped before its last row.
    pub fn abort(&self, id: &str, reason: &str) -> Result<ImportJob, JobError> {
        self.transition(id, JobStatus::Failed, |row| {
            row.message = Some(format!(
                "Stopped after {} of {} rows: {}",
                row.processed, row.total, reason
            ));
        })
    }

    /// Closes a job whose cancel flag was observed before it started.
    pub fn mark_cancelled(&self, id: &str) -> Result<ImportJob, JobError> {
        self.transition(id, JobStatus::Cancelled, |row| {
            row.message = Some("Cancelled before processing started".to_string());
        })
    }

    /// Requests cancellation of a pending or processing job. Advisory:
    /// in-flight work is not interrupted. Finished jobs are refused.
    pub fn cancel(&self, id: &str) -> Result<ImportJob, JobError> {
        if !job_repo::request_cancel(&self.db, id, &now_timestamp())? {
            let row = self.load_row(id)?;
            return Err(JobError::AlreadyFinished {
                id: id.to_string(),
                status: JobStatus::parse(&row.status).unwrap_or(JobStatus::Pending),
            });
        }
        log::info!("Cancel requested for job {}", id);
        self.get(id)
    }

    pub fn is_cancel_requested(&self, id: &str) -> Result<bool, JobError> {
        Ok(self.load_row(id)?.cancel_requested)
    }

    pub fn get(&self, id: &str) -> Result<ImportJob, JobError> {
        Ok(job_from_row(self.load_row(id)?))
    }

    /// Polling read keyed by job id.
    pub fn progress(&self, id: &str) -> Result<JobProgress, JobError> {
        Ok(JobProgress::from(&self.get(id)?))
    }

    pub fn list_batch(&self, batch_id: &str) -> Result<Vec<ImportJob>, JobError> {
        Ok(job_repo::list_by_batch(&self.db, batch_id)?
            .into_iter()
            .map(job_from_row)
            .collect())
    }

    pub fn batch_summary(&self, batch_id: &str) -> Result<BatchSummary, JobError> {
        let mut summary = BatchSummary::default();
        for job in self.list_batch(batch_id)? {
            summary.total += 1;
            match job.status {
                JobStatus::Pending => summary.pending += 1,
                JobStatus::Processing => summary.processing += 1,
                JobStatus::Completed => summary.completed += 1,
                JobStatus::Failed => summary.failed += 1,
                JobStatus::Skipped => summary.skipped += 1,
                JobStatus::Cancelled => summary.cancelled += 1,
            }
        }
        Ok(summary)
    }

    pub fn count_by_status(&self, status: JobStatus) -> Result<u64, JobError> {
        Ok(job_repo::count_by_status(&self.db, status.as_str())?)
    }
}
