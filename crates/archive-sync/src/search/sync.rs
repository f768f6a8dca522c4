//! Keeps the search index in step with the relational store.
//!
//! Index writes are best-effort: transient failures are retried with
//! exponential backoff, and what still fails is reported as a value.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::document::SearchDocument;
use super::engine::{IndexSettings, IndexStats, SearchEngine};
use super::SearchError;
use crate::config::SearchConfig;
use crate::db::{record_repo, Database};
use crate::records::ArchiveRecord;

/// Attempt ceiling and backoff base for index calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before attempt `attempt` (1-based); none before the first.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            Duration::ZERO
        } else {
            self.base_delay * (1u32 << (attempt - 2).min(16))
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

/// Result of a single-document index call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum IndexOutcome {
    Indexed { attempts: u32 },
    Failed { attempts: u32, error: String },
}

impl IndexOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, IndexOutcome::Indexed { .. })
    }
}

/// Aggregate of a multi-batch index call. Partial success is normal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchIndexReport {
    pub indexed: u64,
    pub failed: u64,
    /// One entry per failed batch.
    pub errors: Vec<String>,
}

pub struct IndexSynchronizer {
    engine: Arc<dyn SearchEngine>,
    retry: RetryPolicy,
    batch_size: usize,
}

impl IndexSynchronizer {
    pub fn new(engine: Arc<dyn SearchEngine>, retry: RetryPolicy, batch_size: usize) -> Self {
        Self {
            engine,
            retry,
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_config(engine: Arc<dyn SearchEngine>, config: &SearchConfig) -> Self {
        Self::new(
            engine,
            RetryPolicy::new(config.max_attempts, Duration::from_millis(config.base_delay_ms)),
            config.batch_size,
        )
    }

    pub fn engine(&self) -> &Arc<dyn SearchEngine> {
        &self.engine
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or
    /// the attempt ceiling is hit. Returns the result and attempts used.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut call: F) -> (Result<T, SearchError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SearchError>>,
    {
        let mut attempt = 1;
        loop {
            let delay = self.retry.delay_before(attempt);
            if !delay.is_zero() {
                tracing::debug!(
                    what,
                    attempt,
                    max_attempts = self.retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying index call"
                );
                tokio::time::sleep(delay).await;
            }

            match call().await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    tracing::warn!(what, attempt, error = %e, "Index call failed, will retry");
                    attempt += 1;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }

    /// Upserts one record. Never errors.
    pub async fn index_one(&self, record: &ArchiveRecord) -> IndexOutcome {
        let documents = [SearchDocument::from(record)];
        let (result, attempts) = self
            .with_retry("upsert", || self.engine.upsert_documents(&documents))
            .await;
        match result {
            Ok(()) => IndexOutcome::Indexed { attempts },
            Err(e) => {
                tracing::warn!(
                    record_id = record.id,
                    key = %record.archive_no,
                    attempts,
                    error = %e,
                    "Indexing record failed"
                );
                IndexOutcome::Failed {
                    attempts,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Upserts records in fixed-size batches. A failing batch is counted
    /// and reported; later batches still run.
    pub async fn index_many(&self, records: &[ArchiveRecord]) -> BatchIndexReport {
        let mut report = BatchIndexReport::default();
        for (index, chunk) in records.chunks(self.batch_size).enumerate() {
            let documents: Vec<SearchDocument> = chunk.iter().map(SearchDocument::from).collect();
            let (result, attempts) = self
                .with_retry("upsert_batch", || self.engine.upsert_documents(&documents))
                .await;
            match result {
                Ok(()) => report.indexed += chunk.len() as u64,
                Err(e) => {
                    tracing::warn!(batch = index, size = chunk.len(), attempts, error = %e, "Index batch failed");
                    report.failed += chunk.len() as u64;
                    report
                        .errors
                        .push(format!("batch {} ({} documents): {}", index, chunk.len(), e));
                }
            }
        }
        tracing::info!(
            indexed = report.indexed,
            failed = report.failed,
            "Batch indexing finished"
        );
        report
    }

    /// Removes a record's document. Unknown ids count as success.
    pub async fn deindex_one(&self, record_id: i64) -> IndexOutcome {
        let id = SearchDocument::document_id(record_id);
        let (result, attempts) = self
            .with_retry("delete", || self.engine.delete_document(&id))
            .await;
        match result {
            Ok(()) => IndexOutcome::Indexed { attempts },
            Err(e) => {
                tracing::warn!(record_id, attempts, error = %e, "Deindexing record failed");
                IndexOutcome::Failed {
                    attempts,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Writes the canonical index settings. Idempotent.
    pub async fn configure_index(&self) -> Result<(), SearchError> {
        let settings = IndexSettings::canonical();
        let (result, _) = self
            .with_retry("settings", || self.engine.apply_settings(&settings))
            .await;
        result?;
        tracing::info!("Search index settings applied");
        Ok(())
    }

    /// Re-indexes every record that carries metadata. Skeletons are left out.
    pub async fn reindex_all(&self, db: &Database) -> Result<BatchIndexReport, SearchError> {
        let records = record_repo::list_enriched(db)?;
        tracing::info!(records = records.len(), "Reindexing enriched records");
        Ok(self.index_many(&records).await)
    }

    pub async fn stats(&self) -> Result<IndexStats, SearchError> {
        self.engine.stats().await
    }
}
