//! Per-file ingestion pipeline: dedupe, copy into managed storage, create
//! the skeleton record, audit.
//!
//! The worker assumes its caller already holds a limiter permit. Nothing
//! here indexes the new record; a skeleton has no searchable content until
//! enrichment fills it in.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Datelike, Utc};
use serde::Serialize;
use tracing::Instrument;

use super::copy::{CopyOutcome, CopyStrategySelector};
use crate::audit::{operation, AuditEntry, AuditLog, OperatorContext};
use crate::db::record_repo::{self, NewRecord};
use crate::db::{Database, DatabaseError};
use crate::error::{ArchiveError, StorageError};
use crate::jobs::JobTracker;

pub const REASON_KEY_EXISTS: &str = "key already exists";
pub const REASON_NO_KEY: &str = "cannot derive archive number from file name";

/// A file offered for ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    /// File name as uploaded; the business key is derived from it.
    pub name: String,
    pub source: PathBuf,
    pub size: u64,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            size,
        }
    }

    pub fn from_path(path: &Path, size: u64) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(name, path, size)
    }

    /// Reads the size from the file system.
    pub async fn stat(path: &Path) -> Result<Self, StorageError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| StorageError::Metadata {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(Self::from_path(path, metadata.len()))
    }
}

/// Derives the archive number from a file name: the name without its last
/// extension, trimmed. Returns `None` when nothing is left.
pub fn derive_business_key(file_name: &str) -> Option<String> {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => file_name,
    };
    let key = stem.trim();
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

fn extension_of(file_name: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.trim().to_lowercase())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| "pdf".to_string())
}

/// Result of one file's ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Completed {
        record_id: i64,
        key: String,
        path: PathBuf,
        copy: CopyOutcome,
    },
    Skipped {
        key: String,
        reason: String,
    },
    Failed {
        reason: String,
    },
    Cancelled,
}

impl IngestOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, IngestOutcome::Completed { .. })
    }
}

/// Releases a claimed key when the ingestion attempt ends.
struct KeyClaim<'a> {
    claims: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for KeyClaim<'_> {
    fn drop(&mut self) {
        let mut claims = self
            .claims
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        claims.remove(&self.key);
    }
}

pub struct FileIngestionWorker {
    db: Database,
    tracker: JobTracker,
    audit: AuditLog,
    copier: CopyStrategySelector,
    storage_dir: PathBuf,
    /// Keys currently being ingested by this process.
    claims: Mutex<HashSet<String>>,
}

impl FileIngestionWorker {
    pub fn new(db: Database, copier: CopyStrategySelector, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            tracker: JobTracker::new(db.clone()),
            audit: AuditLog::new(db.clone()),
            db,
            copier,
            storage_dir: storage_dir.into(),
            claims: Mutex::new(HashSet::new()),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// `<storage>/<YYYY>/<MM>`
    fn target_directory(&self) -> PathBuf {
        let now = Utc::now();
        self.storage_dir
            .join(format!("{:04}", now.year()))
            .join(format!("{:02}", now.month()))
    }

    fn claim(&self, key: &str) -> Option<KeyClaim<'_>> {
        let mut claims = self
            .claims
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if claims.insert(key.to_string()) {
            Some(KeyClaim {
                claims: &self.claims,
                key: key.to_string(),
            })
        } else {
            None
        }
    }

    /// Runs the pipeline for one file under an already-held permit.
    ///
    /// Never returns an error: every failure ends up on the job and in the
    /// audit log, and is reported through the outcome.
    pub async fn ingest(
        &self,
        job_id: &str,
        file: &FileDescriptor,
        ctx: &OperatorContext,
    ) -> IngestOutcome {
        let span = tracing::info_span!("ingest", job_id = %job_id, file = %file.name);
        async {
            match self.run(job_id, file, ctx).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let reason = e.to_string();
                    tracing::error!(error = %reason, "Ingestion aborted");
                    if let Err(fail_err) = self.tracker.fail(job_id, &file.name, &reason) {
                        tracing::error!(error = %fail_err, "Could not mark job failed");
                    }
                    self.audit.record(
                        AuditEntry::new(ctx, operation::IMPORT_FAILED, &file.name)
                            .with_detail(reason.clone()),
                    );
                    IngestOutcome::Failed { reason }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        job_id: &str,
        file: &FileDescriptor,
        ctx: &OperatorContext,
    ) -> Result<IngestOutcome, ArchiveError> {
        if self.tracker.is_cancel_requested(job_id)? {
            self.tracker.mark_cancelled(job_id)?;
            tracing::info!("Job cancelled before start");
            return Ok(IngestOutcome::Cancelled);
        }
        self.tracker.start(job_id)?;

        let Some(key) = derive_business_key(&file.name) else {
            return self.fail(job_id, &file.name, REASON_NO_KEY, ctx);
        };

        let Some(_claim) = self.claim(&key) else {
            return self.skip(job_id, &key, ctx);
        };
        if record_repo::exists(&self.db, &key)? {
            return self.skip(job_id, &key, ctx);
        }

        let directory = self.target_directory();
        if let Err(e) = tokio::fs::create_dir_all(&directory).await {
            let err = StorageError::CreateDirectory {
                path: directory,
                source: e,
            };
            return self.fail(job_id, &key, &err.to_string(), ctx);
        }

        let target = directory.join(format!("{}.{}", key, extension_of(&file.name)));
        let copy = match self.copier.copy(&file.source, &target, file.size).await {
            Ok(copy) => copy,
            Err(e) => return self.fail(job_id, &key, &e.to_string(), ctx),
        };
        tracing::debug!(tier = %copy.used, bytes = copy.bytes, "File copied");

        let new_record = NewRecord {
            archive_no: key.clone(),
            file_path: target.to_string_lossy().into_owned(),
            file_size: copy.bytes,
            created_by: Some(ctx.operator.clone()),
        };
        let record = match record_repo::insert_skeleton(&self.db, &new_record) {
            Ok(record) => record,
            // Another process won the race for this key after our check.
            Err(DatabaseError::DuplicateKey(_)) => return self.skip(job_id, &key, ctx),
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&target).await {
                    tracing::warn!(path = %target.display(), error = %rm, "Could not remove orphaned copy");
                }
                return self.fail(job_id, &key, &e.to_string(), ctx);
            }
        };

        self.tracker.complete(job_id, "Imported")?;
        self.audit.record(
            AuditEntry::new(ctx, operation::IMPORT, &key)
                .with_detail(format!("{} bytes via {} copy", copy.bytes, copy.used)),
        );
        tracing::info!(key = %key, record_id = record.id, "File ingested");

        Ok(IngestOutcome::Completed {
            record_id: record.id,
            key,
            path: target,
            copy,
        })
    }

    fn skip(
        &self,
        job_id: &str,
        key: &str,
        ctx: &OperatorContext,
    ) -> Result<IngestOutcome, ArchiveError> {
        self.tracker.skip(job_id, key, REASON_KEY_EXISTS)?;
        self.audit.record(
            AuditEntry::new(ctx, operation::IMPORT_SKIPPED, key).with_detail(REASON_KEY_EXISTS),
        );
        tracing::info!(key = %key, "Skipped duplicate archive number");
        Ok(IngestOutcome::Skipped {
            key: key.to_string(),
            reason: REASON_KEY_EXISTS.to_string(),
        })
    }

    fn fail(
        &self,
        job_id: &str,
        key: &str,
        reason: &str,
        ctx: &OperatorContext,
    ) -> Result<IngestOutcome, ArchiveError> {
        self.tracker.fail(job_id, key, reason)?;
        self.audit
            .record(AuditEntry::new(ctx, operation::IMPORT_FAILED, key).with_detail(reason));
        tracing::error!(key = %key, reason = %reason, "Ingestion failed");
        Ok(IngestOutcome::Failed {
            reason: reason.to_string(),
        })
    }
}
