//! Isolated environment for pipeline tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use archive_sync::config::{
    CacheConfig, Config, CopyConfig, EnrichmentConfig, ImportConfig, SearchConfig,
};
use archive_sync::db::record_repo::{self, NewRecord};
use archive_sync::ingest::{
    ConcurrencyLimiter, CopyMethod, CopyStrategySelector, FileDescriptor, FileIngestionWorker,
    ImportService,
};
use archive_sync::ingest::copy::{FastCopy, NaiveCopy, ResumableCopy, StreamingCopy};
use archive_sync::records::{ArchiveRecord, FieldUpdate};
use archive_sync::search::SearchEngine;
use archive_sync::{ArchiveSync, Database, JobTracker, SettingsCache};

pub struct TestHarness {
    temp_dir: TempDir,
    pub incoming_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub db: Database,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let incoming_dir = temp_dir.path().join("incoming");
        let storage_dir = temp_dir.path().join("storage");
        std::fs::create_dir_all(&incoming_dir).expect("Failed to create incoming dir");

        Self {
            temp_dir,
            incoming_dir,
            storage_dir,
            db: Database::open_in_memory().expect("Failed to open in-memory database"),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config(&self, concurrency: usize) -> Config {
        Config {
            version: "1.0".to_string(),
            storage_directory: self.storage_dir.to_string_lossy().into_owned(),
            database_path: None,
            import: ImportConfig {
                concurrency,
                operator: "tester".to_string(),
            },
            copy: CopyConfig::default(),
            search: SearchConfig {
                max_attempts: 3,
                base_delay_ms: 1,
                ..SearchConfig::default()
            },
            enrichment: EnrichmentConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    /// Writes a fake PDF into `incoming/<subdir>/<name>`.
    pub fn write_pdf_in(&self, subdir: &str, name: &str) -> FileDescriptor {
        let dir = self.incoming_dir.join(subdir);
        std::fs::create_dir_all(&dir).expect("Failed to create subdir");
        let path = dir.join(name);
        let content = format!("%PDF-1.4\n% {}\n%%EOF\n", name);
        std::fs::write(&path, &content).expect("Failed to write PDF");
        FileDescriptor::from_path(&path, content.len() as u64)
    }

    pub fn write_pdf(&self, name: &str) -> FileDescriptor {
        self.write_pdf_in("", name)
    }

    /// Import service with the default copy tiers.
    pub fn import_service(&self, concurrency: usize) -> ImportService {
        self.import_service_with_copy(
            concurrency,
            CopyStrategySelector::from_config(&CopyConfig::default()),
        )
    }

    pub fn import_service_with_copy(
        &self,
        concurrency: usize,
        copier: CopyStrategySelector,
    ) -> ImportService {
        let worker = FileIngestionWorker::new(self.db.clone(), copier, &self.storage_dir);
        ImportService::new(
            Arc::new(worker),
            ConcurrencyLimiter::new(concurrency),
            JobTracker::new(self.db.clone()),
            SettingsCache::default(),
        )
    }

    /// Selector whose every tier is `method`.
    pub fn uniform_copier(method: impl Fn() -> Box<dyn CopyMethod>) -> CopyStrategySelector {
        CopyStrategySelector::with_methods(1024, 4096, method(), method(), method(), method())
    }

    /// Selector with the real tiers except for a replaced fast tier.
    pub fn copier_with_fast(fast: Box<dyn CopyMethod>) -> CopyStrategySelector {
        CopyStrategySelector::with_methods(
            10 * 1024 * 1024,
            50 * 1024 * 1024,
            fast,
            Box::new(StreamingCopy::new(64 * 1024)),
            Box::new(ResumableCopy::new("rsync")),
            Box::new(NaiveCopy),
        )
    }

    pub fn default_fast() -> Box<dyn CopyMethod> {
        Box::new(FastCopy)
    }

    /// Full pipeline around the harness database and the given engine.
    pub fn app(&self, engine: Arc<dyn SearchEngine>, concurrency: usize) -> ArchiveSync {
        ArchiveSync::with_parts(self.config(concurrency), self.db.clone(), engine)
    }

    pub fn seed_record(&self, key: &str) -> ArchiveRecord {
        record_repo::insert_skeleton(
            &self.db,
            &NewRecord {
                archive_no: key.to_string(),
                file_path: self
                    .storage_dir
                    .join(format!("{}.pdf", key))
                    .to_string_lossy()
                    .into_owned(),
                file_size: 8,
                created_by: Some("seed".to_string()),
            },
        )
        .expect("Failed to seed record")
    }

    pub fn seed_enriched(&self, key: &str, updates: &[FieldUpdate]) -> ArchiveRecord {
        self.seed_record(key);
        record_repo::apply_updates(&self.db, key, updates)
            .expect("Failed to enrich record")
            .expect("Seeded record vanished")
    }

    pub fn record(&self, key: &str) -> Option<ArchiveRecord> {
        record_repo::find_by_key(&self.db, key).expect("Failed to read record")
    }

    pub fn record_count(&self) -> u64 {
        record_repo::count(&self.db).expect("Failed to count records")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Polls `check` until it returns true or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    check()
}
