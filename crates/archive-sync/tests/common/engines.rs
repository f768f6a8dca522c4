//! Fault-injecting collaborators.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use archive_sync::error::StorageError;
use archive_sync::ingest::copy::NaiveCopy;
use archive_sync::ingest::CopyMethod;
use archive_sync::search::{
    EngineHits, IndexSettings, IndexStats, MemoryEngine, SearchDocument, SearchEngine,
    SearchError, SearchRequest,
};

fn transient() -> SearchError {
    SearchError::Status {
        status: 503,
        body: "injected".to_string(),
    }
}

/// Wraps [`MemoryEngine`] with switchable failures.
#[derive(Default)]
pub struct FaultyEngine {
    pub inner: MemoryEngine,
    upsert_failures_left: AtomicU32,
    poisoned_ids: Mutex<HashSet<String>>,
    search_fails: AtomicBool,
    pub upsert_calls: AtomicU32,
}

impl FaultyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` upsert calls fail with a retryable error.
    pub fn fail_next_upserts(&self, n: u32) {
        self.upsert_failures_left.store(n, Ordering::SeqCst);
    }

    /// Any upsert containing this document id fails, every time.
    pub fn poison(&self, id: impl Into<String>) {
        self.poisoned_ids
            .lock()
            .unwrap()
            .insert(id.into());
    }

    /// Health stays green but every search call fails.
    pub fn fail_searches(&self) {
        self.search_fails.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SearchEngine for FaultyEngine {
    async fn health(&self) -> bool {
        self.inner.health().await
    }

    async fn upsert_documents(&self, documents: &[SearchDocument]) -> Result<(), SearchError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let left = self.upsert_failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.upsert_failures_left.store(left - 1, Ordering::SeqCst);
            return Err(transient());
        }
        let poisoned = {
            let ids = self.poisoned_ids.lock().unwrap();
            documents.iter().any(|d| ids.contains(&d.id))
        };
        if poisoned {
            return Err(transient());
        }
        self.inner.upsert_documents(documents).await
    }

    async fn delete_document(&self, id: &str) -> Result<(), SearchError> {
        self.inner.delete_document(id).await
    }

    async fn search(&self, request: &SearchRequest) -> Result<EngineHits, SearchError> {
        if self.search_fails.load(Ordering::SeqCst) {
            return Err(transient());
        }
        self.inner.search(request).await
    }

    async fn apply_settings(&self, settings: &IndexSettings) -> Result<(), SearchError> {
        self.inner.apply_settings(settings).await
    }

    async fn stats(&self) -> Result<IndexStats, SearchError> {
        self.inner.stats().await
    }
}

/// Copy that sleeps first and records how many copies overlap.
pub struct SlowCopy {
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl SlowCopy {
    pub fn new(delay: Duration, in_flight: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Self {
        Self {
            delay,
            in_flight,
            peak,
        }
    }
}

#[async_trait]
impl CopyMethod for SlowCopy {
    async fn copy(&self, from: &Path, to: &Path) -> Result<u64, StorageError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let result = NaiveCopy.copy(from, to).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
