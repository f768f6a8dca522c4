//! Wires every component from a [`Config`].

use std::sync::Arc;
use std::time::Duration;

use crate::cache::SettingsCache;
use crate::config::Config;
use crate::db::Database;
use crate::enrich::EnrichmentProcessor;
use crate::error::{ConfigError, Result};
use crate::ingest::{ConcurrencyLimiter, CopyStrategySelector, FileIngestionWorker, ImportService};
use crate::jobs::JobTracker;
use crate::search::{
    IndexQueue, IndexSynchronizer, MeiliEngine, MemoryEngine, QueryRouter, SearchEngine,
};

/// The assembled pipeline.
pub struct ArchiveSync {
    pub config: Config,
    pub db: Database,
    pub cache: SettingsCache,
    pub tracker: JobTracker,
    pub import: ImportService,
    pub synchronizer: Arc<IndexSynchronizer>,
    pub index_queue: IndexQueue,
    pub enrichment: EnrichmentProcessor,
    pub router: QueryRouter,
}

impl ArchiveSync {
    /// Opens the configured database and search engine. Without a search
    /// URL the in-memory engine is used.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(config: Config) -> Result<Self> {
        let path = config.database_path().ok_or_else(|| ConfigError::Validation {
            message: "databasePath is not set and no home directory was found".to_string(),
        })?;
        let db = Database::open(&path)?;

        let engine: Arc<dyn SearchEngine> = match MeiliEngine::from_config(&config.search)? {
            Some(engine) => Arc::new(engine),
            None => {
                tracing::info!("No search URL configured, using in-memory search engine");
                Arc::new(MemoryEngine::new())
            }
        };
        Ok(Self::with_parts(config, db, engine))
    }

    /// Assembles the pipeline around an existing database and engine.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_parts(config: Config, db: Database, engine: Arc<dyn SearchEngine>) -> Self {
        let cache = SettingsCache::new(
            Duration::from_secs(config.cache.ttl_secs),
            config.cache.max_entries,
        );
        let tracker = JobTracker::new(db.clone());

        let worker = FileIngestionWorker::new(
            db.clone(),
            CopyStrategySelector::from_config(&config.copy),
            config.storage_directory(),
        );
        let import = ImportService::new(
            Arc::new(worker),
            ConcurrencyLimiter::new(config.import.concurrency.max(1)),
            tracker.clone(),
            cache.clone(),
        );

        let synchronizer = Arc::new(IndexSynchronizer::from_config(
            Arc::clone(&engine),
            &config.search,
        ));
        let (index_queue, _) = IndexQueue::spawn(Arc::clone(&synchronizer));
        let enrichment = EnrichmentProcessor::new(
            db.clone(),
            index_queue.clone(),
            config.enrichment.key_column.clone(),
        )
        .with_staging_ttl(Duration::from_secs(config.enrichment.staging_ttl_secs));
        let router = QueryRouter::new(engine, db.clone());

        Self {
            config,
            db,
            cache,
            tracker,
            import,
            synchronizer,
            index_queue,
            enrichment,
            router,
        }
    }

    /// Waits until queued index writes have been handled.
    pub async fn flush_index(&self) {
        self.index_queue.flush().await;
    }
}
