//! Index synchronisation and query routing against fault-injecting engines.

mod common;

use std::sync::Arc;
use std::time::Duration;

use archive_sync::records::MetadataField;
use archive_sync::search::{
    IndexOutcome, IndexSettings, MemoryEngine, Pagination, QueryRouter, ResultSource,
    RetryPolicy, SearchDocument, SearchEngine,
};
use archive_sync::{ArchiveRecord, IndexSynchronizer, OperatorContext};
use common::{FaultyEngine, TestHarness};

fn titled(h: &TestHarness, key: &str, title: &str) -> ArchiveRecord {
    h.seed_enriched(key, &[(MetadataField::Title, title.to_string())])
}

fn synchronizer(engine: Arc<FaultyEngine>, attempts: u32, batch_size: usize) -> IndexSynchronizer {
    IndexSynchronizer::new(
        engine,
        RetryPolicy::new(attempts, Duration::from_millis(1)),
        batch_size,
    )
}

#[tokio::test]
async fn test_transient_failures_below_attempt_budget_are_absorbed() {
    let h = TestHarness::new();
    let record = titled(&h, "S-1", "Board minutes");
    let engine = Arc::new(FaultyEngine::new());
    engine.fail_next_upserts(2);

    let outcome = synchronizer(Arc::clone(&engine), 3, 10).index_one(&record).await;

    assert_eq!(outcome, IndexOutcome::Indexed { attempts: 3 });
    assert!(engine
        .inner
        .document(&SearchDocument::document_id(record.id))
        .is_some());
}

#[tokio::test]
async fn test_exhausted_attempts_report_failure() {
    let h = TestHarness::new();
    let record = titled(&h, "S-2", "Budget");
    let engine = Arc::new(FaultyEngine::new());
    engine.fail_next_upserts(5);

    let outcome = synchronizer(Arc::clone(&engine), 3, 10).index_one(&record).await;

    match outcome {
        IndexOutcome::Failed { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(engine.inner.is_empty());
}

#[tokio::test]
async fn test_one_failing_batch_does_not_sink_the_rest() {
    let h = TestHarness::new();
    let records: Vec<ArchiveRecord> = (1..=6)
        .map(|i| titled(&h, &format!("M-{}", i), "Register"))
        .collect();
    let engine = Arc::new(FaultyEngine::new());
    engine.poison(SearchDocument::document_id(records[2].id));

    let report = synchronizer(Arc::clone(&engine), 2, 2)
        .index_many(&records)
        .await;

    assert_eq!(report.indexed, 4);
    assert_eq!(report.failed, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(engine.inner.len(), 4);
    assert!(engine
        .inner
        .document(&SearchDocument::document_id(records[3].id))
        .is_none());
}

#[tokio::test]
async fn test_reindex_skips_skeletons() {
    let h = TestHarness::new();
    h.seed_record("R-1");
    titled(&h, "R-2", "Deed");
    titled(&h, "R-3", "Lease");
    let engine = Arc::new(FaultyEngine::new());

    let report = synchronizer(Arc::clone(&engine), 2, 10)
        .reindex_all(&h.db)
        .await
        .unwrap();

    assert_eq!(report.indexed, 2);
    assert_eq!(engine.inner.len(), 2);
}

#[tokio::test]
async fn test_configure_index_writes_canonical_settings() {
    let engine = Arc::new(FaultyEngine::new());
    synchronizer(Arc::clone(&engine), 2, 10)
        .configure_index()
        .await
        .unwrap();

    assert_eq!(engine.inner.settings(), Some(IndexSettings::canonical()));
}

#[tokio::test]
async fn test_unhealthy_engine_matches_fallback_exactly() {
    let h = TestHarness::new();
    titled(&h, "Q-1", "Harbour survey");
    titled(&h, "Q-2", "harbour dues");
    titled(&h, "Q-3", "Town plan");
    let engine = Arc::new(FaultyEngine::new());
    engine.inner.set_healthy(false);
    let router = QueryRouter::new(engine, h.db.clone());

    let routed = router.search("HARBOUR", Pagination::new(1, 10)).await.unwrap();
    let direct = router.fallback("HARBOUR", Pagination::new(1, 10)).unwrap();

    assert_eq!(routed.source, ResultSource::Fallback);
    assert_eq!(routed.items, direct.items);
    assert_eq!(routed.pagination, direct.pagination);
    assert_eq!(routed.query, direct.query);
    assert_eq!(routed.pagination.total, 2);
}

#[tokio::test]
async fn test_throwing_engine_falls_back() {
    let h = TestHarness::new();
    titled(&h, "T-1", "Charter");
    let engine = Arc::new(FaultyEngine::new());
    engine.fail_searches();
    let router = QueryRouter::new(engine, h.db.clone());

    let response = router.search("charter", Pagination::default()).await.unwrap();

    assert_eq!(response.source, ResultSource::Fallback);
    assert_eq!(response.items.len(), 1);
    assert_eq!(response.items[0].archive_no, "T-1");
}

#[tokio::test]
async fn test_fallback_orders_newest_first_and_pages() {
    let h = TestHarness::new();
    for i in 1..=5 {
        titled(&h, &format!("N-{}", i), "Census");
    }
    let router = QueryRouter::new(Arc::new(MemoryEngine::new()), h.db.clone());

    let page = router.fallback("census", Pagination::new(2, 2)).unwrap();

    assert_eq!(page.pagination.total, 5);
    assert_eq!(page.pagination.total_pages, 3);
    let keys: Vec<_> = page.items.iter().map(|r| r.archive_no.as_str()).collect();
    assert_eq!(keys, vec!["N-3", "N-2"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_import_enrich_then_search_through_engine() {
    let h = TestHarness::new();
    let engine = Arc::new(MemoryEngine::new());
    let app = h.app(engine.clone() as Arc<dyn SearchEngine>, 2);
    let ctx = OperatorContext::new("clerk", None);

    let files = vec![h.write_pdf("E2E-1.pdf"), h.write_pdf("E2E-2.pdf")];
    let report = app.import.submit_batch(files, &ctx).unwrap().wait().await;
    assert_eq!(report.completed, 2);
    assert!(engine.is_empty(), "skeletons must not be indexed");

    let csv = "archive_no,title,keywords\nE2E-1,Lighthouse logbook,maritime\nE2E-2,Mill ledger,\n";
    let staged = app.enrichment.validate_format("batch.csv", csv).unwrap();
    assert!(staged.report.valid);
    assert!(app
        .enrichment
        .validate_existence(&staged.batch_id)
        .unwrap()
        .passed());
    let commit = app.enrichment.commit(&staged.batch_id, &ctx).unwrap();
    commit.wait().await;
    app.flush_index().await;

    assert_eq!(engine.len(), 2);
    let response = app
        .router
        .search("lighthouse", Pagination::default())
        .await
        .unwrap();
    assert_eq!(response.source, ResultSource::Engine);
    assert_eq!(response.items.len(), 1);
    assert_eq!(response.items[0].archive_no, "E2E-1");
    assert_eq!(response.items[0].keywords.as_deref(), Some("maritime"));

    let stats = app.synchronizer.stats().await.unwrap();
    assert_eq!(stats.documents, 2);
}
