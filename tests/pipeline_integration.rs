mod common;

use common::{InMemoryStore, ScriptedEnricher, TARGET_FIELD, fast_settings};
use rusty_enrich::enrichment::{COUNTRY_NAME_FIELD, CountryNameBackfill};
use rusty_enrich::inference::InferenceError;
use rusty_enrich::pipeline::{
    MAX_WRITE_ATTEMPTS, Pipeline, PipelineError, RunSummary, Termination,
};
use rusty_enrich::store::DocumentId;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn run(
    store: &Arc<InMemoryStore>,
    enricher: &Arc<ScriptedEnricher>,
    flush_size: usize,
) -> RunSummary {
    Pipeline::new(store.clone(), enricher.clone(), fast_settings(flush_size))
        .run(&CancellationToken::new())
        .await
        .expect("run")
}

#[tokio::test]
async fn flushes_full_batches_then_the_remainder() {
    let store = Arc::new(InMemoryStore::with_articles(120));
    let enricher = Arc::new(ScriptedEnricher::default());

    let summary = run(&store, &enricher, 50).await;

    assert_eq!(store.bulk_calls(), vec![50, 50, 20]);
    assert_eq!(summary.total_eligible, 120);
    assert_eq!(summary.processed, 120);
    assert_eq!(summary.flushes, 3);
    assert_eq!(summary.modified, 120);
    assert_eq!(summary.unflushed, 0);
    assert_eq!(summary.termination, Termination::Exhausted);
    assert_eq!(summary.checkpoint.as_deref(), Some("120"));
    assert_eq!(
        store.field(7, TARGET_FIELD),
        Some(Value::String("summary of article 7".into()))
    );
}

#[tokio::test]
async fn second_run_finds_nothing_to_do() {
    let store = Arc::new(InMemoryStore::with_articles(30));
    let enricher = Arc::new(ScriptedEnricher::default());

    let first = run(&store, &enricher, 10).await;
    let second = run(&store, &enricher, 10).await;

    assert_eq!(first.processed, 30);
    assert_eq!(second.total_eligible, 0);
    assert_eq!(second.processed, 0);
    assert_eq!(enricher.calls().len(), 30);
    assert_eq!(store.bulk_calls(), vec![10, 10, 10]);
}

#[tokio::test]
async fn every_eligible_document_is_accounted_for() {
    let store = Arc::new(InMemoryStore::with_articles(10));
    store.insert(11, json!({ "content": "   " }));
    store.insert(12, json!({ "title": "no body" }));
    store.insert(13, json!({ "content": "done", "msbm_llm_summary": "already summarized" }));
    let enricher = Arc::new(ScriptedEnricher::default());
    enricher.fail("article 3", 1, || {
        InferenceError::Validation("summary rejected".into())
    });
    enricher.fail("article 5", 2, || {
        InferenceError::Network("connection reset".into())
    });

    let summary = run(&store, &enricher, 4).await;

    assert_eq!(summary.total_eligible, 12);
    assert_eq!(summary.processed, 9);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.errored, 1);
    assert_eq!(
        summary.processed + summary.skipped + summary.errored,
        summary.total_eligible
    );
    assert_eq!(enricher.calls_for("article 3"), 1);
    assert_eq!(enricher.calls_for("article 5"), 3);
    assert!(store.field(3, TARGET_FIELD).is_none());
    assert_eq!(
        store.field(13, TARGET_FIELD),
        Some(Value::String("already summarized".into()))
    );
    assert_eq!(store.enriched_ids(), vec![1, 2, 4, 5, 6, 7, 8, 9, 10, 13]);
}

#[tokio::test]
async fn throttled_document_errors_after_retry_budget() {
    let store = Arc::new(InMemoryStore::with_articles(3));
    let enricher = Arc::new(ScriptedEnricher::default());
    enricher.fail("article 2", 10, || InferenceError::Status {
        status: 429,
        body: "Rate limit reached".into(),
    });

    let summary = run(&store, &enricher, 50).await;

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.errored, 1);
    assert_eq!(enricher.calls_for("article 2"), 4);
    assert_eq!(store.enriched_ids(), vec![1, 3]);
}

#[tokio::test]
async fn expired_scans_resume_without_gaps_or_repeats() {
    let store = Arc::new(InMemoryStore::with_articles(120));
    store.expire_scans_after(&[30, 45]);
    let enricher = Arc::new(ScriptedEnricher::default());

    let summary = run(&store, &enricher, 50).await;

    assert_eq!(summary.invalidations, 2);
    assert_eq!(summary.processed, 120);
    assert_eq!(summary.termination, Termination::Exhausted);
    assert_eq!(
        store.opened_scans(),
        vec![None, Some(DocumentId::Num(30)), Some(DocumentId::Num(75))]
    );
    let calls = enricher.calls();
    let expected = (1..=120)
        .map(|id| format!("article {id}"))
        .collect::<Vec<_>>();
    assert_eq!(calls, expected);
    assert_eq!(store.enriched_ids().len(), 120);
}

#[tokio::test]
async fn expiry_before_any_progress_halts_gracefully() {
    let store = Arc::new(InMemoryStore::with_articles(5));
    store.expire_scans_after(&[0]);
    let enricher = Arc::new(ScriptedEnricher::default());

    let summary = run(&store, &enricher, 50).await;

    assert_eq!(summary.termination, Termination::ScanUnrecoverable);
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.invalidations, 1);
    assert!(summary.checkpoint.is_none());
    assert!(store.bulk_calls().is_empty());
}

#[tokio::test]
async fn repeated_expiry_keeps_completed_work() {
    let store = Arc::new(InMemoryStore::with_articles(10));
    store.expire_scans_after(&[3, 0]);
    let enricher = Arc::new(ScriptedEnricher::default());

    let summary = run(&store, &enricher, 50).await;

    assert_eq!(summary.termination, Termination::ScanUnrecoverable);
    assert_eq!(summary.processed, 3);
    assert_eq!(store.bulk_calls(), vec![3]);
    assert_eq!(store.enriched_ids(), vec![1, 2, 3]);
}

#[tokio::test]
async fn cancellation_flushes_completed_results() {
    let store = Arc::new(InMemoryStore::with_articles(20));
    let enricher = Arc::new(ScriptedEnricher::default());
    let cancel = CancellationToken::new();
    enricher.cancel_after(3, cancel.clone());

    let summary = Pipeline::new(store.clone(), enricher.clone(), fast_settings(50))
        .run(&cancel)
        .await
        .expect("run");

    assert_eq!(summary.termination, Termination::Cancelled);
    assert_eq!(summary.processed, 3);
    assert_eq!(store.bulk_calls(), vec![3]);
    assert_eq!(store.enriched_ids(), vec![1, 2, 3]);
}

#[tokio::test]
async fn failed_bulk_write_is_retried_at_next_flush() {
    let store = Arc::new(InMemoryStore::with_articles(25));
    store.fail_next_writes(1);
    let enricher = Arc::new(ScriptedEnricher::default());

    let summary = run(&store, &enricher, 10).await;

    assert_eq!(store.bulk_calls(), vec![10, 20, 5]);
    assert_eq!(summary.flushes, 2);
    assert_eq!(summary.modified, 25);
    assert_eq!(summary.unflushed, 0);
    assert_eq!(store.enriched_ids().len(), 25);
}

#[tokio::test]
async fn store_outage_keeps_bulk_writes_bounded() {
    let store = Arc::new(InMemoryStore::with_articles(45));
    store.fail_next_writes(1000);
    let enricher = Arc::new(ScriptedEnricher::default());

    let summary = run(&store, &enricher, 10).await;

    let calls = store.bulk_calls();
    assert_eq!(calls, vec![10, 20, 30, 10, 15]);
    assert!(calls.len() <= 45 / 10 + 1);
    assert!(calls.iter().all(|size| *size <= 10 * MAX_WRITE_ATTEMPTS));
    assert_eq!(summary.processed, 45);
    assert_eq!(summary.flushes, 0);
    assert_eq!(summary.write_failures, 30);
    assert_eq!(summary.unflushed, 15);
    assert_eq!(summary.write_failures + summary.unflushed, summary.processed);
    assert!(store.enriched_ids().is_empty());
}

#[tokio::test]
async fn missing_country_code_is_backfilled_as_unknown() {
    let store = Arc::new(InMemoryStore::default());
    store.insert(1, json!({ "country": "JM" }));
    store.insert(2, json!({ "title": "no country" }));
    store.insert(3, json!({ "country": "  " }));
    let pipeline =
        || Pipeline::new(store.clone(), Arc::new(CountryNameBackfill), fast_settings(10));

    let first = pipeline().run(&CancellationToken::new()).await.expect("run");
    let second = pipeline().run(&CancellationToken::new()).await.expect("run");

    assert_eq!(first.total_eligible, 3);
    assert_eq!(first.processed, 3);
    assert_eq!(first.skipped, 0);
    assert_eq!(
        store.field(1, COUNTRY_NAME_FIELD),
        Some(Value::String("Jamaica".into()))
    );
    for id in [2, 3] {
        assert_eq!(
            store.field(id, COUNTRY_NAME_FIELD),
            Some(Value::String("Unknown".into()))
        );
    }
    assert_eq!(second.total_eligible, 0);
    assert_eq!(second.processed, 0);
}

#[tokio::test]
async fn unreachable_store_fails_at_startup() {
    let store = Arc::new(InMemoryStore::with_articles(5));
    store.make_count_unavailable();
    let enricher = Arc::new(ScriptedEnricher::default());

    let error = Pipeline::new(store.clone(), enricher.clone(), fast_settings(50))
        .run(&CancellationToken::new())
        .await
        .expect_err("startup failure");

    assert!(matches!(error, PipelineError::Startup(_)));
    assert!(enricher.calls().is_empty());
}
