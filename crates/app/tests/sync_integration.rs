//! Integration tests for the sync pass.

mod support;

use docsync_app::{SyncIndexDeps, SyncIndexInput, SyncOptions, sync_index};
use docsync_domain::WriteIntent;
use docsync_ports::{DataSourcePort, LoggerPort, SearchIndexPort};
use docsync_shared::{ErrorCode, RequestContext, Result, RetryPolicy};
use serde_json::json;
use std::num::{NonZeroU64, NonZeroUsize};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use support::{
    CaptureLogger, FeedEntry, RecordingIndex, ScriptedSource, doc_id, document, index_name,
    retriable, text_of,
};

fn deps(
    index: &Arc<RecordingIndex>,
    source: &Arc<ScriptedSource>,
    logger: Option<&CaptureLogger>,
) -> SyncIndexDeps {
    let source: Arc<dyn DataSourcePort> = source.clone();
    let index: Arc<dyn SearchIndexPort> = index.clone();
    let logger = logger.map(|logger| -> Arc<dyn LoggerPort> { Arc::new(logger.clone()) });
    SyncIndexDeps {
        source,
        index,
        logger,
        telemetry: None,
    }
}

fn options(chunk_size: usize) -> SyncOptions {
    SyncOptions {
        chunk_size: NonZeroUsize::new(chunk_size).unwrap_or(NonZeroUsize::MIN),
        queue_capacity: NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN),
        concurrent_downloads: NonZeroUsize::new(2).unwrap_or(NonZeroUsize::MIN),
        max_concurrency: NonZeroUsize::new(2).unwrap_or(NonZeroUsize::MIN),
        display_every: NonZeroU64::new(1).unwrap_or(NonZeroU64::MIN),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
            ..RetryPolicy::default()
        },
    }
}

fn input(chunk_size: usize) -> Result<SyncIndexInput> {
    Ok(SyncIndexInput {
        options: options(chunk_size),
        ..SyncIndexInput::new(index_name("search-docs")?)
    })
}

#[tokio::test]
async fn stale_documents_are_deleted_and_new_ones_enriched() -> Result<()> {
    let index = Arc::new(RecordingIndex::with_documents(vec![
        document("id1", Some("t0"))?,
        document("id2", Some("t0"))?,
    ]));
    let enriched = document("id3", Some("t1"))?.with_field("text", json!("x"));
    let source = Arc::new(ScriptedSource::new(vec![
        FeedEntry::enriched(document("id1", Some("t0"))?, Ok(None)),
        FeedEntry::enriched(document("id3", Some("t1"))?, Ok(Some(enriched))),
    ]));
    let ctx = RequestContext::new_request();

    let outcome = sync_index(&ctx, &deps(&index, &source, None), input(10)?).await;
    let result = outcome.into_result()?;

    assert_eq!(result.indexed, 1);
    assert_eq!(result.deleted, 1);
    assert_eq!(result.unchanged, 1);
    assert_eq!(index.stored_ids(), vec!["id1", "id3"]);
    let id3 = index.stored("id3");
    assert_eq!(id3.as_ref().and_then(text_of), Some("x"));

    let deletes: Vec<_> = index
        .intents()
        .into_iter()
        .filter(|intent| !intent.is_upsert())
        .collect();
    assert_eq!(deletes, vec![WriteIntent::delete(doc_id("id2")?)]);

    let mut triggers = source.trigger_log();
    triggers.sort();
    assert_eq!(
        triggers,
        vec![("id1".to_owned(), false), ("id3".to_owned(), true)]
    );
    Ok(())
}

#[tokio::test]
async fn new_documents_are_batched_by_chunk_size() -> Result<()> {
    let index = Arc::new(RecordingIndex::default());
    let mut entries = Vec::new();
    for position in 0..5 {
        entries.push(FeedEntry::plain(document(&format!("doc-{position}"), None)?));
    }
    let source = Arc::new(ScriptedSource::new(entries));
    let ctx = RequestContext::new_request();

    let result = sync_index(&ctx, &deps(&index, &source, None), input(2)?)
        .await
        .into_result()?;

    let mut sizes = index.call_sizes();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![1, 2, 2]);
    assert_eq!(result.bulk_calls, 3);
    assert_eq!(result.indexed, 5);
    Ok(())
}

#[tokio::test]
async fn writer_waits_for_enrichments_finishing_after_the_feed() -> Result<()> {
    let index = Arc::new(RecordingIndex::default());
    let enriched = document("c", Some("t0"))?.with_field("text", json!("late"));
    let source = Arc::new(ScriptedSource::new(vec![
        FeedEntry::plain(document("a", Some("t0"))?),
        FeedEntry::plain(document("b", Some("t0"))?),
        FeedEntry::slow(
            document("c", Some("t0"))?,
            Ok(Some(enriched)),
            Duration::from_millis(50),
        ),
    ]));
    let ctx = RequestContext::new_request();

    let result = sync_index(&ctx, &deps(&index, &source, None), input(2)?)
        .await
        .into_result()?;

    assert_eq!(result.bulk_calls, 2);
    assert_eq!(result.upsert_operations, 4);
    let last_call = index.requests().pop();
    let last_intent = last_call.and_then(|call| call.intents.last().cloned());
    let late_text = match last_intent {
        Some(WriteIntent::Upsert { document, .. }) => text_of(&document).map(str::to_owned),
        _ => None,
    };
    assert_eq!(late_text.as_deref(), Some("late"));
    let stored = index.stored("c");
    assert_eq!(stored.as_ref().and_then(text_of), Some("late"));
    assert!(stored.as_ref().and_then(|doc| doc.get("title")).is_some());
    Ok(())
}

#[tokio::test]
async fn second_pass_over_unchanged_feed_writes_nothing() -> Result<()> {
    let index = Arc::new(RecordingIndex::default());
    let feed = || -> Result<Vec<FeedEntry>> {
        Ok(vec![
            FeedEntry::plain(document("a", Some("t0"))?),
            FeedEntry::plain(document("b", Some("t0"))?),
        ])
    };
    let ctx = RequestContext::new_request();

    let first = Arc::new(ScriptedSource::new(feed()?));
    let result = sync_index(&ctx, &deps(&index, &first, None), input(10)?)
        .await
        .into_result()?;
    assert_eq!(result.indexed, 2);

    let second = Arc::new(ScriptedSource::new(feed()?));
    let result = sync_index(&ctx, &deps(&index, &second, None), input(10)?)
        .await
        .into_result()?;
    assert_eq!(result.indexed, 0);
    assert_eq!(result.deleted, 0);
    assert_eq!(result.unchanged, 2);
    assert_eq!(result.bulk_calls, 0);
    Ok(())
}

#[tokio::test]
async fn documents_without_token_get_a_fresh_timestamp() -> Result<()> {
    let index = Arc::new(RecordingIndex::default());
    let source = Arc::new(ScriptedSource::new(vec![FeedEntry::plain(document(
        "untimed", None,
    )?)]));
    let ctx = RequestContext::new_request();

    sync_index(&ctx, &deps(&index, &source, None), input(10)?)
        .await
        .into_result()?;

    let stored = index.stored("untimed");
    let timestamp = stored
        .as_ref()
        .and_then(|doc| doc.timestamp())
        .map(|token| token.as_str().to_owned());
    assert!(timestamp.is_some_and(|value| value.ends_with("+00:00")));
    Ok(())
}

#[tokio::test]
async fn feed_failure_skips_deletes_and_surfaces_after_writes() -> Result<()> {
    let index = Arc::new(RecordingIndex::with_documents(vec![document(
        "stale",
        Some("t0"),
    )?]));
    let source = Arc::new(ScriptedSource::failing_after(
        vec![
            FeedEntry::plain(document("fresh", Some("t1"))?),
            FeedEntry::plain(document("never", Some("t1"))?),
        ],
        1,
    ));
    let logger = CaptureLogger::default();
    let ctx = RequestContext::new_request();

    let outcome = sync_index(&ctx, &deps(&index, &source, Some(&logger)), input(10)?).await;

    let error = outcome
        .error
        .clone()
        .ok_or_else(|| retriable("expected feed error"))?;
    assert_eq!(error.code, ErrorCode::new("sync", "feed_failed"));
    assert_eq!(outcome.result.indexed, 1);
    assert_eq!(outcome.result.deleted, 0);
    assert_eq!(index.stored_ids(), vec!["fresh", "stale"]);
    assert!(logger.names().contains(&"sync.failed".to_owned()));
    assert!(logger.names().contains(&"sync.deletes.skipped".to_owned()));
    Ok(())
}

#[tokio::test]
async fn transient_bulk_failures_are_retried() -> Result<()> {
    let index = Arc::new(RecordingIndex::default());
    index.failing_calls.store(2, Ordering::SeqCst);
    let source = Arc::new(ScriptedSource::new(vec![FeedEntry::plain(document(
        "a",
        Some("t0"),
    )?)]));
    let ctx = RequestContext::new_request();

    let result = sync_index(&ctx, &deps(&index, &source, None), input(10)?)
        .await
        .into_result()?;

    assert_eq!(result.bulk_calls, 1);
    assert_eq!(index.stored_ids(), vec!["a"]);
    Ok(())
}

#[tokio::test]
async fn exhausted_bulk_retries_are_fatal_with_partial_result() -> Result<()> {
    let index = Arc::new(RecordingIndex::default());
    index.failing_calls.store(usize::MAX, Ordering::SeqCst);
    let source = Arc::new(ScriptedSource::new(vec![
        FeedEntry::plain(document("a", Some("t0"))?),
        FeedEntry::plain(document("b", Some("t0"))?),
        FeedEntry::plain(document("c", Some("t0"))?),
    ]));
    let logger = CaptureLogger::default();
    let ctx = RequestContext::new_request();

    let outcome = sync_index(&ctx, &deps(&index, &source, Some(&logger)), input(1)?).await;

    let error = outcome
        .error
        .ok_or_else(|| retriable("expected bulk error"))?;
    assert_eq!(error.code, ErrorCode::new("sync", "bulk_call_failed"));
    assert_eq!(error.metadata.get("attempts").map(String::as_str), Some("3"));
    assert_eq!(outcome.result.bulk_calls, 0);
    assert!(!ctx.is_cancelled());
    assert!(logger.names().contains(&"sync.bulk.retry".to_owned()));
    Ok(())
}

#[tokio::test]
async fn rejected_operations_are_counted_not_fatal() -> Result<()> {
    let mut index = RecordingIndex::default();
    index.rejected.insert(doc_id("bad")?);
    let index = Arc::new(index);
    let source = Arc::new(ScriptedSource::new(vec![
        FeedEntry::plain(document("good", Some("t0"))?),
        FeedEntry::plain(document("bad", Some("t0"))?),
    ]));
    let logger = CaptureLogger::default();
    let ctx = RequestContext::new_request();

    let outcome = sync_index(&ctx, &deps(&index, &source, Some(&logger)), input(10)?).await;

    assert!(outcome.is_ok());
    assert_eq!(outcome.result.partial_failures, 1);
    assert_eq!(outcome.result.indexed, 1);
    assert_eq!(outcome.result.upsert_operations, 1);
    assert!(!outcome.result.is_clean());
    assert_eq!(logger.messages("sync.bulk.partial_failure"), vec!["mapper_parsing_exception"]);
    Ok(())
}

#[tokio::test]
async fn enrichment_failure_is_counted_and_skipped() -> Result<()> {
    let index = Arc::new(RecordingIndex::default());
    let source = Arc::new(ScriptedSource::new(vec![
        FeedEntry::enriched(
            document("broken", Some("t0"))?,
            Err(retriable("download failed")),
        ),
        FeedEntry::enriched(
            document("fine", Some("t0"))?,
            Ok(Some(document("fine", Some("t0"))?.with_field("text", json!("body")))),
        ),
    ]));
    let logger = CaptureLogger::default();
    let ctx = RequestContext::new_request();

    let outcome = sync_index(&ctx, &deps(&index, &source, Some(&logger)), input(10)?).await;

    assert!(outcome.is_ok());
    assert_eq!(outcome.result.enrichment_failures, 1);
    assert_eq!(outcome.result.indexed, 2);
    assert_eq!(outcome.result.upsert_operations, 3);
    assert_eq!(index.stored("fine").as_ref().and_then(text_of), Some("body"));
    assert!(logger.names().contains(&"sync.enrichment.failed".to_owned()));
    Ok(())
}

#[tokio::test]
async fn snapshot_failure_aborts_before_writes() -> Result<()> {
    let index = Arc::new(RecordingIndex {
        scan_error: Some(retriable("cluster unavailable")),
        ..RecordingIndex::default()
    });
    let source = Arc::new(ScriptedSource::new(vec![FeedEntry::plain(document(
        "a",
        Some("t0"),
    )?)]));
    let ctx = RequestContext::new_request();

    let outcome = sync_index(&ctx, &deps(&index, &source, None), input(10)?).await;

    let error = outcome
        .error
        .ok_or_else(|| retriable("expected index access error"))?;
    assert_eq!(error.code, ErrorCode::new("sync", "index_access"));
    assert!(index.call_sizes().is_empty());
    Ok(())
}

#[tokio::test]
async fn duplicate_ids_in_feed_upsert_once() -> Result<()> {
    let index = Arc::new(RecordingIndex::default());
    let source = Arc::new(ScriptedSource::new(vec![
        FeedEntry::plain(document("twice", Some("t0"))?),
        FeedEntry::plain(document("twice", Some("t1"))?),
    ]));
    let ctx = RequestContext::new_request();

    let result = sync_index(&ctx, &deps(&index, &source, None), input(10)?)
        .await
        .into_result()?;

    assert_eq!(result.upsert_operations, 1);
    let stored = index.stored("twice");
    assert_eq!(
        stored.as_ref().and_then(|doc| doc.timestamp()).map(|t| t.as_str()),
        Some("t0")
    );
    Ok(())
}

#[tokio::test]
async fn cancelled_context_stops_the_pass() -> Result<()> {
    let index = Arc::new(RecordingIndex::default());
    let source = Arc::new(ScriptedSource::new(vec![FeedEntry::plain(document(
        "a",
        Some("t0"),
    )?)]));
    let ctx = RequestContext::new_request();
    ctx.cancel();

    let outcome = sync_index(&ctx, &deps(&index, &source, None), input(10)?).await;

    assert!(outcome.error.is_some_and(|error| error.is_cancelled()));
    assert!(index.call_sizes().is_empty());
    Ok(())
}

#[tokio::test]
async fn progress_is_logged_every_display_interval() -> Result<()> {
    let index = Arc::new(RecordingIndex::default());
    let source = Arc::new(ScriptedSource::new(vec![
        FeedEntry::plain(document("a", Some("t0"))?),
        FeedEntry::plain(document("b", Some("t0"))?),
    ]));
    let logger = CaptureLogger::default();
    let ctx = RequestContext::new_request();

    sync_index(&ctx, &deps(&index, &source, Some(&logger)), input(10)?)
        .await
        .into_result()?;

    assert_eq!(logger.messages("sync.bulk.flushed"), vec!["Indexed 2."]);
    let names = logger.names();
    assert_eq!(names.first().map(String::as_str), Some("sync.start"));
    assert!(names.contains(&"sync.snapshot.loaded".to_owned()));
    assert_eq!(names.last().map(String::as_str), Some("sync.completed"));
    Ok(())
}
