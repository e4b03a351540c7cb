//! One incremental sync pass: snapshot, classify, enrich and write.
//!
//! After the snapshot is loaded three producers/consumers run concurrently
//! and meet only at the write queue:
//!
//! - the change detector pushes upserts, then deletes, then `DocsDone`;
//! - the enrichment drain pushes enrichment upserts, then `DownloadsDone`;
//! - the bulk writer batches everything until both markers are seen.

mod bulk_writer;
mod change_detector;
mod enrichment;
mod snapshot;
mod types;

pub use snapshot::{ExistingSnapshot, load_snapshot};
pub use types::{SyncIndexDeps, SyncIndexInput, SyncOptions, SyncOutcome};

use crate::fsm::SyncPassState;
use bulk_writer::BulkWriter;
use change_detector::{ChangeDetector, Classification};
use docsync_domain::{SyncResult, WriteQueueItem};
use docsync_ports::{LogLevel, TelemetryTags, telemetry_tags};
use docsync_shared::{BoundedQueue, ErrorEnvelope, RequestContext, Result};
use enrichment::EnrichmentDrain;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use types::{SyncPass, SyncStatsCollector, duration_ms, log_fields};

struct Prepared;
struct SnapshotLoaded;
struct Drained;
struct Completed;

impl SyncPass<Prepared> {
    const fn new() -> Self {
        Self {
            state: SyncPassState::Prepared,
            _state: PhantomData,
        }
    }

    fn snapshot_loaded(self) -> Result<SyncPass<SnapshotLoaded>> {
        self.transition(SyncPassState::SnapshotLoaded)
    }
}

impl SyncPass<SnapshotLoaded> {
    fn drained(self) -> Result<SyncPass<Drained>> {
        self.transition(SyncPassState::Drained)
    }
}

impl SyncPass<Drained> {
    fn completed(self) -> Result<SyncPass<Completed>> {
        self.transition(SyncPassState::Completed)
    }
}

/// Run one sync pass of `deps.source` into `input.index`.
///
/// Never returns `Err`: a fatal error is reported in [`SyncOutcome::error`]
/// alongside the counters of everything written before it.
#[tracing::instrument(name = "sync_index", skip_all, fields(index = %input.index))]
pub async fn sync_index(
    ctx: &RequestContext,
    deps: &SyncIndexDeps,
    input: SyncIndexInput,
) -> SyncOutcome {
    let started_at = Instant::now();
    let tags = telemetry_tags([
        ("index", input.index.as_str()),
        ("service_type", deps.source.service_type()),
    ]);
    let total_timer = deps
        .telemetry
        .as_ref()
        .map(|telemetry| telemetry.start_timer("sync.total", Some(&tags)));

    if let Some(logger) = deps.logger.as_ref() {
        logger.info(
            "sync.start",
            "Sync pass started",
            Some(log_fields([
                ("index", Value::from(input.index.as_str())),
                ("source", Value::from(deps.source.name())),
                ("serviceType", Value::from(deps.source.service_type())),
                ("chunkSize", Value::from(input.options.chunk_size.get())),
            ])),
        );
    }

    let stats = Arc::new(SyncStatsCollector::new());
    let error = run_pass(ctx, deps, input, &stats).await.err();
    let result = stats.snapshot();

    if let Some(timer) = total_timer.as_ref() {
        timer.stop();
    }
    report_outcome(deps, &tags, &result, error.as_ref(), started_at);

    SyncOutcome { result, error }
}

async fn run_pass(
    ctx: &RequestContext,
    deps: &SyncIndexDeps,
    input: SyncIndexInput,
    stats: &Arc<SyncStatsCollector>,
) -> Result<()> {
    ctx.ensure_not_cancelled("sync_index")?;
    let pass = SyncPass::<Prepared>::new();

    let snapshot = load_snapshot(ctx, deps.index.as_ref(), &input.index).await?;
    let pass = pass.snapshot_loaded()?;
    if let Some(logger) = deps.logger.as_ref() {
        logger.info(
            "sync.snapshot.loaded",
            &format!("Found {} existing documents", snapshot.len()),
            Some(log_fields([
                ("index", Value::from(input.index.as_str())),
                ("existing", Value::from(snapshot.len())),
            ])),
        );
    }

    let options = input.options;
    let pass_ctx = ctx.child();
    let queue = BoundedQueue::<WriteQueueItem>::new(options.queue_capacity.get())?;
    let (units_tx, units_rx) = mpsc::channel(options.concurrent_downloads.get());

    let detector = ChangeDetector {
        ctx: &pass_ctx,
        source: deps.source.as_ref(),
        queue: &queue,
        units: units_tx,
        stats,
        logger: deps.logger.as_deref(),
    };
    let drain = EnrichmentDrain {
        ctx: &pass_ctx,
        queue: &queue,
        concurrency: options.concurrent_downloads,
        stats,
        logger: deps.logger.clone(),
        telemetry: deps.telemetry.clone(),
    };
    let writer = BulkWriter {
        ctx: pass_ctx.clone(),
        index: Arc::clone(&deps.index),
        index_name: input.index.clone(),
        pipeline: input.pipeline.clone(),
        chunk_size: options.chunk_size,
        max_concurrency: options.max_concurrency,
        display_every: options.display_every,
        retry: options.retry,
        stats: Arc::clone(stats),
        logger: deps.logger.clone(),
        telemetry: deps.telemetry.clone(),
    };

    let (classified, drained, written) = tokio::join!(
        cancel_on_error(&pass_ctx, detector.run(input.filter, &snapshot)),
        cancel_on_error(&pass_ctx, drain.run(units_rx)),
        cancel_on_error(&pass_ctx, writer.run(&queue)),
    );
    queue.close_and_clear().await;
    let pass = pass.drained()?;

    let classification = first_error(classified, drained, written)?;
    let _pass = pass.completed()?;
    if let Some(logger) = deps.logger.as_ref() {
        logger.debug(
            "sync.classified",
            "Classification finished",
            Some(log_fields([
                ("upserts", Value::from(classification.upserts)),
                ("deletes", Value::from(classification.deletes)),
            ])),
        );
    }
    classification.feed_error.map_or(Ok(()), Err)
}

/// Cancel the pass siblings when `task` fails.
async fn cancel_on_error<T>(
    pass_ctx: &RequestContext,
    task: impl Future<Output = Result<T>>,
) -> Result<T> {
    let result = task.await;
    if result.is_err() {
        pass_ctx.cancel();
    }
    result
}

/// Pick the error that caused the pass to stop.
///
/// Siblings of a failed task end with cancellation errors, so the first
/// non-cancellation error wins; writer errors take precedence.
fn first_error(
    classified: Result<Classification>,
    drained: Result<u64>,
    written: Result<()>,
) -> Result<Classification> {
    let errors = [
        written.as_ref().err(),
        classified.as_ref().err(),
        drained.as_ref().err(),
    ];
    if let Some(error) = errors
        .iter()
        .flatten()
        .find(|error| !error.is_cancelled())
        .or_else(|| errors.iter().flatten().next())
    {
        return Err((*error).clone());
    }
    classified
}

fn report_outcome(
    deps: &SyncIndexDeps,
    tags: &TelemetryTags,
    result: &SyncResult,
    error: Option<&ErrorEnvelope>,
    started_at: Instant,
) {
    let duration = duration_ms(started_at.elapsed());
    let fields = log_fields([
        ("indexed", Value::from(result.indexed)),
        ("deleted", Value::from(result.deleted)),
        ("unchanged", Value::from(result.unchanged)),
        ("bulkCalls", Value::from(result.bulk_calls)),
        ("partialFailures", Value::from(result.partial_failures)),
        ("enrichmentFailures", Value::from(result.enrichment_failures)),
        ("durationMs", Value::from(duration)),
    ]);

    if let Some(telemetry) = deps.telemetry.as_ref() {
        let outcome = if error.is_some() { "sync.failed" } else { "sync.completed" };
        telemetry.increment_counter(outcome, 1, Some(tags));
    }
    let Some(logger) = deps.logger.as_ref() else {
        return;
    };
    match error {
        None => logger.info(
            "sync.completed",
            &format!(
                "Sync pass finished: {} indexed, {} deleted",
                result.indexed, result.deleted
            ),
            Some(fields),
        ),
        Some(error) if error.is_cancelled() => {
            logger.failure(LogLevel::Warn, "sync.cancelled", error, Some(fields));
        },
        Some(error) => logger.failure(LogLevel::Error, "sync.failed", error, Some(fields)),
    }
}
