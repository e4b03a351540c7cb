//! Drain the write queue into fixed-size bulk calls.

use super::types::{
    BulkCallReport, SyncStatsCollector, bulk_call_error, count, duration_ms, log_fields,
};
use crate::fsm::{BulkWriterFsm, BulkWriterState};
use docsync_domain::{DocumentId, EndMarker, IndexName, WriteIntent, WriteQueueItem, truncate_id};
use docsync_ports::{
    BulkOpKind, BulkRequest, LogLevel, LoggerPort, SearchIndexPort, TelemetryPort, telemetry_tags,
};
use docsync_shared::{
    BoundedQueue, ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, RetryPolicy,
    retry_async_with_observer,
};
use serde_json::Value;
use std::collections::HashSet;
use std::num::{NonZeroU64, NonZeroUsize};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

pub struct BulkWriter {
    pub(crate) ctx: RequestContext,
    pub(crate) index: Arc<dyn SearchIndexPort>,
    pub(crate) index_name: IndexName,
    pub(crate) pipeline: Option<Box<str>>,
    pub(crate) chunk_size: NonZeroUsize,
    pub(crate) max_concurrency: NonZeroUsize,
    pub(crate) display_every: NonZeroU64,
    pub(crate) retry: RetryPolicy,
    pub(crate) stats: Arc<SyncStatsCollector>,
    pub(crate) logger: Option<Arc<dyn LoggerPort>>,
    pub(crate) telemetry: Option<Arc<dyn TelemetryPort>>,
}

#[derive(Default)]
struct WriterState {
    batch: Vec<WriteIntent>,
    docs_done: bool,
    downloads_done: bool,
    indexed_ids: HashSet<DocumentId>,
    last_reported: u64,
}

impl WriterState {
    const fn finished(&self) -> bool {
        self.docs_done && self.downloads_done
    }
}

impl BulkWriter {
    /// Run `Draining -> Flushing -> Done` until both end markers are seen.
    ///
    /// A bulk call that still fails after retries aborts the other calls in
    /// flight and is returned; counters keep what already succeeded.
    pub(crate) async fn run(self, queue: &BoundedQueue<WriteQueueItem>) -> Result<()> {
        let mut fsm = BulkWriterFsm::new();
        let mut state = WriterState {
            batch: Vec::with_capacity(self.chunk_size.get()),
            ..WriterState::default()
        };
        let mut in_flight: JoinSet<Result<BulkCallReport>> = JoinSet::new();

        let result = self
            .drain(queue, &mut fsm, &mut state, &mut in_flight)
            .await;
        if let Err(error) = result {
            in_flight.abort_all();
            return Err(error);
        }

        fsm.transition(BulkWriterState::Done)?;
        if !state.batch.is_empty() {
            let batch = std::mem::take(&mut state.batch);
            self.dispatch(batch, &mut state, &mut in_flight).await?;
        }
        while !in_flight.is_empty() {
            self.reap_one(&mut state, &mut in_flight).await?;
        }
        Ok(())
    }

    async fn drain(
        &self,
        queue: &BoundedQueue<WriteQueueItem>,
        fsm: &mut BulkWriterFsm,
        state: &mut WriterState,
        in_flight: &mut JoinSet<Result<BulkCallReport>>,
    ) -> Result<()> {
        while !state.finished() {
            match queue.dequeue(&self.ctx).await? {
                WriteQueueItem::Intent(intent) => {
                    state.batch.push(intent);
                    if state.batch.len() >= self.chunk_size.get() {
                        fsm.transition(BulkWriterState::Flushing)?;
                        let batch = std::mem::replace(
                            &mut state.batch,
                            Vec::with_capacity(self.chunk_size.get()),
                        );
                        self.dispatch(batch, state, in_flight).await?;
                        fsm.transition(BulkWriterState::Draining)?;
                    }
                },
                WriteQueueItem::End(EndMarker::DocsDone { .. }) => state.docs_done = true,
                WriteQueueItem::End(EndMarker::DownloadsDone) => state.downloads_done = true,
            }
        }
        Ok(())
    }

    /// Start a bulk call, first waiting for a free slot when the in-flight
    /// limit is reached.
    async fn dispatch(
        &self,
        batch: Vec<WriteIntent>,
        state: &mut WriterState,
        in_flight: &mut JoinSet<Result<BulkCallReport>>,
    ) -> Result<()> {
        while in_flight.len() >= self.max_concurrency.get() {
            self.reap_one(state, in_flight).await?;
        }

        let task = BulkCallTask {
            ctx: self.ctx.clone(),
            index: Arc::clone(&self.index),
            request: BulkRequest {
                index: self.index_name.clone(),
                intents: batch,
                pipeline: self.pipeline.clone(),
            },
            retry: self.retry,
            logger: self.logger.clone(),
            telemetry: self.telemetry.clone(),
        };
        in_flight.spawn(task.run());
        Ok(())
    }

    async fn reap_one(
        &self,
        state: &mut WriterState,
        in_flight: &mut JoinSet<Result<BulkCallReport>>,
    ) -> Result<()> {
        let Some(joined) = in_flight.join_next().await else {
            return Ok(());
        };
        let report = joined.map_err(|join_error| {
            ErrorEnvelope::unexpected(
                ErrorCode::internal(),
                format!("bulk task failed: {join_error}"),
                ErrorClass::NonRetriable,
            )
        });
        let report = match report.and_then(|report| report) {
            Ok(report) => report,
            Err(error) => {
                in_flight.abort_all();
                self.ctx.cancel();
                return Err(error);
            },
        };

        self.stats.record_bulk_call(&report);
        state.indexed_ids.extend(report.upserted);
        self.stats.set_indexed(count(state.indexed_ids.len()));
        self.report_progress(state);
        Ok(())
    }

    fn report_progress(&self, state: &mut WriterState) {
        let written = self.stats.written();
        let every = self.display_every.get();
        if written / every <= state.last_reported / every {
            return;
        }
        state.last_reported = written;
        if let Some(logger) = self.logger.as_ref() {
            logger.info(
                "sync.bulk.flushed",
                &format!("Indexed {written}."),
                Some(log_fields([("count", Value::from(written))])),
            );
        }
    }
}

struct BulkCallTask {
    ctx: RequestContext,
    index: Arc<dyn SearchIndexPort>,
    request: BulkRequest,
    retry: RetryPolicy,
    logger: Option<Arc<dyn LoggerPort>>,
    telemetry: Option<Arc<dyn TelemetryPort>>,
}

impl BulkCallTask {
    async fn run(self) -> Result<BulkCallReport> {
        let Self {
            ctx,
            index,
            request,
            retry,
            logger,
            telemetry,
        } = self;

        let operations = request.intents.len();
        let tags = telemetry_tags([("index", request.index.as_str())]);
        let started = Instant::now();

        let response = retry_async_with_observer(
            &ctx,
            retry,
            "sync.bulk",
            &mut || index.bulk(&ctx, request.clone()),
            |attempt, error| {
                if let Some(logger) = logger.as_ref() {
                    logger.failure(
                        LogLevel::Warn,
                        "sync.bulk.retry",
                        error,
                        Some(log_fields([("attempt", Value::from(attempt))])),
                    );
                }
            },
        )
        .await
        .map_err(|error| bulk_call_error(error, operations))?;
        let duration = started.elapsed();

        if let Some(telemetry) = telemetry.as_ref() {
            telemetry.increment_counter("sync.bulk.calls", 1, Some(&tags));
            telemetry.record_timer_ms("sync.bulk.duration_ms", duration_ms(duration), Some(&tags));
        }

        let mut report = BulkCallReport {
            duration,
            ..BulkCallReport::default()
        };
        for item in response.items {
            if !item.is_failure() {
                match item.op {
                    BulkOpKind::Update => report.upserted.push(item.id),
                    BulkOpKind::Delete => report.deleted += 1,
                }
                continue;
            }
            report.partial_failures += 1;
            if let Some(logger) = logger.as_ref() {
                logger.warn(
                    "sync.bulk.partial_failure",
                    item.error.as_deref().unwrap_or("operation rejected"),
                    Some(log_fields([
                        ("id", Value::from(truncate_id(item.id.as_str()))),
                        ("op", Value::from(item.op.as_str())),
                        ("status", Value::from(item.status)),
                    ])),
                );
            }
        }
        if report.partial_failures > 0
            && let Some(telemetry) = telemetry.as_ref()
        {
            telemetry.increment_counter(
                "sync.bulk.partial_failures",
                report.partial_failures,
                Some(&tags),
            );
        }
        Ok(report)
    }
}
