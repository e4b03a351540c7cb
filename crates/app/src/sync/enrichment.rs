//! Drain triggered enrichments into the write queue in completion order.

use super::change_detector::EnrichmentUnit;
use super::types::{SyncStatsCollector, enrichment_error, log_fields};
use docsync_domain::{Document, DocumentId, EndMarker, WriteIntent, WriteQueueItem, truncate_id};
use docsync_ports::{LogLevel, LoggerPort, TelemetryPort};
use docsync_shared::{BoundedQueue, ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};

pub struct EnrichmentDrain<'a> {
    pub(crate) ctx: &'a RequestContext,
    pub(crate) queue: &'a BoundedQueue<WriteQueueItem>,
    pub(crate) concurrency: NonZeroUsize,
    pub(crate) stats: &'a SyncStatsCollector,
    pub(crate) logger: Option<Arc<dyn LoggerPort>>,
    pub(crate) telemetry: Option<Arc<dyn TelemetryPort>>,
}

type UnitResult = (DocumentId, Result<Option<Document>>);

impl EnrichmentDrain<'_> {
    /// Await every unit received on `units`, then emit `DownloadsDone`.
    ///
    /// At most `concurrency` units run at once; new units are not accepted
    /// while the limit is reached.
    pub(crate) async fn run(self, mut units: mpsc::Receiver<EnrichmentUnit>) -> Result<u64> {
        let mut running: JoinSet<UnitResult> = JoinSet::new();
        let mut scheduling_done = false;
        let mut upserts = 0u64;

        loop {
            if scheduling_done && running.is_empty() {
                break;
            }
            let accepting = !scheduling_done && running.len() < self.concurrency.get();

            tokio::select! {
                () = self.ctx.cancelled() => {
                    running.abort_all();
                    return Err(ErrorEnvelope::cancelled("operation cancelled")
                        .with_operation("sync.enrichment"));
                }
                unit = units.recv(), if accepting => match unit {
                    Some(EnrichmentUnit { id, work }) => {
                        running.spawn(async move { (id, work.await) });
                    },
                    None => scheduling_done = true,
                },
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    if let Some(document) = self.settle(joined) {
                        if let Err(error) = self
                            .queue
                            .enqueue(self.ctx, WriteIntent::upsert(document).into())
                            .await
                        {
                            running.abort_all();
                            return Err(error);
                        }
                        upserts += 1;
                    }
                },
            }
        }

        self.queue
            .enqueue(self.ctx, EndMarker::DownloadsDone.into())
            .await?;
        Ok(upserts)
    }

    /// Turn a finished unit into the document to upsert, if any.
    fn settle(&self, joined: std::result::Result<UnitResult, JoinError>) -> Option<Document> {
        let (id, result) = match joined {
            Ok(finished) => finished,
            Err(join_error) => {
                self.record_failure(None, &task_failure(&join_error));
                return None;
            },
        };
        match result {
            Ok(document) => document,
            Err(error) => {
                self.record_failure(Some(&id), &enrichment_error(&id, error));
                None
            },
        }
    }

    fn record_failure(&self, id: Option<&DocumentId>, error: &ErrorEnvelope) {
        self.stats.record_enrichment_failure();
        if let Some(telemetry) = self.telemetry.as_ref() {
            telemetry.increment_counter("sync.enrichment.failed", 1, None);
        }
        if let Some(logger) = self.logger.as_ref() {
            let fields = id.map(|id| log_fields([("id", Value::from(truncate_id(id.as_str())))]));
            logger.failure(LogLevel::Warn, "sync.enrichment.failed", error, fields);
        }
    }
}

fn task_failure(join_error: &JoinError) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::new("sync", "enrichment_failed"),
        format!("enrichment task failed: {join_error}"),
        ErrorClass::NonRetriable,
    )
}
