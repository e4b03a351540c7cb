//! Classify feed documents against the snapshot and sweep deletions.

use super::snapshot::ExistingSnapshot;
use super::types::{SyncStatsCollector, feed_error, log_fields};
use docsync_domain::{
    Document, DocumentId, EndMarker, Filter, WriteIntent, WriteQueueItem, now_token, truncate_id,
};
use docsync_ports::{BoxFuture, DataSourcePort, DeferredEnrichment, LoggerPort, SourceItem};
use docsync_shared::{
    BoundedQueue, ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result,
};
use futures_util::StreamExt;
use serde_json::Value;
use std::collections::HashSet;
use tokio::sync::mpsc;

/// A triggered enrichment waiting to be awaited by the drain.
pub struct EnrichmentUnit {
    pub(crate) id: DocumentId,
    pub(crate) work: BoxFuture<'static, Result<Option<Document>>>,
}

/// What classification observed.
#[derive(Debug, Default)]
pub struct Classification {
    pub(crate) upserts: u64,
    pub(crate) deletes: u64,
    pub(crate) feed_error: Option<ErrorEnvelope>,
}

pub struct ChangeDetector<'a> {
    pub(crate) ctx: &'a RequestContext,
    pub(crate) source: &'a dyn DataSourcePort,
    pub(crate) queue: &'a BoundedQueue<WriteQueueItem>,
    pub(crate) units: mpsc::Sender<EnrichmentUnit>,
    pub(crate) stats: &'a SyncStatsCollector,
    pub(crate) logger: Option<&'a dyn LoggerPort>,
}

impl ChangeDetector<'_> {
    /// Run the feed to exhaustion, then emit deletions and `DocsDone`.
    ///
    /// A feed failure still emits `DocsDone { failed: true }` but no deletions,
    /// and is reported through [`Classification::feed_error`].
    pub(crate) async fn run(
        self,
        filter: Filter,
        snapshot: &ExistingSnapshot,
    ) -> Result<Classification> {
        let mut seen = HashSet::new();
        let mut outcome = Classification::default();

        let mut feed = self.source.get_docs(self.ctx, filter);
        while let Some(item) = feed.next().await {
            match item {
                Ok(item) => {
                    if self.classify(item, snapshot, &mut seen).await? {
                        outcome.upserts += 1;
                    }
                },
                Err(error) => {
                    let error = feed_error(error);
                    if error.is_cancelled() {
                        return Err(error);
                    }
                    outcome.feed_error = Some(error);
                    break;
                },
            }
        }
        drop(feed);
        // Closing the unit channel lets the drain finish once its work is done.
        let Self {
            ctx,
            queue,
            units,
            logger,
            ..
        } = self;
        drop(units);

        if outcome.feed_error.is_none() {
            for id in unseen_ids(snapshot, &seen) {
                queue.enqueue(ctx, WriteIntent::delete(id).into()).await?;
                outcome.deletes += 1;
            }
        } else if let Some(logger) = logger {
            logger.warn(
                "sync.deletes.skipped",
                "Feed failed; skipping deletion of unseen documents",
                Some(log_fields([("unseen", Value::from(snapshot.len().saturating_sub(seen.len())))])),
            );
        }

        let failed = outcome.feed_error.is_some();
        queue
            .enqueue(ctx, EndMarker::DocsDone { failed }.into())
            .await?;
        Ok(outcome)
    }

    /// Returns true when the document was queued for upsert.
    async fn classify(
        &self,
        item: SourceItem,
        snapshot: &ExistingSnapshot,
        seen: &mut HashSet<DocumentId>,
    ) -> Result<bool> {
        let SourceItem {
            mut document,
            enrichment,
        } = item;
        let id = document.id().clone();

        if !seen.insert(id.clone()) {
            if let Some(logger) = self.logger {
                logger.warn(
                    "sync.feed.duplicate_id",
                    "Document id seen twice in one feed; keeping the first",
                    Some(log_fields([("id", Value::from(truncate_id(id.as_str())))])),
                );
            }
            self.release(&id, enrichment).await;
            return Ok(false);
        }

        let unchanged = document.timestamp().is_some_and(|token| {
            snapshot
                .get(&id)
                .is_some_and(|existing| existing.as_ref() == Some(token))
        });
        if unchanged {
            self.stats.record_unchanged();
            self.release(&id, enrichment).await;
            return Ok(false);
        }

        let token = document.ensure_timestamp(now_token).clone();
        self.queue
            .enqueue(self.ctx, WriteIntent::upsert(document).into())
            .await?;

        if let Some(enrichment) = enrichment {
            let unit = EnrichmentUnit {
                id,
                work: enrichment.fetch(Some(token)),
            };
            if self.units.send(unit).await.is_err() {
                self.ctx.ensure_not_cancelled("sync.classify")?;
                return Err(ErrorEnvelope::unexpected(
                    ErrorCode::internal(),
                    "enrichment drain stopped before the feed finished",
                    ErrorClass::NonRetriable,
                ));
            }
        }
        Ok(true)
    }

    async fn release(&self, id: &DocumentId, enrichment: Option<DeferredEnrichment>) {
        let Some(enrichment) = enrichment else {
            return;
        };
        if let Err(error) = enrichment.release().await
            && let Some(logger) = self.logger
        {
            logger.debug(
                "sync.enrichment.release_failed",
                &error.message,
                Some(log_fields([("id", Value::from(truncate_id(id.as_str())))])),
            );
        }
    }
}

/// Snapshot ids never observed in the feed, in a stable order.
fn unseen_ids(snapshot: &ExistingSnapshot, seen: &HashSet<DocumentId>) -> Vec<DocumentId> {
    let mut unseen: Vec<DocumentId> = snapshot
        .keys()
        .filter(|id| !seen.contains(*id))
        .cloned()
        .collect();
    unseen.sort_unstable();
    unseen
}
