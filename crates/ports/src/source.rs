//! Data source boundary contract.
//!
//! A source produces a lazy, finite feed of documents. Each document may come
//! with a [`DeferredEnrichment`]: expensive extra work (e.g. downloading an
//! attachment) that the engine triggers only for changed documents.

use crate::{BoxFuture, BoxStream};
use docsync_domain::{Document, Filter, FilteringValidationResult, VersionToken};
use docsync_shared::{RequestContext, Result};
use std::fmt;
use std::future::Future;

type EnrichFn =
    Box<dyn FnOnce(bool, Option<VersionToken>) -> BoxFuture<'static, Result<Option<Document>>> + Send>;

/// Deferred per-document enrichment. Consumed on use, so it runs at most once.
pub struct DeferredEnrichment {
    run: EnrichFn,
}

impl DeferredEnrichment {
    /// Wrap an enrichment closure.
    ///
    /// The closure receives `trigger` (false when the document is unchanged and
    /// only resources should be released) and the document's version token.
    pub fn new<F, Fut>(run: F) -> Self
    where
        F: FnOnce(bool, Option<VersionToken>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<Document>>> + Send + 'static,
    {
        Self {
            run: Box::new(move |trigger, timestamp| Box::pin(run(trigger, timestamp))),
        }
    }

    /// Run the enrichment for a changed document.
    pub fn fetch(self, timestamp: Option<VersionToken>) -> BoxFuture<'static, Result<Option<Document>>> {
        (self.run)(true, timestamp)
    }

    /// Signal that the enrichment is not needed.
    pub fn release(self) -> BoxFuture<'static, Result<Option<Document>>> {
        (self.run)(false, None)
    }
}

impl fmt::Debug for DeferredEnrichment {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("DeferredEnrichment")
    }
}

/// One feed item.
#[derive(Debug)]
pub struct SourceItem {
    /// The document.
    pub document: Document,
    /// Optional deferred enrichment bound to the document.
    pub enrichment: Option<DeferredEnrichment>,
}

impl SourceItem {
    /// A document without enrichment.
    #[must_use]
    pub const fn plain(document: Document) -> Self {
        Self {
            document,
            enrichment: None,
        }
    }

    /// A document with enrichment.
    #[must_use]
    pub const fn with_enrichment(document: Document, enrichment: DeferredEnrichment) -> Self {
        Self {
            document,
            enrichment: Some(enrichment),
        }
    }
}

/// Lazy, finite, non-restartable document feed.
pub type DocumentFeed<'a> = BoxStream<'a, Result<SourceItem>>;

/// Boundary contract for a data source.
pub trait DataSourcePort: Send + Sync {
    /// Human-readable name.
    fn name(&self) -> &str;

    /// Stable service type used for configuration lookup.
    fn service_type(&self) -> &str;

    /// Produce the document feed, applying `filter`.
    fn get_docs(&self, ctx: &RequestContext, filter: Filter) -> DocumentFeed<'_>;

    /// Check that `filter` can be applied by this source.
    fn validate_filtering(
        &self,
        ctx: &RequestContext,
        filter: &Filter,
    ) -> BoxFuture<'_, Result<FilteringValidationResult>>;

    /// Check that the source is reachable.
    fn ping(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>>;

    /// Release resources.
    fn close(&self) -> BoxFuture<'_, Result<()>>;
}
