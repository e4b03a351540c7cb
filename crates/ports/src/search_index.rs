//! Search index boundary contracts: the sync read/write path and index admin.

use crate::{BoxFuture, BoxStream};
use docsync_domain::{DocumentId, ExistingRecord, IndexName, WriteIntent};
use docsync_shared::{RequestContext, Result, SecretString};
use serde_json::Value;
use std::collections::BTreeMap;

/// Kind of a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOpKind {
    /// `update` with `doc_as_upsert`.
    Update,
    /// `delete`.
    Delete,
}

impl BulkOpKind {
    /// Action name as used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl From<&WriteIntent> for BulkOpKind {
    fn from(intent: &WriteIntent) -> Self {
        match intent {
            WriteIntent::Upsert { .. } => Self::Update,
            WriteIntent::Delete { .. } => Self::Delete,
        }
    }
}

/// Per-operation outcome reported by a bulk call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemOutcome {
    /// Operation kind.
    pub op: BulkOpKind,
    /// Target id.
    pub id: DocumentId,
    /// HTTP-like status of the operation.
    pub status: u16,
    /// Failure reason when the operation was rejected.
    pub error: Option<Box<str>>,
}

impl BulkItemOutcome {
    /// Accepted operation.
    #[must_use]
    pub const fn ok(op: BulkOpKind, id: DocumentId) -> Self {
        Self {
            op,
            id,
            status: 200,
            error: None,
        }
    }

    /// Returns true when the operation was rejected.
    ///
    /// Deleting an id that is already gone (404) is not a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        if self.error.is_some() {
            return true;
        }
        match self.op {
            BulkOpKind::Delete => self.status >= 300 && self.status != 404,
            BulkOpKind::Update => self.status >= 300,
        }
    }
}

/// Response of one bulk call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResponse {
    /// Server-side time spent, when reported.
    pub took_ms: u64,
    /// Per-operation outcomes, in request order.
    pub items: Vec<BulkItemOutcome>,
}

impl BulkResponse {
    /// Rejected operations.
    pub fn failures(&self) -> impl Iterator<Item = &BulkItemOutcome> {
        self.items.iter().filter(|item| item.is_failure())
    }
}

/// A bulk request: ordered intents against one index.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkRequest {
    /// Target index.
    pub index: IndexName,
    /// Ordered intents.
    pub intents: Vec<WriteIntent>,
    /// Optional ingest pipeline applied to the call.
    pub pipeline: Option<Box<str>>,
}

/// Boundary contract used by the sync engine.
pub trait SearchIndexPort: Send + Sync {
    /// Stream the `(id, timestamp)` projection of every document in `index`.
    ///
    /// A missing index yields an empty stream. Other failures are yielded as
    /// stream errors.
    fn scan_existing(
        &self,
        ctx: &RequestContext,
        index: &IndexName,
    ) -> BoxStream<'_, Result<ExistingRecord>>;

    /// Issue one bulk call. An `Err` means the whole call failed; per-operation
    /// failures are reported in the response.
    fn bulk(&self, ctx: &RequestContext, request: BulkRequest) -> BoxFuture<'_, Result<BulkResponse>>;
}

/// Analysis settings and mappings for a content index in one language.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentIndexSpec {
    /// Index settings body (`analysis` etc.).
    pub settings: Value,
    /// Mappings body (`dynamic`, `dynamic_templates`, `properties`).
    pub mappings: Value,
}

/// Ingest pipeline definition.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestPipelineSpec {
    /// Pipeline id.
    pub id: Box<str>,
    /// Pipeline version.
    pub version: u32,
    /// Description.
    pub description: Box<str>,
    /// Processor list.
    pub processors: Value,
}

/// Per-index statistics returned by `list_indices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    /// Document count, when the backend reports it.
    pub docs_count: Option<u64>,
}

/// Boundary contract for index administration and secret storage.
pub trait IndexAdminPort: Send + Sync {
    /// Check connectivity.
    fn ping(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>>;

    /// Return true when the index exists.
    fn index_exists(&self, ctx: &RequestContext, index: &IndexName)
    -> BoxFuture<'_, Result<bool>>;

    /// Create each missing index with default settings.
    fn ensure_exists(
        &self,
        ctx: &RequestContext,
        indices: Vec<IndexName>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Create a content index with language-specific settings and mappings.
    fn create_content_index(
        &self,
        ctx: &RequestContext,
        index: &IndexName,
        spec: ContentIndexSpec,
    ) -> BoxFuture<'_, Result<()>>;

    /// Fetch the current mappings of an index (the `mappings` object).
    fn get_mappings(&self, ctx: &RequestContext, index: &IndexName)
    -> BoxFuture<'_, Result<Value>>;

    /// Replace the mapping body (additive on the server side).
    fn put_mappings(
        &self,
        ctx: &RequestContext,
        index: &IndexName,
        mappings: Value,
    ) -> BoxFuture<'_, Result<()>>;

    /// Fetch the current index settings (the `settings` object).
    fn get_settings(&self, ctx: &RequestContext, index: &IndexName)
    -> BoxFuture<'_, Result<Value>>;

    /// Apply settings, closing and reopening the index when the backend requires it.
    fn put_settings(
        &self,
        ctx: &RequestContext,
        index: &IndexName,
        settings: Value,
    ) -> BoxFuture<'_, Result<()>>;

    /// Return true when the ingest pipeline exists.
    fn pipeline_exists(&self, ctx: &RequestContext, id: &str) -> BoxFuture<'_, Result<bool>>;

    /// Create or replace an ingest pipeline.
    fn put_pipeline(
        &self,
        ctx: &RequestContext,
        pipeline: IngestPipelineSpec,
    ) -> BoxFuture<'_, Result<()>>;

    /// Delete indices, ignoring missing ones.
    fn delete_indices(
        &self,
        ctx: &RequestContext,
        indices: Vec<IndexName>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Delete every document of an index (match-all delete-by-query).
    fn clean_index(&self, ctx: &RequestContext, index: &IndexName) -> BoxFuture<'_, Result<u64>>;

    /// List indices with their document counts.
    fn list_indices(
        &self,
        ctx: &RequestContext,
    ) -> BoxFuture<'_, Result<BTreeMap<Box<str>, IndexSummary>>>;

    /// Store a secret; returns its id.
    fn create_secret(
        &self,
        ctx: &RequestContext,
        value: SecretString,
    ) -> BoxFuture<'_, Result<Box<str>>>;

    /// Read a secret by id.
    fn get_secret(&self, ctx: &RequestContext, id: &str) -> BoxFuture<'_, Result<SecretString>>;
}
