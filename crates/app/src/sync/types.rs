//! Inputs, dependencies and shared state for the sync pass.

use crate::fsm::{SyncPassState, invalid_transition, is_allowed_pass_transition};
use docsync_domain::{DocumentId, Filter, IndexName, SyncResult, truncate_id};
use docsync_ports::{DataSourcePort, LogFields, LoggerPort, SearchIndexPort, TelemetryPort};
use docsync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, Result, RetryPolicy};
use serde_json::Value;
use std::marker::PhantomData;
use std::num::{NonZeroU64, NonZeroUsize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Tuning knobs for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Intents per bulk call.
    pub chunk_size: NonZeroUsize,
    /// Write queue capacity.
    pub queue_capacity: NonZeroUsize,
    /// Enrichment units running at once.
    pub concurrent_downloads: NonZeroUsize,
    /// Bulk calls in flight at once.
    pub max_concurrency: NonZeroUsize,
    /// Log progress every N written documents.
    pub display_every: NonZeroU64,
    /// Retry policy for whole bulk calls.
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            chunk_size: NonZeroUsize::new(500).unwrap_or(NonZeroUsize::MIN),
            queue_capacity: NonZeroUsize::new(1024).unwrap_or(NonZeroUsize::MIN),
            concurrent_downloads: NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN),
            max_concurrency: NonZeroUsize::new(5).unwrap_or(NonZeroUsize::MIN),
            display_every: NonZeroU64::new(100).unwrap_or(NonZeroU64::MIN),
            retry: RetryPolicy::default(),
        }
    }
}

/// Input for [`crate::sync_index`].
#[derive(Debug, Clone)]
pub struct SyncIndexInput {
    /// Target index.
    pub index: IndexName,
    /// Filtering handed to the source.
    pub filter: Filter,
    /// Optional ingest pipeline for bulk calls.
    pub pipeline: Option<Box<str>>,
    /// Tuning knobs.
    pub options: SyncOptions,
}

impl SyncIndexInput {
    /// Input with no filter, no pipeline and default options.
    #[must_use]
    pub fn new(index: IndexName) -> Self {
        Self {
            index,
            filter: Filter::default(),
            pipeline: None,
            options: SyncOptions::default(),
        }
    }
}

/// Dependencies required by the sync pass.
#[derive(Clone)]
pub struct SyncIndexDeps {
    /// Data source producing the feed.
    pub source: Arc<dyn DataSourcePort>,
    /// Search index read/write path.
    pub index: Arc<dyn SearchIndexPort>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
    /// Optional telemetry.
    pub telemetry: Option<Arc<dyn TelemetryPort>>,
}

/// Result of a pass together with its fatal error, if any.
///
/// Writes made before a fatal error are kept, so `result` is meaningful
/// even when `error` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Aggregated counters.
    pub result: SyncResult,
    /// Fatal error that ended the pass.
    pub error: Option<ErrorEnvelope>,
}

impl SyncOutcome {
    /// Returns true when the pass finished without a fatal error.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into a plain `Result`, dropping the partial counters on error.
    pub fn into_result(self) -> Result<SyncResult> {
        match self.error {
            None => Ok(self.result),
            Some(error) => Err(error),
        }
    }
}

/// Counters shared by the pass tasks.
#[derive(Debug, Default)]
pub struct SyncStatsCollector {
    indexed: AtomicU64,
    upsert_operations: AtomicU64,
    deleted: AtomicU64,
    unchanged: AtomicU64,
    bulk_calls: AtomicU64,
    bulk_duration_ms: AtomicU64,
    partial_failures: AtomicU64,
    enrichment_failures: AtomicU64,
}

impl SyncStatsCollector {
    pub(crate) const fn new() -> Self {
        Self {
            indexed: AtomicU64::new(0),
            upsert_operations: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
            unchanged: AtomicU64::new(0),
            bulk_calls: AtomicU64::new(0),
            bulk_duration_ms: AtomicU64::new(0),
            partial_failures: AtomicU64::new(0),
            enrichment_failures: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_unchanged(&self) {
        self.unchanged.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_enrichment_failure(&self) {
        self.enrichment_failures.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_bulk_call(&self, report: &BulkCallReport) {
        self.bulk_calls.fetch_add(1, Ordering::AcqRel);
        self.bulk_duration_ms
            .fetch_add(duration_ms(report.duration), Ordering::AcqRel);
        self.upsert_operations
            .fetch_add(count(report.upserted.len()), Ordering::AcqRel);
        self.deleted.fetch_add(report.deleted, Ordering::AcqRel);
        self.partial_failures
            .fetch_add(report.partial_failures, Ordering::AcqRel);
    }

    pub(crate) fn set_indexed(&self, distinct: u64) {
        self.indexed.store(distinct, Ordering::Release);
    }

    pub(crate) fn written(&self) -> u64 {
        self.upsert_operations
            .load(Ordering::Acquire)
            .saturating_add(self.deleted.load(Ordering::Acquire))
    }

    pub(crate) fn snapshot(&self) -> SyncResult {
        SyncResult {
            indexed: self.indexed.load(Ordering::Acquire),
            upsert_operations: self.upsert_operations.load(Ordering::Acquire),
            deleted: self.deleted.load(Ordering::Acquire),
            unchanged: self.unchanged.load(Ordering::Acquire),
            bulk_calls: self.bulk_calls.load(Ordering::Acquire),
            bulk_duration_ms: self.bulk_duration_ms.load(Ordering::Acquire),
            partial_failures: self.partial_failures.load(Ordering::Acquire),
            enrichment_failures: self.enrichment_failures.load(Ordering::Acquire),
        }
    }
}

/// What one successful bulk call wrote.
#[derive(Debug, Clone, Default)]
pub struct BulkCallReport {
    pub(crate) upserted: Vec<DocumentId>,
    pub(crate) deleted: u64,
    pub(crate) partial_failures: u64,
    pub(crate) duration: Duration,
}

pub struct SyncPass<S> {
    pub(crate) state: SyncPassState,
    pub(crate) _state: PhantomData<S>,
}

impl<S> SyncPass<S> {
    pub(crate) fn transition<T>(self, next: SyncPassState) -> Result<SyncPass<T>> {
        if !is_allowed_pass_transition(self.state, next) {
            return Err(invalid_transition(
                "sync pass",
                self.state.as_str(),
                next.as_str(),
            ));
        }
        Ok(SyncPass {
            state: next,
            _state: PhantomData,
        })
    }
}

pub(crate) fn index_access_error(index: &IndexName, cause: ErrorEnvelope) -> ErrorEnvelope {
    if cause.is_cancelled() {
        return cause;
    }
    wrap(
        cause,
        ErrorCode::new("sync", "index_access"),
        "failed to read existing documents",
    )
    .with_metadata("index", index.as_str())
}

pub(crate) fn feed_error(cause: ErrorEnvelope) -> ErrorEnvelope {
    if cause.is_cancelled() {
        return cause;
    }
    wrap(
        cause,
        ErrorCode::new("sync", "feed_failed"),
        "document feed failed",
    )
}

pub(crate) fn enrichment_error(id: &DocumentId, cause: ErrorEnvelope) -> ErrorEnvelope {
    wrap(
        cause,
        ErrorCode::new("sync", "enrichment_failed"),
        "enrichment failed",
    )
    .with_metadata("id", truncate_id(id.as_str()))
}

pub(crate) fn bulk_call_error(cause: ErrorEnvelope, operations: usize) -> ErrorEnvelope {
    if cause.is_cancelled() {
        return cause;
    }
    wrap(
        cause,
        ErrorCode::new("sync", "bulk_call_failed"),
        "bulk call failed",
    )
    .with_metadata("operations", operations.to_string())
}

fn wrap(cause: ErrorEnvelope, code: ErrorCode, context: &str) -> ErrorEnvelope {
    let mut error = ErrorEnvelope::unexpected(
        code,
        format!("{context}: {}", cause.message),
        ErrorClass::NonRetriable,
    )
    .with_metadata("cause", cause.code.to_string());
    for (key, value) in cause.metadata {
        error.metadata.entry(key).or_insert(value);
    }
    error
}

pub(crate) fn log_fields<const N: usize>(pairs: [(&str, Value); N]) -> LogFields {
    pairs
        .into_iter()
        .map(|(key, value)| (Box::from(key), value))
        .collect()
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub(crate) fn count(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_keep_cause_metadata() {
        let cause = ErrorEnvelope::unexpected(ErrorCode::io(), "reset", ErrorClass::Retriable)
            .with_metadata("attempts", "3");
        let error = bulk_call_error(cause, 7);

        assert_eq!(error.code, ErrorCode::new("sync", "bulk_call_failed"));
        assert!(!error.is_retriable());
        assert_eq!(error.message, "bulk call failed: reset");
        assert_eq!(error.metadata.get("attempts").map(String::as_str), Some("3"));
        assert_eq!(error.metadata.get("cause").map(String::as_str), Some("core:io"));
        assert_eq!(error.metadata.get("operations").map(String::as_str), Some("7"));
    }

    #[test]
    fn cancellation_is_never_rewrapped() {
        let cancelled = ErrorEnvelope::cancelled("operation cancelled");
        assert!(feed_error(cancelled.clone()).is_cancelled());
        assert!(bulk_call_error(cancelled, 1).is_cancelled());
    }

    #[test]
    fn outcome_converts_to_result() {
        let outcome = SyncOutcome {
            result: SyncResult::default(),
            error: Some(ErrorEnvelope::cancelled("stop")),
        };
        assert!(!outcome.is_ok());
        assert!(outcome.into_result().is_err());
    }
}
