//! Aggregated outcome of one sync pass.

use serde::{Deserialize, Serialize};

/// Counters reported at the end of a pass.
///
/// `indexed` counts distinct documents upserted; a document that received
/// both a classification upsert and an enrichment upsert counts once.
/// `upsert_operations` counts every upsert sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// Distinct documents upserted.
    pub indexed: u64,
    /// Upsert operations sent (classification + enrichment).
    pub upsert_operations: u64,
    /// Documents deleted.
    pub deleted: u64,
    /// Documents skipped because their version token was unchanged.
    pub unchanged: u64,
    /// Bulk calls issued.
    pub bulk_calls: u64,
    /// Cumulative time spent inside bulk calls, in milliseconds.
    pub bulk_duration_ms: u64,
    /// Operations rejected inside otherwise successful bulk calls.
    pub partial_failures: u64,
    /// Enrichment units that failed and were treated as empty.
    pub enrichment_failures: u64,
}

impl SyncResult {
    /// Total write operations sent.
    #[must_use]
    pub const fn operations(&self) -> u64 {
        self.upsert_operations.saturating_add(self.deleted)
    }

    /// Returns true when every operation was accepted.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.partial_failures == 0 && self.enrichment_failures == 0
    }
}
