//! State machine tables for the sync pass and the bulk writer.

use docsync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, Result};

/// Phases of one sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPassState {
    /// Inputs validated, nothing read yet.
    Prepared,
    /// Existing index contents loaded.
    SnapshotLoaded,
    /// Classification, enrichment and writing finished.
    Drained,
    /// Result aggregated.
    Completed,
}

impl SyncPassState {
    /// Stable name used in errors and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prepared => "prepared",
            Self::SnapshotLoaded => "snapshot_loaded",
            Self::Drained => "drained",
            Self::Completed => "completed",
        }
    }
}

/// Every sync pass state.
pub const SYNC_PASS_STATES: [SyncPassState; 4] = [
    SyncPassState::Prepared,
    SyncPassState::SnapshotLoaded,
    SyncPassState::Drained,
    SyncPassState::Completed,
];

/// Allowed sync pass transitions.
pub const SYNC_PASS_TRANSITIONS: [(SyncPassState, SyncPassState); 3] = [
    (SyncPassState::Prepared, SyncPassState::SnapshotLoaded),
    (SyncPassState::SnapshotLoaded, SyncPassState::Drained),
    (SyncPassState::Drained, SyncPassState::Completed),
];

/// States of the bulk writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkWriterState {
    /// Popping items into the current batch.
    Draining,
    /// Dispatching a full batch.
    Flushing,
    /// Both end markers seen; remainder flushed.
    Done,
}

impl BulkWriterState {
    /// Stable name used in errors and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draining => "draining",
            Self::Flushing => "flushing",
            Self::Done => "done",
        }
    }
}

/// Every bulk writer state.
pub const BULK_WRITER_STATES: [BulkWriterState; 3] = [
    BulkWriterState::Draining,
    BulkWriterState::Flushing,
    BulkWriterState::Done,
];

/// Allowed bulk writer transitions.
pub const BULK_WRITER_TRANSITIONS: [(BulkWriterState, BulkWriterState); 3] = [
    (BulkWriterState::Draining, BulkWriterState::Flushing),
    (BulkWriterState::Flushing, BulkWriterState::Draining),
    (BulkWriterState::Draining, BulkWriterState::Done),
];

/// Runtime guard over the bulk writer transition table.
#[derive(Debug)]
pub struct BulkWriterFsm {
    state: BulkWriterState,
}

impl BulkWriterFsm {
    /// Start in `Draining`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: BulkWriterState::Draining,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> BulkWriterState {
        self.state
    }

    /// Move to `next`, rejecting transitions outside the table.
    pub fn transition(&mut self, next: BulkWriterState) -> Result<()> {
        if BULK_WRITER_TRANSITIONS
            .iter()
            .any(|(source, target)| *source == self.state && *target == next)
        {
            self.state = next;
            return Ok(());
        }
        Err(invalid_transition(
            "bulk writer",
            self.state.as_str(),
            next.as_str(),
        ))
    }
}

impl Default for BulkWriterFsm {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn is_allowed_pass_transition(from: SyncPassState, to: SyncPassState) -> bool {
    SYNC_PASS_TRANSITIONS
        .iter()
        .any(|(source, target)| *source == from && *target == to)
}

pub(crate) fn invalid_transition(machine: &str, from: &str, to: &str) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::internal(),
        format!("invalid {machine} transition: {from} -> {to}"),
        ErrorClass::NonRetriable,
    )
}
