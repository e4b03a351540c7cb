//! # docsync-app
//!
//! Application use cases: the incremental sync pass and content index
//! preparation. This crate depends on `ports`, `domain`, and `shared`.

pub mod content_index;
pub mod fsm;
pub mod prepare_index;
pub mod sync;

/// Returns the app crate version.
#[must_use]
pub const fn app_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub use content_index::{content_index_spec, default_mappings, merge_missing};
pub use fsm::{
    BULK_WRITER_STATES, BULK_WRITER_TRANSITIONS, BulkWriterState, SYNC_PASS_STATES,
    SYNC_PASS_TRANSITIONS, SyncPassState,
};
pub use prepare_index::{
    PrepareIndexDeps, PrepareIndexInput, PrepareIndexOutput, prepare_content_index,
};
pub use sync::{
    ExistingSnapshot, SyncIndexDeps, SyncIndexInput, SyncOptions, SyncOutcome, load_snapshot,
    sync_index,
};
