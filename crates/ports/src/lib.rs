//! # docsync-ports
//!
//! Port traits for the docsync hexagonal architecture.
//!
//! This crate defines the interfaces between the sync engine and the outside
//! world: the search index, data sources, logging and telemetry. It depends
//! only on `domain` and `shared`.

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by port traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Boxed stream used by port traits that produce lazy sequences.
pub type BoxStream<'a, T> = futures_util::stream::BoxStream<'a, T>;

/// Returns the ports crate version.
#[must_use]
pub const fn ports_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod logger;
pub mod search_index;
pub mod source;
pub mod telemetry;

pub use logger::*;
pub use search_index::*;
pub use source::*;
pub use telemetry::*;

// Re-export domain types used in port signatures, so adapter crates can
// implement ports without directly depending on `docsync-domain`.
pub use docsync_domain::{
    Document, DocumentId, ExistingRecord, Filter, FilteringValidationResult, IndexName,
    VersionToken, WriteIntent,
};
