//! # docsync-adapters
//!
//! Adapter implementations for ports (Elasticsearch REST, in-memory index,
//! data sources, logging, telemetry).
//! This crate depends on `ports`, `domain`, and `shared`.

/// Elasticsearch REST adapter.
pub mod elasticsearch;

pub mod log_sink;
pub mod logger;
pub mod memory_index;
pub mod sources;
pub mod telemetry;

pub use elasticsearch::{ElasticsearchClient, EsAuth, EsAuthInput, EsClientConfig};
pub use log_sink::{LogSink, MemoryLogSink, StderrLogSink};
pub use logger::{JsonLogger, TracingLogger};
pub use memory_index::InMemorySearchIndex;
pub use sources::{DIRECTORY_SERVICE_TYPE, DirectorySource, FAKE_SERVICE_TYPE, FakeSource};
pub use telemetry::{InMemoryTelemetry, NoopTelemetry, TaggedTelemetry, TelemetrySnapshot};

/// Returns the adapters crate version.
#[must_use]
pub const fn adapters_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
