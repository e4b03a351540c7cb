//! # docsync-shared
//!
//! Foundational types used by every other docsync crate:
//!
//! - `Result` and the structured `ErrorEnvelope`
//! - request context, cancellation and the bounded hand-off queue
//! - retry policies for remote calls
//! - secret redaction and range-checked numeric wrappers
//!
//! This crate has no workspace dependencies.

pub mod bounded;
pub mod concurrency;
pub mod errors;
pub mod redaction;
pub mod result;
pub mod retry;

pub use bounded::{BoundedU32, BoundedU64, BoundedUsize, BoundsError};
pub use concurrency::{
    BoundedQueue, BoundedQueueClosedError, CancellationToken, CorrelationId, RequestContext,
};
pub use errors::{ErrorClass, ErrorCode, ErrorEnvelope, ErrorKind, ErrorMetadata};
pub use redaction::{REDACTED, SecretString, is_secret_key, redact_if_secret};
pub use result::{Result, ResultExt};
pub use retry::{BackoffStrategy, RetryPolicy, retry_async, retry_async_with_observer};

/// Returns the shared crate version.
#[must_use]
pub const fn shared_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    fn workspace_deps() -> Vec<String> {
        let manifest = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let mut in_deps = false;
        manifest
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim())
            .filter_map(|line| {
                if line.starts_with('[') {
                    in_deps = line.ends_with("dependencies]");
                    return None;
                }
                (in_deps && line.starts_with("docsync-"))
                    .then(|| line.split(['.', '=']).next().unwrap_or("").trim().to_string())
            })
            .collect()
    }

    #[test]
    fn shared_has_no_workspace_dependencies() {
        let deps = workspace_deps();
        assert!(deps.is_empty(), "unexpected workspace dependencies: {deps:?}");
    }

    #[test]
    fn version_is_exposed() {
        assert!(!super::shared_crate_version().is_empty());
    }
}
