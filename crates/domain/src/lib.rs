//! # docsync-domain
//!
//! Domain model for incremental document synchronization.
//!
//! - **Primitives** - `DocumentId`, `VersionToken`, `IndexName`
//! - **Documents** - `Document`, `ExistingRecord`
//! - **Intents** - `WriteIntent`, `EndMarker`, `WriteQueueItem`
//! - **Results** - `SyncResult`
//! - **Filtering** - `Filter`, `FilterRule`, `FilteringValidationResult`
//!
//! ## Dependency Rules
//!
//! - Depends only on the `shared` crate
//! - No I/O

pub use docsync_shared::shared_crate_version;

pub mod document;
pub mod filtering;
pub mod ids;
pub mod intent;
pub mod primitives;
pub mod sync_result;

pub use document::{Document, ExistingRecord, ID_FIELD, SOURCE_ID_FIELD, TIMESTAMP_FIELD};
pub use filtering::{
    Filter, FilterOperator, FilterPolicy, FilterRule, FilteringValidationError,
    FilteringValidationResult, FilteringValidationState,
};
pub use ids::{hash_id, iso_utc, now_token, truncate_id};
pub use intent::{EndMarker, WriteIntent, WriteQueueItem};
pub use primitives::{DocumentId, IndexName, IndexNameViolation, PrimitiveError, VersionToken};
pub use sync_result::SyncResult;

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace_deps() -> Vec<String> {
        let cargo_toml = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let mut deps = Vec::new();
        let mut in_deps = false;

        for raw_line in cargo_toml.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                in_deps = line == "[dependencies]" || line == "[dev-dependencies]";
                continue;
            }
            if in_deps && line.starts_with("docsync-") {
                let key = line.split('=').next().unwrap_or("").trim();
                deps.push(key.split('.').next().unwrap_or("").trim().to_owned());
            }
        }

        deps
    }

    #[test]
    fn domain_depends_only_on_shared() {
        let deps = workspace_deps();
        let forbidden = ["docsync-ports", "docsync-config", "docsync-app", "docsync-adapters", "docsync-infra"];

        for dep in &deps {
            assert!(
                !forbidden.contains(&dep.as_str()),
                "forbidden dependency found: {dep}"
            );
        }
    }

    #[test]
    fn domain_crate_compiles() {
        assert!(!domain_crate_version().is_empty());
    }

    #[test]
    fn domain_depends_on_shared() {
        assert!(!shared_crate_version().is_empty());
    }
}
