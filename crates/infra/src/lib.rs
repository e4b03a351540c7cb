//! # docsync-infra
//!
//! Infrastructure wiring and runtime composition.
//! This crate depends on `app`, `adapters`, `config`, and `shared`.

/// Config loading and checking helpers used by CLI surfaces.
pub mod config_check;
/// Environment validation helpers used by CLI surfaces.
pub mod env_check;
/// Elasticsearch client construction.
mod es_factory;
/// Retry-wrapped index and secret administration.
pub mod index_admin;
/// Data source selection by service type.
pub mod registry;
/// One-shot sync runs.
pub mod sync_runner;

pub use config_check::{
    ConfigCheck, ConfigCheckReport, check_config, load_effective_config,
    load_effective_config_json, render_config,
};
pub use env_check::{InfraError, InfraResult, validate_env_parsing};
pub use es_factory::build_es_client;
pub use index_admin::{
    IndexListing, clean_index, create_secret, delete_indices, get_secret, list_indices,
};
pub use registry::{SourceFactory, SourceRegistry};
pub use sync_runner::{
    SyncReport, SyncRuntime, pipeline_spec, run_sync, run_sync_with, sync_options,
};

/// Returns the infra crate version.
#[must_use]
pub const fn infra_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_adapters::adapters_crate_version;
    use docsync_app::app_crate_version;
    use docsync_config::config_crate_version;
    use docsync_shared::shared_crate_version;

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
    fn infra_depends_on_app_adapters_config() {
        let deps = workspace_deps();
        for expected in ["docsync-app", "docsync-adapters", "docsync-config"] {
            assert!(
                deps.iter().any(|dep| dep == expected),
                "missing dependency: {expected}"
            );
        }
    }

    #[test]
    fn infra_can_use_app_adapters_config_shared() {
        assert!(!infra_crate_version().is_empty());
        assert!(!app_crate_version().is_empty());
        assert!(!adapters_crate_version().is_empty());
        assert!(!config_crate_version().is_empty());
        assert!(!shared_crate_version().is_empty());
    }
}
