//! # docsync-config
//!
//! Configuration schema, validation, and layered loading for docsync.
//! This crate depends on `shared` only.

/// Environment variable parsing and merging.
pub mod env;
/// Config loading helpers (env + file + overrides).
pub mod load;
/// JSON merge helpers for layered config sources.
pub mod merge;
/// Configuration schema types and helpers.
pub mod schema;

pub use env::{DocsyncEnv, EnvParseError, apply_env_overrides};
pub use load::{
    ConfigFormat, load_config_from_path, load_config_from_sources, load_config_std_env,
    to_pretty_json, to_pretty_toml,
};
pub use merge::{deep_merge, expand_dotted_keys};
pub use schema::{
    CURRENT_CONFIG_VERSION, ConfigLimits, ConfigSchemaError, DirectorySourceConfig, DocsyncConfig,
    ElasticsearchConfig, FakeSourceConfig, LOG_LEVELS, PipelineConfig, RetryConfig,
    ServiceConfig, SourcesConfig, SyncConfig, ValidatedDocsyncConfig, config_changed,
    parse_config_json, parse_config_toml,
};

/// Returns the config crate version.
#[must_use]
pub const fn config_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_shared::shared_crate_version;

    #[test]
    fn config_can_use_shared() {
        assert!(!config_crate_version().is_empty());
        assert!(!shared_crate_version().is_empty());
    }

    #[test]
    fn config_depends_only_on_shared() {
        let manifest = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let mut in_deps = false;
        let deps: Vec<&str> = manifest
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim())
            .filter(|line| {
                if line.starts_with('[') {
                    in_deps = line.ends_with("dependencies]");
                    return false;
                }
                in_deps && line.starts_with("docsync-")
            })
            .filter_map(|line| line.split(['.', '=']).next())
            .map(str::trim)
            .collect();

        assert_eq!(deps, vec!["docsync-shared"]);
    }
}
