//! Data source selection by configured service type.

use crate::InfraResult;
use docsync_adapters::{DIRECTORY_SERVICE_TYPE, DirectorySource, FAKE_SERVICE_TYPE, FakeSource};
use docsync_config::SourcesConfig;
use docsync_ports::DataSourcePort;
use docsync_shared::{ErrorCode, ErrorEnvelope};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Builds a source from the `sources` config section.
pub type SourceFactory = fn(&SourcesConfig) -> InfraResult<Arc<dyn DataSourcePort>>;

/// Maps `sources.serviceType` values to source factories.
#[derive(Clone)]
pub struct SourceRegistry {
    factories: BTreeMap<Box<str>, SourceFactory>,
}

impl SourceRegistry {
    /// Registry with no sources.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the built-in `directory` and `fake` sources.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(DIRECTORY_SERVICE_TYPE, build_directory);
        registry.register(FAKE_SERVICE_TYPE, build_fake);
        registry
    }

    /// Register (or replace) the factory for `service_type`.
    pub fn register(&mut self, service_type: &str, factory: SourceFactory) {
        self.factories
            .insert(normalize(service_type).into_boxed_str(), factory);
    }

    /// Registered service types, sorted.
    pub fn service_types(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(AsRef::as_ref)
    }

    /// Returns true when `service_type` has a factory.
    #[must_use]
    pub fn contains(&self, service_type: &str) -> bool {
        self.factories.contains_key(normalize(service_type).as_str())
    }

    /// Build the source named by `config.service_type`.
    pub fn build(&self, config: &SourcesConfig) -> InfraResult<Arc<dyn DataSourcePort>> {
        let requested = normalize(&config.service_type);
        let Some(factory) = self.factories.get(requested.as_str()) else {
            let available: Vec<&str> = self.service_types().collect();
            return Err(ErrorEnvelope::expected(
                ErrorCode::new("config", "unknown_service_type"),
                format!("Unknown service type: {}", config.service_type.trim()),
            )
            .with_metadata("serviceType", config.service_type.trim().to_owned())
            .with_metadata("available", available.join(",")));
        };
        factory(config)
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("service_types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn normalize(service_type: &str) -> String {
    service_type.trim().to_ascii_lowercase()
}

fn build_directory(config: &SourcesConfig) -> InfraResult<Arc<dyn DataSourcePort>> {
    let root = match config.directory.path.as_deref() {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().map_err(|error| {
            ErrorEnvelope::from(error).with_operation("registry.directory.current_dir")
        })?,
    };
    Ok(Arc::new(DirectorySource::new(root)))
}

fn build_fake(config: &SourcesConfig) -> InfraResult<Arc<dyn DataSourcePort>> {
    let count = usize::try_from(config.fake.count).unwrap_or(usize::MAX);
    Ok(Arc::new(FakeSource::new(count)))
}
