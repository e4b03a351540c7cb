//! Config loading and checking helpers for CLI surfaces.

use crate::{InfraResult, SourceRegistry};
use docsync_adapters::{EsAuth, EsAuthInput};
use docsync_config::{
    ConfigFormat, DocsyncEnv, ValidatedDocsyncConfig, load_config_from_path, to_pretty_json,
    to_pretty_toml,
};
use docsync_shared::ErrorEnvelope;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Load and validate the effective config from an env map, file and overrides.
pub fn load_effective_config(
    env: &BTreeMap<String, String>,
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> InfraResult<ValidatedDocsyncConfig> {
    let env = DocsyncEnv::from_map(env).map_err(ErrorEnvelope::from)?;
    load_config_from_path(config_path, overrides_json, &env)
}

/// Load and validate the effective config, returning deterministic pretty JSON.
pub fn load_effective_config_json(
    env: &BTreeMap<String, String>,
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> InfraResult<String> {
    let config = load_effective_config(env, config_path, overrides_json)?;
    to_pretty_json(&config)
}

/// Render a validated config in the requested format.
pub fn render_config(config: &ValidatedDocsyncConfig, format: ConfigFormat) -> InfraResult<String> {
    match format {
        ConfigFormat::Json => to_pretty_json(config),
        ConfigFormat::Toml => to_pretty_toml(config),
    }
}

/// Outcome of one `config check` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigCheck {
    /// Check name.
    pub name: &'static str,
    /// Whether the check passed.
    pub ok: bool,
    /// Human-readable detail.
    pub message: String,
}

/// All `config check` results, in a fixed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigCheckReport {
    /// Check outcomes.
    pub checks: Vec<ConfigCheck>,
}

impl ConfigCheckReport {
    /// Returns true when every check passed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(|check| check.ok)
    }
}

/// Check what a sync run would need beyond schema validity: credentials,
/// a registered source type and, for `directory`, an existing root.
#[must_use]
pub fn check_config(
    config: &ValidatedDocsyncConfig,
    env: &DocsyncEnv,
    registry: &SourceRegistry,
) -> ConfigCheckReport {
    let mut checks = Vec::new();

    let auth = EsAuth::resolve(&EsAuthInput {
        api_key: env.es_api_key.as_ref(),
        username: config.elasticsearch.username.as_deref(),
        password: env.es_password.as_ref(),
    });
    checks.push(match auth {
        Ok(EsAuth::ApiKey(_)) => passed("credentials", "api key"),
        Ok(EsAuth::Basic { username, .. }) => passed("credentials", format!("basic auth as {username}")),
        Err(error) => failed("credentials", error.message),
    });

    let service_type = &*config.sources.service_type;
    checks.push(if registry.contains(service_type) {
        passed("source", format!("service type {service_type}"))
    } else {
        let available: Vec<&str> = registry.service_types().collect();
        failed(
            "source",
            format!("Unknown service type: {service_type} (available: {})", available.join(", ")),
        )
    });

    if service_type == "directory" {
        let path = config.sources.directory.path.as_deref().unwrap_or(".");
        checks.push(if Path::new(path).is_dir() {
            passed("directory", format!("{path} is a directory"))
        } else {
            failed("directory", format!("{path} is not a directory"))
        });
    }

    ConfigCheckReport { checks }
}

fn passed(name: &'static str, message: impl Into<String>) -> ConfigCheck {
    ConfigCheck {
        name,
        ok: true,
        message: message.into(),
    }
}

fn failed(name: &'static str, message: impl Into<String>) -> ConfigCheck {
    ConfigCheck {
        name,
        ok: false,
        message: message.into(),
    }
}
