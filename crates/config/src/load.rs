//! Config loading helpers (env + file + overrides).
//!
//! The loader is responsible for deterministic merge order and surfacing
//! user-facing errors as typed `ErrorEnvelope`s.

use crate::merge::{deep_merge, expand_dotted_keys, has_path, nest_value, take_path};
use crate::{DocsyncConfig, DocsyncEnv, ValidatedDocsyncConfig, apply_env_overrides};
use docsync_shared::{ErrorClass, ErrorCode, ErrorEnvelope};
use serde_json::{Map, Value};
use std::path::Path;

/// Format of a config document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON document.
    Json,
    /// TOML document.
    Toml,
}

/// A deprecated config key and where its value now lives.
struct DeprecatedKey {
    old: &'static str,
    new: &'static str,
}

const DEPRECATED_KEYS: [DeprecatedKey; 1] = [DeprecatedKey {
    old: "elasticsearch.bulk.maxRetries",
    new: "retry.maxAttempts",
}];

/// Load the config from sources using a deterministic precedence order.
///
/// Precedence (highest wins):
/// - env overrides (`DocsyncEnv`)
/// - overrides JSON (partial config, dotted keys allowed)
/// - config document
/// - defaults (`DocsyncConfig::default()`)
pub fn load_config_from_sources(
    config_text: Option<(&str, ConfigFormat)>,
    overrides_json: Option<&str>,
    env: &DocsyncEnv,
) -> Result<ValidatedDocsyncConfig, ErrorEnvelope> {
    let mut document = match config_text {
        None => Value::Object(Map::new()),
        Some((input, format)) => parse_document(input, format)?,
    };

    if let Some(input) = overrides_json {
        let overrides = parse_overrides_json(input)?;
        deep_merge(&mut document, expand_dotted_keys(overrides));
    }

    migrate_deprecated_keys(&mut document);

    let config: DocsyncConfig = serde_json::from_value(document).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_config"),
            format!("invalid config: {error}"),
        )
    })?;

    // env is applied last and also validates/normalizes the resulting config.
    apply_env_overrides(config, env)
}

/// Load the config from an optional file path.
pub fn load_config_from_path(
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
    env: &DocsyncEnv,
) -> Result<ValidatedDocsyncConfig, ErrorEnvelope> {
    match config_path {
        None => load_config_from_sources(None, overrides_json, env),
        Some(path) => {
            let format = detect_config_format(path)?;
            let text = read_config_file(path)?;
            load_config_from_sources(Some((&text, format)), overrides_json, env)
        },
    }
}

/// Load the config from std env and an optional file path.
pub fn load_config_std_env(
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> Result<ValidatedDocsyncConfig, ErrorEnvelope> {
    let env = DocsyncEnv::from_std_env().map_err(ErrorEnvelope::from)?;
    load_config_from_path(config_path, overrides_json, &env)
}

/// Serialize the config as deterministic pretty JSON (with trailing newline).
pub fn to_pretty_json(config: &DocsyncConfig) -> Result<String, ErrorEnvelope> {
    let mut output = serde_json::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!("failed to serialize config: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}

/// Serialize the config as deterministic pretty TOML (with trailing newline).
pub fn to_pretty_toml(config: &DocsyncConfig) -> Result<String, ErrorEnvelope> {
    let mut output = toml::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::new("config", "serialize_toml"),
            format!("failed to serialize config TOML: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}

/// Move deprecated keys to their replacements, warning for each one found.
///
/// An explicitly set replacement wins over the deprecated value.
fn migrate_deprecated_keys(document: &mut Value) {
    for key in &DEPRECATED_KEYS {
        let Some(value) = take_path(document, key.old) else {
            continue;
        };
        tracing::warn!(
            deprecated = key.old,
            replacement = key.new,
            "Config `{}` is deprecated, use `{}` instead",
            key.old,
            key.new
        );
        if has_path(document, key.new) {
            continue;
        }
        if let Value::Object(map) = document {
            nest_value(map, key.new, value);
        }
    }
}

fn parse_document(input: &str, format: ConfigFormat) -> Result<Value, ErrorEnvelope> {
    let document: Value = match format {
        ConfigFormat::Json => serde_json::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_json"),
                format!("invalid config JSON: {error}"),
            )
            .with_metadata("source", "config")
        })?,
        ConfigFormat::Toml => toml::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_toml"),
                format!("invalid config TOML: {error}"),
            )
            .with_metadata("source", "config")
        })?,
    };
    ensure_object(document, "config")
}

fn parse_overrides_json(input: &str) -> Result<Value, ErrorEnvelope> {
    let document: Value = serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_json"),
            format!("invalid overrides JSON: {error}"),
        )
        .with_metadata("source", "overrides")
    })?;
    ensure_object(document, "overrides")
}

fn ensure_object(document: Value, source: &'static str) -> Result<Value, ErrorEnvelope> {
    if document.is_object() {
        return Ok(document);
    }
    Err(ErrorEnvelope::expected(
        ErrorCode::new("config", "invalid_config"),
        "config document must be an object",
    )
    .with_metadata("source", source))
}

fn read_config_file(path: &Path) -> Result<String, ErrorEnvelope> {
    std::fs::read_to_string(path).map_err(|error| {
        let code = match error.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::new("config", "config_file_not_found"),
            std::io::ErrorKind::PermissionDenied => {
                ErrorCode::new("config", "config_file_permission_denied")
            },
            _ => ErrorCode::new("config", "config_file_io"),
        };

        ErrorEnvelope::expected(code, format!("failed to read config file: {error}"))
            .with_metadata("path", path.to_string_lossy().to_string())
    })
}

fn detect_config_format(path: &Path) -> Result<ConfigFormat, ErrorEnvelope> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        None | Some("json") => Ok(ConfigFormat::Json),
        Some("toml") => Ok(ConfigFormat::Toml),
        Some(other) => Err(ErrorEnvelope::expected(
            ErrorCode::new("config", "unsupported_format"),
            "unsupported config format; use .json or .toml",
        )
        .with_metadata("extension", other.to_string())),
    }
}
