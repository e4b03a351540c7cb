//! Environment variable parsing and env-to-config merging.
//!
//! Env parsing is strict (invalid values fail fast) and safe (secret values
//! never appear in error metadata). Secrets are only ever read from the
//! environment and are kept out of the serializable config.

use crate::schema::{DocsyncConfig, ValidatedDocsyncConfig};
use docsync_shared::{BackoffStrategy, ErrorCode, ErrorEnvelope, SecretString, redact_if_secret};
use std::collections::BTreeMap;

/// Env var: `service.logLevel`.
pub const ENV_LOG_LEVEL: &str = "DOCSYNC_LOG_LEVEL";
/// Env var: `elasticsearch.host`.
pub const ENV_ES_HOST: &str = "DOCSYNC_ES_HOST";
/// Env var: `elasticsearch.username`.
pub const ENV_ES_USERNAME: &str = "DOCSYNC_ES_USERNAME";
/// Env var: basic-auth password (secret).
// gitleaks:allow
pub const ENV_ES_PASSWORD: &str = "DOCSYNC_ES_PASSWORD";
/// Env var: API key (secret), either encoded or `id:key`.
pub const ENV_ES_API_KEY: &str = "DOCSYNC_ES_API_KEY";
/// Env var: `elasticsearch.serverless`.
pub const ENV_ES_SERVERLESS: &str = "DOCSYNC_ES_SERVERLESS";
/// Env var: `elasticsearch.timeoutMs`.
pub const ENV_ES_TIMEOUT_MS: &str = "DOCSYNC_ES_TIMEOUT_MS";
/// Env var: `sync.chunkSize`.
pub const ENV_SYNC_CHUNK_SIZE: &str = "DOCSYNC_SYNC_CHUNK_SIZE";
/// Env var: `sync.concurrentDownloads`.
pub const ENV_SYNC_CONCURRENT_DOWNLOADS: &str = "DOCSYNC_SYNC_CONCURRENT_DOWNLOADS";
/// Env var: `sync.maxConcurrency`.
pub const ENV_SYNC_MAX_CONCURRENCY: &str = "DOCSYNC_SYNC_MAX_CONCURRENCY";
/// Env var: `retry.strategy`.
pub const ENV_RETRY_STRATEGY: &str = "DOCSYNC_RETRY_STRATEGY";
/// Env var: `retry.intervalMs`.
pub const ENV_RETRY_INTERVAL_MS: &str = "DOCSYNC_RETRY_INTERVAL_MS";
/// Env var: `retry.maxAttempts`.
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "DOCSYNC_RETRY_MAX_ATTEMPTS";
/// Env var: `sources.serviceType`.
pub const ENV_SOURCE_SERVICE_TYPE: &str = "DOCSYNC_SOURCE_SERVICE_TYPE";
/// Env var: `sources.directory.path`.
pub const ENV_SOURCE_DIRECTORY_PATH: &str = "DOCSYNC_SOURCE_DIRECTORY_PATH";

const ALL_ENV_VARS: [&str; 15] = [
    ENV_LOG_LEVEL,
    ENV_ES_HOST,
    ENV_ES_USERNAME,
    ENV_ES_PASSWORD,
    ENV_ES_API_KEY,
    ENV_ES_SERVERLESS,
    ENV_ES_TIMEOUT_MS,
    ENV_SYNC_CHUNK_SIZE,
    ENV_SYNC_CONCURRENT_DOWNLOADS,
    ENV_SYNC_MAX_CONCURRENCY,
    ENV_RETRY_STRATEGY,
    ENV_RETRY_INTERVAL_MS,
    ENV_RETRY_MAX_ATTEMPTS,
    ENV_SOURCE_SERVICE_TYPE,
    ENV_SOURCE_DIRECTORY_PATH,
];

/// Typed env-derived overrides and secrets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocsyncEnv {
    /// Override for `service.logLevel`.
    pub log_level: Option<Box<str>>,
    /// Override for `elasticsearch.host`.
    pub es_host: Option<Box<str>>,
    /// Override for `elasticsearch.username`.
    pub es_username: Option<Box<str>>,
    /// Basic-auth password.
    pub es_password: Option<SecretString>,
    /// API key.
    pub es_api_key: Option<SecretString>,
    /// Override for `elasticsearch.serverless`.
    pub es_serverless: Option<bool>,
    /// Override for `elasticsearch.timeoutMs`.
    pub es_timeout_ms: Option<u64>,
    /// Override for `sync.chunkSize`.
    pub sync_chunk_size: Option<u32>,
    /// Override for `sync.concurrentDownloads`.
    pub sync_concurrent_downloads: Option<u32>,
    /// Override for `sync.maxConcurrency`.
    pub sync_max_concurrency: Option<u32>,
    /// Override for `retry.strategy`.
    pub retry_strategy: Option<BackoffStrategy>,
    /// Override for `retry.intervalMs`.
    pub retry_interval_ms: Option<u64>,
    /// Override for `retry.maxAttempts`.
    pub retry_max_attempts: Option<u32>,
    /// Override for `sources.serviceType`.
    pub source_service_type: Option<Box<str>>,
    /// Override for `sources.directory.path`.
    pub source_directory_path: Option<Box<str>>,
}

impl DocsyncEnv {
    /// Parse env overrides from a key/value map (useful for tests and fixtures).
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, EnvParseError> {
        Ok(Self {
            log_level: parse_optional_trimmed_string(map, ENV_LOG_LEVEL)?,
            es_host: parse_optional_url_string(map, ENV_ES_HOST)?,
            es_username: parse_optional_trimmed_string(map, ENV_ES_USERNAME)?,
            es_password: parse_optional_secret(map, ENV_ES_PASSWORD)?,
            es_api_key: parse_optional_secret(map, ENV_ES_API_KEY)?,
            es_serverless: parse_optional_bool(map, ENV_ES_SERVERLESS)?,
            es_timeout_ms: parse_optional_u64(map, ENV_ES_TIMEOUT_MS)?,
            sync_chunk_size: parse_optional_u32(map, ENV_SYNC_CHUNK_SIZE)?,
            sync_concurrent_downloads: parse_optional_u32(map, ENV_SYNC_CONCURRENT_DOWNLOADS)?,
            sync_max_concurrency: parse_optional_u32(map, ENV_SYNC_MAX_CONCURRENCY)?,
            retry_strategy: parse_optional_strategy(map, ENV_RETRY_STRATEGY)?,
            retry_interval_ms: parse_optional_u64(map, ENV_RETRY_INTERVAL_MS)?,
            retry_max_attempts: parse_optional_u32(map, ENV_RETRY_MAX_ATTEMPTS)?,
            source_service_type: parse_optional_trimmed_string(map, ENV_SOURCE_SERVICE_TYPE)?,
            source_directory_path: parse_optional_trimmed_string(map, ENV_SOURCE_DIRECTORY_PATH)?,
        })
    }

    /// Parse env overrides from the current process environment.
    pub fn from_std_env() -> Result<Self, EnvParseError> {
        let map = ALL_ENV_VARS
            .iter()
            .filter_map(|name| {
                std::env::var(name)
                    .ok()
                    .map(|value| ((*name).to_string(), value))
            })
            .collect();
        Self::from_map(&map)
    }
}

/// Apply env overrides to a base config (env wins over file/default values).
pub fn apply_env_overrides(
    base: DocsyncConfig,
    env: &DocsyncEnv,
) -> Result<ValidatedDocsyncConfig, ErrorEnvelope> {
    let mut config = base;

    set_clone(&mut config.service.log_level, env.log_level.as_ref());
    set_clone(&mut config.elasticsearch.host, env.es_host.as_ref());
    if env.es_username.is_some() {
        config.elasticsearch.username.clone_from(&env.es_username);
    }
    set_copy(&mut config.elasticsearch.serverless, env.es_serverless);
    set_copy(&mut config.elasticsearch.timeout_ms, env.es_timeout_ms);
    set_copy(&mut config.sync.chunk_size, env.sync_chunk_size);
    set_copy(
        &mut config.sync.concurrent_downloads,
        env.sync_concurrent_downloads,
    );
    set_copy(&mut config.sync.max_concurrency, env.sync_max_concurrency);
    set_copy(&mut config.retry.strategy, env.retry_strategy);
    set_copy(&mut config.retry.interval_ms, env.retry_interval_ms);
    set_copy(&mut config.retry.max_attempts, env.retry_max_attempts);
    set_clone(
        &mut config.sources.service_type,
        env.source_service_type.as_ref(),
    );
    if env.source_directory_path.is_some() {
        config
            .sources
            .directory
            .path
            .clone_from(&env.source_directory_path);
    }

    config.validate_and_normalize().map_err(Into::into)
}

fn set_copy<T: Copy>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn set_clone<T: Clone>(field: &mut T, value: Option<&T>) {
    if let Some(value) = value {
        field.clone_from(value);
    }
}

/// Validation failures when parsing env variables.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvParseError {
    /// An env var was present but empty after trimming.
    #[error("{var} must be non-empty")]
    EmptyValue {
        /// Env var name.
        var: &'static str,
    },
    /// A secret env var was present but empty after trimming.
    #[error("{var} must be non-empty")]
    EmptySecret {
        /// Env var name.
        var: &'static str,
    },
    /// Boolean env var had an invalid value.
    #[error("{var} must be a boolean")]
    InvalidBool {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// Integer env var had an invalid value.
    #[error("{var} must be an integer")]
    InvalidInt {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// URL env var had an invalid value.
    #[error("{var} must be a valid URL")]
    InvalidUrl {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// Enum env var had an invalid value.
    #[error("{var} has an unsupported value")]
    InvalidEnum {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
}

impl EnvParseError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyValue { .. } | Self::EmptySecret { .. } => {
                ErrorCode::new("config", "empty_env_var")
            },
            Self::InvalidBool { .. } => ErrorCode::new("config", "invalid_env_bool"),
            Self::InvalidInt { .. } => ErrorCode::new("config", "invalid_env_int"),
            Self::InvalidUrl { .. } => ErrorCode::new("config", "invalid_env_url"),
            Self::InvalidEnum { .. } => ErrorCode::new("config", "invalid_env_enum"),
        }
    }
}

impl From<EnvParseError> for ErrorEnvelope {
    fn from(error: EnvParseError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());

        match error {
            EnvParseError::EmptyValue { var } | EnvParseError::EmptySecret { var } => {
                envelope.with_metadata("env_var", var)
            },
            EnvParseError::InvalidBool { var, value }
            | EnvParseError::InvalidInt { var, value }
            | EnvParseError::InvalidUrl { var, value }
            | EnvParseError::InvalidEnum { var, value } => envelope
                .with_metadata("env_var", var)
                .with_metadata("value", redact_if_secret(var, &value)),
        }
    }
}

fn non_empty<'a>(
    map: &'a BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<&'a str>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }
    Ok(Some(trimmed))
}

fn parse_optional_trimmed_string(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Box<str>>, EnvParseError> {
    Ok(non_empty(map, var)?.map(Box::from))
}

fn parse_optional_secret(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<SecretString>, EnvParseError> {
    match non_empty(map, var) {
        Ok(value) => Ok(value.map(SecretString::from)),
        Err(_) => Err(EnvParseError::EmptySecret { var }),
    }
}

fn parse_optional_u64(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u64>, EnvParseError> {
    non_empty(map, var)?
        .map(|value| {
            value.parse::<u64>().map_err(|_| EnvParseError::InvalidInt {
                var,
                value: value.to_owned(),
            })
        })
        .transpose()
}

fn parse_optional_u32(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u32>, EnvParseError> {
    non_empty(map, var)?
        .map(|value| {
            value.parse::<u32>().map_err(|_| EnvParseError::InvalidInt {
                var,
                value: value.to_owned(),
            })
        })
        .transpose()
}

fn parse_optional_bool(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<bool>, EnvParseError> {
    let Some(value) = non_empty(map, var)? else {
        return Ok(None);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(EnvParseError::InvalidBool {
            var,
            value: value.to_owned(),
        }),
    }
}

fn parse_optional_strategy(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<BackoffStrategy>, EnvParseError> {
    non_empty(map, var)?
        .map(|value| {
            BackoffStrategy::parse(value).ok_or_else(|| EnvParseError::InvalidEnum {
                var,
                value: value.to_owned(),
            })
        })
        .transpose()
}

fn parse_optional_url_string(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Box<str>>, EnvParseError> {
    let Some(value) = non_empty(map, var)? else {
        return Ok(None);
    };
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(Some(value.into())),
        _ => Err(EnvParseError::InvalidUrl {
            var,
            value: value.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn missing_vars_default_to_none() -> Result<(), Box<dyn Error>> {
        let env = DocsyncEnv::from_map(&BTreeMap::new())?;
        assert_eq!(env, DocsyncEnv::default());
        Ok(())
    }

    #[test]
    fn url_validation_accepts_http_and_https() -> Result<(), Box<dyn Error>> {
        let mut map = BTreeMap::new();
        map.insert(ENV_ES_HOST.to_string(), "https://example.com:9243".to_string());
        let env = DocsyncEnv::from_map(&map)?;
        assert_eq!(env.es_host.as_deref(), Some("https://example.com:9243"));

        map.insert(ENV_ES_HOST.to_string(), "ftp://example.com".to_string());
        let error = DocsyncEnv::from_map(&map).err();
        assert!(matches!(error, Some(EnvParseError::InvalidUrl { .. })));
        Ok(())
    }

    #[test]
    fn empty_secret_does_not_echo_value() -> Result<(), Box<dyn Error>> {
        let mut map = BTreeMap::new();
        map.insert(ENV_ES_API_KEY.to_string(), "   ".to_string());

        let envelope: ErrorEnvelope = DocsyncEnv::from_map(&map)
            .err()
            .ok_or_else(|| std::io::Error::other("expected secret error"))?
            .into();

        assert_eq!(envelope.code, ErrorCode::new("config", "empty_env_var"));
        assert_eq!(
            envelope.metadata.get("env_var").map(String::as_str),
            Some(ENV_ES_API_KEY)
        );
        assert!(!envelope.metadata.contains_key("value"));
        Ok(())
    }

    #[test]
    fn secrets_are_kept_out_of_the_config() -> Result<(), Box<dyn Error>> {
        let mut map = BTreeMap::new();
        map.insert(ENV_ES_PASSWORD.to_string(), "hunter2".to_string());
        map.insert(ENV_ES_USERNAME.to_string(), "elastic".to_string());
        let env = DocsyncEnv::from_map(&map)?;

        let config = apply_env_overrides(DocsyncConfig::default(), &env)?;
        let rendered = serde_json::to_string(&*config)?;

        assert_eq!(config.elasticsearch.username.as_deref(), Some("elastic"));
        assert!(!rendered.contains("hunter2"));
        assert_eq!(env.es_password.as_ref().map(SecretString::expose), Some("hunter2"));
        Ok(())
    }

    #[test]
    fn invalid_strategy_is_reported() {
        let mut map = BTreeMap::new();
        map.insert(ENV_RETRY_STRATEGY.to_string(), "fibonacci".to_string());
        let error = DocsyncEnv::from_map(&map).err();
        assert!(matches!(error, Some(EnvParseError::InvalidEnum { .. })));
    }

    #[test]
    fn bools_accept_common_spellings() -> Result<(), Box<dyn Error>> {
        let mut map = BTreeMap::new();
        map.insert(ENV_ES_SERVERLESS.to_string(), "Yes".to_string());
        assert_eq!(DocsyncEnv::from_map(&map)?.es_serverless, Some(true));

        map.insert(ENV_ES_SERVERLESS.to_string(), "maybe".to_string());
        assert!(DocsyncEnv::from_map(&map).is_err());
        Ok(())
    }
}
