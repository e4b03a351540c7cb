//! Configuration schema, defaults, validation, and normalization.
//!
//! - Deserialization uses `serde` (JSON or TOML).
//! - Validation is manual and returns typed errors mapped to `ErrorEnvelope`.
//! - Validated numeric limits are carried as bounded wrappers.

use docsync_shared::{
    BackoffStrategy, BoundedU32, BoundedU64, ErrorCode, ErrorEnvelope, RetryPolicy,
};
use serde::{Deserialize, Serialize};
use url::Url;

/// Current supported configuration schema version.
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Log levels accepted by `service.logLevel` (case-insensitive).
pub const LOG_LEVELS: [&str; 6] = ["DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL"];

const ES_TIMEOUT_MIN_MS: u64 = 1_000;
const ES_TIMEOUT_MAX_MS: u64 = 600_000;

const SYNC_CHUNK_SIZE_MIN: u32 = 1;
const SYNC_CHUNK_SIZE_MAX: u32 = 10_000;
const SYNC_QUEUE_CAPACITY_MIN: u32 = 1;
const SYNC_QUEUE_CAPACITY_MAX: u32 = 1_000_000;
const SYNC_CONCURRENT_DOWNLOADS_MIN: u32 = 1;
const SYNC_CONCURRENT_DOWNLOADS_MAX: u32 = 1_024;
const SYNC_MAX_CONCURRENCY_MIN: u32 = 1;
const SYNC_MAX_CONCURRENCY_MAX: u32 = 256;
const SYNC_DISPLAY_EVERY_MIN: u32 = 1;
const SYNC_DISPLAY_EVERY_MAX: u32 = 1_000_000;

const RETRY_MAX_ATTEMPTS_MIN: u32 = 1;
const RETRY_MAX_ATTEMPTS_MAX: u32 = 50;
const RETRY_INTERVAL_MIN_MS: u64 = 0;
const RETRY_INTERVAL_MAX_MS: u64 = 600_000;
const RETRY_MAX_DELAY_MAX_MS: u64 = 3_600_000;

const FAKE_COUNT_MAX: u32 = 1_000_000;

/// Top-level docsync configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct DocsyncConfig {
    /// Schema version for forward-compatible migrations.
    pub version: u32,
    /// Process-level settings.
    pub service: ServiceConfig,
    /// Remote search index settings.
    pub elasticsearch: ElasticsearchConfig,
    /// Sync pass tuning.
    pub sync: SyncConfig,
    /// Retry policy for remote calls.
    pub retry: RetryConfig,
    /// Data source selection.
    pub sources: SourcesConfig,
}

impl Default for DocsyncConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_CONFIG_VERSION,
            service: ServiceConfig::default(),
            elasticsearch: ElasticsearchConfig::default(),
            sync: SyncConfig::default(),
            retry: RetryConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

impl DocsyncConfig {
    /// Validate and normalize the config.
    pub fn validate_and_normalize(mut self) -> Result<ValidatedDocsyncConfig, ConfigSchemaError> {
        if self.version != CURRENT_CONFIG_VERSION {
            return Err(ConfigSchemaError::UnsupportedVersion {
                found: self.version,
                supported: CURRENT_CONFIG_VERSION,
            });
        }

        self.service.normalize_and_validate()?;
        self.elasticsearch.normalize_and_validate()?;
        self.retry.validate()?;
        self.sources.normalize_and_validate()?;

        let limits = ConfigLimits::new(&self)?;
        Ok(ValidatedDocsyncConfig { raw: self, limits })
    }
}

/// Returns true when a reload should rebuild logging or the index client.
#[must_use]
pub fn config_changed(old: &DocsyncConfig, new: &DocsyncConfig) -> bool {
    old.service.log_level != new.service.log_level || old.elasticsearch != new.elasticsearch
}

/// Validated config wrapper carrying bounded numeric values.
#[derive(Debug, Clone)]
pub struct ValidatedDocsyncConfig {
    raw: DocsyncConfig,
    limits: ConfigLimits,
}

impl ValidatedDocsyncConfig {
    /// Access validated numeric bounds.
    #[must_use]
    pub const fn limits(&self) -> &ConfigLimits {
        &self.limits
    }

    /// Consume the wrapper and return the raw config.
    #[must_use]
    pub fn into_inner(self) -> DocsyncConfig {
        self.raw
    }

    /// Retry policy derived from the `retry` section.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        self.raw.retry.policy(self.limits.retry_max_attempts.get())
    }
}

impl AsRef<DocsyncConfig> for ValidatedDocsyncConfig {
    fn as_ref(&self) -> &DocsyncConfig {
        &self.raw
    }
}

impl std::ops::Deref for ValidatedDocsyncConfig {
    type Target = DocsyncConfig;

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

/// Validated numeric limits derived from the config.
#[derive(Debug, Clone, Copy)]
pub struct ConfigLimits {
    /// Per-request timeout for the index client (ms).
    pub es_timeout_ms: BoundedU64<ES_TIMEOUT_MIN_MS, ES_TIMEOUT_MAX_MS>,
    /// Intents per bulk call.
    pub sync_chunk_size: BoundedU32<SYNC_CHUNK_SIZE_MIN, SYNC_CHUNK_SIZE_MAX>,
    /// Write queue capacity.
    pub sync_queue_capacity: BoundedU32<SYNC_QUEUE_CAPACITY_MIN, SYNC_QUEUE_CAPACITY_MAX>,
    /// Concurrently running enrichment units.
    pub sync_concurrent_downloads:
        BoundedU32<SYNC_CONCURRENT_DOWNLOADS_MIN, SYNC_CONCURRENT_DOWNLOADS_MAX>,
    /// In-flight bulk calls.
    pub sync_max_concurrency: BoundedU32<SYNC_MAX_CONCURRENCY_MIN, SYNC_MAX_CONCURRENCY_MAX>,
    /// Progress log cadence (documents).
    pub sync_display_every: BoundedU32<SYNC_DISPLAY_EVERY_MIN, SYNC_DISPLAY_EVERY_MAX>,
    /// Retry attempts (including the first try).
    pub retry_max_attempts: BoundedU32<RETRY_MAX_ATTEMPTS_MIN, RETRY_MAX_ATTEMPTS_MAX>,
}

impl ConfigLimits {
    fn new(config: &DocsyncConfig) -> Result<Self, ConfigSchemaError> {
        Ok(Self {
            es_timeout_ms: BoundedU64::try_new(config.elasticsearch.timeout_ms).map_err(|_| {
                ConfigSchemaError::TimeoutOutOfRange {
                    section: "elasticsearch",
                    field: "timeoutMs",
                    value_ms: config.elasticsearch.timeout_ms,
                    min_ms: ES_TIMEOUT_MIN_MS,
                    max_ms: ES_TIMEOUT_MAX_MS,
                }
            })?,
            sync_chunk_size: bounded_u32(
                "sync",
                "chunkSize",
                config.sync.chunk_size,
                SYNC_CHUNK_SIZE_MIN,
                SYNC_CHUNK_SIZE_MAX,
            )?,
            sync_queue_capacity: bounded_u32(
                "sync",
                "queueCapacity",
                config.sync.queue_capacity,
                SYNC_QUEUE_CAPACITY_MIN,
                SYNC_QUEUE_CAPACITY_MAX,
            )?,
            sync_concurrent_downloads: bounded_u32(
                "sync",
                "concurrentDownloads",
                config.sync.concurrent_downloads,
                SYNC_CONCURRENT_DOWNLOADS_MIN,
                SYNC_CONCURRENT_DOWNLOADS_MAX,
            )?,
            sync_max_concurrency: bounded_u32(
                "sync",
                "maxConcurrency",
                config.sync.max_concurrency,
                SYNC_MAX_CONCURRENCY_MIN,
                SYNC_MAX_CONCURRENCY_MAX,
            )?,
            sync_display_every: bounded_u32(
                "sync",
                "displayEvery",
                config.sync.display_every,
                SYNC_DISPLAY_EVERY_MIN,
                SYNC_DISPLAY_EVERY_MAX,
            )?,
            retry_max_attempts: bounded_u32(
                "retry",
                "maxAttempts",
                config.retry.max_attempts,
                RETRY_MAX_ATTEMPTS_MIN,
                RETRY_MAX_ATTEMPTS_MAX,
            )?,
        })
    }
}

/// Parse a config from a JSON string, applying validation and normalization.
pub fn parse_config_json(input: &str) -> Result<ValidatedDocsyncConfig, ErrorEnvelope> {
    let config: DocsyncConfig = serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_json"),
            format!("invalid config JSON: {error}"),
        )
    })?;

    config.validate_and_normalize().map_err(Into::into)
}

/// Parse a config from a TOML string, applying validation and normalization.
pub fn parse_config_toml(input: &str) -> Result<ValidatedDocsyncConfig, ErrorEnvelope> {
    let config: DocsyncConfig = toml::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_toml"),
            format!("invalid config TOML: {error}"),
        )
    })?;

    config.validate_and_normalize().map_err(Into::into)
}

/// Process-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ServiceConfig {
    /// One of [`LOG_LEVELS`]; normalized to uppercase.
    pub log_level: Box<str>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".into(),
        }
    }
}

impl ServiceConfig {
    fn normalize_and_validate(&mut self) -> Result<(), ConfigSchemaError> {
        let normalized = self.log_level.trim().to_ascii_uppercase();
        if !LOG_LEVELS.contains(&normalized.as_str()) {
            return Err(ConfigSchemaError::InvalidLogLevel {
                value: self.log_level.to_string(),
            });
        }
        self.log_level = normalized.into_boxed_str();
        Ok(())
    }

    /// `tracing` filter directive for the configured level.
    #[must_use]
    pub fn tracing_directive(&self) -> &'static str {
        match &*self.log_level {
            "DEBUG" => "debug",
            "WARNING" | "WARN" => "warn",
            "ERROR" | "CRITICAL" => "error",
            _ => "info",
        }
    }
}

/// Remote search index settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ElasticsearchConfig {
    /// Base URL (`http` or `https`).
    pub host: Box<str>,
    /// Basic-auth user; the password comes from the environment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<Box<str>>,
    /// Serverless deployments reopen indices via `?reopen=true`.
    pub serverless: bool,
    /// Per-request timeout (ms).
    pub timeout_ms: u64,
    /// Language used for content index analysis settings.
    pub language_code: Box<str>,
    /// Optional ingest pipeline.
    pub pipeline: PipelineConfig,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:9200".into(),
            username: None,
            serverless: false,
            timeout_ms: 120_000,
            language_code: "en".into(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ElasticsearchConfig {
    fn normalize_and_validate(&mut self) -> Result<(), ConfigSchemaError> {
        normalize_boxed_str(&mut self.host);
        while self.host.ends_with('/') {
            let trimmed = self.host.trim_end_matches('/').to_owned();
            self.host = trimmed.into_boxed_str();
        }
        validate_http_url("elasticsearch", "host", &self.host)?;
        normalize_optional_trimmed(&mut self.username);

        normalize_boxed_str(&mut self.language_code);
        if self.language_code.is_empty() {
            return Err(ConfigSchemaError::EmptyValue {
                section: "elasticsearch",
                field: "languageCode",
            });
        }
        let lowered = self.language_code.to_ascii_lowercase();
        self.language_code = lowered.into_boxed_str();

        normalize_optional_trimmed(&mut self.pipeline.name);
        Ok(())
    }
}

/// Ingest pipeline ensured before a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct PipelineConfig {
    /// Pipeline id; no pipeline is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<Box<str>>,
    /// Pipeline version.
    pub version: u32,
    /// Pipeline description.
    pub description: Box<str>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: None,
            version: 1,
            description: "docsync ingest pipeline".into(),
        }
    }
}

/// Sync pass tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SyncConfig {
    /// Intents per bulk call.
    pub chunk_size: u32,
    /// Write queue capacity.
    pub queue_capacity: u32,
    /// Concurrently running enrichment units.
    pub concurrent_downloads: u32,
    /// Maximum in-flight bulk calls.
    pub max_concurrency: u32,
    /// Log progress every N indexed documents.
    pub display_every: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            queue_capacity: 1_024,
            concurrent_downloads: 10,
            max_concurrency: 5,
            display_every: 100,
        }
    }
}

/// Retry policy for remote calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RetryConfig {
    /// Delay growth between attempts.
    pub strategy: BackoffStrategy,
    /// Base delay (ms).
    pub interval_ms: u64,
    /// Maximum attempts (including the first try).
    pub max_attempts: u32,
    /// Delay cap (ms).
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Linear,
            interval_ms: 1_000,
            max_attempts: 3,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<(), ConfigSchemaError> {
        validate_timeout_ms(
            "retry",
            "intervalMs",
            self.interval_ms,
            RETRY_INTERVAL_MIN_MS,
            RETRY_INTERVAL_MAX_MS,
        )?;
        validate_timeout_ms(
            "retry",
            "maxDelayMs",
            self.max_delay_ms,
            self.interval_ms,
            RETRY_MAX_DELAY_MAX_MS,
        )
    }

    const fn policy(&self, max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: self.interval_ms,
            max_delay_ms: self.max_delay_ms,
            jitter_ratio_pct: 0,
            strategy: self.strategy,
        }
    }
}

/// Data source selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SourcesConfig {
    /// Registered source type (`directory`, `fake`).
    pub service_type: Box<str>,
    /// Settings for the `directory` source.
    pub directory: DirectorySourceConfig,
    /// Settings for the `fake` source.
    pub fake: FakeSourceConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            service_type: "directory".into(),
            directory: DirectorySourceConfig::default(),
            fake: FakeSourceConfig::default(),
        }
    }
}

impl SourcesConfig {
    fn normalize_and_validate(&mut self) -> Result<(), ConfigSchemaError> {
        normalize_boxed_str(&mut self.service_type);
        if self.service_type.is_empty() {
            return Err(ConfigSchemaError::EmptyValue {
                section: "sources",
                field: "serviceType",
            });
        }
        normalize_optional_trimmed(&mut self.directory.path);
        if self.fake.count > FAKE_COUNT_MAX {
            return Err(ConfigSchemaError::LimitOutOfRange {
                section: "sources.fake",
                field: "count",
                value: u64::from(self.fake.count),
                min: 0,
                max: u64::from(FAKE_COUNT_MAX),
            });
        }
        Ok(())
    }
}

/// Settings for the `directory` source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct DirectorySourceConfig {
    /// Root directory to walk; defaults to the working directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Box<str>>,
}

/// Settings for the `fake` source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct FakeSourceConfig {
    /// Number of generated documents.
    pub count: u32,
}

impl Default for FakeSourceConfig {
    fn default() -> Self {
        Self { count: 10 }
    }
}

/// Typed validation errors for the configuration schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigSchemaError {
    /// The config version is not supported by this binary.
    #[error("unsupported config version: {found} (supported: {supported})")]
    UnsupportedVersion {
        /// Version found in the config.
        found: u32,
        /// Version supported by this crate.
        supported: u32,
    },
    /// A duration value is out of bounds.
    #[error("{section}.{field} must be within [{min_ms}, {max_ms}] ms (got {value_ms})")]
    TimeoutOutOfRange {
        /// Schema section (e.g. `elasticsearch`).
        section: &'static str,
        /// Field name in the config file (e.g. `timeoutMs`).
        field: &'static str,
        /// Value provided (ms).
        value_ms: u64,
        /// Minimum allowed value (ms).
        min_ms: u64,
        /// Maximum allowed value (ms).
        max_ms: u64,
    },
    /// A numeric limit is out of bounds.
    #[error("{section}.{field} must be within [{min}, {max}] (got {value})")]
    LimitOutOfRange {
        /// Schema section (e.g. `sync`).
        section: &'static str,
        /// Field name in the config file (e.g. `chunkSize`).
        field: &'static str,
        /// Value provided.
        value: u64,
        /// Minimum allowed value.
        min: u64,
        /// Maximum allowed value.
        max: u64,
    },
    /// A URL entry is invalid.
    #[error("invalid URL for {section}.{field}")]
    InvalidUrl {
        /// Schema section.
        section: &'static str,
        /// Field name in the config file.
        field: &'static str,
        /// Invalid URL value.
        url: String,
    },
    /// `service.logLevel` is not a known level.
    #[error("Unexpected log level: {value}")]
    InvalidLogLevel {
        /// Raw value.
        value: String,
    },
    /// A required string is empty after trimming.
    #[error("{section}.{field} must be non-empty")]
    EmptyValue {
        /// Schema section.
        section: &'static str,
        /// Field name in the config file.
        field: &'static str,
    },
}

impl ConfigSchemaError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedVersion { .. } => ErrorCode::new("config", "unsupported_version"),
            Self::TimeoutOutOfRange { .. } => ErrorCode::new("config", "invalid_timeout"),
            Self::LimitOutOfRange { .. } => ErrorCode::new("config", "invalid_limit"),
            Self::InvalidUrl { .. } => ErrorCode::new("config", "invalid_url"),
            Self::InvalidLogLevel { .. } => ErrorCode::new("config", "invalid_log_level"),
            Self::EmptyValue { .. } => ErrorCode::new("config", "empty_value"),
        }
    }
}

impl From<ConfigSchemaError> for ErrorEnvelope {
    fn from(error: ConfigSchemaError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());

        match error {
            ConfigSchemaError::UnsupportedVersion { found, supported } => envelope
                .with_metadata("found", found.to_string())
                .with_metadata("supported", supported.to_string()),
            ConfigSchemaError::TimeoutOutOfRange {
                section,
                field,
                value_ms,
                min_ms,
                max_ms,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("value_ms", value_ms.to_string())
                .with_metadata("min_ms", min_ms.to_string())
                .with_metadata("max_ms", max_ms.to_string()),
            ConfigSchemaError::LimitOutOfRange {
                section,
                field,
                value,
                min,
                max,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("value", value.to_string())
                .with_metadata("min", min.to_string())
                .with_metadata("max", max.to_string()),
            ConfigSchemaError::InvalidUrl {
                section,
                field,
                url,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("url", sanitize_url_for_error(&url)),
            ConfigSchemaError::InvalidLogLevel { value } => envelope.with_metadata("value", value),
            ConfigSchemaError::EmptyValue { section, field } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field),
        }
    }
}

/// Strips credentials from a URL before it is echoed in an error.
fn sanitize_url_for_error(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() || !parsed.username().is_empty() {
                if parsed.set_username("").is_err() {
                    return "[invalid url: invalid username]".to_string();
                }
                if parsed.set_password(None).is_err() {
                    return "[invalid url: invalid password]".to_string();
                }
            }
            parsed.to_string()
        },
        Err(error) => format!("[invalid url: {error}]"),
    }
}

const fn validate_timeout_ms(
    section: &'static str,
    field: &'static str,
    value_ms: u64,
    min_ms: u64,
    max_ms: u64,
) -> Result<(), ConfigSchemaError> {
    if value_ms < min_ms || value_ms > max_ms {
        return Err(ConfigSchemaError::TimeoutOutOfRange {
            section,
            field,
            value_ms,
            min_ms,
            max_ms,
        });
    }
    Ok(())
}

fn bounded_u32<const MIN: u32, const MAX: u32>(
    section: &'static str,
    field: &'static str,
    value: u32,
    min: u32,
    max: u32,
) -> Result<BoundedU32<MIN, MAX>, ConfigSchemaError> {
    BoundedU32::try_new(value).map_err(|_| ConfigSchemaError::LimitOutOfRange {
        section,
        field,
        value: u64::from(value),
        min: u64::from(min),
        max: u64::from(max),
    })
}

fn validate_http_url(
    section: &'static str,
    field: &'static str,
    value: &str,
) -> Result<(), ConfigSchemaError> {
    let invalid = || ConfigSchemaError::InvalidUrl {
        section,
        field,
        url: value.to_owned(),
    };
    let parsed = Url::parse(value).map_err(|_| invalid())?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(invalid());
    }
    Ok(())
}

fn normalize_optional_trimmed(value: &mut Option<Box<str>>) {
    if let Some(inner) = value.as_ref() {
        let trimmed = inner.trim();
        if trimmed.is_empty() {
            *value = None;
        } else if trimmed.len() != inner.len() {
            *value = Some(trimmed.to_owned().into_boxed_str());
        }
    }
}

fn normalize_boxed_str(value: &mut Box<str>) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_owned().into_boxed_str();
    }
}
