//! One-shot sync runs: prepare the content index, then run a pass.

use crate::{InfraResult, SourceRegistry, build_es_client};
use docsync_adapters::{InMemoryTelemetry, TaggedTelemetry, TelemetrySnapshot, TracingLogger};
use docsync_app::{
    PrepareIndexDeps, PrepareIndexInput, SyncIndexDeps, SyncIndexInput, SyncOptions,
    prepare_content_index, sync_index,
};
use docsync_config::{DocsyncEnv, ValidatedDocsyncConfig};
use docsync_domain::{Filter, IndexName, SyncResult};
use docsync_ports::{
    DataSourcePort, IndexAdminPort, IngestPipelineSpec, LoggerPort, SearchIndexPort,
    TelemetryPort, telemetry_tags,
};
use docsync_shared::{ErrorCode, ErrorEnvelope, RequestContext};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::num::{NonZeroU64, NonZeroUsize};
use std::sync::Arc;

/// Ports a sync run is wired with.
#[derive(Clone)]
pub struct SyncRuntime {
    /// Index administration (preparation).
    pub admin: Arc<dyn IndexAdminPort>,
    /// Index read/write path.
    pub index: Arc<dyn SearchIndexPort>,
    /// Data source.
    pub source: Arc<dyn DataSourcePort>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
    /// Optional telemetry.
    pub telemetry: Option<Arc<dyn TelemetryPort>>,
}

/// What a sync run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Target index.
    pub index: Box<str>,
    /// Source service type.
    pub service_type: Box<str>,
    /// The index was created by this run.
    pub index_created: bool,
    /// The ingest pipeline was created by this run.
    pub pipeline_created: bool,
    /// Pass counters, including writes made before a fatal error.
    pub result: SyncResult,
    /// Fatal error that ended the pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
    /// Telemetry counter totals recorded during the run.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub counters: BTreeMap<Box<str>, u64>,
}

impl SyncReport {
    /// Attach the counter totals of `snapshot`.
    #[must_use]
    pub fn with_counters(mut self, snapshot: &TelemetrySnapshot) -> Self {
        self.counters.clone_from(&snapshot.counters);
        self
    }

    /// Returns true when the pass finished without a fatal error.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Sync tuning derived from the validated config.
#[must_use]
pub fn sync_options(config: &ValidatedDocsyncConfig) -> SyncOptions {
    let limits = config.limits();
    SyncOptions {
        chunk_size: non_zero(limits.sync_chunk_size.get()),
        queue_capacity: non_zero(limits.sync_queue_capacity.get()),
        concurrent_downloads: non_zero(limits.sync_concurrent_downloads.get()),
        max_concurrency: non_zero(limits.sync_max_concurrency.get()),
        display_every: NonZeroU64::new(u64::from(limits.sync_display_every.get()))
            .unwrap_or(NonZeroU64::MIN),
        retry: config.retry_policy(),
    }
}

fn non_zero(value: u32) -> NonZeroUsize {
    NonZeroUsize::new(usize::try_from(value).unwrap_or(usize::MAX)).unwrap_or(NonZeroUsize::MIN)
}

/// Ingest pipeline to ensure, when `elasticsearch.pipeline.name` is set.
///
/// The pipeline stamps each document with its ingest time.
#[must_use]
pub fn pipeline_spec(config: &ValidatedDocsyncConfig) -> Option<IngestPipelineSpec> {
    let pipeline = &config.elasticsearch.pipeline;
    pipeline.name.as_ref().map(|name| IngestPipelineSpec {
        id: name.clone(),
        version: pipeline.version,
        description: pipeline.description.clone(),
        processors: json!([
            { "set": { "field": "_ingested_at", "value": "{{{_ingest.timestamp}}}" } }
        ]),
    })
}

/// Prepare `index`, validate `filter` against the source, then run one pass.
///
/// Preparation and filtering errors are returned as `Err`; a pass that
/// fails midway is reported in [`SyncReport::error`]. The source is closed
/// on every path.
pub async fn run_sync_with(
    ctx: &RequestContext,
    runtime: &SyncRuntime,
    config: &ValidatedDocsyncConfig,
    index: &str,
    filter: Filter,
) -> InfraResult<SyncReport> {
    let report = prepare_and_sync(ctx, runtime, config, index, filter).await;
    if let Err(error) = runtime.source.close().await {
        tracing::warn!(code = %error.code, "failed to close source: {}", error.message);
    }
    report
}

async fn prepare_and_sync(
    ctx: &RequestContext,
    runtime: &SyncRuntime,
    config: &ValidatedDocsyncConfig,
    index: &str,
    filter: Filter,
) -> InfraResult<SyncReport> {
    let index_name = IndexName::parse(index).map_err(ErrorEnvelope::from)?;
    let pipeline = pipeline_spec(config);
    let pipeline_id = pipeline.as_ref().map(|spec| spec.id.clone());

    let prepared = prepare_content_index(
        ctx,
        &PrepareIndexDeps {
            admin: Arc::clone(&runtime.admin),
            logger: runtime.logger.clone(),
        },
        PrepareIndexInput {
            index: index_name.as_str().into(),
            language_code: config.elasticsearch.language_code.clone(),
            pipeline,
            retry: config.retry_policy(),
        },
    )
    .await?;

    runtime.source.ping(ctx).await?;
    let validation = runtime.source.validate_filtering(ctx, &filter).await?;
    if !validation.is_valid() {
        let messages: Vec<String> = validation
            .errors
            .iter()
            .flat_map(|error| {
                error
                    .messages
                    .iter()
                    .map(move |message| format!("{}: {message}", error.rule))
            })
            .collect();
        return Err(ErrorEnvelope::expected(
            ErrorCode::new("source", "invalid_filtering"),
            format!("Invalid filtering: {}", messages.join("; ")),
        ));
    }

    let deps = SyncIndexDeps {
        source: Arc::clone(&runtime.source),
        index: Arc::clone(&runtime.index),
        logger: runtime.logger.clone(),
        telemetry: runtime.telemetry.clone(),
    };
    let mut input = SyncIndexInput::new(index_name.clone());
    input.filter = filter;
    input.pipeline = pipeline_id;
    input.options = sync_options(config);

    let outcome = sync_index(ctx, &deps, input).await;

    Ok(SyncReport {
        index: index_name.as_str().into(),
        service_type: runtime.source.service_type().into(),
        index_created: prepared.created,
        pipeline_created: prepared.pipeline_created,
        result: outcome.result,
        error: outcome.error,
        counters: BTreeMap::new(),
    })
}

/// Build the Elasticsearch-backed runtime and run one pass.
pub async fn run_sync(
    ctx: &RequestContext,
    config: &ValidatedDocsyncConfig,
    env: &DocsyncEnv,
    index: &str,
) -> InfraResult<SyncReport> {
    let client = Arc::new(build_es_client(config, env)?);
    let source = SourceRegistry::with_builtin().build(&config.sources)?;
    let recorder = InMemoryTelemetry::new();
    let telemetry = TaggedTelemetry::new(
        Arc::new(recorder.clone()),
        telemetry_tags([("component", "sync")]),
    );
    let runtime = SyncRuntime {
        admin: client.clone(),
        index: client,
        source,
        logger: Some(Arc::new(TracingLogger::new())),
        telemetry: Some(Arc::new(telemetry)),
    };
    let report = run_sync_with(ctx, &runtime, config, index, Filter::default()).await?;
    Ok(report.with_counters(&recorder.snapshot()))
}
