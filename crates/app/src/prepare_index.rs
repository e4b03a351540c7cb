//! Make sure a content index (and its ingest pipeline) is ready for a sync.

use crate::content_index::{content_index_spec, has_analysis, merge_missing};
use docsync_domain::IndexName;
use docsync_ports::{
    IndexAdminPort, IngestPipelineSpec, LogEvent, LogFields, LogLevel, LoggerPort,
};
use docsync_shared::{ErrorEnvelope, RequestContext, Result, RetryPolicy, retry_async};
use serde_json::Value;
use std::sync::Arc;

/// Input for [`prepare_content_index`].
#[derive(Debug, Clone)]
pub struct PrepareIndexInput {
    /// Raw index name; validated before any call is made.
    pub index: Box<str>,
    /// Language of the analysis settings.
    pub language_code: Box<str>,
    /// Pipeline to create when missing.
    pub pipeline: Option<IngestPipelineSpec>,
    /// Retry policy for every admin call.
    pub retry: RetryPolicy,
}

/// Dependencies required by [`prepare_content_index`].
#[derive(Clone)]
pub struct PrepareIndexDeps {
    /// Index admin adapter.
    pub admin: Arc<dyn IndexAdminPort>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
}

/// What [`prepare_content_index`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepareIndexOutput {
    /// The index was created.
    pub created: bool,
    /// Missing mappings were added.
    pub mappings_updated: bool,
    /// Analysis settings were added.
    pub settings_updated: bool,
    /// The ingest pipeline was created.
    pub pipeline_created: bool,
}

/// Validate the name, create the index when missing, top up mappings and
/// settings, then create the ingest pipeline when configured.
///
/// Mapping and settings updates are best effort: failures are logged and
/// the index is used as is.
#[tracing::instrument(name = "prepare_content_index", skip_all, fields(index = %input.index))]
pub async fn prepare_content_index(
    ctx: &RequestContext,
    deps: &PrepareIndexDeps,
    input: PrepareIndexInput,
) -> Result<PrepareIndexOutput> {
    ctx.ensure_not_cancelled("prepare_content_index")?;
    let index = IndexName::parse(&input.index).map_err(ErrorEnvelope::from)?;
    let spec = content_index_spec(&input.language_code);
    let admin = deps.admin.as_ref();
    let policy = input.retry;
    let mut output = PrepareIndexOutput::default();

    let exists = retry_async(ctx, policy, "index.exists", || admin.index_exists(ctx, &index)).await?;
    if !exists {
        retry_async(ctx, policy, "index.create", || {
            admin.create_content_index(ctx, &index, spec.clone())
        })
        .await?;
        output.created = true;
        log(deps, LogLevel::Info, "index.created", "Created content index", &index);
    }

    match ensure_mappings(ctx, admin, policy, &index, &spec.mappings).await {
        Ok(updated) => output.mappings_updated = updated,
        Err(error) => warn_failure(deps, "index.mappings.failed", &error, &index),
    }
    match ensure_settings(ctx, admin, policy, &index, &spec.settings).await {
        Ok(updated) => output.settings_updated = updated,
        Err(error) => warn_failure(deps, "index.settings.failed", &error, &index),
    }

    if let Some(pipeline) = input.pipeline {
        let id = pipeline.id.clone();
        let present =
            retry_async(ctx, policy, "pipeline.exists", || admin.pipeline_exists(ctx, &id)).await?;
        if !present {
            retry_async(ctx, policy, "pipeline.put", || {
                admin.put_pipeline(ctx, pipeline.clone())
            })
            .await?;
            output.pipeline_created = true;
            log(deps, LogLevel::Info, "pipeline.created", "Created ingest pipeline", &index);
        }
    }

    Ok(output)
}

async fn ensure_mappings(
    ctx: &RequestContext,
    admin: &dyn IndexAdminPort,
    policy: RetryPolicy,
    index: &IndexName,
    desired: &Value,
) -> Result<bool> {
    let existing = retry_async(ctx, policy, "index.get_mappings", || {
        admin.get_mappings(ctx, index)
    })
    .await?;
    let merged = if is_empty_object(&existing) {
        desired.clone()
    } else {
        merge_missing(&existing, desired)
    };
    if merged == existing {
        return Ok(false);
    }
    retry_async(ctx, policy, "index.put_mappings", || {
        admin.put_mappings(ctx, index, merged.clone())
    })
    .await?;
    Ok(true)
}

async fn ensure_settings(
    ctx: &RequestContext,
    admin: &dyn IndexAdminPort,
    policy: RetryPolicy,
    index: &IndexName,
    desired: &Value,
) -> Result<bool> {
    let existing = retry_async(ctx, policy, "index.get_settings", || {
        admin.get_settings(ctx, index)
    })
    .await?;
    if has_analysis(&existing) {
        return Ok(false);
    }
    retry_async(ctx, policy, "index.put_settings", || {
        admin.put_settings(ctx, index, desired.clone())
    })
    .await?;
    Ok(true)
}

fn is_empty_object(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn index_fields(index: &IndexName) -> LogFields {
    LogFields::from([(Box::from("index"), Value::from(index.as_str()))])
}

fn log(deps: &PrepareIndexDeps, level: LogLevel, event: &str, message: &str, index: &IndexName) {
    if let Some(logger) = deps.logger.as_ref() {
        logger.log(LogEvent::new(level, event, message).with_fields(Some(index_fields(index))));
    }
}

fn warn_failure(deps: &PrepareIndexDeps, event: &str, error: &ErrorEnvelope, index: &IndexName) {
    if error.is_cancelled() {
        return;
    }
    if let Some(logger) = deps.logger.as_ref() {
        logger.failure(LogLevel::Warn, event, error, Some(index_fields(index)));
    }
}
