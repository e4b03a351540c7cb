//! Retry-wrapped index and secret administration for the CLI.

use crate::InfraResult;
use docsync_domain::IndexName;
use docsync_ports::IndexAdminPort;
use docsync_shared::{ErrorEnvelope, RequestContext, RetryPolicy, SecretString, retry_async};
use serde::Serialize;

/// One row of `index list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexListing {
    /// Index name.
    pub name: Box<str>,
    /// Document count, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_count: Option<u64>,
}

/// List indices sorted by name.
pub async fn list_indices(
    ctx: &RequestContext,
    admin: &dyn IndexAdminPort,
    policy: RetryPolicy,
) -> InfraResult<Vec<IndexListing>> {
    let indices = retry_async(ctx, policy, "index.list", || admin.list_indices(ctx)).await?;
    Ok(indices
        .into_iter()
        .map(|(name, summary)| IndexListing {
            name,
            docs_count: summary.docs_count,
        })
        .collect())
}

/// Delete every document of `index`; returns the deleted count.
pub async fn clean_index(
    ctx: &RequestContext,
    admin: &dyn IndexAdminPort,
    policy: RetryPolicy,
    index: &str,
) -> InfraResult<u64> {
    let index = IndexName::parse(index).map_err(ErrorEnvelope::from)?;
    let deleted = retry_async(ctx, policy, "index.clean", || admin.clean_index(ctx, &index)).await?;
    tracing::info!(index = %index, deleted, "index cleaned");
    Ok(deleted)
}

/// Delete `indices`, ignoring missing ones. Every name is validated first.
pub async fn delete_indices(
    ctx: &RequestContext,
    admin: &dyn IndexAdminPort,
    policy: RetryPolicy,
    indices: &[String],
) -> InfraResult<Vec<Box<str>>> {
    let names = indices
        .iter()
        .map(|name| IndexName::parse(name).map_err(ErrorEnvelope::from))
        .collect::<InfraResult<Vec<_>>>()?;
    retry_async(ctx, policy, "index.delete", || {
        admin.delete_indices(ctx, names.clone())
    })
    .await?;
    tracing::info!(count = names.len(), "indices deleted");
    Ok(names.iter().map(|name| Box::from(name.as_str())).collect())
}

/// Store a secret; returns its id.
pub async fn create_secret(
    ctx: &RequestContext,
    admin: &dyn IndexAdminPort,
    policy: RetryPolicy,
    value: SecretString,
) -> InfraResult<Box<str>> {
    retry_async(ctx, policy, "secret.create", || {
        admin.create_secret(ctx, value.clone())
    })
    .await
}

/// Read a secret by id.
pub async fn get_secret(
    ctx: &RequestContext,
    admin: &dyn IndexAdminPort,
    policy: RetryPolicy,
    id: &str,
) -> InfraResult<SecretString> {
    retry_async(ctx, policy, "secret.get", || admin.get_secret(ctx, id)).await
}
