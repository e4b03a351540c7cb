//! Existing index snapshot: `(id, timestamp)` of every indexed document.

use super::types::index_access_error;
use docsync_domain::{DocumentId, IndexName, VersionToken};
use docsync_ports::SearchIndexPort;
use docsync_shared::{RequestContext, Result};
use futures_util::StreamExt;
use std::collections::HashMap;

/// Ids present in the index with their last-known version token.
///
/// Held in memory for one pass; size grows linearly with the index.
pub type ExistingSnapshot = HashMap<DocumentId, Option<VersionToken>>;

/// Read the snapshot of `index`.
///
/// A missing index reads as empty. Any other failure is an index access
/// error and aborts the pass before anything is written.
pub async fn load_snapshot(
    ctx: &RequestContext,
    index: &dyn SearchIndexPort,
    index_name: &IndexName,
) -> Result<ExistingSnapshot> {
    ctx.ensure_not_cancelled("sync.snapshot")?;

    let mut snapshot = ExistingSnapshot::new();
    let mut records = index.scan_existing(ctx, index_name);
    while let Some(record) = records.next().await {
        let record = record.map_err(|error| index_access_error(index_name, error))?;
        snapshot.insert(record.id, record.timestamp);
    }
    Ok(snapshot)
}
