//! Local directory source: one document per regular file.

use super::{passes_rules, validate_rules};
use chrono::{DateTime, Utc};
use docsync_domain::{
    Document, DocumentId, Filter, FilteringValidationResult, VersionToken, hash_id, iso_utc,
};
use docsync_ports::{BoxFuture, DataSourcePort, DeferredEnrichment, DocumentFeed, SourceItem};
use docsync_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use futures_util::{StreamExt, stream};
use serde_json::Value;
use std::collections::VecDeque;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

/// Service type of [`DirectorySource`].
pub const DIRECTORY_SERVICE_TYPE: &str = "directory";

const FILTERABLE_FIELDS: [&str; 4] = ["path", "name", "extension", "size_in_bytes"];

/// Walks a directory tree breadth first, in file-name order.
///
/// Ids are the md5 of the path relative to the root, timestamps are the
/// file mtime. File contents are read only when the enrichment is fetched.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    /// Source rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

struct Walk {
    root: PathBuf,
    pending: VecDeque<PathBuf>,
    files: VecDeque<(PathBuf, Metadata)>,
}

impl Walk {
    fn new(root: PathBuf) -> Self {
        let mut pending = VecDeque::new();
        pending.push_back(root.clone());
        Self {
            root,
            pending,
            files: VecDeque::new(),
        }
    }

    async fn next_file(&mut self) -> Result<Option<(PathBuf, Metadata)>> {
        loop {
            if let Some(file) = self.files.pop_front() {
                return Ok(Some(file));
            }
            let Some(dir) = self.pending.pop_front() else {
                return Ok(None);
            };

            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|error| io_error(&error, &dir))?;
            let mut collected = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|error| io_error(&error, &dir))?
            {
                collected.push(entry);
            }
            collected.sort_by_key(tokio::fs::DirEntry::file_name);

            for entry in collected {
                let path = entry.path();
                let metadata = entry
                    .metadata()
                    .await
                    .map_err(|error| io_error(&error, &path))?;
                if metadata.is_dir() {
                    self.pending.push_back(path);
                } else if metadata.is_file() {
                    self.files.push_back((path, metadata));
                }
            }
        }
    }

    fn relative_path_for(&self, path: &Path) -> Option<String> {
        let stripped = path.strip_prefix(&self.root).ok()?;
        let normalized = stripped.to_string_lossy().replace('\\', "/");
        let normalized = normalized.trim_start_matches('/');
        if normalized.is_empty() {
            None
        } else {
            Some(normalized.to_owned())
        }
    }

    fn document_for(&self, path: &Path, metadata: &Metadata) -> Result<Option<Document>> {
        let Some(relative) = self.relative_path_for(path) else {
            return Ok(None);
        };
        let id = DocumentId::parse(hash_id(&relative)).map_err(ErrorEnvelope::from)?;
        let modified = metadata
            .modified()
            .map_err(|error| io_error(&error, path))?;
        let timestamp = VersionToken::new(iso_utc(DateTime::<Utc>::from(modified)));
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Some(
            Document::new(id)
                .with_timestamp(timestamp)
                .with_field("path", Value::String(relative))
                .with_field("name", Value::String(name))
                .with_field("extension", Value::String(extension))
                .with_field("size_in_bytes", Value::from(metadata.len())),
        ))
    }
}

fn io_error(error: &std::io::Error, path: &Path) -> ErrorEnvelope {
    ErrorEnvelope::from_error(error)
        .with_metadata("path", path.display().to_string())
        .with_operation("directory.walk")
}

fn text_enrichment(path: PathBuf, id: DocumentId) -> DeferredEnrichment {
    DeferredEnrichment::new(move |trigger, timestamp| async move {
        if !trigger {
            return Ok(None);
        }
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|error| io_error(&error, &path))?;
        let mut document =
            Document::new(id).with_field("text", Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        if let Some(timestamp) = timestamp {
            document = document.with_timestamp(timestamp);
        }
        Ok(Some(document))
    })
}

impl DataSourcePort for DirectorySource {
    fn name(&self) -> &str {
        "Directory"
    }

    fn service_type(&self) -> &str {
        DIRECTORY_SERVICE_TYPE
    }

    fn get_docs(&self, ctx: &RequestContext, filter: Filter) -> DocumentFeed<'_> {
        let state = (Walk::new(self.root.clone()), ctx.clone(), filter);
        stream::try_unfold(state, |(mut walk, ctx, filter)| async move {
            loop {
                ctx.ensure_not_cancelled("directory.get_docs")?;
                let Some((path, metadata)) = walk.next_file().await? else {
                    return Ok(None);
                };
                let Some(document) = walk.document_for(&path, &metadata)? else {
                    continue;
                };
                if !passes_rules(&filter, &document) {
                    continue;
                }
                let enrichment = text_enrichment(path, document.id().clone());
                let item = SourceItem::with_enrichment(document, enrichment);
                return Ok(Some((item, (walk, ctx, filter))));
            }
        })
        .boxed()
    }

    fn validate_filtering(
        &self,
        _ctx: &RequestContext,
        filter: &Filter,
    ) -> BoxFuture<'_, Result<FilteringValidationResult>> {
        let result = validate_rules(filter, &FILTERABLE_FIELDS);
        Box::pin(async move { Ok(result) })
    }

    fn ping(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("directory.ping")?;
            let metadata = tokio::fs::metadata(&self.root)
                .await
                .map_err(|error| io_error(&error, &self.root))?;
            if metadata.is_dir() {
                Ok(())
            } else {
                Err(ErrorEnvelope::expected(
                    ErrorCode::new("source", "not_a_directory"),
                    format!("{} is not a directory", self.root.display()),
                ))
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_domain::{FilterOperator, FilterPolicy, FilterRule};
    use futures_util::TryStreamExt;

    async fn fixture() -> Result<tempfile::TempDir> {
        let dir = tempfile::tempdir().map_err(ErrorEnvelope::from)?;
        tokio::fs::create_dir_all(dir.path().join("sub"))
            .await
            .map_err(ErrorEnvelope::from)?;
        tokio::fs::write(dir.path().join("a.txt"), "alpha")
            .await
            .map_err(ErrorEnvelope::from)?;
        tokio::fs::write(dir.path().join("sub").join("b.md"), "# beta")
            .await
            .map_err(ErrorEnvelope::from)?;
        Ok(dir)
    }

    fn path_of(item: &SourceItem) -> Option<&str> {
        item.document.get("path").and_then(Value::as_str)
    }

    #[tokio::test]
    async fn walks_files_breadth_first_with_hashed_ids() -> Result<()> {
        let dir = fixture().await?;
        let source = DirectorySource::new(dir.path());
        let ctx = RequestContext::new_request();

        let items: Vec<SourceItem> = source.get_docs(&ctx, Filter::default()).try_collect().await?;
        let paths: Vec<_> = items.iter().filter_map(path_of).collect();
        assert_eq!(paths, vec!["a.txt", "sub/b.md"]);

        let first = items.first().map(|item| item.document.id().as_str().to_owned());
        assert_eq!(first, Some(hash_id("a.txt")));
        assert!(items.iter().all(|item| item.document.timestamp().is_some()));
        assert!(items.iter().all(|item| item.document.get("text").is_none()));
        Ok(())
    }

    #[tokio::test]
    async fn enrichment_reads_text_only_when_fetched() -> Result<()> {
        let dir = fixture().await?;
        let source = DirectorySource::new(dir.path());
        let ctx = RequestContext::new_request();
        let mut items: Vec<SourceItem> =
            source.get_docs(&ctx, Filter::default()).try_collect().await?;

        let released = items
            .pop()
            .and_then(|item| item.enrichment)
            .map(DeferredEnrichment::release);
        if let Some(released) = released {
            assert!(released.await?.is_none());
        }

        let fetched = items
            .pop()
            .and_then(|item| item.enrichment)
            .map(|enrichment| enrichment.fetch(Some(VersionToken::new("t1"))));
        let document = match fetched {
            Some(fetched) => fetched.await?,
            None => None,
        };
        assert_eq!(
            document.as_ref().and_then(|doc| doc.get("text")).and_then(Value::as_str),
            Some("alpha")
        );
        assert_eq!(
            document.as_ref().and_then(Document::timestamp),
            Some(&VersionToken::new("t1"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn rules_filter_the_feed() -> Result<()> {
        let dir = fixture().await?;
        let source = DirectorySource::new(dir.path());
        let ctx = RequestContext::new_request();
        let filter = Filter {
            rules: vec![FilterRule {
                field: "extension".to_owned(),
                operator: FilterOperator::Equals,
                value: "md".to_owned(),
                policy: FilterPolicy::Include,
            }],
            advanced: Value::Null,
        };

        assert!(source.validate_filtering(&ctx, &filter).await?.is_valid());
        let items: Vec<SourceItem> = source.get_docs(&ctx, filter).try_collect().await?;
        let paths: Vec<_> = items.iter().filter_map(path_of).collect();
        assert_eq!(paths, vec!["sub/b.md"]);
        Ok(())
    }

    #[tokio::test]
    async fn missing_root_fails_ping_and_feed() -> Result<()> {
        let dir = fixture().await?;
        let source = DirectorySource::new(dir.path().join("missing"));
        let ctx = RequestContext::new_request();

        assert!(source.ping(&ctx).await.is_err());
        let collected: Result<Vec<SourceItem>> =
            source.get_docs(&ctx, Filter::default()).try_collect().await;
        assert!(collected.is_err());

        let file_root = DirectorySource::new(dir.path().join("a.txt"));
        let error = file_root.ping(&ctx).await.err().map(|error| error.code);
        assert_eq!(error, Some(ErrorCode::new("source", "not_a_directory")));
        Ok(())
    }
}
