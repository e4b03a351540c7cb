//! Deterministic in-memory source for demos and tests.

use super::{passes_rules, validate_rules};
use docsync_domain::{Document, DocumentId, Filter, FilteringValidationResult, VersionToken};
use docsync_ports::{BoxFuture, DataSourcePort, DeferredEnrichment, DocumentFeed, SourceItem};
use docsync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use futures_util::{StreamExt, stream};
use serde_json::Value;

/// Service type of [`FakeSource`].
pub const FAKE_SERVICE_TYPE: &str = "fake";

/// Stable version token, so repeated passes see unchanged documents.
const FAKE_TIMESTAMP: &str = "2022-10-31T09:04:35.277558+00:00";

const FILTERABLE_FIELDS: [&str; 2] = ["title", "parity"];

/// Yields documents `"1"..="count"` with a stable timestamp. The
/// enrichment adds a `text` field.
#[derive(Debug, Clone)]
pub struct FakeSource {
    count: usize,
    fail_after: Option<usize>,
}

impl FakeSource {
    /// Source producing `count` documents.
    #[must_use]
    pub const fn new(count: usize) -> Self {
        Self {
            count,
            fail_after: None,
        }
    }

    /// Make the feed fail after `yielded` documents.
    #[must_use]
    pub const fn failing_after(mut self, yielded: usize) -> Self {
        self.fail_after = Some(yielded);
        self
    }

    fn document(position: usize) -> Result<Document> {
        let id = DocumentId::parse((position + 1).to_string()).map_err(ErrorEnvelope::from)?;
        let parity = if position % 2 == 0 { "odd" } else { "even" };
        Ok(Document::new(id)
            .with_timestamp(VersionToken::new(FAKE_TIMESTAMP))
            .with_field("title", Value::String(format!("Fake document {}", position + 1)))
            .with_field("parity", Value::from(parity)))
    }
}

fn feed_failure(position: usize) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::new("source", "fake_failure"),
        "I fail while syncing",
        ErrorClass::NonRetriable,
    )
    .with_metadata("position", position.to_string())
}

fn text_enrichment(id: DocumentId) -> DeferredEnrichment {
    DeferredEnrichment::new(move |trigger, timestamp| async move {
        if !trigger {
            return Ok(None);
        }
        let mut document = Document::new(id).with_field("text", Value::from("xx"));
        if let Some(timestamp) = timestamp {
            document = document.with_timestamp(timestamp);
        }
        Ok(Some(document))
    })
}

impl DataSourcePort for FakeSource {
    fn name(&self) -> &str {
        "Fakey"
    }

    fn service_type(&self) -> &str {
        FAKE_SERVICE_TYPE
    }

    fn get_docs(&self, ctx: &RequestContext, filter: Filter) -> DocumentFeed<'_> {
        let ctx = ctx.clone();
        let count = self.count;
        let fail_after = self.fail_after;
        stream::iter(0..count)
            .map(move |position| -> Result<Option<SourceItem>> {
                ctx.ensure_not_cancelled("fake.get_docs")?;
                if fail_after.is_some_and(|limit| position >= limit) {
                    return Err(feed_failure(position));
                }
                let document = Self::document(position)?;
                if !passes_rules(&filter, &document) {
                    return Ok(None);
                }
                let enrichment = text_enrichment(document.id().clone());
                Ok(Some(SourceItem::with_enrichment(document, enrichment)))
            })
            .filter_map(|item| async move { item.transpose() })
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
        Box::pin(async move { ctx.ensure_not_cancelled("fake.ping") })
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

    #[tokio::test]
    async fn yields_numbered_documents() -> Result<()> {
        let ctx = RequestContext::new_request();
        let items: Vec<SourceItem> = FakeSource::new(3)
            .get_docs(&ctx, Filter::default())
            .try_collect()
            .await?;
        let ids: Vec<&str> = items.iter().map(|item| item.document.id().as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert!(items.iter().all(|item| item.enrichment.is_some()));
        Ok(())
    }

    #[tokio::test]
    async fn failure_surfaces_after_prefix() -> Result<()> {
        let ctx = RequestContext::new_request();
        let source = FakeSource::new(5).failing_after(2);
        let mut feed = source.get_docs(&ctx, Filter::default());

        let mut yielded = 0;
        let mut failed = false;
        while let Some(item) = feed.next().await {
            match item {
                Ok(_) => yielded += 1,
                Err(error) => {
                    assert_eq!(error.code, ErrorCode::new("source", "fake_failure"));
                    failed = true;
                    break;
                },
            }
        }
        assert_eq!(yielded, 2);
        assert!(failed);
        Ok(())
    }

    #[tokio::test]
    async fn parity_rule_keeps_even_documents() -> Result<()> {
        let ctx = RequestContext::new_request();
        let filter = Filter {
            rules: vec![FilterRule {
                field: "parity".to_owned(),
                operator: FilterOperator::Equals,
                value: "even".to_owned(),
                policy: FilterPolicy::Include,
            }],
            advanced: Value::Null,
        };
        let source = FakeSource::new(4);
        assert!(source.validate_filtering(&ctx, &filter).await?.is_valid());

        let items: Vec<SourceItem> = source.get_docs(&ctx, filter).try_collect().await?;
        let ids: Vec<&str> = items.iter().map(|item| item.document.id().as_str()).collect();
        assert_eq!(ids, vec!["2", "4"]);
        Ok(())
    }
}
