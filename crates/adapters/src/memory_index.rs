//! In-memory search index implementing both index ports.
//!
//! Used for local runs without a cluster and as a deterministic stand-in in
//! tests. Every bulk call is recorded in order.

use docsync_domain::{Document, DocumentId, ExistingRecord, IndexName, WriteIntent};
use docsync_ports::{
    BoxFuture, BoxStream, BulkItemOutcome, BulkOpKind, BulkRequest, BulkResponse,
    ContentIndexSpec, IndexAdminPort, IndexSummary, IngestPipelineSpec, SearchIndexPort,
};
use docsync_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result, SecretString};
use futures_util::{StreamExt, stream};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredIndex {
    documents: BTreeMap<DocumentId, Document>,
    settings: Value,
    mappings: Value,
}

impl StoredIndex {
    fn empty() -> Self {
        Self {
            documents: BTreeMap::new(),
            settings: json!({}),
            mappings: json!({}),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    indices: BTreeMap<String, StoredIndex>,
    pipelines: BTreeMap<String, IngestPipelineSpec>,
    secrets: BTreeMap<String, SecretString>,
    bulk_calls: Vec<BulkRequest>,
}

/// In-memory index store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemorySearchIndex {
    state: Arc<RwLock<State>>,
}

impl InMemorySearchIndex {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an index with documents, creating it when missing.
    pub async fn insert_documents(&self, index: &IndexName, documents: Vec<Document>) {
        let mut state = self.state.write().await;
        let stored = state
            .indices
            .entry(index.as_str().to_owned())
            .or_insert_with(StoredIndex::empty);
        for document in documents {
            stored.documents.insert(document.id().clone(), document);
        }
    }

    /// Documents of an index, in id order.
    pub async fn documents(&self, index: &IndexName) -> Vec<Document> {
        let state = self.state.read().await;
        state
            .indices
            .get(index.as_str())
            .map(|stored| stored.documents.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every bulk call received so far.
    pub async fn bulk_calls(&self) -> Vec<BulkRequest> {
        self.state.read().await.bulk_calls.clone()
    }
}

fn missing_index(index: &IndexName) -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::new("index", "not_found"),
        format!("no such index [{}]", index.as_str()),
    )
    .with_metadata("index", index.as_str())
}

fn apply_intent(stored: &mut StoredIndex, intent: WriteIntent) -> BulkItemOutcome {
    let op = BulkOpKind::from(&intent);
    match intent {
        WriteIntent::Upsert { id, document } => {
            match stored.documents.get_mut(&id) {
                Some(existing) => existing.merge(document),
                None => {
                    stored.documents.insert(id.clone(), document);
                },
            }
            BulkItemOutcome::ok(op, id)
        },
        WriteIntent::Delete { id } => {
            let status = if stored.documents.remove(&id).is_some() { 200 } else { 404 };
            BulkItemOutcome {
                op,
                id,
                status,
                error: None,
            }
        },
    }
}

impl SearchIndexPort for InMemorySearchIndex {
    fn scan_existing(
        &self,
        ctx: &RequestContext,
        index: &IndexName,
    ) -> BoxStream<'_, Result<ExistingRecord>> {
        let ctx = ctx.clone();
        let index = index.clone();
        stream::once(async move {
            if let Err(error) = ctx.ensure_not_cancelled("memory.scan_existing") {
                return vec![Err(error)];
            }
            let state = self.state.read().await;
            state
                .indices
                .get(index.as_str())
                .map(|stored| {
                    stored
                        .documents
                        .values()
                        .map(|document| {
                            Ok(ExistingRecord::new(
                                document.id().clone(),
                                document.timestamp().cloned(),
                            ))
                        })
                        .collect()
                })
                .unwrap_or_default()
        })
        .flat_map(stream::iter)
        .boxed()
    }

    fn bulk(&self, ctx: &RequestContext, request: BulkRequest) -> BoxFuture<'_, Result<BulkResponse>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("memory.bulk")?;
            let mut state = self.state.write().await;
            state.bulk_calls.push(request.clone());
            let stored = state
                .indices
                .entry(request.index.as_str().to_owned())
                .or_insert_with(StoredIndex::empty);
            let items = request
                .intents
                .into_iter()
                .map(|intent| apply_intent(stored, intent))
                .collect();
            Ok(BulkResponse { took_ms: 0, items })
        })
    }
}

impl IndexAdminPort for InMemorySearchIndex {
    fn ping(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move { ctx.ensure_not_cancelled("memory.ping") })
    }

    fn index_exists(&self, _ctx: &RequestContext, index: &IndexName) -> BoxFuture<'_, Result<bool>> {
        let index = index.clone();
        Box::pin(async move { Ok(self.state.read().await.indices.contains_key(index.as_str())) })
    }

    fn ensure_exists(
        &self,
        _ctx: &RequestContext,
        indices: Vec<IndexName>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            for index in indices {
                state
                    .indices
                    .entry(index.as_str().to_owned())
                    .or_insert_with(StoredIndex::empty);
            }
            Ok(())
        })
    }

    fn create_content_index(
        &self,
        _ctx: &RequestContext,
        index: &IndexName,
        spec: ContentIndexSpec,
    ) -> BoxFuture<'_, Result<()>> {
        let index = index.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            if state.indices.contains_key(index.as_str()) {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::new("index", "http_status"),
                    format!("index [{}] already exists", index.as_str()),
                ));
            }
            state.indices.insert(
                index.as_str().to_owned(),
                StoredIndex {
                    documents: BTreeMap::new(),
                    settings: spec.settings,
                    mappings: spec.mappings,
                },
            );
            Ok(())
        })
    }

    fn get_mappings(&self, _ctx: &RequestContext, index: &IndexName) -> BoxFuture<'_, Result<Value>> {
        let index = index.clone();
        Box::pin(async move {
            let state = self.state.read().await;
            state
                .indices
                .get(index.as_str())
                .map(|stored| stored.mappings.clone())
                .ok_or_else(|| missing_index(&index))
        })
    }

    fn put_mappings(
        &self,
        _ctx: &RequestContext,
        index: &IndexName,
        mappings: Value,
    ) -> BoxFuture<'_, Result<()>> {
        let index = index.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            let stored = state
                .indices
                .get_mut(index.as_str())
                .ok_or_else(|| missing_index(&index))?;
            stored.mappings = mappings;
            Ok(())
        })
    }

    fn get_settings(&self, _ctx: &RequestContext, index: &IndexName) -> BoxFuture<'_, Result<Value>> {
        let index = index.clone();
        Box::pin(async move {
            let state = self.state.read().await;
            state
                .indices
                .get(index.as_str())
                .map(|stored| json!({ "index": stored.settings }))
                .ok_or_else(|| missing_index(&index))
        })
    }

    fn put_settings(
        &self,
        _ctx: &RequestContext,
        index: &IndexName,
        settings: Value,
    ) -> BoxFuture<'_, Result<()>> {
        let index = index.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            let stored = state
                .indices
                .get_mut(index.as_str())
                .ok_or_else(|| missing_index(&index))?;
            if let (Some(current), Some(update)) = (stored.settings.as_object_mut(), settings.as_object()) {
                current.extend(update.iter().map(|(key, value)| (key.clone(), value.clone())));
            } else {
                stored.settings = settings;
            }
            Ok(())
        })
    }

    fn pipeline_exists(&self, _ctx: &RequestContext, id: &str) -> BoxFuture<'_, Result<bool>> {
        let id = id.to_owned();
        Box::pin(async move { Ok(self.state.read().await.pipelines.contains_key(&id)) })
    }

    fn put_pipeline(
        &self,
        _ctx: &RequestContext,
        pipeline: IngestPipelineSpec,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.pipelines.insert(pipeline.id.to_string(), pipeline);
            Ok(())
        })
    }

    fn delete_indices(
        &self,
        _ctx: &RequestContext,
        indices: Vec<IndexName>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            for index in indices {
                state.indices.remove(index.as_str());
            }
            Ok(())
        })
    }

    fn clean_index(&self, _ctx: &RequestContext, index: &IndexName) -> BoxFuture<'_, Result<u64>> {
        let index = index.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            let deleted = state
                .indices
                .get_mut(index.as_str())
                .map(|stored| std::mem::take(&mut stored.documents).len())
                .unwrap_or(0);
            Ok(u64::try_from(deleted).unwrap_or(u64::MAX))
        })
    }

    fn list_indices(
        &self,
        _ctx: &RequestContext,
    ) -> BoxFuture<'_, Result<BTreeMap<Box<str>, IndexSummary>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .indices
                .iter()
                .map(|(name, stored)| {
                    let docs_count = u64::try_from(stored.documents.len()).ok();
                    (name.as_str().into(), IndexSummary { docs_count })
                })
                .collect())
        })
    }

    fn create_secret(
        &self,
        _ctx: &RequestContext,
        value: SecretString,
    ) -> BoxFuture<'_, Result<Box<str>>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let id = format!("secret-{}", state.secrets.len() + 1);
            state.secrets.insert(id.clone(), value);
            Ok(id.into_boxed_str())
        })
    }

    fn get_secret(&self, _ctx: &RequestContext, id: &str) -> BoxFuture<'_, Result<SecretString>> {
        let id = id.to_owned();
        Box::pin(async move {
            let state = self.state.read().await;
            state.secrets.get(&id).cloned().ok_or_else(|| {
                ErrorEnvelope::expected(
                    ErrorCode::new("index", "not_found"),
                    format!("secret [{id}] not found"),
                )
            })
        })
    }
}
