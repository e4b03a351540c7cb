//! In-test fakes for the sync engine ports.

#![allow(dead_code, reason = "each test binary uses a different subset of helpers")]

use docsync_domain::{Document, DocumentId, ExistingRecord, Filter, FilteringValidationResult};
use docsync_domain::{IndexName, VersionToken, WriteIntent};
use docsync_ports::{
    BoxFuture, BoxStream, BulkItemOutcome, BulkOpKind, BulkRequest, BulkResponse, DataSourcePort,
    DeferredEnrichment, DocumentFeed, LogEvent, LogFields, LoggerPort, SearchIndexPort, SourceItem,
};
use docsync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use futures_util::{StreamExt, stream};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn doc_id(value: &str) -> Result<DocumentId> {
    DocumentId::parse(value).map_err(ErrorEnvelope::from)
}

pub fn index_name(value: &str) -> Result<IndexName> {
    IndexName::parse(value).map_err(ErrorEnvelope::from)
}

pub fn document(id: &str, timestamp: Option<&str>) -> Result<Document> {
    let mut document = Document::new(doc_id(id)?).with_field("title", json!(format!("doc {id}")));
    if let Some(timestamp) = timestamp {
        document = document.with_timestamp(VersionToken::new(timestamp));
    }
    Ok(document)
}

pub fn retriable(message: &str) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(ErrorCode::unavailable(), message, ErrorClass::Retriable)
}

/// Search index fake holding documents in a map and recording bulk calls.
#[derive(Default)]
pub struct RecordingIndex {
    pub documents: Mutex<BTreeMap<DocumentId, Document>>,
    pub calls: Mutex<Vec<BulkRequest>>,
    pub scan_error: Option<ErrorEnvelope>,
    /// Number of leading bulk calls that fail with a retriable error.
    pub failing_calls: AtomicUsize,
    /// Ids whose operations are rejected inside successful calls.
    pub rejected: HashSet<DocumentId>,
}

impl RecordingIndex {
    pub fn with_documents(documents: Vec<Document>) -> Self {
        let index = Self::default();
        if let Ok(mut stored) = index.documents.lock() {
            for document in documents {
                stored.insert(document.id().clone(), document);
            }
        }
        index
    }

    pub fn call_sizes(&self) -> Vec<usize> {
        self.calls
            .lock()
            .map(|calls| calls.iter().map(|call| call.intents.len()).collect())
            .unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<BulkRequest> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn intents(&self) -> Vec<WriteIntent> {
        self.calls
            .lock()
            .map(|calls| calls.iter().flat_map(|call| call.intents.clone()).collect())
            .unwrap_or_default()
    }

    pub fn stored_ids(&self) -> Vec<String> {
        self.documents
            .lock()
            .map(|docs| docs.keys().map(|id| id.as_str().to_owned()).collect())
            .unwrap_or_default()
    }

    pub fn stored(&self, id: &str) -> Option<Document> {
        let id = doc_id(id).ok()?;
        self.documents.lock().ok()?.get(&id).cloned()
    }

    fn apply(&self, request: &BulkRequest) -> BulkResponse {
        let mut items = Vec::with_capacity(request.intents.len());
        let Ok(mut documents) = self.documents.lock() else {
            return BulkResponse::default();
        };
        for intent in &request.intents {
            let op = BulkOpKind::from(intent);
            let id = intent.id().clone();
            if self.rejected.contains(&id) {
                items.push(BulkItemOutcome {
                    op,
                    id,
                    status: 400,
                    error: Some("mapper_parsing_exception".into()),
                });
                continue;
            }
            match intent {
                WriteIntent::Upsert { document, .. } => match documents.get_mut(&id) {
                    Some(existing) => existing.merge(document.clone()),
                    None => {
                        documents.insert(id.clone(), document.clone());
                    },
                },
                WriteIntent::Delete { .. } => {
                    documents.remove(&id);
                },
            }
            items.push(BulkItemOutcome::ok(op, id));
        }
        BulkResponse { took_ms: 1, items }
    }
}

impl SearchIndexPort for RecordingIndex {
    fn scan_existing(
        &self,
        _ctx: &RequestContext,
        _index: &IndexName,
    ) -> BoxStream<'_, Result<ExistingRecord>> {
        if let Some(error) = self.scan_error.clone() {
            return stream::iter(vec![Err(error)]).boxed();
        }
        let records: Vec<Result<ExistingRecord>> = self
            .documents
            .lock()
            .map(|docs| {
                docs.values()
                    .map(|doc| Ok(ExistingRecord::new(doc.id().clone(), doc.timestamp().cloned())))
                    .collect()
            })
            .unwrap_or_default();
        stream::iter(records).boxed()
    }

    fn bulk(&self, _ctx: &RequestContext, request: BulkRequest) -> BoxFuture<'_, Result<BulkResponse>> {
        Box::pin(async move {
            let failing = self.failing_calls.load(Ordering::SeqCst);
            if failing > 0 {
                self.failing_calls.store(failing - 1, Ordering::SeqCst);
                return Err(retriable("connection reset"));
            }
            let response = self.apply(&request);
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(request);
            }
            Ok(response)
        })
    }
}

/// One scripted feed entry.
pub struct FeedEntry {
    pub document: Document,
    /// `Some(Ok(doc))` enriches, `Some(Err(..))` fails, `None` has no enrichment.
    pub enrichment: Option<Result<Option<Document>>>,
    /// How long the enrichment takes once triggered.
    pub delay: Option<Duration>,
}

impl FeedEntry {
    pub const fn plain(document: Document) -> Self {
        Self {
            document,
            enrichment: None,
            delay: None,
        }
    }

    pub const fn enriched(document: Document, result: Result<Option<Document>>) -> Self {
        Self {
            document,
            enrichment: Some(result),
            delay: None,
        }
    }

    pub const fn slow(document: Document, result: Result<Option<Document>>, delay: Duration) -> Self {
        Self {
            document,
            enrichment: Some(result),
            delay: Some(delay),
        }
    }
}

/// Source fake replaying a scripted feed; records enrichment triggers.
#[derive(Default)]
pub struct ScriptedSource {
    entries: Mutex<Vec<FeedEntry>>,
    fail_after: Option<usize>,
    pub triggers: Arc<Mutex<Vec<(String, bool)>>>,
}

impl ScriptedSource {
    pub fn new(entries: Vec<FeedEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Self::default()
        }
    }

    /// Fail the feed after `count` items.
    pub fn failing_after(entries: Vec<FeedEntry>, count: usize) -> Self {
        Self {
            entries: Mutex::new(entries),
            fail_after: Some(count),
            ..Self::default()
        }
    }

    pub fn trigger_log(&self) -> Vec<(String, bool)> {
        self.triggers
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    fn item(&self, entry: FeedEntry) -> SourceItem {
        let FeedEntry {
            document,
            enrichment,
            delay,
        } = entry;
        let Some(result) = enrichment else {
            return SourceItem::plain(document);
        };
        let triggers = Arc::clone(&self.triggers);
        let id = document.id().as_str().to_owned();
        SourceItem::with_enrichment(
            document,
            DeferredEnrichment::new(move |trigger, _timestamp| async move {
                if let Ok(mut log) = triggers.lock() {
                    log.push((id, trigger));
                }
                if !trigger {
                    return Ok(None);
                }
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                result
            }),
        )
    }
}

impl DataSourcePort for ScriptedSource {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn service_type(&self) -> &str {
        "scripted"
    }

    fn get_docs(&self, _ctx: &RequestContext, _filter: Filter) -> DocumentFeed<'_> {
        let entries = self
            .entries
            .lock()
            .map(|mut entries| std::mem::take(&mut *entries))
            .unwrap_or_default();
        let mut items: Vec<Result<SourceItem>> = Vec::new();
        for (position, entry) in entries.into_iter().enumerate() {
            if self.fail_after == Some(position) {
                items.push(Err(retriable("source went away")));
                break;
            }
            items.push(Ok(self.item(entry)));
        }
        stream::iter(items).boxed()
    }

    fn validate_filtering(
        &self,
        _ctx: &RequestContext,
        _filter: &Filter,
    ) -> BoxFuture<'_, Result<FilteringValidationResult>> {
        Box::pin(async { Ok(FilteringValidationResult::valid()) })
    }

    fn ping(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Logger capturing every event.
#[derive(Default, Clone)]
pub struct CaptureLogger {
    pub events: Arc<Mutex<Vec<LogEvent>>>,
}

impl CaptureLogger {
    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .map(|events| events.iter().map(|event| event.event.to_string()).collect())
            .unwrap_or_default()
    }

    pub fn messages(&self, name: &str) -> Vec<String> {
        self.events
            .lock()
            .map(|events| {
                events
                    .iter()
                    .filter(|event| &*event.event == name)
                    .map(|event| event.message.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl LoggerPort for CaptureLogger {
    fn log(&self, event: LogEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    fn child(&self, _fields: LogFields) -> Box<dyn LoggerPort> {
        Box::new(self.clone())
    }
}

pub fn text_of(document: &Document) -> Option<&str> {
    document.get("text").and_then(Value::as_str)
}
