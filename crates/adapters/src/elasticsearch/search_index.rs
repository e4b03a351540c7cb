//! Sync read/write path: snapshot scan and NDJSON bulk calls.

use super::client::{Body, ElasticsearchClient};
use super::error::{EsErrorContext, error_reason, invalid_response};
use docsync_domain::{DocumentId, ExistingRecord, IndexName, TIMESTAMP_FIELD, WriteIntent};
use docsync_ports::{
    BoxFuture, BoxStream, BulkItemOutcome, BulkOpKind, BulkRequest, BulkResponse,
    SearchIndexPort,
};
use docsync_shared::{ErrorEnvelope, RequestContext, Result};
use futures_util::{StreamExt, TryStreamExt, stream};
use reqwest::Method;
use serde_json::{Value, json};

struct ScanState {
    client: ElasticsearchClient,
    ctx: RequestContext,
    index: IndexName,
    search_after: Option<Value>,
    done: bool,
}

impl ElasticsearchClient {
    async fn scan_page(&self, state: &mut ScanState) -> Result<Vec<ExistingRecord>> {
        let path = format!("/{}/_search", state.index.as_str());
        let err_ctx = EsErrorContext::new("es.scan_existing", &path, Some(state.index.as_str()));
        let mut body = json!({
            "size": self.scan_page_size,
            "sort": ["_doc"],
            "_source": ["id", TIMESTAMP_FIELD],
            "query": { "match_all": {} },
        });
        if let (Some(after), Some(map)) = (state.search_after.take(), body.as_object_mut()) {
            map.insert("search_after".to_owned(), after);
        }

        let Some(response) = self
            .call_optional(&state.ctx, Method::POST, &path, &[], Body::Json(body), &err_ctx)
            .await?
        else {
            state.done = true;
            return Ok(Vec::new());
        };

        let hits = response
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid_response(&err_ctx, "missing hits.hits"))?;
        if hits.len() < self.scan_page_size {
            state.done = true;
        }
        state.search_after = hits.last().and_then(|hit| hit.get("sort")).cloned();
        if state.search_after.is_none() {
            state.done = true;
        }
        hits.iter().map(|hit| existing_record(hit, &err_ctx)).collect()
    }
}

/// `_source.id` with the hit's `_id` as fallback.
fn existing_record(hit: &Value, err_ctx: &EsErrorContext) -> Result<ExistingRecord> {
    let source = hit.get("_source").cloned().unwrap_or_else(|| json!({}));
    if source.get("id").is_some() {
        return ExistingRecord::from_source(&source).map_err(ErrorEnvelope::from);
    }
    let raw_id = hit
        .get("_id")
        .ok_or_else(|| invalid_response(err_ctx, "hit without _id"))?;
    let id = DocumentId::from_json(raw_id).map_err(ErrorEnvelope::from)?;
    let mut projection = json!({ "id": id.as_str() });
    if let (Some(timestamp), Some(map)) = (source.get(TIMESTAMP_FIELD), projection.as_object_mut())
    {
        map.insert(TIMESTAMP_FIELD.to_owned(), timestamp.clone());
    }
    ExistingRecord::from_source(&projection).map_err(ErrorEnvelope::from)
}

/// Encode intents as `_bulk` NDJSON: `update` with `doc_as_upsert`, bare `delete`.
pub fn encode_bulk(index: &IndexName, intents: &[WriteIntent]) -> String {
    let mut lines = String::new();
    for intent in intents {
        let target = json!({ "_index": index.as_str(), "_id": intent.id().as_str() });
        match intent {
            WriteIntent::Upsert { document, .. } => {
                lines.push_str(&json!({ "update": target }).to_string());
                lines.push('\n');
                let body = json!({ "doc": Value::Object(document.to_source()), "doc_as_upsert": true });
                lines.push_str(&body.to_string());
                lines.push('\n');
            },
            WriteIntent::Delete { .. } => {
                lines.push_str(&json!({ "delete": target }).to_string());
                lines.push('\n');
            },
        }
    }
    lines
}

/// Parse a `_bulk` response, pairing items with the intents that produced them.
pub fn parse_bulk_response(
    response: &Value,
    intents: &[WriteIntent],
    err_ctx: &EsErrorContext,
) -> Result<BulkResponse> {
    let items = response
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid_response(err_ctx, "missing items"))?;
    if items.len() != intents.len() {
        return Err(invalid_response(
            err_ctx,
            format!("expected {} items, got {}", intents.len(), items.len()),
        ));
    }

    let outcomes = items
        .iter()
        .zip(intents)
        .map(|(item, intent)| {
            let op = BulkOpKind::from(intent);
            let result = item.get(op.as_str()).unwrap_or(item);
            let status = result
                .get("status")
                .and_then(Value::as_u64)
                .and_then(|status| u16::try_from(status).ok())
                .unwrap_or(500);
            let error = error_reason(result).map(String::into_boxed_str);
            BulkItemOutcome {
                op,
                id: intent.id().clone(),
                status,
                error,
            }
        })
        .collect();

    Ok(BulkResponse {
        took_ms: response.get("took").and_then(Value::as_u64).unwrap_or(0),
        items: outcomes,
    })
}

impl SearchIndexPort for ElasticsearchClient {
    fn scan_existing(
        &self,
        ctx: &RequestContext,
        index: &IndexName,
    ) -> BoxStream<'_, Result<ExistingRecord>> {
        let state = ScanState {
            client: self.clone(),
            ctx: ctx.clone(),
            index: index.clone(),
            search_after: None,
            done: false,
        };
        stream::try_unfold(state, |mut state| async move {
            if state.done {
                return Ok::<_, ErrorEnvelope>(None);
            }
            let client = state.client.clone();
            let page = client.scan_page(&mut state).await?;
            Ok(Some((page, state)))
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }

    fn bulk(&self, ctx: &RequestContext, request: BulkRequest) -> BoxFuture<'_, Result<BulkResponse>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let err_ctx = EsErrorContext::new("es.bulk", "/_bulk", Some(request.index.as_str()));
            if request.intents.is_empty() {
                return Ok(BulkResponse::default());
            }
            let payload = encode_bulk(&request.index, &request.intents);
            let pipeline = request.pipeline.as_deref();
            let query: Vec<(&str, &str)> = pipeline.map(|id| ("pipeline", id)).into_iter().collect();
            let response = self
                .call(&ctx, Method::POST, "/_bulk", &query, Body::Ndjson(payload), &err_ctx)
                .await?;
            parse_bulk_response(&response, &request.intents, &err_ctx)
        })
    }
}
