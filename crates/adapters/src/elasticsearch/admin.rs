//! Index administration and connector secrets over the REST API.

use super::client::{Body, ElasticsearchClient};
use super::error::{EsErrorContext, invalid_response};
use docsync_domain::IndexName;
use docsync_ports::{BoxFuture, ContentIndexSpec, IndexAdminPort, IndexSummary, IngestPipelineSpec};
use docsync_shared::{RequestContext, Result, SecretString};
use reqwest::Method;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

const SECRET_PATH: &str = "/_connector/_secret";

impl ElasticsearchClient {
    async fn exists(&self, ctx: &RequestContext, index: &IndexName) -> Result<bool> {
        let path = format!("/{}", index.as_str());
        let err_ctx = EsErrorContext::new("es.index_exists", &path, Some(index.as_str()));
        let found = self
            .call_optional(ctx, Method::HEAD, &path, &[], Body::Empty, &err_ctx)
            .await?;
        Ok(found.is_some())
    }

    async fn index_section(
        &self,
        ctx: &RequestContext,
        index: &IndexName,
        endpoint: &str,
        section: &str,
        operation: &'static str,
    ) -> Result<Value> {
        let path = format!("/{}/{endpoint}", index.as_str());
        let err_ctx = EsErrorContext::new(operation, &path, Some(index.as_str()));
        let response = self
            .call(ctx, Method::GET, &path, &[], Body::Empty, &err_ctx)
            .await?;
        let entry = response
            .get(index.as_str())
            .or_else(|| response.as_object().and_then(|map| map.values().next()))
            .ok_or_else(|| invalid_response(&err_ctx, format!("missing index {}", index.as_str())))?;
        Ok(entry.get(section).cloned().unwrap_or_else(|| json!({})))
    }

    async fn settings_with_reopen(
        &self,
        ctx: &RequestContext,
        index: &IndexName,
        settings: Value,
    ) -> Result<()> {
        let name = index.as_str();
        let settings_path = format!("/{name}/_settings");
        let err_ctx = EsErrorContext::new("es.put_settings", &settings_path, Some(name));
        if self.serverless {
            self.call(
                ctx,
                Method::PUT,
                &settings_path,
                &[("reopen", "true")],
                Body::Json(settings),
                &err_ctx,
            )
            .await?;
            return Ok(());
        }

        let close_path = format!("/{name}/_close");
        let close_ctx = EsErrorContext::new("es.close_index", &close_path, Some(name));
        self.call(ctx, Method::POST, &close_path, &[], Body::Empty, &close_ctx)
            .await?;

        let updated = self
            .call(ctx, Method::PUT, &settings_path, &[], Body::Json(settings), &err_ctx)
            .await;

        let open_path = format!("/{name}/_open");
        let open_ctx = EsErrorContext::new("es.open_index", &open_path, Some(name));
        let reopened = self
            .call(ctx, Method::POST, &open_path, &[], Body::Empty, &open_ctx)
            .await;
        updated?;
        reopened?;
        Ok(())
    }
}

/// `dynamic`, `dynamic_templates` and `properties` of a mapping body.
fn mapping_body(mappings: &Value) -> Value {
    let mut body = Map::new();
    body.insert(
        "dynamic".to_owned(),
        mappings.get("dynamic").cloned().unwrap_or(Value::Bool(false)),
    );
    body.insert(
        "dynamic_templates".to_owned(),
        mappings
            .get("dynamic_templates")
            .cloned()
            .unwrap_or_else(|| json!([])),
    );
    body.insert(
        "properties".to_owned(),
        mappings.get("properties").cloned().unwrap_or_else(|| json!({})),
    );
    Value::Object(body)
}

fn joined(indices: &[IndexName]) -> String {
    indices
        .iter()
        .map(IndexName::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

impl IndexAdminPort for ElasticsearchClient {
    fn ping(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let err_ctx = EsErrorContext::new("es.ping", "/", None);
            self.call(&ctx, Method::GET, "/", &[], Body::Empty, &err_ctx)
                .await?;
            Ok(())
        })
    }

    fn index_exists(&self, ctx: &RequestContext, index: &IndexName) -> BoxFuture<'_, Result<bool>> {
        let ctx = ctx.clone();
        let index = index.clone();
        Box::pin(async move { self.exists(&ctx, &index).await })
    }

    fn ensure_exists(
        &self,
        ctx: &RequestContext,
        indices: Vec<IndexName>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            for index in indices {
                if self.exists(&ctx, &index).await? {
                    continue;
                }
                let path = format!("/{}", index.as_str());
                let err_ctx = EsErrorContext::new("es.create_index", &path, Some(index.as_str()));
                self.call(&ctx, Method::PUT, &path, &[], Body::Empty, &err_ctx)
                    .await?;
                tracing::debug!(index = index.as_str(), "created index");
            }
            Ok(())
        })
    }

    fn create_content_index(
        &self,
        ctx: &RequestContext,
        index: &IndexName,
        spec: ContentIndexSpec,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let index = index.clone();
        Box::pin(async move {
            let path = format!("/{}", index.as_str());
            let err_ctx = EsErrorContext::new("es.create_content_index", &path, Some(index.as_str()));
            let body = json!({ "settings": spec.settings, "mappings": spec.mappings });
            self.call(&ctx, Method::PUT, &path, &[], Body::Json(body), &err_ctx)
                .await?;
            Ok(())
        })
    }

    fn get_mappings(&self, ctx: &RequestContext, index: &IndexName) -> BoxFuture<'_, Result<Value>> {
        let ctx = ctx.clone();
        let index = index.clone();
        Box::pin(async move {
            self.index_section(&ctx, &index, "_mapping", "mappings", "es.get_mappings")
                .await
        })
    }

    fn put_mappings(
        &self,
        ctx: &RequestContext,
        index: &IndexName,
        mappings: Value,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let index = index.clone();
        Box::pin(async move {
            let path = format!("/{}/_mapping", index.as_str());
            let err_ctx = EsErrorContext::new("es.put_mappings", &path, Some(index.as_str()));
            self.call(&ctx, Method::PUT, &path, &[], Body::Json(mapping_body(&mappings)), &err_ctx)
                .await?;
            Ok(())
        })
    }

    fn get_settings(&self, ctx: &RequestContext, index: &IndexName) -> BoxFuture<'_, Result<Value>> {
        let ctx = ctx.clone();
        let index = index.clone();
        Box::pin(async move {
            self.index_section(&ctx, &index, "_settings", "settings", "es.get_settings")
                .await
        })
    }

    fn put_settings(
        &self,
        ctx: &RequestContext,
        index: &IndexName,
        settings: Value,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let index = index.clone();
        Box::pin(async move { self.settings_with_reopen(&ctx, &index, settings).await })
    }

    fn pipeline_exists(&self, ctx: &RequestContext, id: &str) -> BoxFuture<'_, Result<bool>> {
        let ctx = ctx.clone();
        let id = id.to_owned();
        Box::pin(async move {
            let path = format!("/_ingest/pipeline/{id}");
            let err_ctx = EsErrorContext::new("es.get_pipeline", &path, None);
            let found = self
                .call_optional(&ctx, Method::GET, &path, &[], Body::Empty, &err_ctx)
                .await?;
            Ok(found.is_some())
        })
    }

    fn put_pipeline(
        &self,
        ctx: &RequestContext,
        pipeline: IngestPipelineSpec,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let path = format!("/_ingest/pipeline/{}", pipeline.id);
            let err_ctx = EsErrorContext::new("es.put_pipeline", &path, None);
            let body = json!({
                "version": pipeline.version,
                "description": pipeline.description,
                "processors": pipeline.processors,
            });
            self.call(&ctx, Method::PUT, &path, &[], Body::Json(body), &err_ctx)
                .await?;
            Ok(())
        })
    }

    fn delete_indices(
        &self,
        ctx: &RequestContext,
        indices: Vec<IndexName>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            if indices.is_empty() {
                return Ok(());
            }
            let path = format!("/{}", joined(&indices));
            let err_ctx = EsErrorContext::new("es.delete_indices", &path, None);
            self.call(
                &ctx,
                Method::DELETE,
                &path,
                &[("ignore_unavailable", "true")],
                Body::Empty,
                &err_ctx,
            )
            .await?;
            Ok(())
        })
    }

    fn clean_index(&self, ctx: &RequestContext, index: &IndexName) -> BoxFuture<'_, Result<u64>> {
        let ctx = ctx.clone();
        let index = index.clone();
        Box::pin(async move {
            let path = format!("/{}/_delete_by_query", index.as_str());
            let err_ctx = EsErrorContext::new("es.clean_index", &path, Some(index.as_str()));
            let response = self
                .call(
                    &ctx,
                    Method::POST,
                    &path,
                    &[("ignore_unavailable", "true")],
                    Body::Json(json!({ "query": { "match_all": {} } })),
                    &err_ctx,
                )
                .await?;
            Ok(response.get("deleted").and_then(Value::as_u64).unwrap_or(0))
        })
    }

    fn list_indices(
        &self,
        ctx: &RequestContext,
    ) -> BoxFuture<'_, Result<BTreeMap<Box<str>, IndexSummary>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            if self.serverless {
                let err_ctx = EsErrorContext::new("es.list_indices", "/*", None);
                let response = self
                    .call(&ctx, Method::GET, "/*", &[], Body::Empty, &err_ctx)
                    .await?;
                let names = response.as_object().map(Map::keys).into_iter().flatten();
                return Ok(names
                    .map(|name| (name.as_str().into(), IndexSummary { docs_count: None }))
                    .collect());
            }

            let err_ctx = EsErrorContext::new("es.list_indices", "/_stats", None);
            let response = self
                .call(&ctx, Method::GET, "/_stats", &[], Body::Empty, &err_ctx)
                .await?;
            let indices = response
                .get("indices")
                .and_then(Value::as_object)
                .ok_or_else(|| invalid_response(&err_ctx, "missing indices"))?;
            Ok(indices
                .iter()
                .map(|(name, stats)| {
                    let docs_count = stats.pointer("/primaries/docs/count").and_then(Value::as_u64);
                    (name.as_str().into(), IndexSummary { docs_count })
                })
                .collect())
        })
    }

    fn create_secret(
        &self,
        ctx: &RequestContext,
        value: SecretString,
    ) -> BoxFuture<'_, Result<Box<str>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let err_ctx = EsErrorContext::new("es.create_secret", SECRET_PATH, None);
            let body = json!({ "value": value.expose() });
            let response = self
                .call(&ctx, Method::POST, SECRET_PATH, &[], Body::Json(body), &err_ctx)
                .await?;
            response
                .get("id")
                .and_then(Value::as_str)
                .map(Box::from)
                .ok_or_else(|| invalid_response(&err_ctx, "missing secret id"))
        })
    }

    fn get_secret(&self, ctx: &RequestContext, id: &str) -> BoxFuture<'_, Result<SecretString>> {
        let ctx = ctx.clone();
        let id = id.to_owned();
        Box::pin(async move {
            let path = format!("{SECRET_PATH}/{id}");
            let err_ctx = EsErrorContext::new("es.get_secret", &path, None);
            let response = self
                .call(&ctx, Method::GET, &path, &[], Body::Empty, &err_ctx)
                .await?;
            response
                .get("value")
                .and_then(Value::as_str)
                .map(SecretString::new)
                .ok_or_else(|| invalid_response(&err_ctx, "missing secret value"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_body_fills_missing_sections() {
        let body = mapping_body(&json!({ "properties": { "title": { "type": "text" } } }));
        assert_eq!(
            body,
            json!({
                "dynamic": false,
                "dynamic_templates": [],
                "properties": { "title": { "type": "text" } }
            })
        );
    }
}
