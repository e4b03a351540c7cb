// Elasticsearch REST adapter against a mock server.
#![allow(missing_docs)]

use docsync_adapters::{ElasticsearchClient, EsAuth, EsClientConfig};
use docsync_domain::{Document, DocumentId, ExistingRecord, IndexName, VersionToken, WriteIntent};
use docsync_ports::{BulkRequest, IndexAdminPort, SearchIndexPort};
use docsync_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result, SecretString};
use futures_util::TryStreamExt;
use serde_json::json;
use wiremock::matchers::{
    body_partial_json, body_string_contains, header, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, page_size: usize) -> Result<ElasticsearchClient> {
    let mut config = EsClientConfig::new(server.uri(), EsAuth::ApiKey(SecretString::new("abc")));
    config.timeout_ms = 5_000;
    config.scan_page_size = page_size;
    ElasticsearchClient::new(config)
}

fn index() -> Result<IndexName> {
    IndexName::parse("search-docs").map_err(ErrorEnvelope::from)
}

fn id(value: &str) -> Result<DocumentId> {
    DocumentId::parse(value).map_err(ErrorEnvelope::from)
}

fn hit(id: &str, timestamp: &str, sort: u64) -> serde_json::Value {
    json!({ "_id": id, "_source": { "id": id, "timestamp": timestamp }, "sort": [sort] })
}

#[tokio::test]
async fn scan_pages_with_search_after() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search-docs/_search"))
        .and(body_partial_json(json!({ "search_after": [2] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": { "hits": [hit("c", "t3", 3)] }
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/search-docs/_search"))
        .and(header("authorization", "ApiKey abc"))
        .and(body_partial_json(json!({ "sort": ["_doc"], "_source": ["id", "timestamp"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": { "hits": [hit("a", "t1", 1), hit("b", "t2", 2)] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, 2)?;
    let ctx = RequestContext::new_request();
    let records: Vec<ExistingRecord> = client.scan_existing(&ctx, &index()?).try_collect().await?;

    let ids: Vec<&str> = records.iter().map(|record| record.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(
        records.last().and_then(|record| record.timestamp.clone()),
        Some(VersionToken::new("t3"))
    );
    Ok(())
}

#[tokio::test]
async fn scan_of_missing_index_is_empty() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search-docs/_search"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "type": "index_not_found_exception", "reason": "no such index" },
            "status": 404
        })))
        .mount(&server)
        .await;

    let client = client(&server, 100)?;
    let ctx = RequestContext::new_request();
    let records: Vec<ExistingRecord> = client.scan_existing(&ctx, &index()?).try_collect().await?;
    assert!(records.is_empty());
    Ok(())
}

#[tokio::test]
async fn bulk_sends_ndjson_with_pipeline() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(query_param("pipeline", "ent-search-generic-ingestion"))
        .and(header("content-type", "application/x-ndjson"))
        .and(body_string_contains("\"doc_as_upsert\":true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "took": 4,
            "errors": true,
            "items": [
                { "update": { "_id": "1", "status": 201 } },
                { "delete": { "_id": "2", "status": 404 } },
                { "update": { "_id": "3", "status": 400,
                    "error": { "type": "mapper_parsing_exception", "reason": "bad" } } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, 100)?;
    let ctx = RequestContext::new_request();
    let document = Document::new(id("1")?).with_timestamp(VersionToken::new("t1"));
    let request = BulkRequest {
        index: index()?,
        intents: vec![
            WriteIntent::upsert(document),
            WriteIntent::delete(id("2")?),
            WriteIntent::upsert(Document::new(id("3")?)),
        ],
        pipeline: Some("ent-search-generic-ingestion".into()),
    };
    let response = client.bulk(&ctx, request).await?;

    assert_eq!(response.took_ms, 4);
    let failed: Vec<&str> = response.failures().map(|item| item.id.as_str()).collect();
    assert_eq!(failed, vec!["3"]);
    Ok(())
}

#[tokio::test]
async fn unavailable_cluster_is_retriable() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = client(&server, 100)?;
    let ctx = RequestContext::new_request();
    let request = BulkRequest {
        index: index()?,
        intents: vec![WriteIntent::delete(id("1")?)],
        pipeline: None,
    };
    let error = client.bulk(&ctx, request).await.err();

    assert_eq!(error.as_ref().map(|error| error.code.clone()), Some(ErrorCode::new("index", "unavailable")));
    assert!(error.is_some_and(|error| error.is_retriable()));
    Ok(())
}

#[tokio::test]
async fn settings_update_closes_and_reopens() -> Result<()> {
    let server = MockServer::start().await;
    for (verb, route) in [
        ("POST", "/search-docs/_close"),
        ("PUT", "/search-docs/_settings"),
        ("POST", "/search-docs/_open"),
    ] {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = client(&server, 100)?;
    let ctx = RequestContext::new_request();
    client
        .put_settings(&ctx, &index()?, json!({ "analysis": {} }))
        .await?;
    Ok(())
}

#[tokio::test]
async fn serverless_settings_use_reopen_flag() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/search-docs/_settings"))
        .and(query_param("reopen", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = EsClientConfig::new(server.uri(), EsAuth::ApiKey(SecretString::new("abc")));
    config.serverless = true;
    let client = ElasticsearchClient::new(config)?;
    let ctx = RequestContext::new_request();
    client
        .put_settings(&ctx, &index()?, json!({ "analysis": {} }))
        .await?;
    Ok(())
}

#[tokio::test]
async fn admin_reads_indices_pipelines_and_secrets() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "indices": {
                "search-docs": { "primaries": { "docs": { "count": 12 } } },
                "search-empty": { "primaries": { "docs": { "count": 0 } } }
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_ingest/pipeline/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_connector/_secret"))
        .and(body_partial_json(json!({ "value": "s3cr3t" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "sec-1" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/_connector/_secret/sec-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "sec-1", "value": "s3cr3t" })))
        .mount(&server)
        .await;

    let client = client(&server, 100)?;
    let ctx = RequestContext::new_request();

    let indices = client.list_indices(&ctx).await?;
    assert_eq!(indices.get("search-docs").and_then(|summary| summary.docs_count), Some(12));
    assert_eq!(indices.len(), 2);

    assert!(!client.pipeline_exists(&ctx, "missing").await?);

    let secret_id = client.create_secret(&ctx, SecretString::new("s3cr3t")).await?;
    assert_eq!(&*secret_id, "sec-1");
    assert_eq!(client.get_secret(&ctx, &secret_id).await?.expose(), "s3cr3t");
    Ok(())
}

#[tokio::test]
async fn cancelled_context_skips_the_request() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(&server, 100)?;
    let ctx = RequestContext::new_request();
    ctx.cancel();
    let error = client.ping(&ctx).await.err();
    assert!(error.is_some_and(|error| error.is_cancelled()));
    Ok(())
}
