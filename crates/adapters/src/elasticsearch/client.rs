//! Elasticsearch REST transport.

use super::auth::EsAuth;
use super::error::{
    EsErrorContext, cancelled_error, invalid_response, map_http_error, map_transport_error,
    timeout_error,
};
use docsync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use url::Url;

const DEFAULT_SCAN_PAGE_SIZE: usize = 1_000;

/// REST client configuration.
#[derive(Debug, Clone)]
pub struct EsClientConfig {
    /// Base URL, e.g. `http://localhost:9200`.
    pub host: Box<str>,
    /// Credentials.
    pub auth: EsAuth,
    /// Serverless deployments cannot close indices.
    pub serverless: bool,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Hits per page when scanning an index.
    pub scan_page_size: usize,
}

impl EsClientConfig {
    /// Config with default timeout and page size.
    #[must_use]
    pub fn new(host: impl Into<Box<str>>, auth: EsAuth) -> Self {
        Self {
            host: host.into(),
            auth,
            serverless: false,
            timeout_ms: 120_000,
            scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "Elasticsearch timeout must be greater than zero",
            ));
        }
        if self.scan_page_size == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "scan page size must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Request body variants.
pub(crate) enum Body {
    Empty,
    Json(Value),
    Ndjson(String),
}

/// Elasticsearch REST client implementing the search index and admin ports.
#[derive(Clone)]
pub struct ElasticsearchClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    pub(crate) serverless: bool,
    pub(crate) scan_page_size: usize,
}

impl ElasticsearchClient {
    /// Build a client from configuration.
    pub fn new(config: EsClientConfig) -> Result<Self> {
        config.validate()?;
        let base_url = parse_base_url(&config.host)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(config.auth.header_value().expose()).map_err(|_| {
            ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "Elasticsearch auth header contains invalid characters",
            )
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("index", "client_init_failed"),
                    format!("failed to build Elasticsearch client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;

        Ok(Self {
            http,
            base_url,
            timeout: Duration::from_millis(config.timeout_ms),
            serverless: config.serverless,
            scan_page_size: config.scan_page_size,
        })
    }

    /// Base URL the client talks to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Returns true for serverless deployments.
    #[must_use]
    pub const fn is_serverless(&self) -> bool {
        self.serverless
    }

    /// Send a request and fail on any non-2xx status.
    pub(crate) async fn call(
        &self,
        ctx: &RequestContext,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Body,
        err_ctx: &EsErrorContext,
    ) -> Result<Value> {
        let (status, payload) = self.send(ctx, method, path, query, body, err_ctx).await?;
        if !(200..300).contains(&status) {
            return Err(map_http_error(status, &payload, err_ctx));
        }
        Ok(payload)
    }

    /// Send a request where 404 means "absent" rather than failure.
    pub(crate) async fn call_optional(
        &self,
        ctx: &RequestContext,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Body,
        err_ctx: &EsErrorContext,
    ) -> Result<Option<Value>> {
        let (status, payload) = self.send(ctx, method, path, query, body, err_ctx).await?;
        if status == 404 {
            return Ok(None);
        }
        if !(200..300).contains(&status) {
            return Err(map_http_error(status, &payload, err_ctx));
        }
        Ok(Some(payload))
    }

    async fn send(
        &self,
        ctx: &RequestContext,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Body,
        err_ctx: &EsErrorContext,
    ) -> Result<(u16, Value)> {
        ctx.ensure_not_cancelled(err_ctx.operation)?;
        let url = self.url(path, query, err_ctx)?;
        let request = self.http.request(method, url);
        let request = match body {
            Body::Empty => request,
            Body::Json(value) => request.json(&value),
            Body::Ndjson(lines) => request
                .header(CONTENT_TYPE, HeaderValue::from_static("application/x-ndjson"))
                .body(lines),
        };

        let response = tokio::select! {
            () = ctx.cancelled() => return Err(cancelled_error(err_ctx)),
            res = tokio::time::timeout(self.timeout, request.send()) => res,
        };
        let response = match response {
            Ok(result) => result.map_err(|error| map_transport_error(&error, err_ctx))?,
            Err(_) => return Err(timeout_error(err_ctx)),
        };

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| map_transport_error(&error, err_ctx))?;
        if bytes.is_empty() {
            return Ok((status, Value::Null));
        }
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(payload) => Ok((status, payload)),
            Err(_) if !(200..300).contains(&status) => Ok((
                status,
                Value::String(String::from_utf8_lossy(&bytes).into_owned()),
            )),
            Err(error) => Err(invalid_response(err_ctx, error.to_string())),
        }
    }

    fn url(&self, path: &str, query: &[(&str, &str)], err_ctx: &EsErrorContext) -> Result<Url> {
        let mut url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|error| invalid_response(err_ctx, format!("invalid request path: {error}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

fn parse_base_url(host: &str) -> Result<Url> {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            "Elasticsearch host is required",
        ));
    }
    let parsed = Url::parse(&format!("{trimmed}/")).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            format!("invalid Elasticsearch host: {error}"),
        )
    })?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            "Elasticsearch host must use http or https",
        ));
    }
    Ok(parsed)
}
