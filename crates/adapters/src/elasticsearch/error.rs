//! Elasticsearch error mapping helpers.

use docsync_shared::{ErrorClass, ErrorCode, ErrorEnvelope};
use serde_json::Value;

/// Context attached to every error produced by the REST client.
#[derive(Debug, Clone)]
pub struct EsErrorContext {
    /// Operation label, e.g. `es.bulk`.
    pub operation: &'static str,
    /// Endpoint path of the failing request.
    pub endpoint: String,
    /// Index name, when the request is index-scoped.
    pub index: Option<String>,
}

impl EsErrorContext {
    pub(crate) fn new(operation: &'static str, endpoint: &str, index: Option<&str>) -> Self {
        Self {
            operation,
            endpoint: endpoint.to_owned(),
            index: index.map(ToOwned::to_owned),
        }
    }

    fn apply(&self, envelope: ErrorEnvelope) -> ErrorEnvelope {
        let envelope = envelope
            .with_metadata("operation", self.operation)
            .with_metadata("endpoint", self.endpoint.clone());
        match self.index.as_ref() {
            Some(index) => envelope.with_metadata("index", index.clone()),
            None => envelope,
        }
    }
}

/// Maps a non-success HTTP response into an error envelope.
///
/// 408, 429 and 5xx responses are retriable; everything else is not.
pub fn map_http_error(status: u16, body: &Value, ctx: &EsErrorContext) -> ErrorEnvelope {
    let reason = error_reason(body).unwrap_or_else(|| format!("HTTP {status}"));
    let code = match status {
        401 | 403 => auth_code(),
        404 => not_found_code(),
        408 | 504 => timeout_code(),
        429 | 500..=599 => unavailable_code(),
        _ => http_status_code(),
    };
    let class = if status == 429 || status == 408 || status >= 500 {
        ErrorClass::Retriable
    } else {
        ErrorClass::NonRetriable
    };
    ctx.apply(ErrorEnvelope::unexpected(code, reason, class))
        .with_metadata("http_status", status.to_string())
}

/// Maps reqwest transport errors into error envelopes.
pub fn map_transport_error(error: &reqwest::Error, ctx: &EsErrorContext) -> ErrorEnvelope {
    if error.is_timeout() {
        return ctx.apply(ErrorEnvelope::unexpected(
            timeout_code(),
            format!("Elasticsearch request timed out: {error}"),
            ErrorClass::Retriable,
        ));
    }
    if error.is_connect() {
        return ctx.apply(ErrorEnvelope::unexpected(
            connection_code(),
            format!("Elasticsearch connection failed: {error}"),
            ErrorClass::Retriable,
        ));
    }
    ctx.apply(ErrorEnvelope::unexpected(
        request_failed_code(),
        format!("Elasticsearch request failed: {error}"),
        ErrorClass::Retriable,
    ))
}

pub(crate) fn timeout_error(ctx: &EsErrorContext) -> ErrorEnvelope {
    ctx.apply(ErrorEnvelope::unexpected(
        timeout_code(),
        "Elasticsearch request timed out",
        ErrorClass::Retriable,
    ))
}

pub(crate) fn cancelled_error(ctx: &EsErrorContext) -> ErrorEnvelope {
    ctx.apply(ErrorEnvelope::cancelled("operation cancelled"))
}

pub(crate) fn invalid_response(ctx: &EsErrorContext, detail: impl Into<String>) -> ErrorEnvelope {
    ctx.apply(ErrorEnvelope::unexpected(
        invalid_response_code(),
        format!("invalid Elasticsearch response: {}", detail.into()),
        ErrorClass::NonRetriable,
    ))
}

/// `error.type: error.reason` from an Elasticsearch error body.
pub fn error_reason(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    if let Some(text) = error.as_str() {
        return Some(text.to_owned());
    }
    let kind = error.get("type").and_then(Value::as_str);
    let reason = error.get("reason").and_then(Value::as_str);
    match (kind, reason) {
        (Some(kind), Some(reason)) => Some(format!("{kind}: {reason}")),
        (Some(text), None) | (None, Some(text)) => Some(text.to_owned()),
        (None, None) => None,
    }
}

fn auth_code() -> ErrorCode {
    ErrorCode::new("index", "auth")
}

fn not_found_code() -> ErrorCode {
    ErrorCode::new("index", "not_found")
}

fn timeout_code() -> ErrorCode {
    ErrorCode::new("index", "timeout")
}

fn connection_code() -> ErrorCode {
    ErrorCode::new("index", "connection")
}

fn unavailable_code() -> ErrorCode {
    ErrorCode::new("index", "unavailable")
}

fn http_status_code() -> ErrorCode {
    ErrorCode::new("index", "http_status")
}

fn request_failed_code() -> ErrorCode {
    ErrorCode::new("index", "request_failed")
}

fn invalid_response_code() -> ErrorCode {
    ErrorCode::new("index", "invalid_response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> EsErrorContext {
        EsErrorContext::new("es.bulk", "/_bulk", Some("search-docs"))
    }

    #[test]
    fn server_errors_are_retriable() {
        let error = map_http_error(503, &json!({}), &ctx());
        assert_eq!(error.code, ErrorCode::new("index", "unavailable"));
        assert!(error.is_retriable());
        assert_eq!(error.metadata.get("http_status").map(String::as_str), Some("503"));
        assert_eq!(error.metadata.get("index").map(String::as_str), Some("search-docs"));
    }

    #[test]
    fn client_errors_carry_the_reason() {
        let body = json!({
            "error": { "type": "illegal_argument_exception", "reason": "bad mapping" },
            "status": 400
        });
        let error = map_http_error(400, &body, &ctx());
        assert_eq!(error.code, ErrorCode::new("index", "http_status"));
        assert!(!error.is_retriable());
        assert_eq!(error.message, "illegal_argument_exception: bad mapping");
    }

    #[test]
    fn auth_failures_are_not_retried() {
        let error = map_http_error(401, &json!({ "error": "unauthorized" }), &ctx());
        assert_eq!(error.code, ErrorCode::new("index", "auth"));
        assert!(!error.is_retriable());
        assert_eq!(error.message, "unauthorized");
    }
}
