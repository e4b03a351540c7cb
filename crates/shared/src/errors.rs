//! Error envelope types and helpers.
//!
//! Every fallible boundary in the workspace reports an [`ErrorEnvelope`]: a
//! kind (where the failure came from), a retry class, a namespaced code and
//! free-form metadata that is safe to log once secrets are redacted.

use crate::redaction::{REDACTED, is_secret_key};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fmt, io};

/// Metadata attached to errors for diagnostics.
pub type ErrorMetadata = BTreeMap<String, String>;

/// High-level classification of error origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Expected failures (validation, user input, cancellation).
    Expected,
    /// Invariant violations in domain logic.
    Invariant,
    /// Unexpected failures (I/O, remote services).
    Unexpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Expected => "expected",
            Self::Invariant => "invariant",
            Self::Unexpected => "unexpected",
        })
    }
}

/// Retry classification for failure handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorClass {
    /// The operation can be retried safely.
    Retriable,
    /// The operation should not be retried.
    NonRetriable,
}

impl ErrorClass {
    /// Returns true when the error is considered retriable.
    #[must_use]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Retriable)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Retriable => "retriable",
            Self::NonRetriable => "non-retriable",
        })
    }
}

/// Stable error code with namespace and identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode {
    namespace: String,
    code: String,
}

impl ErrorCode {
    /// Create a new error code with a namespace and code.
    pub fn new(namespace: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            code: code.into(),
        }
    }

    /// Core cancellation code.
    pub fn cancelled() -> Self {
        Self::new("core", "cancelled")
    }

    /// Invalid input code.
    pub fn invalid_input() -> Self {
        Self::new("core", "invalid_input")
    }

    /// Not found code.
    pub fn not_found() -> Self {
        Self::new("core", "not_found")
    }

    /// Permission denied code.
    pub fn permission_denied() -> Self {
        Self::new("core", "permission_denied")
    }

    /// Timeout code.
    pub fn timeout() -> Self {
        Self::new("core", "timeout")
    }

    /// Remote dependency unavailable.
    pub fn unavailable() -> Self {
        Self::new("core", "unavailable")
    }

    /// I/O error code.
    pub fn io() -> Self {
        Self::new("core", "io")
    }

    /// Internal failure code.
    pub fn internal() -> Self {
        Self::new("core", "internal")
    }

    /// Returns the namespace portion.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the code identifier.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.namespace, self.code)
    }
}

/// Structured error envelope shared across crates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Error kind describing the origin category.
    pub kind: ErrorKind,
    /// Retry classification.
    pub class: ErrorClass,
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// Additional diagnostic metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: ErrorMetadata,
}

impl ErrorEnvelope {
    fn build(kind: ErrorKind, class: ErrorClass, code: ErrorCode, message: String) -> Self {
        Self {
            kind,
            class,
            code,
            message,
            metadata: BTreeMap::new(),
        }
    }

    /// Create an expected error with non-retriable classification.
    pub fn expected(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::build(
            ErrorKind::Expected,
            ErrorClass::NonRetriable,
            code,
            message.into(),
        )
    }

    /// Create an expected error with an explicit retry classification.
    pub fn expected_with_class(
        code: ErrorCode,
        message: impl Into<String>,
        class: ErrorClass,
    ) -> Self {
        Self::build(ErrorKind::Expected, class, code, message.into())
    }

    /// Create an invariant error (always non-retriable).
    pub fn invariant(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::build(
            ErrorKind::Invariant,
            ErrorClass::NonRetriable,
            code,
            message.into(),
        )
    }

    /// Create an unexpected error with the provided retry classification.
    pub fn unexpected(code: ErrorCode, message: impl Into<String>, class: ErrorClass) -> Self {
        Self::build(ErrorKind::Unexpected, class, code, message.into())
    }

    /// Create a cancellation error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::expected(ErrorCode::cancelled(), message)
    }

    /// Wrap any error, classifying I/O causes found in its source chain.
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error + 'static,
    {
        let (code, class) = classify_error(error);
        Self::unexpected(code, error.to_string(), class)
    }

    /// Returns true if the error represents a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::cancelled()
    }

    /// Returns true when a retry may succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        self.class.is_retriable()
    }

    /// Attach a single metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach the failing operation name.
    #[must_use]
    pub fn with_operation(self, operation: &str) -> Self {
        self.with_metadata("operation", operation)
    }

    /// Override the retry classification.
    #[must_use]
    pub const fn with_class(mut self, class: ErrorClass) -> Self {
        self.class = class;
        self
    }

    /// Replace metadata values for the provided keys and for any key that looks like a secret.
    #[must_use]
    pub fn redact_metadata(mut self, keys: &[&str]) -> Self {
        for (key, value) in &mut self.metadata {
            if keys.contains(&key.as_str()) || is_secret_key(key) {
                REDACTED.clone_into(value);
            }
        }
        self
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} {} {}: {}",
            self.kind, self.class, self.code, self.message
        )
    }
}

impl std::error::Error for ErrorEnvelope {}

impl From<io::Error> for ErrorEnvelope {
    fn from(error: io::Error) -> Self {
        Self::from_error(&error)
    }
}

fn classify_error(error: &(dyn std::error::Error + 'static)) -> (ErrorCode, ErrorClass) {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(candidate) = current {
        if let Some(io_error) = candidate.downcast_ref::<io::Error>() {
            return classify_io_kind(io_error.kind());
        }
        current = candidate.source();
    }
    (ErrorCode::internal(), ErrorClass::NonRetriable)
}

fn classify_io_kind(kind: io::ErrorKind) -> (ErrorCode, ErrorClass) {
    let code = match kind {
        io::ErrorKind::NotFound => ErrorCode::not_found(),
        io::ErrorKind::PermissionDenied => ErrorCode::permission_denied(),
        io::ErrorKind::TimedOut => ErrorCode::timeout(),
        io::ErrorKind::Interrupted => ErrorCode::cancelled(),
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected => ErrorCode::unavailable(),
        _ => ErrorCode::io(),
    };
    let class = if matches!(
        kind,
        io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
    ) {
        ErrorClass::Retriable
    } else {
        ErrorClass::NonRetriable
    };
    (code, class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_kind_and_class() {
        let expected = ErrorEnvelope::expected(ErrorCode::invalid_input(), "invalid");
        assert_eq!(expected.kind, ErrorKind::Expected);
        assert_eq!(expected.class, ErrorClass::NonRetriable);

        let invariant = ErrorEnvelope::invariant(ErrorCode::internal(), "boom");
        assert_eq!(invariant.kind, ErrorKind::Invariant);

        let unexpected =
            ErrorEnvelope::unexpected(ErrorCode::timeout(), "timeout", ErrorClass::Retriable);
        assert!(unexpected.is_retriable());
        assert_eq!(
            unexpected.to_string(),
            "unexpected retriable core:timeout: timeout"
        );
    }

    #[test]
    fn io_errors_are_classified() {
        let envelope = ErrorEnvelope::from(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert_eq!(envelope.code, ErrorCode::timeout());
        assert!(envelope.is_retriable());

        let envelope = ErrorEnvelope::from(io::Error::new(io::ErrorKind::NotFound, "missing"));
        assert_eq!(envelope.code, ErrorCode::not_found());
        assert!(!envelope.is_retriable());

        let envelope = ErrorEnvelope::from(io::Error::new(io::ErrorKind::ConnectionRefused, "no"));
        assert_eq!(envelope.code, ErrorCode::unavailable());
        assert!(envelope.is_retriable());
    }

    #[test]
    fn cancellation_is_detected() {
        let cancelled = ErrorEnvelope::cancelled("stopped");
        assert!(cancelled.is_cancelled());
        assert!(!cancelled.is_retriable());
    }

    #[test]
    fn metadata_redaction_covers_secret_like_keys() {
        let error = ErrorEnvelope::expected(ErrorCode::invalid_input(), "bad")
            .with_metadata("apiKey", "abc")
            .with_metadata("value", "hunter2")
            .with_metadata("index", "search-docs");
        let redacted = error.redact_metadata(&["value"]);

        assert_eq!(
            redacted.metadata.get("apiKey").map(String::as_str),
            Some(REDACTED)
        );
        assert_eq!(
            redacted.metadata.get("value").map(String::as_str),
            Some(REDACTED)
        );
        assert_eq!(
            redacted.metadata.get("index").map(String::as_str),
            Some("search-docs")
        );
    }
}
