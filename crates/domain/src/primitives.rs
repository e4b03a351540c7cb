//! Domain primitives with validated constructors.

use docsync_shared::{ErrorCode, ErrorEnvelope};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

const INVALID_INDEX_CHARS: [char; 11] = ['\\', '/', '*', '?', '"', '<', '>', '|', ' ', ',', '#'];
const INVALID_INDEX_PREFIXES: [char; 3] = ['_', '-', '+'];
const RESERVED_INDEX_NAMES: [&str; 2] = [".", ".."];

/// Why an index name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexNameViolation {
    /// Empty after trimming.
    Empty,
    /// Contains a forbidden character.
    InvalidChar(char),
    /// Starts with a forbidden character.
    InvalidPrefix(char),
    /// Contains uppercase characters.
    NotLowercase,
    /// `.` or `..`.
    Reserved,
}

impl fmt::Display for IndexNameViolation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => formatter.write_str("Must be non-empty"),
            Self::InvalidChar(ch) => write!(formatter, "Invalid character {ch}"),
            Self::InvalidPrefix(ch) => write!(formatter, "Invalid prefix {ch}"),
            Self::NotLowercase => formatter.write_str("Must be lowercase"),
            Self::Reserved => formatter.write_str("Can't use that name"),
        }
    }
}

/// Validation failures for domain primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrimitiveError {
    /// `DocumentId` is empty after trimming.
    #[error("DocumentId must be non-empty")]
    InvalidDocumentId {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// A document carries no usable `id`/`_id` field.
    #[error("document has no `id` or `_id` field")]
    MissingDocumentId,
    /// The document id is neither a string nor a number.
    #[error("document id must be a string or number, got {found}")]
    UnsupportedDocumentId {
        /// JSON type name of the offending value.
        found: &'static str,
    },
    /// The version token is not a scalar.
    #[error("timestamp must be a scalar, got {found}")]
    UnsupportedVersionToken {
        /// JSON type name of the offending value.
        found: &'static str,
    },
    /// A document is not a JSON object.
    #[error("document must be a JSON object, got {found}")]
    DocumentNotObject {
        /// JSON type name of the offending value.
        found: &'static str,
    },
    /// `IndexName` failed validation.
    #[error("invalid index name: {violation}")]
    InvalidIndexName {
        /// Raw input.
        input: String,
        /// Violated rule.
        violation: IndexNameViolation,
    },
}

impl PrimitiveError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidDocumentId { .. }
            | Self::MissingDocumentId
            | Self::UnsupportedDocumentId { .. } => ErrorCode::new("domain", "invalid_document_id"),
            Self::UnsupportedVersionToken { .. } => {
                ErrorCode::new("domain", "invalid_version_token")
            },
            Self::DocumentNotObject { .. } => ErrorCode::new("domain", "invalid_document"),
            Self::InvalidIndexName { .. } => ErrorCode::new("domain", "invalid_index_name"),
        }
    }
}

impl From<PrimitiveError> for ErrorEnvelope {
    fn from(error: PrimitiveError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());
        match error {
            PrimitiveError::InvalidDocumentId { input_length } => {
                envelope.with_metadata("input_length", input_length.to_string())
            },
            PrimitiveError::UnsupportedDocumentId { found }
            | PrimitiveError::UnsupportedVersionToken { found }
            | PrimitiveError::DocumentNotObject { found } => envelope.with_metadata("found", found),
            PrimitiveError::InvalidIndexName { input, .. } => {
                envelope.with_metadata("index", input)
            },
            PrimitiveError::MissingDocumentId => envelope,
        }
    }
}

/// JSON type name used in error messages.
pub(crate) const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Identifier of a document in the target index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(Box<str>);

impl DocumentId {
    /// Parse a document id. The value is trimmed; empty values are rejected.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PrimitiveError::InvalidDocumentId {
                input_length: raw.len(),
            });
        }
        Ok(Self(trimmed.into()))
    }

    /// Parse a document id from a JSON string or number.
    pub fn from_json(value: &Value) -> Result<Self, PrimitiveError> {
        match value {
            Value::String(text) => Self::parse(text),
            Value::Number(number) => Self::parse(number.to_string()),
            other => Err(PrimitiveError::UnsupportedDocumentId {
                found: json_type_name(other),
            }),
        }
    }

    /// Borrow the id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = PrimitiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DocumentId> for String {
    fn from(value: DocumentId) -> Self {
        value.0.into()
    }
}

/// Opaque, comparable per-document version marker (usually a timestamp).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(Box<str>);

impl VersionToken {
    /// Wrap a token value.
    pub fn new(value: impl Into<Box<str>>) -> Self {
        Self(value.into())
    }

    /// Read a token from a JSON scalar. `null` means "no token".
    pub fn from_json(value: &Value) -> Result<Option<Self>, PrimitiveError> {
        match value {
            Value::Null => Ok(None),
            Value::String(text) => Ok(Some(Self::new(text.as_str()))),
            Value::Number(number) => Ok(Some(Self::new(number.to_string()))),
            Value::Bool(flag) => Ok(Some(Self::new(flag.to_string()))),
            other => Err(PrimitiveError::UnsupportedVersionToken {
                found: json_type_name(other),
            }),
        }
    }

    /// Borrow the token as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// A validated search index name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IndexName(Box<str>);

impl IndexName {
    /// Validate an index name.
    ///
    /// Rejects forbidden characters, forbidden leading characters, uppercase
    /// characters and the reserved names `.` and `..`.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let name = input.as_ref().trim();
        let reject = |violation| PrimitiveError::InvalidIndexName {
            input: name.to_string(),
            violation,
        };

        if name.is_empty() {
            return Err(reject(IndexNameViolation::Empty));
        }
        if let Some(ch) = INVALID_INDEX_CHARS.iter().find(|ch| name.contains(**ch)) {
            return Err(reject(IndexNameViolation::InvalidChar(*ch)));
        }
        if let Some(first) = name.chars().next().filter(|ch| INVALID_INDEX_PREFIXES.contains(ch))
        {
            return Err(reject(IndexNameViolation::InvalidPrefix(first)));
        }
        if name.chars().any(char::is_uppercase) {
            return Err(reject(IndexNameViolation::NotLowercase));
        }
        if RESERVED_INDEX_NAMES.contains(&name) {
            return Err(reject(IndexNameViolation::Reserved));
        }
        Ok(Self(name.into()))
    }

    /// Borrow the name as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl TryFrom<String> for IndexName {
    type Error = PrimitiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<IndexName> for String {
    fn from(value: IndexName) -> Self {
        value.0.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn document_id_requires_non_empty_input() {
        assert!(matches!(
            DocumentId::parse("  "),
            Err(PrimitiveError::InvalidDocumentId { input_length: 2 })
        ));
    }

    #[test]
    fn document_id_accepts_numbers() -> Result<(), PrimitiveError> {
        assert_eq!(DocumentId::from_json(&json!(42))?.as_str(), "42");
        assert!(DocumentId::from_json(&json!(["a"])).is_err());
        Ok(())
    }

    #[test]
    fn version_token_treats_null_as_absent() -> Result<(), PrimitiveError> {
        assert_eq!(VersionToken::from_json(&Value::Null)?, None);
        assert_eq!(
            VersionToken::from_json(&json!("2022-10-31T09:04:35"))?,
            Some(VersionToken::new("2022-10-31T09:04:35"))
        );
        assert!(VersionToken::from_json(&json!({"a": 1})).is_err());
        Ok(())
    }

    #[test]
    fn index_name_rules() {
        let violation = |name: &str| match IndexName::parse(name) {
            Err(PrimitiveError::InvalidIndexName { violation, .. }) => Some(violation),
            _ => None,
        };

        assert_eq!(violation("a*b"), Some(IndexNameViolation::InvalidChar('*')));
        assert_eq!(violation("has space"), Some(IndexNameViolation::InvalidChar(' ')));
        assert_eq!(violation("_hidden"), Some(IndexNameViolation::InvalidPrefix('_')));
        assert_eq!(violation("+plus"), Some(IndexNameViolation::InvalidPrefix('+')));
        assert_eq!(violation("Search"), Some(IndexNameViolation::NotLowercase));
        assert_eq!(violation(".."), Some(IndexNameViolation::Reserved));
        assert_eq!(violation(""), Some(IndexNameViolation::Empty));
        assert_eq!(violation("search-docs"), None);
    }

    #[test]
    fn index_name_error_message_names_the_rule() {
        let Err(error) = IndexName::parse("a#b") else {
            return;
        };
        assert_eq!(error.to_string(), "invalid index name: Invalid character #");
    }

    proptest! {
        #[test]
        fn lowercase_alphanumeric_names_are_valid(name in "[a-z0-9][a-z0-9._-]{0,30}") {
            prop_assume!(name != "." && name != "..");
            prop_assert!(IndexName::parse(&name).is_ok());
        }
    }
}
