//! Source documents and index snapshot records.

use crate::primitives::{DocumentId, PrimitiveError, VersionToken, json_type_name};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding the document id in the index.
pub const ID_FIELD: &str = "id";
/// Field a source may use for the id instead of [`ID_FIELD`].
pub const SOURCE_ID_FIELD: &str = "_id";
/// Field holding the version token.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// A document produced by a source: an id, an optional version token and
/// arbitrary JSON fields.
///
/// `id` and `timestamp` are kept out of `fields` and written back by
/// [`Document::to_source`], so the body never disagrees with them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Document {
    id: DocumentId,
    timestamp: Option<VersionToken>,
    fields: Map<String, Value>,
}

impl Document {
    /// Create a document with no extra fields.
    #[must_use]
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            timestamp: None,
            fields: Map::new(),
        }
    }

    /// Build a document from a JSON object.
    ///
    /// `_id` takes precedence over `id` and is renamed to `id`.
    pub fn from_json(value: Value) -> Result<Self, PrimitiveError> {
        let Value::Object(mut fields) = value else {
            return Err(PrimitiveError::DocumentNotObject {
                found: json_type_name(&value),
            });
        };

        let raw_id = match fields.remove(SOURCE_ID_FIELD) {
            Some(raw) => {
                fields.remove(ID_FIELD);
                raw
            },
            None => fields
                .remove(ID_FIELD)
                .ok_or(PrimitiveError::MissingDocumentId)?,
        };
        let id = DocumentId::from_json(&raw_id)?;
        let timestamp = match fields.remove(TIMESTAMP_FIELD) {
            Some(raw) => VersionToken::from_json(&raw)?,
            None => None,
        };

        Ok(Self {
            id,
            timestamp,
            fields,
        })
    }

    /// Builder: set the version token.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: VersionToken) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Builder: set a field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// Document id.
    #[must_use]
    pub const fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Version token, if the source provided one.
    #[must_use]
    pub const fn timestamp(&self) -> Option<&VersionToken> {
        self.timestamp.as_ref()
    }

    /// Assign `timestamp` when no token is present; returns the effective token.
    pub fn ensure_timestamp(&mut self, fallback: impl FnOnce() -> VersionToken) -> &VersionToken {
        self.timestamp.get_or_insert_with(fallback)
    }

    /// Read a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Set a field. `id`/`timestamp` are reserved and ignored here.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if name == ID_FIELD || name == TIMESTAMP_FIELD || name == SOURCE_ID_FIELD {
            return;
        }
        self.fields.insert(name, value);
    }

    /// Number of non-reserved fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Apply a partial update the way `doc_as_upsert` does: top-level fields of
    /// `update` replace ours, fields it lacks are kept.
    pub fn merge(&mut self, update: Self) {
        if update.timestamp.is_some() {
            self.timestamp = update.timestamp;
        }
        self.fields.extend(update.fields);
    }

    /// The body as stored in the index, including `id` and `timestamp`.
    #[must_use]
    pub fn to_source(&self) -> Map<String, Value> {
        let mut source = self.fields.clone();
        source.insert(ID_FIELD.to_string(), Value::from(self.id.as_str()));
        if let Some(timestamp) = &self.timestamp {
            source.insert(TIMESTAMP_FIELD.to_string(), Value::from(timestamp.as_str()));
        }
        source
    }
}

impl TryFrom<Value> for Document {
    type Error = PrimitiveError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(value)
    }
}

impl From<Document> for Value {
    fn from(document: Document) -> Self {
        Self::Object(document.to_source())
    }
}

/// `(id, timestamp)` projection read from the index before a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingRecord {
    /// Document id.
    pub id: DocumentId,
    /// Last-known version token.
    pub timestamp: Option<VersionToken>,
}

impl ExistingRecord {
    /// Create a record.
    #[must_use]
    pub const fn new(id: DocumentId, timestamp: Option<VersionToken>) -> Self {
        Self { id, timestamp }
    }

    /// Read a record from a `_source` projection.
    pub fn from_source(source: &Value) -> Result<Self, PrimitiveError> {
        let id = source
            .get(ID_FIELD)
            .ok_or(PrimitiveError::MissingDocumentId)
            .and_then(DocumentId::from_json)?;
        let timestamp = match source.get(TIMESTAMP_FIELD) {
            Some(raw) => VersionToken::from_json(raw)?,
            None => None,
        };
        Ok(Self { id, timestamp })
    }
}
