//! Write intents and the items carried by the write queue.

use crate::document::Document;
use crate::primitives::DocumentId;
use serde::{Deserialize, Serialize};

/// A single write decision, consumed exactly once by the bulk writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum WriteIntent {
    /// Create or merge the document.
    Upsert {
        /// Target id.
        id: DocumentId,
        /// Full document body.
        document: Document,
    },
    /// Remove the document.
    Delete {
        /// Target id.
        id: DocumentId,
    },
}

impl WriteIntent {
    /// Upsert keyed by the document's own id.
    #[must_use]
    pub fn upsert(document: Document) -> Self {
        Self::Upsert {
            id: document.id().clone(),
            document,
        }
    }

    /// Delete by id.
    #[must_use]
    pub const fn delete(id: DocumentId) -> Self {
        Self::Delete { id }
    }

    /// Target id.
    #[must_use]
    pub const fn id(&self) -> &DocumentId {
        match self {
            Self::Upsert { id, .. } | Self::Delete { id } => id,
        }
    }

    /// Returns true for upserts.
    #[must_use]
    pub const fn is_upsert(&self) -> bool {
        matches!(self, Self::Upsert { .. })
    }
}

/// End-of-stream markers. Each producer emits its marker exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "marker", rename_all = "camelCase")]
pub enum EndMarker {
    /// The document classification task finished.
    DocsDone {
        /// The feed failed before it was exhausted.
        failed: bool,
    },
    /// The enrichment drain finished.
    DownloadsDone,
}

/// An item on the write queue.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteQueueItem {
    /// A write decision.
    Intent(WriteIntent),
    /// A producer finished.
    End(EndMarker),
}

impl From<WriteIntent> for WriteQueueItem {
    fn from(intent: WriteIntent) -> Self {
        Self::Intent(intent)
    }
}

impl From<EndMarker> for WriteQueueItem {
    fn from(marker: EndMarker) -> Self {
        Self::End(marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PrimitiveError;

    #[test]
    fn upsert_takes_the_document_id() -> Result<(), PrimitiveError> {
        let intent = WriteIntent::upsert(Document::new(DocumentId::parse("doc-1")?));
        assert_eq!(intent.id().as_str(), "doc-1");
        assert!(intent.is_upsert());
        assert!(!WriteIntent::delete(DocumentId::parse("doc-2")?).is_upsert());
        Ok(())
    }

    #[test]
    fn markers_convert_into_queue_items() {
        let item = WriteQueueItem::from(EndMarker::DocsDone { failed: true });
        assert_eq!(item, WriteQueueItem::End(EndMarker::DocsDone { failed: true }));
    }
}
