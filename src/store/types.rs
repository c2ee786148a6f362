//! Shared types used by the document store abstraction and its Qdrant adapter.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned while interacting with the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// A scan stayed open longer than its allowed duration and can no longer be continued.
    #[error("Scan invalidated after {elapsed:?}")]
    ScanInvalidated {
        /// Age of the scan when the expiry was observed.
        elapsed: Duration,
    },
    /// Store returned a point identifier that is neither an integer nor a UUID.
    #[error("Unsupported document identifier: {0}")]
    InvalidId(String),
}

/// Stable, totally ordered document identifier.
///
/// Qdrant point ids are either unsigned integers or UUIDs; integers order before UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocumentId {
    /// Unsigned integer point id.
    Num(u64),
    /// UUID point id.
    Uuid(Uuid),
}

impl DocumentId {
    /// Parse a point id as returned by Qdrant.
    pub fn from_point_id(value: &Value) -> Result<Self, StoreError> {
        match value {
            Value::Number(number) => number
                .as_u64()
                .map(Self::Num)
                .ok_or_else(|| StoreError::InvalidId(number.to_string())),
            Value::String(text) => Uuid::parse_str(text)
                .map(Self::Uuid)
                .map_err(|_| StoreError::InvalidId(text.clone())),
            other => Err(StoreError::InvalidId(other.to_string())),
        }
    }

    /// Render the identifier as a Qdrant point id.
    pub fn to_point_id(&self) -> Value {
        match self {
            Self::Num(value) => Value::from(*value),
            Self::Uuid(value) => Value::String(value.to_string()),
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(value) => write!(f, "{value}"),
            Self::Uuid(value) => write!(f, "{value}"),
        }
    }
}

impl From<u64> for DocumentId {
    fn from(value: u64) -> Self {
        Self::Num(value)
    }
}

/// Document pulled from the store: identifier plus opaque payload fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Identifier used for ordering and checkpointing.
    pub id: DocumentId,
    /// Payload fields stored with the document.
    pub payload: Map<String, Value>,
}

impl Document {
    /// Construct a document from its identifier and payload.
    pub fn new(id: impl Into<DocumentId>, payload: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    /// Return the trimmed string value of `field`, or `None` when absent or blank.
    pub fn text_field(&self, field: &str) -> Option<&str> {
        self.payload
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Whether `field` is absent, null, an empty string, or an empty array.
    pub fn field_is_empty(&self, field: &str) -> bool {
        match self.payload.get(field) {
            None | Some(Value::Null) => true,
            Some(Value::String(text)) => text.is_empty(),
            Some(Value::Array(values)) => values.is_empty(),
            Some(_) => false,
        }
    }
}

/// Predicate selecting documents that still need enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityFilter {
    /// Field populated by the enrichment; eligible while absent or empty.
    pub target_field: String,
    /// Fields that must already be populated for a document to be selected.
    pub required_fields: Vec<String>,
}

impl EligibilityFilter {
    /// Select documents whose `target_field` is absent or empty.
    pub fn missing(target_field: impl Into<String>) -> Self {
        Self {
            target_field: target_field.into(),
            required_fields: Vec::new(),
        }
    }

    /// Additionally require `field` to be populated.
    pub fn requiring(mut self, field: impl Into<String>) -> Self {
        self.required_fields.push(field.into());
        self
    }

    /// Evaluate the predicate against a document held in memory.
    pub fn matches(&self, document: &Document) -> bool {
        document.field_is_empty(&self.target_field)
            && self
                .required_fields
                .iter()
                .all(|field| !document.field_is_empty(field))
    }
}

/// Parameters for opening an ordered scan over eligible documents.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanQuery {
    /// Eligibility predicate evaluated at scan time.
    pub filter: EligibilityFilter,
    /// When set, only identifiers strictly greater than this are returned.
    pub exclude_up_to: Option<DocumentId>,
    /// Page size requested from the store.
    pub batch_size: usize,
    /// Age after which the scan expires.
    pub max_scan_duration: Duration,
}

impl ScanQuery {
    /// Copy of this query that resumes strictly after `checkpoint`.
    pub fn resuming_after(&self, checkpoint: DocumentId) -> Self {
        Self {
            exclude_up_to: Some(checkpoint),
            ..self.clone()
        }
    }
}

/// Keyed update setting a single field on one document.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    /// Document to update.
    pub id: DocumentId,
    /// Field to set.
    pub field: String,
    /// Value written to the field.
    pub value: Value,
}

/// Per-document failure reported by a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkWriteFailure {
    /// Document whose update was not applied.
    pub id: DocumentId,
    /// Reason reported by the store.
    pub message: String,
}

/// Outcome of a bulk upsert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteReport {
    /// Number of documents the store reports as modified.
    pub modified_count: usize,
    /// Updates the store did not apply.
    pub errors: Vec<BulkWriteFailure>,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResponse {
    pub(crate) result: ScrollResult,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResult {
    #[serde(default)]
    pub(crate) points: Vec<ScrollPoint>,
    #[serde(default)]
    pub(crate) next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
pub(crate) struct ScrollPoint {
    pub(crate) id: Value,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct CountResponse {
    pub(crate) result: CountResult,
}

#[derive(Deserialize)]
pub(crate) struct CountResult {
    pub(crate) count: u64,
}

#[derive(Deserialize)]
pub(crate) struct BatchUpdateResponse {
    #[serde(default)]
    pub(crate) result: Vec<UpdateResult>,
}

#[derive(Deserialize)]
pub(crate) struct UpdateResult {
    #[serde(default)]
    pub(crate) status: String,
}
