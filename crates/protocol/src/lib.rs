pub mod codec;

use serde_json::{Map, Value};
use thiserror::Error;

pub use codec::NdjsonRecords;

/// A domain entity the loader can address.
///
/// The id is used for the destination path and for diagnostics only; the payload is
/// opaque to the loader and only ever seen by an [`Encoder`].
pub trait Record: Send + 'static {
    fn id(&self) -> &str;
}

#[derive(Debug, Error)]
#[error("failed to encode record {id}: {reason}")]
pub struct EncodeError {
    pub id: String,
    pub reason: String,
}

/// Turns a record into its wire payload.
///
/// Implementations must be pure: the same record always yields the same bytes and
/// nothing of the record is retained after the call returns.
pub trait Encoder<R>: Send + Sync + 'static {
    fn encode(&self, record: &R) -> Result<Vec<u8>, EncodeError>;
}

/// A JSON object carrying its own `"id"` field.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: String,
    body: Map<String, Value>,
}

impl Document {
    /// Build a document from a parsed JSON object. String ids are taken as-is and
    /// integer ids are rendered in decimal; anything else yields `None`.
    pub fn from_object(body: Map<String, Value>) -> Option<Self> {
        let id = match body.get("id")? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
            _ => return None,
        };
        Some(Self { id, body })
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }
}

impl Record for Document {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Serializes a whole [`Document`] back to compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl Encoder<Document> for JsonEncoder {
    fn encode(&self, record: &Document) -> Result<Vec<u8>, EncodeError> {
        serde_json::to_vec(&record.body).map_err(|e| EncodeError {
            id: record.id.clone(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
