use crate::value::KeyValue;
use serde_json::{Map, Value};

/// The mandatory primary-key field of every document.
pub const KEY_ID: &str = "id";

/// A document is an unordered mapping from field names to JSON values.
pub type Document = Map<String, Value>;

/// Extracts the primary key of a document. A missing or null `id` yields
/// `None`; such documents are rejected at insert.
pub(crate) fn primary_key(document: &Document) -> Option<KeyValue> {
    document
        .get(KEY_ID)
        .filter(|v| !v.is_null())
        .map(|v| KeyValue::from(v.clone()))
}
