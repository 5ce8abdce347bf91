//! Documents, equality filters and index definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field holding the document identifier.
pub const ID_FIELD: &str = "_id";

/// Name of the implicit unique index on [`ID_FIELD`].
pub const ID_INDEX: &str = "_id_";

/// A schemaless document.
pub type Document = serde_json::Map<String, Value>;

/// Conjunction of top-level field equality clauses.
///
/// A missing field only matches a `null` clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    /// Create a filter matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    /// Check whether a document satisfies every clause.
    pub fn matches(&self, document: &Document) -> bool {
        self.clauses.iter().all(|(field, expected)| {
            document.get(field).unwrap_or(&Value::Null) == expected
        })
    }

    /// Returns true if the filter has no clauses.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// The equality clauses.
    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }
}

/// Index definition on a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name, unique per collection.
    pub name: String,
    /// Indexed fields, in key order.
    pub keys: Vec<String>,
    /// Whether the index rejects duplicate key tuples.
    pub unique: bool,
}

impl IndexSpec {
    /// Create a non-unique ascending index named after its keys.
    pub fn new(keys: &[&str]) -> Self {
        Self {
            name: Self::default_name(keys),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            unique: false,
        }
    }

    /// Mark the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Override the index name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Conventional name: `field_1` segments joined by `_`.
    pub fn default_name(keys: &[&str]) -> String {
        keys.iter()
            .map(|k| format!("{}_1", k))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// The implicit unique index every collection carries.
    pub fn id_index() -> Self {
        Self::new(&[ID_FIELD]).unique().with_name(ID_INDEX)
    }

    /// Returns true if this index is over exactly `keys`, in order.
    pub fn has_keys(&self, keys: &[&str]) -> bool {
        self.keys.len() == keys.len() && self.keys.iter().zip(keys).all(|(a, b)| a == b)
    }

    /// Extract this index's key tuple from a document.
    pub fn key_values<'a>(&self, document: &'a Document) -> Vec<&'a Value> {
        self.keys
            .iter()
            .map(|k| document.get(k).unwrap_or(&Value::Null))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_filter_matches() {
        let d = doc(json!({"changeId": "001", "author": "alice", "status": "installed"}));

        assert!(Filter::new().matches(&d));
        assert!(Filter::new().eq("changeId", "001").eq("author", "alice").matches(&d));
        assert!(!Filter::new().eq("changeId", "001").eq("author", "bob").matches(&d));
    }

    #[test]
    fn test_filter_missing_field_matches_null() {
        let d = doc(json!({"changeId": "001"}));
        assert!(Filter::new().eq("error", Value::Null).matches(&d));
        assert!(!Filter::new().eq("error", "boom").matches(&d));
    }

    #[test]
    fn test_index_default_name() {
        let index = IndexSpec::new(&["changeId", "author"]).unique();
        assert_eq!(index.name, "changeId_1_author_1");
        assert!(index.unique);
        assert!(index.has_keys(&["changeId", "author"]));
        assert!(!index.has_keys(&["author", "changeId"]));
    }

    #[test]
    fn test_key_values_fill_missing_with_null() {
        let index = IndexSpec::new(&["key", "owner"]);
        let d = doc(json!({"key": "LOCK"}));
        assert_eq!(index.key_values(&d), vec![&json!("LOCK"), &Value::Null]);
    }
}
