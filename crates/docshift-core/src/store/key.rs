//! Key layout inside a collection tree.
//!
//! Every collection is one sled tree holding three key families:
//!
//! ```text
//! doc\0<id: u64 big-endian>                -> document JSON
//! idx\0<index name>\0<v1>\0<v2>...         -> doc key
//! meta\0indexes                            -> JSON array of IndexSpec
//! ```
//!
//! Big-endian ids keep iteration order equal to insertion order.

use serde_json::Value;

/// Prefix for document keys.
pub const DOC_PREFIX: &[u8] = b"doc\0";

/// Prefix for index entry keys.
pub const INDEX_PREFIX: &[u8] = b"idx\0";

/// Key holding the collection's index definitions.
pub const META_INDEXES: &[u8] = b"meta\0indexes";

/// Separator between database and collection in tree names.
pub const TREE_SEPARATOR: char = '/';

/// Tree name for a collection of a database.
pub fn tree_name(database: &str, collection: &str) -> String {
    format!("{}{}{}", database, TREE_SEPARATOR, collection)
}

/// Collection name if `tree` belongs to `database`.
pub fn collection_of<'a>(database: &str, tree: &'a str) -> Option<&'a str> {
    tree.strip_prefix(database)?
        .strip_prefix(TREE_SEPARATOR)
        .filter(|c| !c.is_empty())
}

/// Encode a document key.
pub fn doc_key(id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(DOC_PREFIX.len() + 8);
    key.extend_from_slice(DOC_PREFIX);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Prefix covering every entry of one index.
pub fn index_prefix(index: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(INDEX_PREFIX.len() + index.len() + 1);
    key.extend_from_slice(INDEX_PREFIX);
    key.extend_from_slice(index.as_bytes());
    key.push(0);
    key
}

/// Encode an index entry key from the indexed values.
///
/// Values are rendered as canonical JSON so `"1"` and `1` stay distinct.
pub fn index_key(index: &str, values: &[&Value]) -> Vec<u8> {
    let mut key = index_prefix(index);
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            key.push(0);
        }
        key.extend_from_slice(value.to_string().as_bytes());
    }
    key
}

/// Render index values for error messages.
pub fn render_values(values: &[&Value]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_doc_keys_sort_by_id() {
        assert!(doc_key(1) < doc_key(2));
        assert!(doc_key(255) < doc_key(256));
        assert!(doc_key(7).starts_with(DOC_PREFIX));
    }

    #[test]
    fn test_index_key_distinguishes_types() {
        let a = index_key("key_1", &[&json!("1")]);
        let b = index_key("key_1", &[&json!(1)]);
        assert_ne!(a, b);
        assert!(a.starts_with(&index_prefix("key_1")));
    }

    #[test]
    fn test_index_prefix_does_not_cover_longer_names() {
        let entry = index_key("key_10", &[&json!("x")]);
        assert!(!entry.starts_with(&index_prefix("key_1")));
    }

    #[test]
    fn test_collection_of() {
        assert_eq!(collection_of("app", "app/dbchangelog"), Some("dbchangelog"));
        assert_eq!(collection_of("app", "application/dbchangelog"), None);
        assert_eq!(collection_of("app", "app/"), None);
        assert_eq!(collection_of("app", &tree_name("app", "lock")), Some("lock"));
    }
}
