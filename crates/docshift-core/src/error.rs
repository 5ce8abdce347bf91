//! Document store error types.

use thiserror::Error;

/// Errors raised by a document database driver.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A unique index rejected the write.
    #[error("duplicate key in {collection}: index {index} already contains {value}")]
    DuplicateKey {
        /// Collection the write targeted.
        collection: String,
        /// Name of the violated index.
        index: String,
        /// Rendered key values.
        value: String,
    },

    /// A stored document could not be decoded.
    #[error("corrupt document in {collection}: {message}")]
    CorruptDocument {
        /// Collection holding the document.
        collection: String,
        /// Decoder message.
        message: String,
    },

    /// Index definition rejected.
    #[error("invalid index: {0}")]
    InvalidIndex(String),

    /// Index not found.
    #[error("index {index} not found on {collection}")]
    IndexNotFound {
        /// Collection that was searched.
        collection: String,
        /// Requested index name.
        index: String,
    },

    /// Driver-specific failure reported by a non-sled implementation.
    #[error("{0}")]
    Driver(String),
}

impl StoreError {
    /// Whether this error is a unique index violation.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_key_display() {
        let err = StoreError::DuplicateKey {
            collection: "dbchangelog".to_string(),
            index: "changeId_1_author_1".to_string(),
            value: "\"001\", \"alice\"".to_string(),
        };
        assert!(err.is_duplicate_key());
        assert!(err.to_string().contains("changeId_1_author_1"));
    }

    #[test]
    fn test_other_errors_are_not_duplicates() {
        let err = StoreError::InvalidIndex("empty key list".to_string());
        assert!(!err.is_duplicate_key());
    }
}
