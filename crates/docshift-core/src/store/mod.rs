//! Document database boundary.
//!
//! The migrator never talks to a concrete driver. It is handed a
//! [`DocumentClient`] and resolves a [`DocumentDatabase`] by name when a run
//! connects. [`SledClient`] is the embedded implementation shipped with the
//! crate; any other driver only needs to implement the two traits.

mod config;
mod document;
mod engine;

pub mod key;

pub use config::StoreConfig;
pub use document::{Document, Filter, IndexSpec, ID_FIELD, ID_INDEX};
pub use engine::{SledClient, SledDatabase};

use std::sync::Arc;

use crate::error::StoreError;

/// Shared handle to a connected database.
pub type DatabaseHandle = Arc<dyn DocumentDatabase>;

/// Entry point of a driver: hands out databases by name.
pub trait DocumentClient: Send + Sync {
    /// Resolve a database handle.
    fn database(&self, name: &str) -> Result<DatabaseHandle, StoreError>;
}

/// Collection-scoped operations used by the migrator.
///
/// All calls are synchronous and block the calling thread.
pub trait DocumentDatabase: Send + Sync {
    /// The database name.
    fn name(&self) -> &str;

    /// Insert a single document atomically.
    ///
    /// Fails with [`StoreError::DuplicateKey`] if any unique index of the
    /// collection already holds the document's key tuple. Never upserts.
    fn insert_one(&self, collection: &str, document: Document) -> Result<(), StoreError>;

    /// Return every document matching the filter, in insertion order.
    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    /// Return the first matching document.
    fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, StoreError> {
        Ok(self.find(collection, filter)?.into_iter().next())
    }

    /// Count matching documents.
    fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        Ok(self.find(collection, filter)?.len() as u64)
    }

    /// Delete every matching document. Deleting nothing is not an error.
    fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    /// List index definitions, including the implicit `_id_` index.
    fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, StoreError>;

    /// Create an index. Creating an identical index again is a no-op.
    fn create_index(&self, collection: &str, index: IndexSpec) -> Result<(), StoreError>;

    /// Drop an index by name.
    fn drop_index(&self, collection: &str, name: &str) -> Result<(), StoreError>;

    /// List collections that have been touched in this database.
    fn list_collections(&self) -> Result<Vec<String>, StoreError>;
}
