//! Append-only change log store.
//!
//! The (`changeId`, `author`) unique index is the source of truth for
//! "already applied". Two runners that both believe a change set is new
//! race on the insert, and the loser's append surfaces as an error.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use tracing::{info, warn};

use super::connection::Connection;
use super::entry::{ChangeEntry, AUTHOR_FIELD, CHANGE_ID_FIELD};
use super::error::MigrationError;
use crate::store::{DocumentDatabase, Filter, IndexSpec};

/// Result of [`ChangeLogStore::ensure_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    /// A unique index was already in place.
    Present,
    /// The index did not exist and was created.
    Created,
    /// A non-unique index was dropped and recreated as unique.
    Recreated,
}

/// Make sure `collection` carries `required`, repairing a non-unique index
/// over the same keys.
pub(crate) fn ensure_unique_index(
    database: &dyn DocumentDatabase,
    collection: &str,
    required: IndexSpec,
) -> Result<IndexStatus, MigrationError> {
    let keys: Vec<&str> = required.keys.iter().map(String::as_str).collect();
    let existing = database
        .list_indexes(collection)?
        .into_iter()
        .find(|index| index.has_keys(&keys));

    match existing {
        Some(index) if index.unique => Ok(IndexStatus::Present),
        Some(index) => {
            warn!(
                collection,
                index = %index.name,
                "index is not unique, recreating"
            );
            database.drop_index(collection, &index.name)?;
            database.create_index(collection, required)?;
            Ok(IndexStatus::Recreated)
        }
        None => {
            database.create_index(collection, required.clone())?;
            info!(collection, index = %required.name, "index created");
            Ok(IndexStatus::Created)
        }
    }
}

/// Reads and appends change log entries.
#[derive(Debug)]
pub struct ChangeLogStore {
    connection: Connection,
    collection: String,
    last_stamp: AtomicI64,
}

impl ChangeLogStore {
    pub fn new(connection: Connection, collection: impl Into<String>) -> Self {
        Self {
            connection,
            collection: collection.into(),
            last_stamp: AtomicI64::new(0),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The unique compound index the collection must carry.
    pub fn required_index() -> IndexSpec {
        IndexSpec::new(&[CHANGE_ID_FIELD, AUTHOR_FIELD]).unique()
    }

    /// Create the unique index, or repair it if it exists without uniqueness.
    pub fn ensure_index(&self) -> Result<IndexStatus, MigrationError> {
        let database = self.connection.database()?;
        ensure_unique_index(database.as_ref(), &self.collection, Self::required_index())
    }

    /// Returns true if no entry with exactly this id and author exists.
    pub fn is_new(&self, change_id: &str, author: &str) -> Result<bool, MigrationError> {
        let database = self.connection.database()?;
        let filter = Filter::new()
            .eq(CHANGE_ID_FIELD, change_id)
            .eq(AUTHOR_FIELD, author);
        Ok(database.count(&self.collection, &filter)? == 0)
    }

    /// Insert an entry. Never upserts.
    pub fn append(&self, entry: &ChangeEntry) -> Result<(), MigrationError> {
        let database = self.connection.database()?;
        database.insert_one(&self.collection, entry.to_document()?)?;
        Ok(())
    }

    /// Every entry in insertion order.
    pub fn entries(&self) -> Result<Vec<ChangeEntry>, MigrationError> {
        let database = self.connection.database()?;
        database
            .find(&self.collection, &Filter::new())?
            .into_iter()
            .map(|document| {
                ChangeEntry::from_document(&self.collection, document).map_err(Into::into)
            })
            .collect()
    }

    /// Entries belonging to one change set, including failed and
    /// re-executed rows.
    pub fn history(
        &self,
        change_id: &str,
        author: &str,
    ) -> Result<Vec<ChangeEntry>, MigrationError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|entry| entry.author == author && entry.correlation_id() == change_id)
            .collect())
    }

    /// Epoch milliseconds for a derived id, strictly greater than any
    /// previously returned stamp.
    pub fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }
}
