//! Process lock backed by a single well-known document.
//!
//! The lock is held while the document exists. Acquiring inserts it and
//! relies on the unique `key_1` index to reject a second holder; releasing
//! deletes it. There is no owner token and no lease: a holder that dies
//! without releasing keeps the lock until an operator calls
//! [`LockStore::release`].

use serde_json::Value;
use tracing::{debug, error, info};

use super::changelog::{ensure_unique_index, IndexStatus};
use super::connection::Connection;
use super::error::MigrationError;
use crate::store::{Document, Filter, IndexSpec};

/// Field identifying the lock document.
pub const LOCK_KEY_FIELD: &str = "key";

/// Value of [`LOCK_KEY_FIELD`] on the lock document.
pub const LOCK_KEY: &str = "LOCK";

const LOCK_STATUS_FIELD: &str = "status";
const LOCK_STATUS_HELD: &str = "LOCK_HELD";

/// Lock document store.
#[derive(Debug, Clone)]
pub struct LockStore {
    connection: Connection,
    collection: String,
}

impl LockStore {
    pub fn new(connection: Connection, collection: impl Into<String>) -> Self {
        Self {
            connection,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Ensure the unique key index exists. Safe to call repeatedly.
    pub fn initialize(&self) -> Result<IndexStatus, MigrationError> {
        let database = self.connection.database()?;
        ensure_unique_index(
            database.as_ref(),
            &self.collection,
            IndexSpec::new(&[LOCK_KEY_FIELD]).unique(),
        )
    }

    /// Try to take the lock once. Returns false if another process holds it.
    pub fn acquire(&self) -> Result<bool, MigrationError> {
        let database = self.connection.database()?;

        let mut document = Document::new();
        document.insert(LOCK_KEY_FIELD.to_string(), Value::from(LOCK_KEY));
        document.insert(LOCK_STATUS_FIELD.to_string(), Value::from(LOCK_STATUS_HELD));

        match database.insert_one(&self.collection, document) {
            Ok(()) => {
                debug!(collection = %self.collection, "lock acquired");
                Ok(true)
            }
            Err(e) if e.is_duplicate_key() => {
                debug!(collection = %self.collection, "lock already held");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the lock document. Releasing a free lock is a no-op.
    pub fn release(&self) -> Result<(), MigrationError> {
        let database = self.connection.database()?;
        let removed = database.delete_many(&self.collection, &lock_filter())?;
        debug!(collection = %self.collection, removed, "lock released");
        Ok(())
    }

    /// Whether any process holds the lock.
    pub fn is_held(&self) -> Result<bool, MigrationError> {
        let database = self.connection.database()?;
        Ok(database.count(&self.collection, &lock_filter())? >= 1)
    }

    /// Try to take the lock once, returning a guard that releases it.
    pub fn try_lock(&self) -> Result<Option<LockGuard>, MigrationError> {
        if self.acquire()? {
            Ok(Some(LockGuard {
                store: self.clone(),
                released: false,
            }))
        } else {
            Ok(None)
        }
    }
}

fn lock_filter() -> Filter {
    Filter::new().eq(LOCK_KEY_FIELD, LOCK_KEY)
}

/// Held lock. Dropping the guard releases the lock, also while unwinding.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard {
    store: LockStore,
    released: bool,
}

impl LockGuard {
    /// Release the lock and report the outcome.
    pub fn release(mut self) -> Result<(), MigrationError> {
        self.released = true;
        self.store.release()?;
        info!(collection = %self.store.collection, "lock released");
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.store.release() {
            Ok(()) => info!(collection = %self.store.collection, "lock released on drop"),
            Err(e) => error!(collection = %self.store.collection, error = %e, "failed to release lock"),
        }
    }
}
