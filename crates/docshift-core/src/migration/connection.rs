//! Shared database slot filled by [`Migrator::connect`](super::Migrator::connect).

use std::sync::Arc;

use parking_lot::RwLock;

use super::error::MigrationError;
use crate::store::DatabaseHandle;

/// Database handle shared by the lock and change log stores.
///
/// Clones share the same slot. Reads before a handle is attached fail with
/// [`MigrationError::NotConnected`].
#[derive(Clone, Default)]
pub struct Connection {
    slot: Arc<RwLock<Option<DatabaseHandle>>>,
}

impl Connection {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a slot already holding a handle.
    pub fn connected(database: DatabaseHandle) -> Self {
        let connection = Self::new();
        connection.attach(database);
        connection
    }

    /// Replace the held handle.
    pub fn attach(&self, database: DatabaseHandle) {
        *self.slot.write() = Some(database);
    }

    pub fn detach(&self) {
        self.slot.write().take();
    }

    pub fn is_connected(&self) -> bool {
        self.slot.read().is_some()
    }

    /// The connected database.
    pub fn database(&self) -> Result<DatabaseHandle, MigrationError> {
        self.slot.read().clone().ok_or(MigrationError::NotConnected)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let database = self.slot.read().as_ref().map(|db| db.name().to_string());
        f.debug_struct("Connection")
            .field("database", &database)
            .finish()
    }
}
