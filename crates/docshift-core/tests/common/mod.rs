//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use docshift_core::migration::{ChangeLog, ChangeSet, Connection, LockStore};
use docshift_core::store::{
    DatabaseHandle, Document, DocumentClient, DocumentDatabase, Filter, IndexSpec, SledClient,
};
use docshift_core::{Inject, MigratorConfig, StaticRegistry, StoreError};

pub const DATABASE: &str = "app";
pub const AUTHOR: &str = "testuser";

/// Counts body invocations.
#[derive(Debug, Default)]
pub struct Invocations {
    count: AtomicUsize,
}

impl Invocations {
    pub fn hit(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

pub fn client() -> Arc<SledClient> {
    Arc::new(SledClient::temporary().unwrap())
}

/// A change set whose body bumps the shared invocation counter.
pub fn counting(id: &str, order: &str) -> ChangeSet {
    ChangeSet::new(id, AUTHOR, order, |calls: Inject<Invocations>| calls.hit())
}

/// A change log with `n` counting change sets `001..=n`.
pub fn numbered_change_log(name: &str, n: usize) -> ChangeLog {
    (1..=n).fold(ChangeLog::new(name), |log, i| {
        let id = format!("{:03}", i);
        log.with_change_set(counting(&id, &id))
    })
}

pub fn config(client: Arc<dyn DocumentClient>, calls: &Arc<Invocations>) -> MigratorConfig {
    MigratorConfig::new(DATABASE)
        .with_client(client)
        .with_params(docshift_core::ChangeParams::new().with_shared(Arc::clone(calls)))
}

pub fn registry(change_log: ChangeLog) -> StaticRegistry {
    StaticRegistry::new("test").with_change_log(change_log)
}

/// A lock store on the default lock collection, independent of any migrator.
pub fn lock_store(client: &SledClient) -> LockStore {
    let connection = Connection::connected(Arc::new(client.open_database(DATABASE)));
    let store = LockStore::new(connection, "docshiftlock");
    store.initialize().unwrap();
    store
}

/// Wraps a database and fails inserts into one collection once armed.
pub struct FlakyDatabase {
    inner: DatabaseHandle,
    collection: String,
    armed: AtomicBool,
}

impl FlakyDatabase {
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl DocumentDatabase for FlakyDatabase {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn insert_one(&self, collection: &str, document: Document) -> Result<(), StoreError> {
        if collection == self.collection && self.armed.load(Ordering::SeqCst) {
            return Err(StoreError::Driver("connection reset by peer".to_string()));
        }
        self.inner.insert_one(collection, document)
    }

    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        self.inner.find(collection, filter)
    }

    fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.inner.delete_many(collection, filter)
    }

    fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, StoreError> {
        self.inner.list_indexes(collection)
    }

    fn create_index(&self, collection: &str, index: IndexSpec) -> Result<(), StoreError> {
        self.inner.create_index(collection, index)
    }

    fn drop_index(&self, collection: &str, name: &str) -> Result<(), StoreError> {
        self.inner.drop_index(collection, name)
    }

    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_collections()
    }
}

/// Client handing out one shared [`FlakyDatabase`].
pub struct FlakyClient {
    pub database: Arc<FlakyDatabase>,
}

impl FlakyClient {
    pub fn new(inner: &SledClient, collection: &str) -> Self {
        Self {
            database: Arc::new(FlakyDatabase {
                inner: Arc::new(inner.open_database(DATABASE)),
                collection: collection.to_string(),
                armed: AtomicBool::new(false),
            }),
        }
    }
}

impl DocumentClient for FlakyClient {
    fn database(&self, _name: &str) -> Result<DatabaseHandle, StoreError> {
        Ok(self.database.clone())
    }
}
