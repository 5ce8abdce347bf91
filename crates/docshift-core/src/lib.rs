//! docshift core - document database migration runner.
//!
//! This crate provides the migration engine and an embedded document store
//! built on sled that serves as the default driver.

pub mod error;
pub mod migration;
pub mod store;

pub use error::StoreError;
pub use migration::{
    ChangeEntry, ChangeLog, ChangeLogStore, ChangeParams, ChangeRegistry, ChangeSet,
    ChangeSetError, ChangeStatus, Db, ExecutionReport, Inject, LockStore, MigrationError,
    Migrator, MigratorConfig, StaticRegistry,
};
pub use store::{
    DatabaseHandle, Document, DocumentClient, DocumentDatabase, Filter, IndexSpec, SledClient,
    SledDatabase, StoreConfig,
};
