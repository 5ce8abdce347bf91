//! Migration runner.
//!
//! Applies change sets to a document database exactly once, records each
//! outcome in an append-only change log and makes sure only one process
//! per database runs migrations at a time.
//!
//! # Execution policy
//!
//! | Change set state | Outcome |
//! |------------------|---------|
//! | declared for another environment | skipped |
//! | new, postponed | postponed, not logged |
//! | new | executed, INSTALLED entry |
//! | applied, `run_always` + `repeatable` | re-executed, new INSTALLED entry |
//! | applied | skipped |
//!
//! A body that fails, or declares a parameter that cannot be resolved, is
//! counted as failed and logged under a derived id. The run continues.
//!
//! # Example
//!
//! ```ignore
//! use docshift_core::migration::{ChangeLog, ChangeSet, Db, Migrator, MigratorConfig, StaticRegistry};
//! use docshift_core::store::{IndexSpec, SledClient};
//!
//! let registry = StaticRegistry::new("app").with_change_log(
//!     ChangeLog::new("UserChangeLog").with_change_set(ChangeSet::new(
//!         "001",
//!         "alice",
//!         "001",
//!         |db: Db| db.create_index("users", IndexSpec::new(&["email"]).unique()),
//!     )),
//! );
//!
//! let config = MigratorConfig::new("app")
//!     .with_client(Arc::new(SledClient::open(StoreConfig::new("./data"))?))
//!     .with_registry(registry);
//!
//! if let Some(report) = Migrator::new(config).execute()? {
//!     println!("{}", report);
//! }
//! ```

pub mod change;
pub mod changelog;
pub mod config;
pub mod connection;
pub mod entry;
pub mod error;
pub mod executor;
pub mod lock;
pub mod params;
pub mod report;

pub use change::{ChangeLog, ChangeRegistry, ChangeSet, StaticRegistry, ANY_ENVIRONMENT};
pub use changelog::{ChangeLogStore, IndexStatus};
pub use config::{
    MigratorConfig, DEFAULT_CHANGELOG_COLLECTION, DEFAULT_LOCK_COLLECTION,
    DEFAULT_LOCK_POLL_INTERVAL, DEFAULT_LOCK_WAIT,
};
pub use connection::Connection;
pub use entry::{ChangeEntry, ChangeStatus};
pub use error::{ChangeSetError, MigrationError};
pub use executor::Migrator;
pub use lock::{LockGuard, LockStore};
pub use params::{ChangeBody, ChangeOutcome, ChangeParams, Db, Inject, Param, ParamResolver};
pub use report::{ChangeSetOutcome, ExecutionReport};
