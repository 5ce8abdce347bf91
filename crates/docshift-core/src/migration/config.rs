//! Migrator configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::change::{ChangeRegistry, ANY_ENVIRONMENT};
use super::error::MigrationError;
use super::params::ChangeParams;
use crate::store::DocumentClient;

/// Default change log collection.
pub const DEFAULT_CHANGELOG_COLLECTION: &str = "dbchangelog";

/// Default lock collection.
pub const DEFAULT_LOCK_COLLECTION: &str = "docshiftlock";

/// Default time to wait for the lock when waiting is enabled.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5 * 60);

/// Default pause between lock attempts.
pub const DEFAULT_LOCK_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for a [`Migrator`](super::Migrator).
///
/// Built once and moved into the migrator; it cannot be changed afterwards.
#[derive(Clone)]
pub struct MigratorConfig {
    /// Target database name. Required.
    pub database_name: String,

    /// Driver used to resolve the database. Required.
    pub client: Option<Arc<dyn DocumentClient>>,

    /// Change set sources, executed in order. At least one is required.
    pub registries: Vec<Arc<dyn ChangeRegistry>>,

    /// Disabled migrators return without a report.
    pub enabled: bool,

    /// Poll for the lock instead of giving up after one attempt.
    pub wait_for_lock: bool,

    /// How long to poll for the lock.
    pub lock_wait: Duration,

    /// Pause between lock attempts.
    pub lock_poll_interval: Duration,

    /// Fail with [`MigrationError::LockUnavailable`] instead of skipping the run.
    pub fail_if_lock_unavailable: bool,

    /// Change log collection name.
    pub changelog_collection: String,

    /// Lock collection name.
    pub lock_collection: String,

    /// Active environment; `any` runs every change set.
    pub environment: String,

    /// Singletons available to change set bodies.
    pub params: ChangeParams,

    /// Tag stamped on every change log entry.
    pub installation_id: String,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            database_name: String::new(),
            client: None,
            registries: Vec::new(),
            enabled: true,
            wait_for_lock: false,
            lock_wait: DEFAULT_LOCK_WAIT,
            lock_poll_interval: DEFAULT_LOCK_POLL_INTERVAL,
            fail_if_lock_unavailable: false,
            changelog_collection: DEFAULT_CHANGELOG_COLLECTION.to_string(),
            lock_collection: DEFAULT_LOCK_COLLECTION.to_string(),
            environment: ANY_ENVIRONMENT.to_string(),
            params: ChangeParams::new(),
            installation_id: Utc::now().timestamp_millis().to_string(),
        }
    }
}

impl MigratorConfig {
    /// Create a configuration targeting `database_name`.
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            ..Default::default()
        }
    }

    pub fn with_client(mut self, client: Arc<dyn DocumentClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Add a change set source.
    pub fn with_registry(mut self, registry: impl ChangeRegistry + 'static) -> Self {
        self.registries.push(Arc::new(registry));
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Enable lock waiting with the given timeout and poll interval.
    pub fn with_lock_wait(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.wait_for_lock = true;
        self.lock_wait = timeout;
        self.lock_poll_interval = poll_interval;
        self
    }

    pub fn with_wait_for_lock(mut self, wait: bool) -> Self {
        self.wait_for_lock = wait;
        self
    }

    pub fn with_fail_if_lock_unavailable(mut self, fail: bool) -> Self {
        self.fail_if_lock_unavailable = fail;
        self
    }

    /// Set the change log collection.
    ///
    /// Pointing an existing deployment at a new collection makes every
    /// change set look new, so they all run again.
    pub fn with_changelog_collection(mut self, collection: impl Into<String>) -> Self {
        self.changelog_collection = collection.into();
        self
    }

    /// Set the lock collection.
    ///
    /// Runners using different lock collections do not exclude each other.
    pub fn with_lock_collection(mut self, collection: impl Into<String>) -> Self {
        self.lock_collection = collection.into();
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_params(mut self, params: ChangeParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_installation_id(mut self, installation_id: impl Into<String>) -> Self {
        self.installation_id = installation_id.into();
        self
    }

    /// Checks needed before touching the database.
    pub(crate) fn validate_connection(&self) -> Result<(), MigrationError> {
        if self.database_name.trim().is_empty() {
            return Err(MigrationError::Configuration(
                "database name is not set".to_string(),
            ));
        }
        if self.client.is_none() {
            return Err(MigrationError::Configuration(
                "database client is not set".to_string(),
            ));
        }
        if self.changelog_collection.is_empty() || self.lock_collection.is_empty() {
            return Err(MigrationError::Configuration(
                "collection names must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks needed before a full run.
    pub fn validate(&self) -> Result<(), MigrationError> {
        self.validate_connection()?;
        if self.registries.is_empty() {
            return Err(MigrationError::Configuration(
                "no change set registry configured".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for MigratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registries: Vec<&str> = self.registries.iter().map(|r| r.name()).collect();
        f.debug_struct("MigratorConfig")
            .field("database_name", &self.database_name)
            .field("client", &self.client.is_some())
            .field("registries", &registries)
            .field("enabled", &self.enabled)
            .field("wait_for_lock", &self.wait_for_lock)
            .field("lock_wait", &self.lock_wait)
            .field("lock_poll_interval", &self.lock_poll_interval)
            .field("fail_if_lock_unavailable", &self.fail_if_lock_unavailable)
            .field("changelog_collection", &self.changelog_collection)
            .field("lock_collection", &self.lock_collection)
            .field("environment", &self.environment)
            .field("params", &self.params)
            .field("installation_id", &self.installation_id)
            .finish()
    }
}
