//! Migrator - orchestrates a migration run.
//!
//! A run validates the configuration, connects, takes the process lock,
//! applies every change set of every registry in order and releases the
//! lock on every exit path.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, warn};

use super::change::{ChangeLog, ChangeSet};
use super::changelog::ChangeLogStore;
use super::config::MigratorConfig;
use super::connection::Connection;
use super::entry::ChangeEntry;
use super::error::{ChangeSetError, MigrationError};
use super::lock::{LockGuard, LockStore};
use super::report::{ChangeSetOutcome, ExecutionReport};
use crate::store::DatabaseHandle;

/// Runs change sets against one database.
#[derive(Debug)]
pub struct Migrator {
    config: MigratorConfig,
    connection: Connection,
    lock: LockStore,
    change_log: ChangeLogStore,
}

impl Migrator {
    /// Create a migrator. Nothing is validated or opened until a run starts.
    pub fn new(config: MigratorConfig) -> Self {
        let connection = Connection::new();
        let lock = LockStore::new(connection.clone(), config.lock_collection.clone());
        let change_log =
            ChangeLogStore::new(connection.clone(), config.changelog_collection.clone());
        Self {
            config,
            connection,
            lock,
            change_log,
        }
    }

    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    /// The change log store. Usable once connected.
    pub fn change_log(&self) -> &ChangeLogStore {
        &self.change_log
    }

    /// The lock store. Usable once connected.
    pub fn lock(&self) -> &LockStore {
        &self.lock
    }

    /// Resolve the database, ensure the change log index and initialize
    /// the lock collection.
    pub fn connect(&self) -> Result<DatabaseHandle, MigrationError> {
        self.config.validate_connection()?;
        let client = self
            .config
            .client
            .as_ref()
            .ok_or_else(|| MigrationError::Configuration("database client is not set".to_string()))?;

        let database = client.database(&self.config.database_name)?;
        self.connection.attach(Arc::clone(&database));

        self.change_log.ensure_index()?;
        self.lock.initialize()?;
        info!(database = %self.config.database_name, "Connected");
        Ok(database)
    }

    /// Run every registered change set.
    ///
    /// Returns `Ok(None)` when the migrator is disabled or the lock could
    /// not be taken, so callers can tell "did not run" from "ran nothing".
    pub fn execute(&self) -> Result<Option<ExecutionReport>, MigrationError> {
        if !self.config.enabled {
            info!("Migrator is disabled, exiting");
            return Ok(None);
        }
        self.config.validate()?;

        let database = self.connect()?;
        let Some(guard) = self.acquire_lock()? else {
            return Ok(None);
        };

        info!(
            installation_id = %self.config.installation_id,
            environment = %self.config.environment,
            "Migration started"
        );
        let result = self.run_registries(&database);
        let report = self.finish(guard, result)?;
        info!(%report, "Migration finished");
        Ok(Some(report))
    }

    /// Run one change set outside of the registries.
    ///
    /// New change sets execute, applied repeatable ones execute again and
    /// applied non-repeatable ones count as failed without a log entry.
    /// Postponement is ignored.
    pub fn execute_single(
        &self,
        change_set: &ChangeSet,
    ) -> Result<Option<ExecutionReport>, MigrationError> {
        if !self.config.enabled {
            info!("Migrator is disabled, exiting");
            return Ok(None);
        }

        let database = self.connect()?;
        let Some(guard) = self.acquire_lock()? else {
            return Ok(None);
        };

        let result = self.run_single(&database, change_set);
        let report = self.finish(guard, result)?;
        info!(%report, change_id = change_set.id(), "Single change set finished");
        Ok(Some(report))
    }

    /// Whether any process currently holds the migration lock.
    pub fn is_execution_in_progress(&self) -> Result<bool, MigrationError> {
        self.lock.is_held()
    }

    /// Clear the lock left behind by a process that died while holding it.
    pub fn force_release_lock(&self) -> Result<(), MigrationError> {
        warn!(collection = %self.lock.collection(), "Force releasing lock");
        self.lock.release()
    }

    fn acquire_lock(&self) -> Result<Option<LockGuard>, MigrationError> {
        if let Some(guard) = self.lock.try_lock()? {
            info!("Lock acquired");
            return Ok(Some(guard));
        }

        if self.config.wait_for_lock {
            let deadline = Instant::now() + self.config.lock_wait;
            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let pause = self.config.lock_poll_interval.min(deadline - now);
                info!(
                    wait_ms = pause.as_millis() as u64,
                    "Lock held by another process, waiting"
                );
                thread::sleep(pause);

                if let Some(guard) = self.lock.try_lock()? {
                    info!("Lock acquired");
                    return Ok(Some(guard));
                }
            }
        }

        if self.config.fail_if_lock_unavailable {
            return Err(MigrationError::LockUnavailable(format!(
                "lock in {} is held by another process",
                self.lock.collection()
            )));
        }
        info!("Lock held by another process, skipping migration");
        Ok(None)
    }

    /// Release the lock and pick the error to report.
    fn finish(
        &self,
        guard: LockGuard,
        result: Result<ExecutionReport, MigrationError>,
    ) -> Result<ExecutionReport, MigrationError> {
        let released = guard.release();
        match (result, released) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => {
                error!(error = %e, "Migration aborted");
                Err(e)
            }
            (Err(e), Err(release_error)) => {
                error!(error = %e, "Migration aborted");
                error!(error = %release_error, "Failed to release lock after abort");
                Err(e)
            }
        }
    }

    fn run_registries(&self, database: &DatabaseHandle) -> Result<ExecutionReport, MigrationError> {
        let mut report = ExecutionReport::new(&self.config.installation_id);
        for registry in &self.config.registries {
            for change_log in registry.change_logs()? {
                let group = self.run_change_log(database, &change_log)?;
                report.merge(Some(&group));
            }
        }
        Ok(report)
    }

    fn run_change_log(
        &self,
        database: &DatabaseHandle,
        change_log: &ChangeLog,
    ) -> Result<ExecutionReport, MigrationError> {
        let mut report = ExecutionReport::new(&self.config.installation_id);
        for change_set in change_log.sorted_change_sets() {
            let outcome = self.apply(database, change_set)?;
            report.record(outcome);
        }
        info!(change_log = change_log.name(), %report, "Change log processed");
        Ok(report)
    }

    fn apply(
        &self,
        database: &DatabaseHandle,
        change_set: &ChangeSet,
    ) -> Result<ChangeSetOutcome, MigrationError> {
        let id = change_set.id();

        if !change_set.matches_environment(&self.config.environment) {
            info!(
                change_id = id,
                environment = change_set.environment(),
                "Skipped (wrong environment)"
            );
            return Ok(ChangeSetOutcome::Skipped);
        }

        if self.change_log.is_new(id, change_set.author())? {
            if change_set.is_postponed() {
                info!(change_id = id, "Postponed");
                return Ok(ChangeSetOutcome::Postponed);
            }
            return self.run_body(database, change_set, false);
        }

        if change_set.is_reexecutable() {
            return self.run_body(database, change_set, true);
        }

        info!(change_id = id, "Passed over");
        Ok(ChangeSetOutcome::Skipped)
    }

    fn run_single(
        &self,
        database: &DatabaseHandle,
        change_set: &ChangeSet,
    ) -> Result<ExecutionReport, MigrationError> {
        let mut report = ExecutionReport::new(&self.config.installation_id);
        let id = change_set.id();

        let outcome = if !change_set.matches_environment(&self.config.environment) {
            let refused = ChangeSetError::EnvironmentMismatch {
                change_id: id.to_string(),
                required: change_set.environment().to_string(),
            };
            warn!(error = %refused, "Refused");
            ChangeSetOutcome::Failed
        } else if self.change_log.is_new(id, change_set.author())? {
            self.run_body(database, change_set, false)?
        } else if change_set.is_repeatable() {
            self.run_body(database, change_set, true)?
        } else {
            let refused = ChangeSetError::NotRepeatable {
                change_id: id.to_string(),
            };
            warn!(error = %refused, "Refused");
            ChangeSetOutcome::Failed
        };

        report.record(outcome);
        Ok(report)
    }

    /// Invoke the body and append the matching change log entry.
    fn run_body(
        &self,
        database: &DatabaseHandle,
        change_set: &ChangeSet,
        rerun: bool,
    ) -> Result<ChangeSetOutcome, MigrationError> {
        let entry = ChangeEntry::from_change_set(change_set, &self.config.installation_id, Utc::now());

        match change_set.invoke(database, &self.config.params) {
            Ok(()) if rerun => {
                self.change_log
                    .append(&entry.reexecuted(self.change_log.next_stamp()))?;
                info!(change_id = change_set.id(), "Reapplied");
                Ok(ChangeSetOutcome::ReExecuted)
            }
            Ok(()) => {
                self.change_log.append(&entry)?;
                info!(change_id = change_set.id(), "Applied");
                Ok(ChangeSetOutcome::Executed)
            }
            Err(e) => {
                error!(change_id = change_set.id(), error = %e, "Failed");
                self.change_log
                    .append(&entry.failed(self.change_log.next_stamp(), e.to_string()))?;
                Ok(ChangeSetOutcome::Failed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::change::StaticRegistry;
    use crate::store::SledClient;

    fn config(client: &Arc<SledClient>, change_log: ChangeLog) -> MigratorConfig {
        MigratorConfig::new("app")
            .with_client(client.clone())
            .with_registry(StaticRegistry::new("app").with_change_log(change_log))
    }

    #[test]
    fn test_disabled_returns_none() {
        let migrator = Migrator::new(MigratorConfig::new("").with_enabled(false));
        assert!(migrator.execute().unwrap().is_none());
    }

    #[test]
    fn test_invalid_config_fails_before_io() {
        let migrator = Migrator::new(MigratorConfig::new("app"));
        assert!(matches!(
            migrator.execute(),
            Err(MigrationError::Configuration(_))
        ));
    }

    #[test]
    fn test_lock_queries_need_connection() {
        let client = Arc::new(SledClient::temporary().unwrap());
        let migrator = Migrator::new(config(&client, ChangeLog::new("log")));
        assert!(matches!(
            migrator.is_execution_in_progress(),
            Err(MigrationError::NotConnected)
        ));

        migrator.connect().unwrap();
        assert!(!migrator.is_execution_in_progress().unwrap());
    }

    #[test]
    fn test_execute_runs_and_releases_lock() {
        let client = Arc::new(SledClient::temporary().unwrap());
        let change_log = ChangeLog::new("log")
            .with_change_set(ChangeSet::new("001", "alice", "1", || {}))
            .with_change_set(ChangeSet::new("002", "alice", "2", || {}));
        let migrator = Migrator::new(config(&client, change_log));

        let report = migrator.execute().unwrap().unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.executed, 2);
        assert!(!migrator.is_execution_in_progress().unwrap());
    }

    #[test]
    fn test_failure_is_recorded_and_run_continues() {
        let client = Arc::new(SledClient::temporary().unwrap());
        let change_log = ChangeLog::new("log")
            .with_change_set(ChangeSet::new("001", "alice", "1", || -> Result<(), String> {
                Err("boom".to_string())
            }))
            .with_change_set(ChangeSet::new("002", "alice", "2", || {}));
        let migrator = Migrator::new(config(&client, change_log));

        let report = migrator.execute().unwrap().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.executed, 1);

        let history = migrator.change_log().history("001", "alice").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].error.as_deref(), Some("change set 001 failed: boom"));
        assert!(migrator.change_log().is_new("001", "alice").unwrap());
    }
}
