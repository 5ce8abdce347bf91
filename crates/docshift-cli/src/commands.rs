//! Operator commands.

use std::sync::Arc;

use clap::Subcommand;
use docshift_core::migration::{ChangeLogStore, Connection, LockStore, Migrator};
use docshift_core::{DocumentClient, MigrationError};
use tracing::info;

use crate::error::CliError;
use crate::formatter::{Formatter, StatusSummary};

/// Operator subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show lock state and change log totals.
    Status,

    /// List change log entries.
    History {
        /// Only show rows belonging to this change set id.
        #[arg(long, requires = "author")]
        change_id: Option<String>,

        /// Author of the change set given by --change-id.
        #[arg(long)]
        author: Option<String>,
    },

    /// Clear a lock left behind by a runner that died.
    Unlock {
        /// Clear the lock without checking whether it is held.
        #[arg(long)]
        force: bool,
    },

    /// Create or repair the change log and lock indexes.
    RepairIndex,
}

/// Execute a command and return the formatted output.
pub fn execute(
    command: &Command,
    migrator: &Migrator,
    formatter: &dyn Formatter,
) -> Result<String, CliError> {
    match command {
        Command::Status => {
            migrator.connect()?;
            let entries = migrator.change_log().entries()?;
            let installed = entries.iter().filter(|e| e.is_installed()).count();
            let status = StatusSummary {
                database: migrator.config().database_name.clone(),
                lock_collection: migrator.lock().collection().to_string(),
                lock_held: migrator.is_execution_in_progress()?,
                installed,
                failed: entries.len() - installed,
            };
            Ok(formatter.format_status(&status))
        }

        Command::History { change_id, author } => {
            migrator.connect()?;
            let entries = match (change_id, author) {
                (Some(change_id), Some(author)) => migrator.change_log().history(change_id, author)?,
                _ => migrator.change_log().entries()?,
            };
            Ok(formatter.format_entries(&entries))
        }

        Command::Unlock { force } => {
            migrator.connect()?;
            if !migrator.is_execution_in_progress()? {
                return Ok(formatter.format_message("Lock is not held"));
            }
            if !force {
                return Err(CliError::LockHeld(migrator.lock().collection().to_string()));
            }
            migrator.force_release_lock()?;
            Ok(formatter.format_message("Lock released"))
        }

        Command::RepairIndex => {
            let config = migrator.config();
            let client: &Arc<dyn DocumentClient> = config.client.as_ref().ok_or_else(|| {
                MigrationError::Configuration("database client is not set".to_string())
            })?;
            let connection = Connection::connected(client.database(&config.database_name)?);

            let change_log = ChangeLogStore::new(connection.clone(), config.changelog_collection.clone());
            let lock = LockStore::new(connection, config.lock_collection.clone());
            let indexes = vec![
                (change_log.collection().to_string(), change_log.ensure_index()?),
                (lock.collection().to_string(), lock.initialize()?),
            ];
            info!(?indexes, "Indexes checked");
            Ok(formatter.format_indexes(&indexes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::JsonFormatter;
    use docshift_core::migration::ChangeSet;
    use docshift_core::store::IndexSpec;
    use docshift_core::{DocumentDatabase, MigratorConfig, SledClient};

    fn migrator(client: &Arc<SledClient>) -> Migrator {
        Migrator::new(MigratorConfig::new("app").with_client(client.clone()))
    }

    fn json(output: &str) -> serde_json::Value {
        serde_json::from_str(output).unwrap()
    }

    #[test]
    fn test_status_and_history() {
        let client = Arc::new(SledClient::temporary().unwrap());
        let migrator = migrator(&client);
        migrator
            .execute_single(&ChangeSet::new("001", "alice", "1", || {}))
            .unwrap()
            .unwrap();

        let status = json(&execute(&Command::Status, &migrator, &JsonFormatter).unwrap());
        assert_eq!(status["installed"], 1);
        assert_eq!(status["failed"], 0);
        assert_eq!(status["lockHeld"], false);

        let history = json(
            &execute(
                &Command::History {
                    change_id: Some("001".to_string()),
                    author: Some("alice".to_string()),
                },
                &migrator,
                &JsonFormatter,
            )
            .unwrap(),
        );
        assert_eq!(history.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_unlock_requires_force() {
        let client = Arc::new(SledClient::temporary().unwrap());
        let migrator = migrator(&client);
        migrator.connect().unwrap();
        assert!(migrator.lock().acquire().unwrap());

        let err = execute(&Command::Unlock { force: false }, &migrator, &JsonFormatter).unwrap_err();
        assert!(matches!(err, CliError::LockHeld(_)));
        assert!(migrator.is_execution_in_progress().unwrap());

        let output = execute(&Command::Unlock { force: true }, &migrator, &JsonFormatter).unwrap();
        assert_eq!(json(&output)["message"], "Lock released");
        assert!(!migrator.is_execution_in_progress().unwrap());
    }

    #[test]
    fn test_repair_index() {
        let client = Arc::new(SledClient::temporary().unwrap());
        client
            .database("app")
            .unwrap()
            .create_index("dbchangelog", IndexSpec::new(&["changeId", "author"]))
            .unwrap();

        let output = execute(&Command::RepairIndex, &migrator(&client), &JsonFormatter).unwrap();
        let indexes = json(&output);
        assert_eq!(indexes["dbchangelog"], "recreated");
        assert_eq!(indexes["docshiftlock"], "created");
    }
}
