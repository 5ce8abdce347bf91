//! docshift command-line tool
//!
//! Inspects and repairs the migration state of an embedded docshift
//! database: lock state, change log history and index health.

mod commands;
mod error;
mod formatter;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use commands::Command;
use docshift_core::migration::{DEFAULT_CHANGELOG_COLLECTION, DEFAULT_LOCK_COLLECTION};
use docshift_core::{Migrator, MigratorConfig, SledClient, StoreConfig};
use error::CliError;
use formatter::OutputFormat;

/// docshift command-line tool
#[derive(Parser, Debug)]
#[command(name = "docshift")]
#[command(version, about = "Inspect and repair docshift migration state")]
pub struct Args {
    /// Path to the database storage directory.
    #[arg(short, long, default_value = "./docshift_data")]
    pub data_path: PathBuf,

    /// Target database name.
    #[arg(short = 'D', long)]
    pub database: String,

    /// Change log collection name.
    #[arg(long, default_value = DEFAULT_CHANGELOG_COLLECTION)]
    pub changelog_collection: String,

    /// Lock collection name.
    #[arg(long, default_value = DEFAULT_LOCK_COLLECTION)]
    pub lock_collection: String,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// Storage configuration for the data directory.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(&self.data_path)
    }

    /// Migrator configuration using `client`.
    pub fn into_config(self, client: Arc<SledClient>) -> MigratorConfig {
        MigratorConfig::new(self.database)
            .with_client(client)
            .with_changelog_collection(self.changelog_collection)
            .with_lock_collection(self.lock_collection)
    }
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docshift=info,docshift_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<String, CliError> {
    tracing::info!(
        data_path = %args.data_path.display(),
        database = %args.database,
        "opening database"
    );
    let client = Arc::new(SledClient::open(args.store_config())?);
    let formatter = formatter::create_formatter(args.format);
    let command = args.command.clone();

    let migrator = Migrator::new(args.into_config(client.clone()));
    let output = commands::execute(&command, &migrator, &*formatter)?;
    client.flush()?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["docshift", "--database", "app", "status"]);
        assert_eq!(args.data_path, PathBuf::from("./docshift_data"));
        assert_eq!(args.changelog_collection, "dbchangelog");
        assert_eq!(args.lock_collection, "docshiftlock");
        assert_eq!(args.format, OutputFormat::Table);
        assert_eq!(args.command, Command::Status);
    }

    #[test]
    fn test_database_is_required() {
        assert!(Args::try_parse_from(["docshift", "status"]).is_err());
    }

    #[test]
    fn test_history_requires_author_with_change_id() {
        assert!(Args::try_parse_from([
            "docshift",
            "-D",
            "app",
            "history",
            "--change-id",
            "001"
        ])
        .is_err());

        let args = Args::parse_from([
            "docshift",
            "-D",
            "app",
            "history",
            "--change-id",
            "001",
            "--author",
            "alice",
        ]);
        assert_eq!(
            args.command,
            Command::History {
                change_id: Some("001".to_string()),
                author: Some("alice".to_string()),
            }
        );
    }

    #[test]
    fn test_into_config() {
        let args = Args::parse_from([
            "docshift",
            "--data-path",
            "/var/lib/docshift",
            "--database",
            "orders",
            "--changelog-collection",
            "ledger",
            "--lock-collection",
            "ordersLock",
            "--format",
            "json",
            "unlock",
            "--force",
        ]);
        assert_eq!(args.store_config().path, PathBuf::from("/var/lib/docshift"));
        assert_eq!(args.format, OutputFormat::Json);

        let client = Arc::new(SledClient::temporary().unwrap());
        let config = args.into_config(client);
        assert_eq!(config.database_name, "orders");
        assert_eq!(config.changelog_collection, "ledger");
        assert_eq!(config.lock_collection, "ordersLock");
        assert!(config.client.is_some());
    }

    #[test]
    fn test_run_against_data_directory() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().to_str().unwrap();

        let args = Args::parse_from(["docshift", "-d", data_path, "-D", "app", "--format", "json", "repair-index"]);
        let output = run(args).unwrap();
        assert!(output.contains("\"dbchangelog\":\"created\""));

        let args = Args::parse_from(["docshift", "-d", data_path, "-D", "app", "--format", "json", "status"]);
        let output = run(args).unwrap();
        assert!(output.contains("\"lockHeld\":false"));
    }
}
