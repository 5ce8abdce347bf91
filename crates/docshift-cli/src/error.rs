//! CLI error types.

use docshift_core::{MigrationError, StoreError};
use thiserror::Error;

/// Errors surfaced to the operator.
#[derive(Debug, Error)]
pub enum CliError {
    /// The document store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A migration store operation failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// The lock is still held and `--force` was not given.
    #[error("lock in {0} is held; pass --force to clear it")]
    LockHeld(String),
}
