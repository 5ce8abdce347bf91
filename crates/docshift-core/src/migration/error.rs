//! Migration-specific error types.

use crate::error::StoreError;
use thiserror::Error;

/// Failure of a single change set.
///
/// These are recovered per change set: the run records a FAILED entry and
/// moves on to the next change set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChangeSetError {
    /// The change set body returned an error.
    #[error("change set {change_id} failed: {message}")]
    Body {
        /// The failing change set.
        change_id: String,
        /// Error text produced by the body.
        message: String,
    },

    /// The body declares a parameter nobody can supply.
    #[error("change set {change_set} has wrong arguments list, unsupported type: {type_name}")]
    UnsupportedParameter {
        /// Body name of the change set.
        change_set: String,
        /// The unresolvable parameter type.
        type_name: &'static str,
    },

    /// The change set was already applied and cannot run again.
    #[error("change set {change_id} was already applied and is not repeatable")]
    NotRepeatable {
        /// The rejected change set.
        change_id: String,
    },

    /// The change set is restricted to another environment.
    #[error("change set {change_id} can be executed only on {required} environment")]
    EnvironmentMismatch {
        /// The rejected change set.
        change_id: String,
        /// Environment declared by the change set.
        required: String,
    },
}

/// Errors that can abort a migration run.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Missing or invalid setup; raised before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A store was used before a successful connect.
    #[error("database is not connected")]
    NotConnected,

    /// The database failed or rejected a write.
    #[error("connection error: {0}")]
    Connection(#[from] StoreError),

    /// The process lock could not be obtained within the wait policy.
    #[error("could not acquire process lock: {0}")]
    LockUnavailable(String),

    /// A change log declares the same change set id twice.
    #[error("duplicated change set id found in {change_log}: '{change_id}'")]
    DuplicateIdentity {
        /// The offending change log.
        change_log: String,
        /// The repeated id.
        change_id: String,
    },

    /// A single change set failed.
    #[error(transparent)]
    ChangeSet(#[from] ChangeSetError),
}

impl MigrationError {
    /// Whether this error aborts the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MigrationError::ChangeSet(_))
    }
}
