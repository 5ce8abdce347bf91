//! Persisted change log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::change::ChangeSet;
use crate::error::StoreError;
use crate::store::Document;

/// Field holding the change set id.
pub const CHANGE_ID_FIELD: &str = "changeId";

/// Field holding the change set author.
pub const AUTHOR_FIELD: &str = "author";

/// Outcome recorded for a change set execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Installed,
    Failed,
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeStatus::Installed => write!(f, "installed"),
            ChangeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One row of the change log.
///
/// Failed and re-executed rows are stored under a derived id so the unique
/// (`changeId`, `author`) index only ever constrains the first installation.
/// `originalChangeId` carries the id they belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEntry {
    pub change_id: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "changeLogClass")]
    pub change_log: String,
    #[serde(rename = "changeSetMethod")]
    pub method: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub group: String,
    pub environment: String,
    #[serde(default)]
    pub postponed: bool,
    #[serde(default)]
    pub repeatable: bool,
    pub status: ChangeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_change_id: Option<String>,
    pub installation_id: String,
}

impl ChangeEntry {
    /// Build an INSTALLED entry for a change set.
    pub fn from_change_set(
        change_set: &ChangeSet,
        installation_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            change_id: change_set.id().to_string(),
            author: change_set.author().to_string(),
            timestamp,
            change_log: change_set.change_log().to_string(),
            method: change_set.method().to_string(),
            description: change_set.description().to_string(),
            group: change_set.group().to_string(),
            environment: change_set.environment().to_string(),
            postponed: change_set.is_postponed(),
            repeatable: change_set.is_repeatable(),
            status: ChangeStatus::Installed,
            error: None,
            original_change_id: None,
            installation_id: installation_id.to_string(),
        }
    }

    /// Turn the entry into a FAILED row under `"<id> (failed, <stamp>)"`.
    pub fn failed(mut self, stamp: i64, error: impl Into<String>) -> Self {
        self.derive_id("failed", stamp);
        self.status = ChangeStatus::Failed;
        self.error = Some(error.into());
        self
    }

    /// Turn the entry into a re-execution row under `"<id> (reexecuted, <stamp>)"`.
    pub fn reexecuted(mut self, stamp: i64) -> Self {
        self.derive_id("reexecuted", stamp);
        self
    }

    fn derive_id(&mut self, kind: &str, stamp: i64) {
        let original = std::mem::take(&mut self.change_id);
        self.change_id = format!("{} ({}, {})", original, kind, stamp);
        self.original_change_id = Some(original);
    }

    /// The change set id this row belongs to.
    pub fn correlation_id(&self) -> &str {
        self.original_change_id.as_deref().unwrap_or(&self.change_id)
    }

    pub fn is_installed(&self) -> bool {
        self.status == ChangeStatus::Installed
    }

    pub fn to_document(&self) -> Result<Document, StoreError> {
        match serde_json::to_value(self)? {
            Value::Object(document) => Ok(document),
            other => Err(StoreError::Driver(format!(
                "change entry serialized to non-object value: {}",
                other
            ))),
        }
    }

    pub fn from_document(collection: &str, document: Document) -> Result<Self, StoreError> {
        serde_json::from_value(Value::Object(document)).map_err(|e| StoreError::CorruptDocument {
            collection: collection.to_string(),
            message: e.to_string(),
        })
    }
}
