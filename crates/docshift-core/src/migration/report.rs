//! Execution report.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What happened to one scanned change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSetOutcome {
    Executed,
    ReExecuted,
    Skipped,
    Postponed,
    Failed,
}

/// Counters for one run, or for one change log within a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub installation_id: String,
    pub scanned: u64,
    pub executed: u64,
    pub re_executed: u64,
    pub skipped: u64,
    pub postponed: u64,
    pub failed: u64,
}

impl ExecutionReport {
    pub fn new(installation_id: impl Into<String>) -> Self {
        Self {
            installation_id: installation_id.into(),
            ..Default::default()
        }
    }

    /// Count a scanned change set and its outcome.
    pub fn record(&mut self, outcome: ChangeSetOutcome) {
        self.scanned += 1;
        match outcome {
            ChangeSetOutcome::Executed => self.executed += 1,
            ChangeSetOutcome::ReExecuted => self.re_executed += 1,
            ChangeSetOutcome::Skipped => self.skipped += 1,
            ChangeSetOutcome::Postponed => self.postponed += 1,
            ChangeSetOutcome::Failed => self.failed += 1,
        }
    }

    /// Add another report's counters. Merging `None` changes nothing.
    pub fn merge(&mut self, other: Option<&ExecutionReport>) {
        let Some(other) = other else {
            return;
        };
        self.scanned += other.scanned;
        self.executed += other.executed;
        self.re_executed += other.re_executed;
        self.skipped += other.skipped;
        self.postponed += other.postponed;
        self.failed += other.failed;
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "installation {}: scanned={} executed={} reExecuted={} skipped={} postponed={} failed={}",
            self.installation_id,
            self.scanned,
            self.executed,
            self.re_executed,
            self.skipped,
            self.postponed,
            self.failed
        )
    }
}
