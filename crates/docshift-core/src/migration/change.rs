//! Change sets, change logs and the registries that supply them.

use std::fmt;
use std::sync::Arc;

use super::error::{ChangeSetError, MigrationError};
use super::params::{BodyFn, ChangeBody, ChangeParams, ErasedBody, ParamResolver};
use crate::store::DatabaseHandle;

/// Environment wildcard. A change set declared for `any` runs everywhere,
/// and a run configured for `any` executes every change set.
pub const ANY_ENVIRONMENT: &str = "any";

/// A single migration unit.
///
/// Identity is the pair (`id`, `author`). The body is any function taking
/// up to four [`Param`](super::params::Param) arguments.
#[derive(Clone)]
pub struct ChangeSet {
    id: String,
    author: String,
    order: String,
    description: String,
    group: String,
    environment: String,
    run_always: bool,
    repeatable: bool,
    postponed: bool,
    change_log: String,
    method: String,
    body: Arc<dyn ErasedBody>,
}

impl ChangeSet {
    /// Create a change set. The body name defaults to the id.
    pub fn new<F, Args>(
        id: impl Into<String>,
        author: impl Into<String>,
        order: impl Into<String>,
        body: F,
    ) -> Self
    where
        F: ChangeBody<Args>,
        Args: 'static,
    {
        let id = id.into();
        Self {
            method: id.clone(),
            id,
            author: author.into(),
            order: order.into(),
            description: String::new(),
            group: String::new(),
            environment: ANY_ENVIRONMENT.to_string(),
            run_always: false,
            repeatable: false,
            postponed: false,
            change_log: String::new(),
            body: Arc::new(BodyFn::new(body)),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Restrict the change set to one environment.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Name recorded as the body of the change set in the change log.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Re-run on every execution. Only effective together with [`repeatable`](Self::repeatable).
    pub fn run_always(mut self) -> Self {
        self.run_always = true;
        self
    }

    /// Allow the change set to be applied more than once.
    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    /// Withhold the change set from execution. It is never logged while postponed.
    pub fn postponed(mut self) -> Self {
        self.postponed = true;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn order(&self) -> &str {
        &self.order
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn is_run_always(&self) -> bool {
        self.run_always
    }

    pub fn is_repeatable(&self) -> bool {
        self.repeatable
    }

    pub fn is_postponed(&self) -> bool {
        self.postponed
    }

    /// Name of the change log that declares this change set.
    pub fn change_log(&self) -> &str {
        &self.change_log
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Whether an already applied change set runs again during a full run.
    pub fn is_reexecutable(&self) -> bool {
        self.run_always && self.repeatable && !self.postponed
    }

    /// Whether the change set may run under the active environment.
    pub fn matches_environment(&self, active: &str) -> bool {
        active == ANY_ENVIRONMENT || self.environment == ANY_ENVIRONMENT || self.environment == active
    }

    /// Resolve the body's parameters and run it.
    pub fn invoke(
        &self,
        database: &DatabaseHandle,
        params: &ChangeParams,
    ) -> Result<(), ChangeSetError> {
        let resolver = ParamResolver::new(&self.id, &self.method, database, params);
        self.body.call(&resolver)
    }

    pub(crate) fn declared_in(mut self, change_log: &str) -> Self {
        self.change_log = change_log.to_string();
        self
    }
}

impl fmt::Debug for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSet")
            .field("id", &self.id)
            .field("author", &self.author)
            .field("order", &self.order)
            .field("environment", &self.environment)
            .field("run_always", &self.run_always)
            .field("repeatable", &self.repeatable)
            .field("postponed", &self.postponed)
            .field("change_log", &self.change_log)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// A named group of change sets executed together.
#[derive(Debug, Clone)]
pub struct ChangeLog {
    name: String,
    order: String,
    change_sets: Vec<ChangeSet>,
}

impl ChangeLog {
    /// Create an empty change log. Its order key defaults to its name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            order: name.clone(),
            name,
            change_sets: Vec::new(),
        }
    }

    pub fn with_order(mut self, order: impl Into<String>) -> Self {
        self.order = order.into();
        self
    }

    /// Add a change set declared by this change log.
    pub fn with_change_set(mut self, change_set: ChangeSet) -> Self {
        self.change_sets.push(change_set.declared_in(&self.name));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> &str {
        &self.order
    }

    /// Change sets in declaration order.
    pub fn change_sets(&self) -> &[ChangeSet] {
        &self.change_sets
    }

    /// Change sets in execution order: ascending by order key, ties kept
    /// in declaration order.
    pub fn sorted_change_sets(&self) -> Vec<&ChangeSet> {
        let mut sorted: Vec<&ChangeSet> = self.change_sets.iter().collect();
        sorted.sort_by(|a, b| a.order.cmp(&b.order));
        sorted
    }

    /// Reject change sets sharing an id.
    pub fn validate(&self) -> Result<(), MigrationError> {
        let mut seen = std::collections::HashSet::new();
        for change_set in &self.change_sets {
            if !seen.insert(change_set.id.as_str()) {
                return Err(MigrationError::DuplicateIdentity {
                    change_log: self.name.clone(),
                    change_id: change_set.id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Source of change logs, one per configured scan source.
pub trait ChangeRegistry: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Validated change logs in execution order.
    fn change_logs(&self) -> Result<Vec<ChangeLog>, MigrationError>;
}

/// A registry built from an explicit registration table.
#[derive(Debug, Clone)]
pub struct StaticRegistry {
    name: String,
    change_logs: Vec<ChangeLog>,
}

impl StaticRegistry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            change_logs: Vec::new(),
        }
    }

    pub fn with_change_log(mut self, change_log: ChangeLog) -> Self {
        self.change_logs.push(change_log);
        self
    }
}

impl ChangeRegistry for StaticRegistry {
    fn name(&self) -> &str {
        &self.name
    }

    fn change_logs(&self) -> Result<Vec<ChangeLog>, MigrationError> {
        for change_log in &self.change_logs {
            change_log.validate()?;
        }

        let mut change_logs = self.change_logs.clone();
        change_logs.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        Ok(change_logs)
    }
}
