//! Named, ordered callback pipelines per operation kind.
//!
//! Each [`Operation`] owns a pipeline of [`Step`]s run strictly in order
//! against one [`Scope`]. A step reports failure by returning an error; the
//! error is recorded on the scope and every later step is skipped except
//! those registered as cleanup steps, which still run (the built-in
//! transaction commit/rollback is one). [`Scope::skip_left`] stops the
//! pipeline the same way without recording an error.
//!
//! Built-in steps are prefixed `strata:` and may be reordered, replaced or
//! removed like user steps:
//!
//! ```rust,ignore
//! db.callback(Operation::Create)
//!     .insert_before("strata:create", "audit:stamp", |scope| {
//!         scope.set_column("audited", true.into())
//!     })?;
//! ```

mod create;
mod delete;
mod query;
mod row_query;
mod update;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::error::{QueryError, QueryResult};
use crate::scope::Scope;

/// Operation kinds that own a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Insert one record.
    Create,
    /// Select into records.
    Query,
    /// Update records.
    Update,
    /// Delete records.
    Delete,
    /// Select into an unmanaged row cursor.
    RowQuery,
}

impl Operation {
    /// All operation kinds.
    pub const ALL: [Operation; 5] = [
        Self::Create,
        Self::Query,
        Self::Update,
        Self::Delete,
        Self::RowQuery,
    ];

    /// Short name used in logs and error context.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Query => "query",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::RowQuery => "row_query",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The behavior of one step.
pub type StepFn = Arc<dyn Fn(&mut Scope<'_>) -> QueryResult<()> + Send + Sync>;

/// One named pipeline step.
#[derive(Clone)]
pub struct Step {
    name: String,
    cleanup: bool,
    behavior: StepFn,
}

impl Step {
    fn new<F>(name: impl Into<String>, cleanup: bool, behavior: F) -> Self
    where
        F: Fn(&mut Scope<'_>) -> QueryResult<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            cleanup,
            behavior: Arc::new(behavior),
        }
    }

    /// Step name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the step runs after an earlier error.
    pub fn is_cleanup(&self) -> bool {
        self.cleanup
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("cleanup", &self.cleanup)
            .finish()
    }
}

/// The pipelines of one session family.
#[derive(Debug, Clone)]
pub(crate) struct CallbackSet {
    pipelines: HashMap<Operation, Vec<Step>>,
}

impl Default for CallbackSet {
    fn default() -> Self {
        let mut pipelines = HashMap::new();
        pipelines.insert(Operation::Create, create::steps());
        pipelines.insert(Operation::Query, query::steps());
        pipelines.insert(Operation::Update, update::steps());
        pipelines.insert(Operation::Delete, delete::steps());
        pipelines.insert(Operation::RowQuery, row_query::steps());
        Self { pipelines }
    }
}

impl CallbackSet {
    fn steps(&self, op: Operation) -> &[Step] {
        self.pipelines.get(&op).map(Vec::as_slice).unwrap_or_default()
    }

    fn steps_mut(&mut self, op: Operation) -> &mut Vec<Step> {
        self.pipelines.entry(op).or_default()
    }
}

/// Registration handle for one operation's pipeline.
pub struct Pipeline<'a> {
    set: &'a RwLock<CallbackSet>,
    op: Operation,
}

impl<'a> Pipeline<'a> {
    pub(crate) fn new(set: &'a RwLock<CallbackSet>, op: Operation) -> Self {
        Self { set, op }
    }

    /// Step names in execution order.
    pub fn names(&self) -> Vec<String> {
        self.set
            .read()
            .steps(self.op)
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }

    /// Add a step at the end.
    pub fn append<F>(&self, name: &str, behavior: F) -> QueryResult<()>
    where
        F: Fn(&mut Scope<'_>) -> QueryResult<()> + Send + Sync + 'static,
    {
        self.insert_at(Position::End, Step::new(name, false, behavior))
    }

    /// Add a step at the end that also runs after an earlier error.
    pub fn append_cleanup<F>(&self, name: &str, behavior: F) -> QueryResult<()>
    where
        F: Fn(&mut Scope<'_>) -> QueryResult<()> + Send + Sync + 'static,
    {
        self.insert_at(Position::End, Step::new(name, true, behavior))
    }

    /// Add a step at the start.
    pub fn prepend<F>(&self, name: &str, behavior: F) -> QueryResult<()>
    where
        F: Fn(&mut Scope<'_>) -> QueryResult<()> + Send + Sync + 'static,
    {
        self.insert_at(Position::Start, Step::new(name, false, behavior))
    }

    /// Add a step right before `anchor`.
    pub fn insert_before<F>(&self, anchor: &str, name: &str, behavior: F) -> QueryResult<()>
    where
        F: Fn(&mut Scope<'_>) -> QueryResult<()> + Send + Sync + 'static,
    {
        self.insert_at(Position::Before(anchor), Step::new(name, false, behavior))
    }

    /// Add a step right after `anchor`.
    pub fn insert_after<F>(&self, anchor: &str, name: &str, behavior: F) -> QueryResult<()>
    where
        F: Fn(&mut Scope<'_>) -> QueryResult<()> + Send + Sync + 'static,
    {
        self.insert_at(Position::After(anchor), Step::new(name, false, behavior))
    }

    /// Swap the behavior of an existing step, keeping its position.
    pub fn replace<F>(&self, name: &str, behavior: F) -> QueryResult<()>
    where
        F: Fn(&mut Scope<'_>) -> QueryResult<()> + Send + Sync + 'static,
    {
        let mut set = self.set.write();
        let steps = set.steps_mut(self.op);
        let step = steps
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| QueryError::callback_not_found(name))?;
        step.behavior = Arc::new(behavior);
        trace!(operation = %self.op, step = name, "Callback replaced");
        Ok(())
    }

    /// Remove a step.
    pub fn remove(&self, name: &str) -> QueryResult<()> {
        let mut set = self.set.write();
        let steps = set.steps_mut(self.op);
        let index = steps
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| QueryError::callback_not_found(name))?;
        steps.remove(index);
        trace!(operation = %self.op, step = name, "Callback removed");
        Ok(())
    }

    fn insert_at(&self, position: Position<'_>, step: Step) -> QueryResult<()> {
        let mut set = self.set.write();
        let steps = set.steps_mut(self.op);
        if steps.iter().any(|s| s.name == step.name) {
            return Err(QueryError::duplicate_callback(step.name));
        }
        let index = match position {
            Position::Start => 0,
            Position::End => steps.len(),
            Position::Before(anchor) | Position::After(anchor) => {
                let found = steps
                    .iter()
                    .position(|s| s.name == anchor)
                    .ok_or_else(|| QueryError::callback_not_found(anchor))?;
                if matches!(position, Position::After(_)) {
                    found + 1
                } else {
                    found
                }
            }
        };
        trace!(operation = %self.op, step = %step.name, index, "Callback registered");
        steps.insert(index, step);
        Ok(())
    }
}

enum Position<'a> {
    Start,
    End,
    Before(&'a str),
    After(&'a str),
}

/// Run the pipeline for `op` against `scope`.
///
/// The step list is snapshotted first, so registration during a run only
/// affects later runs.
pub(crate) fn run(set: &RwLock<CallbackSet>, op: Operation, scope: &mut Scope<'_>) {
    let steps: Vec<Step> = set.read().steps(op).to_vec();
    for step in &steps {
        if (scope.is_skipped() || scope.has_error()) && !step.cleanup {
            continue;
        }
        trace!(operation = %op, step = %step.name, "Running callback");
        if let Err(err) = (step.behavior)(scope) {
            scope.add_error(err.with_context(op.as_str()));
        }
    }
}
