//! Per-operation execution context.
//!
//! A [`Scope`] is created for one terminal call, carries the target record(s)
//! and the session that issued the call, and is handed to every step of the
//! operation's callback pipeline. Steps record errors on it rather than
//! unwinding; the first error becomes the call's result.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::conditions::{Clause, RenderContext};
use crate::config::Settings;
use crate::connection::ExecResult;
use crate::error::{QueryError, QueryResult};
use crate::model::{Hook, ModelDescriptor, Record, Target, primary_key_value};
use crate::row::Rows;
use crate::session::Db;
use crate::sql::SqlBuilder;
use crate::value::Value;

/// Mutable state of one operation run.
pub struct Scope<'t> {
    db: Db,
    target: Target<'t>,
    descriptor: Option<Arc<ModelDescriptor>>,
    table: String,
    errors: Vec<QueryError>,
    rows_affected: u64,
    skip_left: bool,
    started_transaction: bool,
    instance: HashMap<String, Value>,
    statement: Option<(String, Vec<Value>)>,
    pub(crate) update_attrs: Option<Vec<(String, Value)>>,
    pub(crate) skip_hooks: bool,
    pub(crate) skip_timestamps: bool,
    pub(crate) rows: Option<Rows>,
}

impl<'t> Scope<'t> {
    /// Create a scope for `target`, resolving its model and table.
    ///
    /// A model bound with [`Db::model`] wins over the target's own type; the
    /// table is the chain's override, else the model's table.
    pub(crate) fn new(db: Db, target: Target<'t>) -> Self {
        let descriptor = db.search().model.clone().or_else(|| match &target {
            Target::None => None,
            Target::One(record) => Some(record.descriptor()),
            Target::Many(list) => Some(list.descriptor()),
        });
        let table = match (&db.search().table, &descriptor) {
            (Some(table), _) => table.clone(),
            (None, Some(d)) => d.table_name(db.is_singular_table()).into_owned(),
            (None, None) => String::new(),
        };
        Self {
            db,
            target,
            descriptor,
            table,
            errors: Vec::new(),
            rows_affected: 0,
            skip_left: false,
            started_transaction: false,
            instance: HashMap::new(),
            statement: None,
            update_attrs: None,
            skip_hooks: false,
            skip_timestamps: false,
            rows: None,
        }
    }

    /// The session running this operation; inside an implicit transaction
    /// this is the transactional session.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// The model descriptor, if the operation has one.
    pub fn descriptor(&self) -> Option<&ModelDescriptor> {
        self.descriptor.as_deref()
    }

    pub(crate) fn descriptor_arc(&self) -> Option<Arc<ModelDescriptor>> {
        self.descriptor.clone()
    }

    /// The resolved table name.
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// The resolved table name, quoted for the dialect.
    pub fn quoted_table_name(&self) -> String {
        self.render_context().quoted_table()
    }

    /// The chain's settings.
    pub fn settings(&self) -> &Settings {
        self.db.settings()
    }

    /// Record an error. Later non-cleanup steps are skipped.
    pub fn add_error(&mut self, err: QueryError) {
        if self.errors.is_empty() {
            debug!(code = %err.code, error = %err.message, "Scope error");
        }
        self.errors.push(err);
    }

    /// Whether an error has been recorded.
    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Stop the pipeline after the current step without an error. Cleanup
    /// steps still run.
    pub fn skip_left(&mut self) {
        self.skip_left = true;
    }

    pub(crate) fn is_skipped(&self) -> bool {
        self.skip_left
    }

    /// Rows affected by the last statement.
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    pub(crate) fn set_rows_affected(&mut self, rows: u64) {
        self.rows_affected = rows;
    }

    /// The last statement run, in the dialect's placeholder syntax.
    pub fn sql(&self) -> Option<&str> {
        self.statement.as_ref().map(|(sql, _)| sql.as_str())
    }

    /// The values bound to the last statement.
    pub fn sql_values(&self) -> &[Value] {
        self.statement
            .as_ref()
            .map(|(_, values)| values.as_slice())
            .unwrap_or_default()
    }

    /// Store a value visible to later steps of this run only.
    pub fn instance_set(&mut self, key: impl Into<String>, value: Value) {
        self.instance.insert(key.into(), value);
    }

    /// Read a value stored with [`Scope::instance_set`].
    pub fn instance_get(&self, key: &str) -> Option<&Value> {
        self.instance.get(key)
    }

    /// The single target record, if the operation has one.
    pub fn record_mut(&mut self) -> Option<&mut dyn Record> {
        match &mut self.target {
            Target::One(record) => Some(&mut **record),
            _ => None,
        }
    }

    pub(crate) fn target(&self) -> &Target<'t> {
        &self.target
    }

    pub(crate) fn target_mut(&mut self) -> &mut Target<'t> {
        &mut self.target
    }

    /// Set a column on the target record and, for attribute updates, on the
    /// statement being built.
    pub fn set_column(&mut self, name: &str, value: Value) -> QueryResult<()> {
        let field = match &self.descriptor {
            Some(d) => Some(d.field(name).ok_or_else(|| {
                QueryError::invalid_query(format!("unknown column '{}' for {}", name, d.type_name))
                    .with_model(d.type_name)
                    .with_field(name)
            })?),
            None => None,
        };
        let column = field.map_or(name, |f| f.column.as_str()).to_string();

        if let (Some(field), Target::One(record)) = (field, &mut self.target) {
            record.set_field(&field.path, value.clone())?;
        }
        if let Some(attrs) = &mut self.update_attrs {
            match attrs.iter_mut().find(|(c, _)| *c == column) {
                Some(entry) => entry.1 = value,
                None => attrs.push((column, value)),
            }
        }
        Ok(())
    }

    /// Run lifecycle hooks on every target record, in order.
    pub(crate) fn call_hooks(&mut self, hooks: &[Hook]) -> QueryResult<()> {
        if self.skip_hooks {
            return Ok(());
        }
        let db = &self.db;
        match &mut self.target {
            Target::None => {}
            Target::One(record) => {
                for hook in hooks {
                    record.call_hook(*hook, db)?;
                }
            }
            Target::Many(list) => {
                for record in list.records_mut() {
                    for hook in hooks {
                        record.call_hook(*hook, db)?;
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn render_context(&self) -> RenderContext<'_> {
        RenderContext {
            dialect: self.db.dialect_ref(),
            table: &self.table,
            descriptor: self.descriptor.as_deref(),
        }
    }

    /// The soft-delete filter, unless the chain is unscoped.
    pub(crate) fn soft_delete_clause(&self) -> Option<Clause> {
        if self.db.search().unscoped {
            return None;
        }
        let field = self.descriptor.as_ref()?.soft_delete_field()?;
        let ctx = self.render_context();
        Some(Clause::new(
            format!("{}.{} IS NULL", ctx.quoted_table(), self.db.dialect_ref().quote(&field.column)),
            Vec::new(),
        ))
    }

    /// Equality on the single target's primary key(s), if all are set.
    pub(crate) fn primary_key_clause(&self) -> Option<Clause> {
        let Target::One(record) = &self.target else {
            return None;
        };
        let descriptor = self.descriptor.as_ref()?;
        if record.descriptor().type_name != descriptor.type_name {
            return None;
        }
        primary_key_value(&**record)?;

        let ctx = self.render_context();
        let mut parts = Vec::new();
        let mut args = Vec::new();
        for pk in descriptor.primary_keys() {
            let value = record.get_field(&pk.path).filter(|v| !v.is_zero())?;
            parts.push(format!(
                "{}.{} = ?",
                ctx.quoted_table(),
                self.db.dialect_ref().quote(&pk.column)
            ));
            args.push(value.into());
        }
        Some(Clause::new(parts.join(" AND "), args))
    }

    /// Append an ordering on the first primary key column.
    pub(crate) fn order_by_primary_key(&mut self, descending: bool) {
        let Some(pk) = self.descriptor.as_ref().and_then(|d| d.primary_key()) else {
            return;
        };
        let order = format!(
            "{}.{} {}",
            self.quoted_table_name(),
            self.db.dialect_ref().quote(&pk.column),
            if descending { "DESC" } else { "ASC" }
        );
        self.db.search_mut().orders.push(Clause::new(order, Vec::new()));
    }

    /// Clauses that always prefix the user's conditions.
    pub(crate) fn primary_clauses(&self) -> Vec<Clause> {
        self.soft_delete_clause()
            .into_iter()
            .chain(self.primary_key_clause())
            .collect()
    }

    /// Whether an update/delete is restricted by anything besides the
    /// soft-delete filter.
    pub(crate) fn has_identifying_condition(&self) -> bool {
        self.primary_key_clause().is_some() || self.db.search().has_filters()
    }

    pub(crate) fn require_table(&self) -> QueryResult<()> {
        if self.table.is_empty() {
            return Err(QueryError::invalid_query(
                "no table to run against: pass a model value, or call model() or table()",
            ));
        }
        Ok(())
    }

    /// Build the select statement for the chain, or its raw statement.
    pub(crate) fn build_select(&self) -> QueryResult<SqlBuilder> {
        let search = self.db.search();
        let mut b = SqlBuilder::new();
        if let Some(raw) = &search.raw {
            b.push_clause(&raw.sql, &raw.args)?;
            return Ok(b);
        }
        self.require_table()?;

        let ctx = self.render_context();
        let settings = self.settings();
        if let Some(hint) = &settings.query_hint {
            b.push(hint).push(" ");
        }
        b.push("SELECT ");
        search.render_select(&mut b)?;
        b.push(" FROM ").push(ctx.quoted_table());
        search.render_joins(&mut b)?;
        search.render_where(&mut b, &ctx, &self.primary_clauses())?;
        search.render_group(&mut b)?;
        search.render_order_limit(&mut b, ctx.dialect)?;
        if let Some(option) = &settings.query_option {
            b.push(" ").push(option);
        }
        Ok(b)
    }

    /// Run a statement that returns no rows.
    pub fn exec(&mut self, b: SqlBuilder) -> QueryResult<ExecResult> {
        let (sql, values) = b.build(self.db.dialect_ref());
        let result = self.db.run_exec(&sql, &values);
        self.statement = Some((sql, values));
        let result = result?;
        self.rows_affected = result.rows_affected;
        Ok(result)
    }

    /// Run a statement that returns rows.
    pub fn query(&mut self, b: SqlBuilder) -> QueryResult<Rows> {
        let (sql, values) = b.build(self.db.dialect_ref());
        let result = self.db.run_query(&sql, &values);
        self.statement = Some((sql, values));
        result
    }

    /// Open an implicit transaction unless the session already has one.
    pub(crate) fn begin_implicit(&mut self) -> QueryResult<()> {
        if self.db.in_transaction() {
            return Ok(());
        }
        self.db = self.db.begin()?;
        self.started_transaction = true;
        Ok(())
    }

    /// Finish the implicit transaction: roll back after an error, commit
    /// otherwise.
    pub(crate) fn finish_implicit(&mut self) -> QueryResult<()> {
        if !std::mem::take(&mut self.started_transaction) {
            return Ok(());
        }
        if self.has_error() {
            self.db.rollback()
        } else {
            self.db.commit()
        }
    }

    /// The first recorded error with later ones attached.
    pub(crate) fn take_error(&mut self) -> Option<QueryError> {
        let mut errors = std::mem::take(&mut self.errors).into_iter();
        let first = errors.next()?;
        Some(errors.fold(first, |acc, other| acc.with_related(&other)))
    }
}

impl std::fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("table", &self.table)
            .field("model", &self.descriptor.as_ref().map(|d| d.type_name))
            .field("errors", &self.errors.len())
            .field("rows_affected", &self.rows_affected)
            .finish()
    }
}
