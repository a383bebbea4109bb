//! Terminal operations. Each builds a scope from the chain and runs one
//! callback pipeline, or issues its statement directly.

use crate::callbacks::Operation;
use crate::conditions::{Clause, Combinator, Predicate};
use crate::error::{QueryError, QueryResult};
use crate::model::{Model, Record, RecordList, Target, primary_key_value, scan_row_into};
use crate::row::{Row, Rows};
use crate::scope::Scope;
use crate::sql::SqlBuilder;
use crate::value::{FromValue, IntoArgs, SqlExpr, Value};

use super::{Db, Outcome};

impl Db {
    // ============== Reads ==============

    /// Load the first row by primary key order into `record`.
    ///
    /// A non-zero primary key on `record` is added as a condition. Fails
    /// with a not-found error when no row matches.
    pub fn first(&self, record: &mut dyn Record) -> QueryResult<Outcome> {
        let mut scope = Scope::new(self.chain(|c| c.limit = Some(1)), Target::One(record));
        scope.order_by_primary_key(false);
        self.run(Operation::Query, scope)
    }

    /// Load the last row by primary key order into `record`.
    pub fn last(&self, record: &mut dyn Record) -> QueryResult<Outcome> {
        let mut scope = Scope::new(self.chain(|c| c.limit = Some(1)), Target::One(record));
        scope.order_by_primary_key(true);
        self.run(Operation::Query, scope)
    }

    /// Load one row in no particular order into `record`.
    pub fn take(&self, record: &mut dyn Record) -> QueryResult<Outcome> {
        let scope = Scope::new(self.chain(|c| c.limit = Some(1)), Target::One(record));
        self.run(Operation::Query, scope)
    }

    /// Replace the contents of `list` with every matching row. Finding
    /// nothing is not an error.
    pub fn find(&self, list: &mut dyn RecordList) -> QueryResult<Outcome> {
        let scope = Scope::new(self.clone(), Target::Many(list));
        self.run(Operation::Query, scope)
    }

    /// Load the first match, or fill `record` from the chain's equality
    /// conditions and [`Db::attrs`] without saving. [`Db::assign`] values
    /// are applied either way.
    pub fn first_or_init(&self, record: &mut dyn Record) -> QueryResult<Outcome> {
        match self.first(record) {
            Ok(outcome) => {
                self.apply_attrs(record, &self.search.assign_attrs)?;
                Ok(outcome)
            }
            Err(err) if err.is_not_found() => {
                self.initialize(record)?;
                Ok(Outcome::default())
            }
            Err(err) => Err(err),
        }
    }

    /// Load the first match and persist [`Db::assign`] values on it, or
    /// initialize `record` like [`Db::first_or_init`] and create it.
    pub fn first_or_create(&self, record: &mut dyn Record) -> QueryResult<Outcome> {
        match self.first(record) {
            Ok(outcome) => {
                if self.search.assign_attrs.is_empty() {
                    return Ok(outcome);
                }
                self.fresh().update(record, self.search.assign_attrs.clone())
            }
            Err(err) if err.is_not_found() => {
                self.initialize(record)?;
                self.fresh().create(record)
            }
            Err(err) => Err(err),
        }
    }

    fn initialize(&self, record: &mut dyn Record) -> QueryResult<()> {
        let from_conditions: Vec<(String, Value)> = self
            .search
            .wheres
            .iter()
            .filter_map(|(combinator, predicate)| match (combinator, predicate) {
                (Combinator::And, Predicate::Attrs(attrs)) => Some(attrs.iter().cloned()),
                _ => None,
            })
            .flatten()
            .collect();
        self.apply_attrs(record, &from_conditions)?;
        self.apply_attrs(record, &self.search.init_attrs)?;
        self.apply_attrs(record, &self.search.assign_attrs)
    }

    fn apply_attrs(&self, record: &mut dyn Record, attrs: &[(String, Value)]) -> QueryResult<()> {
        let descriptor = record.descriptor();
        for (name, value) in attrs {
            let field = descriptor.field(name).ok_or_else(|| {
                QueryError::invalid_query(format!(
                    "unknown column '{}' for {}",
                    name, descriptor.type_name
                ))
                .with_model(descriptor.type_name)
                .with_field(name)
            })?;
            record.set_field(&field.path, value.clone())?;
        }
        Ok(())
    }

    // ============== Writes ==============

    /// Insert `record`, with hooks, timestamps, generated keys and
    /// association cascades, inside an implicit transaction.
    pub fn create(&self, record: &mut dyn Record) -> QueryResult<Outcome> {
        let scope = Scope::new(self.clone(), Target::One(record));
        self.run(Operation::Create, scope)
    }

    /// Write every column of `record`. A record without a primary key is
    /// created; an update that matches no row falls back to a create.
    pub fn save(&self, record: &mut dyn Record) -> QueryResult<Outcome> {
        if primary_key_value(record).is_none() {
            return self.create(record);
        }
        let outcome = self.update_record(record)?;
        if outcome.rows_affected == 0 {
            return self.create(record);
        }
        Ok(outcome)
    }

    /// Full-record update used by `save` and association cascades.
    pub(crate) fn update_record(&self, record: &mut dyn Record) -> QueryResult<Outcome> {
        let scope = Scope::new(self.clone(), Target::One(record));
        self.run(Operation::Update, scope)
    }

    /// Update the given attributes of `record`, which must be identified by
    /// its primary key or the chain's conditions. Only values that differ
    /// from the record are written; `updated_at` is stamped.
    pub fn update(
        &self,
        record: &mut dyn Record,
        attrs: Vec<(String, Value)>,
    ) -> QueryResult<Outcome> {
        let mut scope = Scope::new(self.clone(), Target::One(record));
        scope.update_attrs = Some(attrs);
        self.run(Operation::Update, scope)
    }

    /// Update one column without hooks or timestamps.
    pub fn update_column(
        &self,
        record: &mut dyn Record,
        name: &str,
        value: impl Into<Value>,
    ) -> QueryResult<Outcome> {
        self.update_columns(record, vec![(name.to_string(), value.into())])
    }

    /// Update columns without hooks or timestamps.
    pub fn update_columns(
        &self,
        record: &mut dyn Record,
        attrs: Vec<(String, Value)>,
    ) -> QueryResult<Outcome> {
        let mut scope = Scope::new(self.clone(), Target::One(record));
        scope.update_attrs = Some(attrs);
        scope.skip_hooks = true;
        scope.skip_timestamps = true;
        self.run(Operation::Update, scope)
    }

    /// Update every row matching the chain. Needs a model or table; blocked
    /// without conditions unless global updates are allowed.
    pub fn update_all(&self, attrs: Vec<(String, Value)>) -> QueryResult<Outcome> {
        let mut scope = Scope::new(self.clone(), Target::None);
        scope.update_attrs = Some(attrs);
        self.run(Operation::Update, scope)
    }

    /// Delete `record`, or mark it deleted when the model has a soft-delete
    /// column and the chain is not unscoped.
    pub fn delete(&self, record: &mut dyn Record) -> QueryResult<Outcome> {
        let scope = Scope::new(self.clone(), Target::One(record));
        self.run(Operation::Delete, scope)
    }

    /// Delete every `T` row matching the chain.
    pub fn delete_all<T: Model>(&self) -> QueryResult<Outcome> {
        let scope = Scope::new(self.model::<T>(), Target::None);
        self.run(Operation::Delete, scope)
    }

    // ============== Aggregates ==============

    /// Count matching rows. Orderings are dropped; a grouped chain counts
    /// its groups.
    pub fn count(&self) -> QueryResult<u64> {
        let base = self.chain(|c| c.orders.clear());
        let db = if self.search.group.is_some() {
            let groups = base.query_expr()?.parenthesized();
            self.fresh().raw("SELECT count(*) FROM ? AS count_table", groups)
        } else {
            base.chain(|c| c.select = Some(Clause::new("count(*)", Vec::new())))
        };
        let row = db
            .run_rows()?
            .next()
            .ok_or_else(|| QueryError::internal("count returned no rows"))?;
        let count: i64 = row.get(0)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Read one column of every matching row into `dest`, replacing its
    /// contents.
    pub fn pluck<T: FromValue>(&self, column: &str, dest: &mut Vec<T>) -> QueryResult<()> {
        let rows = self
            .chain(|c| c.select = Some(Clause::new(column, Vec::new())))
            .run_rows()?;
        dest.clear();
        for row in rows {
            dest.push(row.get(0)?);
        }
        Ok(())
    }

    // ============== Scanning ==============

    /// Scan the first result row into `record` by column name. Hooks and
    /// preloads do not run.
    pub fn scan(&self, record: &mut dyn Record) -> QueryResult<()> {
        let row = self
            .run_rows()?
            .next()
            .ok_or_else(|| QueryError::not_found(record.descriptor().type_name))?;
        scan_row_into(record, &row)
    }

    /// Scan every result row into `list`, replacing its contents.
    pub fn scan_all(&self, list: &mut dyn RecordList) -> QueryResult<()> {
        let rows = self.run_rows()?;
        list.clear();
        for row in rows {
            scan_row_into(list.push_default(), &row)?;
        }
        Ok(())
    }

    /// The first result row, if any.
    pub fn row(&self) -> QueryResult<Option<Row>> {
        Ok(self.run_rows()?.next())
    }

    /// Every result row.
    pub fn rows(&self) -> QueryResult<Rows> {
        self.run_rows()
    }

    /// Scan one row into `record` by column name.
    pub fn scan_row(&self, row: &Row, record: &mut dyn Record) -> QueryResult<()> {
        scan_row_into(record, row)
    }

    // ============== Raw SQL and expressions ==============

    /// Run a statement verbatim, expanding its arguments.
    pub fn exec(&self, sql: &str, args: impl IntoArgs) -> QueryResult<Outcome> {
        let mut b = SqlBuilder::new();
        b.push_clause(sql, &args.into_args())?;
        let result = self.exec_built(b)?;
        Ok(Outcome {
            rows_affected: result.rows_affected,
        })
    }

    /// Build an expression for use as an argument, an ordering or an update
    /// value. Fails when the placeholder and argument counts differ.
    pub fn expr(sql: &str, args: impl IntoArgs) -> QueryResult<SqlExpr> {
        let mut b = SqlBuilder::new();
        b.push_clause(sql, &args.into_args())?;
        Ok(b.into_expr())
    }

    /// The chain's select statement as an expression, with neutral
    /// placeholders so it can be nested in another statement.
    pub fn query_expr(&self) -> QueryResult<SqlExpr> {
        let scope = Scope::new(self.clone(), Target::None);
        Ok(scope.build_select()?.into_expr())
    }

    /// [`Db::query_expr`], parenthesized for use as a sub-query.
    pub fn sub_query(&self) -> QueryResult<SqlExpr> {
        Ok(self.query_expr()?.parenthesized())
    }
}
