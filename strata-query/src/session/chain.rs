//! Chaining methods. Each returns a new [`Db`] and leaves `self` untouched.

use crate::conditions::{Clause, Combinator, Conditions, Predicate, Preload};
use crate::config::Settings;
use crate::model::{Model, Record};
use crate::value::{Arg, IntoArgs, SqlExpr, Value};

use super::Db;

impl Db {
    pub(crate) fn chain(&self, f: impl FnOnce(&mut Conditions)) -> Db {
        let mut db = self.clone();
        f(&mut db.search);
        db
    }

    fn configure(&self, f: impl FnOnce(&mut Settings)) -> Db {
        let mut db = self.clone();
        f(&mut db.settings);
        db
    }

    fn filter(&self, combinator: Combinator, predicate: Predicate) -> Db {
        self.chain(|c| c.wheres.push((combinator, predicate)))
    }

    // ============== Conditions ==============

    /// Add a raw SQL predicate, ANDed with the others.
    ///
    /// Each `?` takes one argument; lists expand to one placeholder per
    /// element and expressions are spliced in place.
    pub fn where_(&self, sql: &str, args: impl IntoArgs) -> Db {
        self.filter(
            Combinator::And,
            Predicate::Raw(Clause::new(sql, args.into_args())),
        )
    }

    /// Add a raw SQL predicate, ORed with the others.
    pub fn or(&self, sql: &str, args: impl IntoArgs) -> Db {
        self.filter(
            Combinator::Or,
            Predicate::Raw(Clause::new(sql, args.into_args())),
        )
    }

    /// Add a negated raw SQL predicate.
    pub fn not(&self, sql: &str, args: impl IntoArgs) -> Db {
        self.filter(
            Combinator::Not,
            Predicate::Raw(Clause::new(sql, args.into_args())),
        )
    }

    /// Equality on field/column pairs. A null value tests `IS NULL`, a list
    /// tests membership.
    pub fn where_attrs(&self, attrs: Vec<(String, Value)>) -> Db {
        self.filter(Combinator::And, Predicate::Attrs(attrs))
    }

    /// [`Db::where_attrs`], ORed.
    pub fn or_attrs(&self, attrs: Vec<(String, Value)>) -> Db {
        self.filter(Combinator::Or, Predicate::Attrs(attrs))
    }

    /// [`Db::where_attrs`], negated per pair.
    pub fn not_attrs(&self, attrs: Vec<(String, Value)>) -> Db {
        self.filter(Combinator::Not, Predicate::Attrs(attrs))
    }

    /// Equality on the record's non-zero fields.
    pub fn where_record(&self, record: &dyn Record) -> Db {
        self.where_attrs(non_zero_attrs(record))
    }

    /// [`Db::where_record`], ORed.
    pub fn or_record(&self, record: &dyn Record) -> Db {
        self.or_attrs(non_zero_attrs(record))
    }

    /// [`Db::where_record`], negated.
    pub fn not_record(&self, record: &dyn Record) -> Db {
        self.not_attrs(non_zero_attrs(record))
    }

    /// Primary key equality, or membership when given a list.
    pub fn where_pk(&self, key: impl Into<Arg>) -> Db {
        self.filter(Combinator::And, Predicate::PrimaryKey(key.into()))
    }

    // ============== Query shape ==============

    /// Replace the select list.
    pub fn select(&self, sql: &str, args: impl IntoArgs) -> Db {
        let clause = Clause::new(sql, args.into_args());
        self.chain(|c| c.select = Some(clause))
    }

    /// Run against `name` instead of the model's table. An empty name
    /// restores the model's table.
    pub fn table(&self, name: &str) -> Db {
        let table = (!name.is_empty()).then(|| name.to_string());
        self.chain(|c| c.table = table)
    }

    /// Append a join clause.
    pub fn joins(&self, sql: &str, args: impl IntoArgs) -> Db {
        let clause = Clause::new(sql, args.into_args());
        self.chain(|c| c.joins.push(clause))
    }

    /// Set the `GROUP BY` list.
    pub fn group(&self, sql: &str) -> Db {
        let group = sql.to_string();
        self.chain(|c| c.group = Some(group))
    }

    /// Add a `HAVING` predicate.
    pub fn having(&self, sql: &str, args: impl IntoArgs) -> Db {
        let clause = Clause::new(sql, args.into_args());
        self.chain(|c| c.having.push(clause))
    }

    /// Append an ordering.
    pub fn order(&self, sql: &str) -> Db {
        let clause = Clause::new(sql, Vec::new());
        self.chain(|c| c.orders.push(clause))
    }

    /// Append an ordering by expression.
    pub fn order_expr(&self, expr: SqlExpr) -> Db {
        let clause = Clause::new("?", vec![Arg::Expr(expr)]);
        self.chain(|c| c.orders.push(clause))
    }

    /// Replace every earlier ordering.
    pub fn reorder(&self, sql: &str) -> Db {
        let clause = Clause::new(sql, Vec::new());
        self.chain(|c| c.orders = vec![clause])
    }

    /// Limit the row count. A negative value cancels an earlier limit.
    pub fn limit(&self, limit: i64) -> Db {
        let limit = u64::try_from(limit).ok();
        self.chain(|c| c.limit = limit)
    }

    /// Skip rows. A negative value cancels an earlier offset.
    pub fn offset(&self, offset: i64) -> Db {
        let offset = u64::try_from(offset).ok();
        self.chain(|c| c.offset = offset)
    }

    /// Run `sql` verbatim instead of a generated select. Terminals that read
    /// rows scan its result.
    pub fn raw(&self, sql: &str, args: impl IntoArgs) -> Db {
        let clause = Clause::new(sql, args.into_args());
        self.chain(|c| c.raw = Some(clause))
    }

    /// Resolve the table and columns through `T`, whatever the target.
    pub fn model<T: Model>(&self) -> Db {
        let descriptor = T::describe();
        self.chain(|c| c.model = Some(descriptor))
    }

    /// Drop soft-delete filtering; deletes remove rows for good.
    pub fn unscoped(&self) -> Db {
        self.chain(|c| c.unscoped = true)
    }

    // ============== Eager loading ==============

    /// Load an association for every result. Nested levels are dotted:
    /// `Orders.Items` loads `Orders` first.
    pub fn preload(&self, path: &str) -> Db {
        self.preload_where(path, "", ())
    }

    /// [`Db::preload`] with a condition on the loaded rows of the last
    /// level.
    pub fn preload_where(&self, path: &str, sql: &str, args: impl IntoArgs) -> Db {
        let mut preload = Preload {
            path: path.to_string(),
            conditions: Vec::new(),
        };
        if !sql.is_empty() {
            preload.conditions.push(Clause::new(sql, args.into_args()));
        }
        self.chain(|c| c.preloads.push(preload))
    }

    // ============== find-or-init inputs ==============

    /// Attributes applied only when [`Db::first_or_init`] or
    /// [`Db::first_or_create`] finds nothing.
    pub fn attrs(&self, attrs: Vec<(String, Value)>) -> Db {
        self.chain(|c| c.init_attrs.extend(attrs))
    }

    /// Attributes applied whether or not a row is found; persisted by
    /// [`Db::first_or_create`].
    pub fn assign(&self, attrs: Vec<(String, Value)>) -> Db {
        self.chain(|c| c.assign_attrs.extend(attrs))
    }

    // ============== Settings ==============

    /// Append an option to generated statements (`FOR UPDATE`).
    pub fn query_option(&self, option: &str) -> Db {
        let option = option.to_string();
        self.configure(|s| s.query_option = Some(option))
    }

    /// Put a hint before generated selects.
    pub fn query_hint(&self, hint: &str) -> Db {
        let hint = hint.to_string();
        self.configure(|s| s.query_hint = Some(hint))
    }

    /// Append an option to inserts (`ON CONFLICT DO NOTHING`).
    pub fn insert_option(&self, option: &str) -> Db {
        let option = option.to_string();
        self.configure(|s| s.insert_option = Some(option))
    }

    /// Allow update/delete without any condition.
    pub fn allow_global_update(&self, enabled: bool) -> Db {
        self.configure(|s| s.allow_global_update = enabled)
    }

    /// Cascade saves through associations.
    pub fn save_associations(&self, enabled: bool) -> Db {
        self.configure(|s| s.save_associations = enabled)
    }

    /// Update associated records that already have a primary key.
    pub fn association_autoupdate(&self, enabled: bool) -> Db {
        self.configure(|s| s.association_autoupdate = enabled)
    }

    /// Log statements at `info` instead of `debug`.
    pub fn log_sql(&self, enabled: bool) -> Db {
        self.configure(|s| s.log_sql = enabled)
    }

    /// Attach a value for user callbacks.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Db {
        let (key, value) = (key.to_string(), value.into());
        self.configure(|s| {
            s.values.insert(key, value);
        })
    }

    /// Read a value attached with [`Db::set`].
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.settings.values.get(key)
    }
}

fn non_zero_attrs(record: &dyn Record) -> Vec<(String, Value)> {
    record
        .descriptor()
        .fields
        .iter()
        .filter_map(|f| {
            record
                .get_field(&f.path)
                .filter(|v| !v.is_zero())
                .map(|v| (f.column.clone(), v))
        })
        .collect()
}
