//! Accumulated query fragments for one session chain.
//!
//! Chaining methods on [`Db`](crate::Db) append to a [`Conditions`] value that
//! is cloned on every call. Fragments stay unrendered until a scope knows its
//! table, dialect and model; rendering then writes them into a
//! [`SqlBuilder`] in textual order.

use std::sync::Arc;

use crate::dialect::Dialect;
use crate::error::{QueryError, QueryResult};
use crate::model::ModelDescriptor;
use crate::sql::SqlBuilder;
use crate::value::{Arg, Value};

/// A raw SQL fragment and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    /// SQL text with `?` placeholders.
    pub sql: String,
    /// One argument per placeholder.
    pub args: Vec<Arg>,
}

impl Clause {
    /// Create a clause.
    pub fn new(sql: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }
}

/// How a predicate joins the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
    Not,
}

/// One filtering predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Raw SQL.
    Raw(Clause),
    /// Column/value pairs; field names are resolved to columns on render.
    Attrs(Vec<(String, Value)>),
    /// Primary key equality, or membership for a list.
    PrimaryKey(Arg),
}

/// An eager-loading directive.
#[derive(Debug, Clone, PartialEq)]
pub struct Preload {
    /// Association name, dotted for nested levels (`Orders.Items`).
    pub path: String,
    /// Extra conditions on the loaded rows.
    pub conditions: Vec<Clause>,
}

/// Fragments accumulated by chaining.
#[derive(Debug, Clone, Default)]
pub struct Conditions {
    pub(crate) wheres: Vec<(Combinator, Predicate)>,
    pub(crate) select: Option<Clause>,
    pub(crate) joins: Vec<Clause>,
    pub(crate) group: Option<String>,
    pub(crate) having: Vec<Clause>,
    pub(crate) orders: Vec<Clause>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) preloads: Vec<Preload>,
    pub(crate) table: Option<String>,
    pub(crate) raw: Option<Clause>,
    pub(crate) unscoped: bool,
    pub(crate) init_attrs: Vec<(String, Value)>,
    pub(crate) assign_attrs: Vec<(String, Value)>,
    pub(crate) model: Option<Arc<ModelDescriptor>>,
}

/// What a render needs to know about the statement's target.
#[derive(Clone, Copy)]
pub(crate) struct RenderContext<'a> {
    pub dialect: &'a dyn Dialect,
    pub table: &'a str,
    pub descriptor: Option<&'a ModelDescriptor>,
}

impl RenderContext<'_> {
    /// Quote a table-qualified column, resolving field names through the
    /// descriptor. Qualified or unknown names pass through when there is
    /// no descriptor to check them against.
    pub fn column(&self, name: &str) -> QueryResult<String> {
        if name.contains('(') || name.contains(' ') {
            return Ok(name.to_string());
        }
        if name.contains('.') {
            return Ok(self.dialect.quote_path(name));
        }
        let column = match self.descriptor {
            Some(d) => match d.field(name) {
                Some(field) => field.column.as_str(),
                None => {
                    return Err(QueryError::invalid_query(format!(
                        "unknown column '{}' for {}",
                        name, d.type_name
                    ))
                    .with_model(d.type_name)
                    .with_field(name));
                }
            },
            None => name,
        };
        Ok(format!(
            "{}.{}",
            self.dialect.quote(self.table),
            self.dialect.quote(column)
        ))
    }

    /// The quoted table name.
    pub fn quoted_table(&self) -> String {
        if self.table.starts_with('(') || self.table.contains(' ') {
            self.table.to_string()
        } else {
            self.dialect.quote(self.table)
        }
    }
}

impl Conditions {
    /// Whether any predicate filters the rows. A record with nothing but
    /// zero fields yields an empty attribute map, which matches every row.
    pub fn has_filters(&self) -> bool {
        self.wheres.iter().any(|(_, predicate)| match predicate {
            Predicate::Attrs(pairs) => !pairs.is_empty(),
            _ => true,
        })
    }

    /// Render `WHERE ...`, including `primary` predicates that always apply
    /// (soft-delete filters, the target's primary key). Renders nothing when
    /// there are no predicates.
    pub(crate) fn render_where(
        &self,
        b: &mut SqlBuilder,
        ctx: &RenderContext<'_>,
        primary: &[Clause],
    ) -> QueryResult<()> {
        let mut ands = SqlBuilder::new();
        let mut ors = SqlBuilder::new();

        for (combinator, predicate) in &self.wheres {
            let target = match combinator {
                Combinator::Or => &mut ors,
                _ => &mut ands,
            };
            let joiner = if *combinator == Combinator::Or { " OR " } else { " AND " };
            if !target.is_empty() {
                target.push(joiner);
            }
            render_predicate(target, ctx, predicate, *combinator == Combinator::Not)?;
        }

        let mut combined = ands;
        if !ors.is_empty() {
            if combined.is_empty() {
                combined = ors;
            } else {
                combined.push(" OR ");
                combined.push_expr(&ors.into_expr());
            }
        }

        if primary.is_empty() && combined.is_empty() {
            return Ok(());
        }

        b.push(" WHERE ");
        for (i, clause) in primary.iter().enumerate() {
            if i > 0 {
                b.push(" AND ");
            }
            b.push("(");
            b.push_clause(&clause.sql, &clause.args)?;
            b.push(")");
        }
        if !combined.is_empty() {
            if primary.is_empty() {
                b.push_expr(&combined.into_expr());
            } else {
                b.push(" AND (");
                b.push_expr(&combined.into_expr());
                b.push(")");
            }
        }
        Ok(())
    }

    /// Render joins in call order.
    pub(crate) fn render_joins(&self, b: &mut SqlBuilder) -> QueryResult<()> {
        for join in &self.joins {
            b.push(" ");
            b.push_clause(&join.sql, &join.args)?;
        }
        Ok(())
    }

    /// Render `GROUP BY` and `HAVING`.
    pub(crate) fn render_group(&self, b: &mut SqlBuilder) -> QueryResult<()> {
        if let Some(group) = &self.group {
            b.push(" GROUP BY ").push(group);
        }
        for (i, having) in self.having.iter().enumerate() {
            b.push(if i == 0 { " HAVING (" } else { " AND (" });
            b.push_clause(&having.sql, &having.args)?;
            b.push(")");
        }
        Ok(())
    }

    /// Render `ORDER BY` plus limit and offset.
    pub(crate) fn render_order_limit(
        &self,
        b: &mut SqlBuilder,
        dialect: &dyn Dialect,
    ) -> QueryResult<()> {
        for (i, order) in self.orders.iter().enumerate() {
            b.push(if i == 0 { " ORDER BY " } else { "," });
            b.push_clause(&order.sql, &order.args)?;
        }
        b.push(dialect.limit_and_offset_sql(self.limit, self.offset));
        Ok(())
    }

    /// Render the select list, `*` by default.
    pub(crate) fn render_select(&self, b: &mut SqlBuilder) -> QueryResult<()> {
        match &self.select {
            Some(select) => {
                b.push_clause(&select.sql, &select.args)?;
            }
            None => {
                b.push("*");
            }
        }
        Ok(())
    }
}

fn render_predicate(
    b: &mut SqlBuilder,
    ctx: &RenderContext<'_>,
    predicate: &Predicate,
    negate: bool,
) -> QueryResult<()> {
    match predicate {
        Predicate::Raw(clause) => {
            b.push(if negate { "NOT (" } else { "(" });
            b.push_clause(&clause.sql, &clause.args)?;
            b.push(")");
        }
        Predicate::Attrs(attrs) => {
            b.push("(");
            if attrs.is_empty() {
                b.push("1 = 1");
            }
            for (i, (name, value)) in attrs.iter().enumerate() {
                if i > 0 {
                    b.push(" AND ");
                }
                render_comparison(b, &ctx.column(name)?, value.clone(), negate);
            }
            b.push(")");
        }
        Predicate::PrimaryKey(arg) => {
            let pk = ctx
                .descriptor
                .and_then(|d| d.primary_key())
                .map(|f| f.column.clone())
                .unwrap_or_else(|| "id".to_string());
            let column = ctx.column(&pk)?;
            b.push("(");
            match arg {
                Arg::Value(value) => render_comparison(b, &column, value.clone(), negate),
                Arg::Expr(expr) => {
                    b.push(&column)
                        .push(if negate { " NOT IN " } else { " IN " })
                        .push_expr(expr);
                }
            }
            b.push(")");
        }
    }
    Ok(())
}

fn render_comparison(b: &mut SqlBuilder, column: &str, value: Value, negate: bool) {
    b.push(column);
    match value {
        Value::Null => {
            b.push(if negate { " IS NOT NULL" } else { " IS NULL" });
        }
        Value::List(_) => {
            b.push(if negate { " NOT IN (" } else { " IN (" })
                .push_value(value)
                .push(")");
        }
        other => {
            b.push(if negate { " <> " } else { " = " }).push_value(other);
        }
    }
}
