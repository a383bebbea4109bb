//! Incremental SQL assembly with neutral placeholders.
//!
//! Statements are built with `?` for every bound value. Each `?` in a clause
//! consumes the next argument: a list expands to `?,?,?`, an expression
//! splices its own text and values, anything else becomes a single `?`.
//! Only the finished statement is rewritten into the dialect's placeholder
//! syntax by [`rebind`], which keeps values in textual order no matter how
//! deeply expressions nest.

use crate::dialect::Dialect;
use crate::error::{QueryError, QueryResult};
use crate::value::{Arg, SqlExpr, Value};

/// A SQL builder for constructing statements.
#[derive(Debug, Clone, Default)]
pub struct SqlBuilder {
    sql: String,
    values: Vec<Value>,
}

impl SqlBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push literal SQL.
    pub fn push(&mut self, sql: impl AsRef<str>) -> &mut Self {
        self.sql.push_str(sql.as_ref());
        self
    }

    /// Push one bound value. Lists expand to one placeholder per element;
    /// an empty list renders `NULL` so that `IN (...)` matches nothing.
    pub fn push_value(&mut self, value: Value) -> &mut Self {
        match value {
            Value::List(items) if items.is_empty() => {
                self.sql.push_str("NULL");
            }
            Value::List(items) => {
                let placeholders = vec!["?"; items.len()].join(",");
                self.sql.push_str(&placeholders);
                self.values.extend(items);
            }
            other => {
                self.sql.push('?');
                self.values.push(other);
            }
        }
        self
    }

    /// Push one argument in place of a placeholder.
    pub fn push_arg(&mut self, arg: &Arg) -> &mut Self {
        match arg {
            Arg::Value(value) => self.push_value(value.clone()),
            Arg::Expr(expr) => self.push_expr(expr),
        }
    }

    /// Splice an expression's text and values.
    pub fn push_expr(&mut self, expr: &SqlExpr) -> &mut Self {
        self.sql.push_str(&expr.sql);
        self.values.extend(expr.values.iter().cloned());
        self
    }

    /// Push a clause, substituting each `?` outside quotes with the next
    /// argument. Every placeholder needs exactly one argument.
    pub fn push_clause(&mut self, clause: &str, args: &[Arg]) -> QueryResult<&mut Self> {
        let mut args = args.iter();
        let mut used = 0usize;
        for segment in split_placeholders(clause) {
            match segment {
                Segment::Text(text) => {
                    self.sql.push_str(text);
                }
                Segment::Placeholder => {
                    let arg = args.next().ok_or_else(|| {
                        QueryError::invalid_query(format!(
                            "clause '{}' has more placeholders than arguments ({})",
                            clause, used
                        ))
                    })?;
                    used += 1;
                    self.push_arg(arg);
                }
            }
        }
        let extra = args.count();
        if extra > 0 {
            return Err(QueryError::invalid_query(format!(
                "clause '{}' received {} unused argument(s)",
                clause, extra
            )));
        }
        Ok(self)
    }

    /// Current SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Current bound values.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Whether nothing was pushed.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// The statement as an embeddable expression, placeholders left neutral.
    pub fn into_expr(self) -> SqlExpr {
        SqlExpr::new(self.sql, self.values)
    }

    /// The final statement in the dialect's placeholder syntax.
    pub fn build(self, dialect: &dyn Dialect) -> (String, Vec<Value>) {
        (rebind(&self.sql, dialect), self.values)
    }
}

enum Segment<'a> {
    Text(&'a str),
    Placeholder,
}

/// Split SQL into literal text and placeholders, ignoring `?` inside
/// quoted strings and quoted identifiers.
fn split_placeholders(sql: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in sql.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '[' => quote = Some(']'),
                '?' => {
                    if start < i {
                        segments.push(Segment::Text(&sql[start..i]));
                    }
                    segments.push(Segment::Placeholder);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    if start < sql.len() {
        segments.push(Segment::Text(&sql[start..]));
    }
    segments
}

/// Rewrite neutral `?` placeholders into the dialect's syntax, numbering
/// them in textual order.
pub fn rebind(sql: &str, dialect: &dyn Dialect) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    for segment in split_placeholders(sql) {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Placeholder => {
                index += 1;
                out.push_str(&dialect.bind_var(index));
            }
        }
    }
    out
}

/// Number of neutral placeholders in `sql`.
pub fn count_placeholders(sql: &str) -> usize {
    split_placeholders(sql)
        .iter()
        .filter(|s| matches!(s, Segment::Placeholder))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MsSql, Postgres, Sqlite};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_push_clause_expands_lists() {
        let mut b = SqlBuilder::new();
        b.push("SELECT * FROM users WHERE ");
        b.push_clause(
            "name IN (?) AND age > ?",
            &[Arg::from(vec!["a", "b"]), Arg::from(20)],
        )
        .unwrap();
        assert_eq!(b.sql(), "SELECT * FROM users WHERE name IN (?,?) AND age > ?");
        assert_eq!(b.values(), &["a".into(), "b".into(), Value::Int(20)]);
    }

    #[test]
    fn test_empty_list_matches_nothing() {
        let mut b = SqlBuilder::new();
        b.push_clause("id IN (?)", &[Arg::from(Vec::<i64>::new())]).unwrap();
        assert_eq!(b.sql(), "id IN (NULL)");
        assert!(b.values().is_empty());
    }

    #[test]
    fn test_argument_count_mismatch() {
        let mut b = SqlBuilder::new();
        assert!(b.push_clause("a = ? AND b = ?", &[Arg::from(1)]).is_err());
        let mut b = SqlBuilder::new();
        assert!(b.push_clause("a = ?", &[Arg::from(1), Arg::from(2)]).is_err());
    }

    #[test]
    fn test_quoted_question_marks_are_literal() {
        let mut b = SqlBuilder::new();
        b.push_clause("name = 'who?' AND \"odd?col\" = ?", &[Arg::from(1)])
            .unwrap();
        assert_eq!(b.values().len(), 1);
        assert_eq!(
            rebind(b.sql(), &Postgres),
            "name = 'who?' AND \"odd?col\" = $1"
        );
    }

    #[test]
    fn test_nested_expressions_keep_textual_order() {
        // innermost: SELECT user_id FROM pets WHERE kind = ?
        let mut inner = SqlBuilder::new();
        inner
            .push_clause("SELECT user_id FROM pets WHERE kind = ?", &[Arg::from("cat")])
            .unwrap();
        let inner = inner.into_expr().parenthesized();

        // middle: SELECT AVG(age) FROM users WHERE name LIKE ? AND id IN (inner)
        let mut middle = SqlBuilder::new();
        middle
            .push_clause(
                "SELECT AVG(age) FROM users WHERE name LIKE ? AND id IN ?",
                &[Arg::from("j%"), Arg::from(inner)],
            )
            .unwrap();
        let middle = middle.into_expr().parenthesized();

        let mut outer = SqlBuilder::new();
        outer.push("SELECT * FROM users WHERE ");
        outer
            .push_clause(
                "role = ? AND age >= ? AND active = ?",
                &[Arg::from("admin"), Arg::from(middle), Arg::from(true)],
            )
            .unwrap();

        let (sql, values) = outer.build(&Postgres);
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE role = $1 AND age >= (SELECT AVG(age) FROM users \
             WHERE name LIKE $2 AND id IN (SELECT user_id FROM pets WHERE kind = $3)) \
             AND active = $4"
        );
        assert_eq!(
            values,
            vec!["admin".into(), "j%".into(), "cat".into(), Value::Bool(true)]
        );
    }

    #[test]
    fn test_rebind_per_dialect() {
        assert_eq!(rebind("a = ? AND b = ?", &Sqlite), "a = ? AND b = ?");
        assert_eq!(rebind("a = ? AND b = ?", &MsSql), "a = @p1 AND b = @p2");
        assert_eq!(count_placeholders("[x?] = ? OR y = ?"), 2);
    }
}
