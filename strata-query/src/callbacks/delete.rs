//! Built-in delete pipeline. Models with a soft-delete column are marked
//! deleted instead of removed, unless the chain is unscoped.

use chrono::Utc;

use super::Step;
use super::create::{begin_transaction, commit_or_rollback};
use crate::error::{QueryError, QueryResult};
use crate::model::Hook;
use crate::scope::Scope;
use crate::sql::SqlBuilder;
use crate::value::Value;

pub(super) fn steps() -> Vec<Step> {
    vec![
        Step::new("strata:begin_transaction", false, begin_transaction),
        Step::new("strata:before_delete", false, |scope| {
            scope.call_hooks(&[Hook::BeforeDelete])
        }),
        Step::new("strata:delete", false, delete),
        Step::new("strata:after_delete", false, |scope| {
            scope.call_hooks(&[Hook::AfterDelete])
        }),
        Step::new("strata:commit_or_rollback_transaction", true, commit_or_rollback),
    ]
}

fn delete(scope: &mut Scope<'_>) -> QueryResult<()> {
    scope.require_table()?;
    if !scope.has_identifying_condition() && !scope.settings().allow_global_update {
        return Err(QueryError::global_delete_blocked(scope.table_name()));
    }

    let soft_delete = if scope.db().search().unscoped {
        None
    } else {
        scope
            .descriptor()
            .and_then(|d| d.soft_delete_field())
            .map(|f| (f.path.clone(), f.column.clone()))
    };

    let mut b = SqlBuilder::new();
    let now = Value::Timestamp(Utc::now());
    match &soft_delete {
        Some((_, column)) => {
            b.push("UPDATE ")
                .push(scope.quoted_table_name())
                .push(" SET ")
                .push(scope.db().dialect_ref().quote(column))
                .push(" = ")
                .push_value(now.clone());
        }
        None => {
            b.push("DELETE FROM ").push(scope.quoted_table_name());
        }
    }
    let ctx = scope.render_context();
    scope
        .db()
        .search()
        .render_where(&mut b, &ctx, &scope.primary_clauses())?;
    if let Some(option) = &scope.settings().query_option {
        b.push(" ").push(option);
    }
    scope.exec(b)?;

    if let (Some((path, _)), Some(record)) = (soft_delete, scope.record_mut()) {
        record.set_field(&path, now)?;
    }
    Ok(())
}
