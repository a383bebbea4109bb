//! Built-in update pipeline.
//!
//! Two modes share the pipeline: a full save writes every column of the
//! target record, an attribute update (`update`, `update_columns`,
//! `update_all`) writes only the given columns.

use chrono::Utc;

use super::Step;
use super::create::{begin_transaction, commit_or_rollback};
use crate::associations;
use crate::error::{QueryError, QueryResult};
use crate::model::Hook;
use crate::scope::Scope;
use crate::sql::SqlBuilder;
use crate::value::Value;

pub(super) fn steps() -> Vec<Step> {
    vec![
        Step::new("strata:assign_updating_attributes", false, assign_updating_attributes),
        Step::new("strata:begin_transaction", false, begin_transaction),
        Step::new("strata:before_update", false, |scope| {
            scope.call_hooks(&[Hook::BeforeSave, Hook::BeforeUpdate])
        }),
        Step::new("strata:save_before_associations", false, |scope| {
            if scope.update_attrs.is_some() {
                return Ok(());
            }
            associations::save_before(scope)
        }),
        Step::new("strata:update_time_stamp", false, update_time_stamp),
        Step::new("strata:update", false, update),
        Step::new("strata:save_after_associations", false, |scope| {
            if scope.update_attrs.is_some() {
                return Ok(());
            }
            associations::save_after(scope)
        }),
        Step::new("strata:after_update", false, |scope| {
            scope.call_hooks(&[Hook::AfterUpdate, Hook::AfterSave])
        }),
        Step::new("strata:commit_or_rollback_transaction", true, commit_or_rollback),
    ]
}

/// Resolve attribute names to columns, keep only values that differ from
/// the target record, and write them into it. Stops the pipeline when
/// nothing changed.
fn assign_updating_attributes(scope: &mut Scope<'_>) -> QueryResult<()> {
    let Some(attrs) = scope.update_attrs.take() else {
        return Ok(());
    };
    let descriptor = scope.descriptor_arc();

    let mut changed: Vec<(String, Value)> = Vec::with_capacity(attrs.len());
    for (name, value) in attrs {
        let field = match &descriptor {
            Some(d) => Some(d.field(&name).ok_or_else(|| {
                QueryError::invalid_query(format!("unknown column '{}' for {}", name, d.type_name))
                    .with_model(d.type_name)
                    .with_field(&name)
            })?),
            None => None,
        };
        let column = field.map_or(name.clone(), |f| f.column.clone());

        if let (Some(field), Some(record)) = (field, scope.record_mut()) {
            if record.get_field(&field.path).as_ref() == Some(&value) {
                continue;
            }
            record.set_field(&field.path, value.clone())?;
        }
        match changed.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = value,
            None => changed.push((column, value)),
        }
    }

    if changed.is_empty() {
        scope.skip_left();
    }
    scope.update_attrs = Some(changed);
    Ok(())
}

/// Stamp `updated_at`, on the record and in the attribute set.
fn update_time_stamp(scope: &mut Scope<'_>) -> QueryResult<()> {
    if scope.skip_timestamps {
        return Ok(());
    }
    let Some(descriptor) = scope.descriptor_arc() else {
        return Ok(());
    };
    let Some(field) = descriptor.fields.iter().find(|f| f.is_updated_at()) else {
        return Ok(());
    };
    scope.set_column(&field.column, Value::Timestamp(Utc::now()))
}

fn update(scope: &mut Scope<'_>) -> QueryResult<()> {
    scope.require_table()?;
    if !scope.has_identifying_condition() && !scope.settings().allow_global_update {
        return Err(QueryError::global_update_blocked(scope.table_name()));
    }

    let dialect = scope.db().dialect();
    let assignments: Vec<(String, Value)> = match &scope.update_attrs {
        Some(attrs) => attrs.clone(),
        None => {
            let Some(descriptor) = scope.descriptor_arc() else {
                return Err(QueryError::invalid_query("save needs a model value"));
            };
            let Some(record) = scope.record_mut() else {
                return Err(QueryError::invalid_query("save needs a single record"));
            };
            descriptor
                .fields
                .iter()
                .filter(|f| !f.is_primary_key)
                .filter_map(|f| {
                    let value = record.get_field(&f.path).unwrap_or(Value::Null);
                    if f.is_created_at() && value.is_zero() {
                        None
                    } else {
                        Some((f.column.clone(), value))
                    }
                })
                .collect()
        }
    };
    if assignments.is_empty() {
        return Ok(());
    }

    let mut b = SqlBuilder::new();
    b.push("UPDATE ").push(scope.quoted_table_name()).push(" SET ");
    for (i, (column, value)) in assignments.into_iter().enumerate() {
        if i > 0 {
            b.push(", ");
        }
        b.push(dialect.quote(&column)).push(" = ").push_value(value);
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
    Ok(())
}
