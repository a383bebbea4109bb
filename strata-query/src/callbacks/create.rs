//! Built-in create pipeline.

use chrono::Utc;

use super::Step;
use crate::associations;
use crate::error::{QueryError, QueryResult};
use crate::model::Hook;
use crate::scope::Scope;
use crate::sql::SqlBuilder;
use crate::value::Value;

pub(super) fn steps() -> Vec<Step> {
    vec![
        Step::new("strata:begin_transaction", false, begin_transaction),
        Step::new("strata:before_create", false, |scope| {
            scope.call_hooks(&[Hook::BeforeSave, Hook::BeforeCreate])
        }),
        Step::new("strata:save_before_associations", false, associations::save_before),
        Step::new("strata:update_time_stamp", false, update_time_stamp),
        Step::new("strata:assign_primary_key", false, assign_primary_key),
        Step::new("strata:create", false, create),
        Step::new("strata:save_after_associations", false, associations::save_after),
        Step::new("strata:after_create", false, |scope| {
            scope.call_hooks(&[Hook::AfterCreate, Hook::AfterSave])
        }),
        Step::new("strata:commit_or_rollback_transaction", true, commit_or_rollback),
    ]
}

pub(super) fn begin_transaction(scope: &mut Scope<'_>) -> QueryResult<()> {
    scope.begin_implicit()
}

pub(super) fn commit_or_rollback(scope: &mut Scope<'_>) -> QueryResult<()> {
    scope.finish_implicit()
}

/// Stamp `created_at` when unset and `updated_at` always.
fn update_time_stamp(scope: &mut Scope<'_>) -> QueryResult<()> {
    if scope.skip_timestamps {
        return Ok(());
    }
    let Some(descriptor) = scope.descriptor_arc() else {
        return Ok(());
    };
    let Some(record) = scope.record_mut() else {
        return Ok(());
    };
    let now = Value::Timestamp(Utc::now());
    for field in &descriptor.fields {
        let unset = record.get_field(&field.path).is_none_or(|v| v.is_zero());
        if field.is_updated_at() || (field.is_created_at() && unset) {
            record.set_field(&field.path, now.clone())?;
        }
    }
    Ok(())
}

/// Fill blank primary keys from their client-side generators.
fn assign_primary_key(scope: &mut Scope<'_>) -> QueryResult<()> {
    let Some(descriptor) = scope.descriptor_arc() else {
        return Ok(());
    };
    let Some(record) = scope.record_mut() else {
        return Ok(());
    };
    for field in descriptor.primary_keys() {
        let Some(generate) = field.generate else {
            continue;
        };
        if record.get_field(&field.path).is_none_or(|v| v.is_zero()) {
            record.set_field(&field.path, generate())?;
        }
    }
    Ok(())
}

/// Insert the target and scan the generated key back into it.
fn create(scope: &mut Scope<'_>) -> QueryResult<()> {
    scope.require_table()?;
    let Some(descriptor) = scope.descriptor_arc() else {
        return Err(QueryError::invalid_query("create needs a model value"));
    };
    let dialect = scope.db().dialect();
    let table = scope.table_name().to_string();
    let quoted_table = scope.quoted_table_name();
    let insert_option = scope.settings().insert_option.clone();

    let Some(record) = scope.record_mut() else {
        return Err(QueryError::invalid_query("create needs a single record"));
    };

    let mut columns = Vec::new();
    let mut values = Vec::new();
    for field in &descriptor.fields {
        let value = record.get_field(&field.path).unwrap_or(Value::Null);
        let blank = value.is_zero();
        if blank && (field.is_primary_key || field.default.is_some()) {
            continue;
        }
        columns.push(dialect.quote(&field.column));
        values.push(value);
    }

    // A blank auto-increment key is read back after the insert.
    let generated = descriptor
        .primary_key()
        .filter(|pk| pk.auto_increment)
        .filter(|pk| record.get_field(&pk.path).is_none_or(|v| v.is_zero()))
        .cloned();

    let (interstitial, returning) = match &generated {
        Some(pk) => (
            dialect.last_insert_id_output_interstitial(&table, &pk.column),
            dialect.last_insert_id_returning_suffix(&table, &pk.column),
        ),
        None => (String::new(), String::new()),
    };

    let mut b = SqlBuilder::new();
    b.push("INSERT INTO ").push(&quoted_table);
    if columns.is_empty() {
        if !interstitial.is_empty() {
            b.push(" ").push(&interstitial);
        }
        b.push(" ").push(dialect.default_values());
    } else {
        b.push(" (").push(columns.join(",")).push(")");
        if !interstitial.is_empty() {
            b.push(" ").push(&interstitial);
        }
        b.push(" VALUES (");
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                b.push(",");
            }
            b.push_value(value);
        }
        b.push(")");
    }
    b.push(&returning);
    if let Some(option) = insert_option {
        b.push(" ").push(option);
    }

    let Some(pk) = generated else {
        scope.exec(b)?;
        return Ok(());
    };

    if interstitial.is_empty() && returning.is_empty() {
        let result = scope.exec(b)?;
        if let (Some(id), Some(record)) = (result.last_insert_id, scope.record_mut()) {
            record.set_field(&pk.path, Value::Int(id))?;
        }
    } else {
        let rows = scope.query(b)?.into_vec();
        scope.set_rows_affected(rows.len() as u64);
        let id = rows.first().and_then(|row| row.values().first().cloned());
        if let (Some(id), Some(record)) = (id, scope.record_mut()) {
            record.set_field(&pk.path, id)?;
        }
    }
    Ok(())
}

