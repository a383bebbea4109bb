//! Association cascade on save and batched eager loading.
//!
//! Saving follows the dependency direction of each relationship: belongs-to
//! targets are stored before the owner so their key can be copied into the
//! owner's foreign key; has-one, has-many and many-to-many targets are
//! stored after it, once the owner key is known.
//!
//! Preloading issues one statement per association per nesting level,
//! selecting the related rows for every owner at once with `IN (...)` and
//! distributing them by key.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::conditions::Clause;
use crate::error::{QueryError, QueryResult};
use crate::model::{
    AssociationDescriptor, AssociationKind, Hook, ModelDescriptor, Record, RelatedMut, Target,
    primary_key_value, scan_row_into,
};
use crate::row::Row;
use crate::scope::Scope;
use crate::session::Db;
use crate::sql::SqlBuilder;
use crate::value::Value;

/// Column alias carrying the owner key in many-to-many preload rows.
const OWNER_KEY_ALIAS: &str = "__strata_owner_key";

/// Save belongs-to targets and copy their keys into the owner.
///
/// A target that already has a primary key is only updated (and only with
/// `association_autoupdate`); it is never inserted. The owner's foreign key
/// is filled when empty and overwritten when the target was just inserted.
pub(crate) fn save_before(scope: &mut Scope<'_>) -> QueryResult<()> {
    if !scope.settings().save_associations {
        return Ok(());
    }
    let Some(descriptor) = scope.descriptor_arc() else {
        return Ok(());
    };
    let autoupdate = scope.settings().association_autoupdate;
    let db = scope.db().fresh();
    let Some(owner) = scope.record_mut() else {
        return Ok(());
    };

    for assoc in descriptor
        .associations
        .iter()
        .filter(|a| a.save && a.kind == AssociationKind::BelongsTo)
    {
        let saved = {
            let Some(RelatedMut::One(mut slot)) = owner.association_mut(&assoc.name) else {
                continue;
            };
            let Some(target) = slot.get() else {
                continue;
            };
            let inserted = if primary_key_value(target).is_none() {
                db.create(target)?;
                true
            } else {
                if autoupdate {
                    db.update_record(target)?;
                }
                false
            };
            let target_descriptor = target.descriptor();
            assoc
                .target_key(&target_descriptor)
                .and_then(|column| target_descriptor.field(&column).map(|f| f.path.clone()))
                .and_then(|path| target.get_field(&path))
                .map(|key| (key, inserted))
        };
        let Some((key, inserted)) = saved else {
            continue;
        };

        let fk = field_path(&descriptor, &assoc.foreign_key)?;
        let current = owner.get_field(&fk);
        if inserted || current.is_none_or(|v| v.is_zero()) {
            owner.set_field(&fk, key)?;
        }
    }
    Ok(())
}

/// Save has-one, has-many and many-to-many targets after the owner.
pub(crate) fn save_after(scope: &mut Scope<'_>) -> QueryResult<()> {
    if !scope.settings().save_associations {
        return Ok(());
    }
    let Some(descriptor) = scope.descriptor_arc() else {
        return Ok(());
    };
    let autoupdate = scope.settings().association_autoupdate;
    let db = scope.db().fresh();
    let Some(owner) = scope.record_mut() else {
        return Ok(());
    };

    for assoc in descriptor
        .associations
        .iter()
        .filter(|a| a.save && a.kind.saves_after_owner())
    {
        let Some(owner_key) = assoc
            .owner_key(&descriptor)
            .and_then(|column| descriptor.field(&column).map(|f| f.path.clone()))
            .and_then(|path| owner.get_field(&path))
            .filter(|v| !v.is_zero())
        else {
            debug!(
                model = descriptor.type_name,
                association = %assoc.name,
                "Owner has no key; association not saved"
            );
            continue;
        };

        let targets: Vec<&mut dyn Record> = match owner.association_mut(&assoc.name) {
            Some(RelatedMut::One(slot)) => slot.into_present().into_iter().collect(),
            Some(RelatedMut::Many(list)) => list.records_mut(),
            None => continue,
        };

        for target in targets {
            match assoc.kind {
                AssociationKind::ManyToMany => {
                    if primary_key_value(target).is_none() {
                        db.create(target)?;
                    } else if autoupdate {
                        db.save(target)?;
                    }
                    link(&db, assoc, &owner_key, target)?;
                }
                _ => {
                    let fk = field_path(&target.descriptor(), &assoc.foreign_key)?;
                    target.set_field(&fk, owner_key.clone())?;
                    if primary_key_value(target).is_none() {
                        db.create(target)?;
                    } else if autoupdate {
                        db.save(target)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Insert the join row for one many-to-many pair unless it exists.
fn link(
    db: &Db,
    assoc: &AssociationDescriptor,
    owner_key: &Value,
    target: &dyn Record,
) -> QueryResult<()> {
    let target_descriptor = target.descriptor();
    let Some(target_key) = primary_key_value(target) else {
        return Err(QueryError::missing_primary_key(target_descriptor.type_name));
    };
    let Some(join_table) = &assoc.join_table else {
        return Ok(());
    };

    let dialect = db.dialect_ref();
    let table = dialect.quote(join_table);
    let owner_column = dialect.quote(&assoc.foreign_key);
    let target_column = dialect.quote(&assoc.join_target_column());

    let mut b = SqlBuilder::new();
    b.push(format!("INSERT INTO {} ({},{}) SELECT ", table, owner_column, target_column))
        .push_value(owner_key.clone())
        .push(",")
        .push_value(target_key.clone());
    let dummy = dialect.select_from_dummy_table();
    if !dummy.is_empty() {
        b.push(" ").push(dummy);
    }
    b.push(format!(
        " WHERE NOT EXISTS (SELECT * FROM {} WHERE {} = ",
        table, owner_column
    ))
    .push_value(owner_key.clone())
    .push(format!(" AND {} = ", target_column))
    .push_value(target_key)
    .push(")");
    db.exec_built(b)?;
    Ok(())
}

fn field_path(descriptor: &ModelDescriptor, column: &str) -> QueryResult<String> {
    descriptor
        .field(column)
        .map(|f| f.path.clone())
        .ok_or_else(|| {
            QueryError::invalid_query(format!(
                "{} has no column {} for the association key",
                descriptor.type_name, column
            ))
            .with_model(descriptor.type_name)
            .with_field(column)
        })
}

/// Load every preload directive of the chain into the scope's records.
pub(crate) fn preload(scope: &mut Scope<'_>) -> QueryResult<()> {
    let directives = scope.db().search().preloads.clone();
    if directives.is_empty() {
        return Ok(());
    }
    let Some(root) = scope.descriptor_arc() else {
        return Ok(());
    };
    for directive in &directives {
        resolve_path(&root, &directive.path)?;
    }
    let db = scope.db().fresh();

    let mut loaded: HashSet<String> = HashSet::new();
    for directive in &directives {
        let segments: Vec<&str> = directive.path.split('.').collect();
        let levels = resolve_path(&root, &directive.path)?;

        for depth in 1..=segments.len() {
            let prefix = segments[..depth].join(".");
            let last = depth == segments.len();
            if !last && loaded.contains(&prefix) {
                continue;
            }
            let (owner_descriptor, assoc) = &levels[depth - 1];
            let conditions: &[Clause] = if last { &directive.conditions } else { &[] };

            let mut owners = root_records(scope.target_mut());
            for segment in &segments[..depth - 1] {
                owners = reach(owners, segment);
            }
            load(&db, owner_descriptor, assoc, owners, conditions)?;
            loaded.insert(prefix);
        }
    }
    Ok(())
}

/// Walk a dotted association path, returning the owner descriptor and
/// association at each level.
fn resolve_path(
    root: &Arc<ModelDescriptor>,
    path: &str,
) -> QueryResult<Vec<(Arc<ModelDescriptor>, AssociationDescriptor)>> {
    let mut levels = Vec::new();
    let mut owner = Arc::clone(root);
    for segment in path.split('.') {
        let assoc = owner
            .association(segment)
            .cloned()
            .ok_or_else(|| QueryError::unknown_association(owner.type_name, segment))?;
        let next = assoc.target();
        levels.push((owner, assoc));
        owner = next;
    }
    Ok(levels)
}

fn root_records<'a>(target: &'a mut Target<'_>) -> Vec<&'a mut dyn Record> {
    match target {
        Target::None => Vec::new(),
        Target::One(record) => vec![&mut **record],
        Target::Many(list) => list.records_mut(),
    }
}

/// Collect the present values of association `name` across `records`.
fn reach<'a>(records: Vec<&'a mut dyn Record>, name: &str) -> Vec<&'a mut dyn Record> {
    let mut children = Vec::new();
    for record in records {
        match record.association_mut(name) {
            Some(RelatedMut::One(slot)) => children.extend(slot.into_present()),
            Some(RelatedMut::Many(list)) => children.extend(list.records_mut()),
            None => {}
        }
    }
    children
}

/// Key values of `column` across `records`, deduplicated, in first-seen order.
fn collect_keys(records: &[&mut dyn Record], path: &str) -> Vec<Value> {
    let keys: IndexMap<String, Value> = records
        .iter()
        .filter_map(|r| r.get_field(path))
        .filter(|v| !v.is_zero())
        .filter_map(|v| Some((v.to_key()?, v)))
        .collect();
    keys.into_values().collect()
}

fn key_of(record: &dyn Record, path: &str) -> Option<String> {
    record.get_field(path).and_then(|v| v.to_key())
}

/// Group rows by the value of `column`, keeping row order per group.
fn group_rows(rows: Vec<Row>, column: &str) -> HashMap<String, Vec<Row>> {
    let mut groups: HashMap<String, Vec<Row>> = HashMap::new();
    for row in rows {
        if let Some(key) = row.value(column).and_then(Value::to_key) {
            groups.entry(key).or_default().push(row);
        }
    }
    groups
}

fn load(
    db: &Db,
    owner_descriptor: &ModelDescriptor,
    assoc: &AssociationDescriptor,
    owners: Vec<&mut dyn Record>,
    conditions: &[Clause],
) -> QueryResult<()> {
    if owners.is_empty() {
        return Ok(());
    }
    let target = assoc.target();
    let (owner_path, match_column, rows) = match assoc.kind {
        AssociationKind::BelongsTo => {
            let owner_path = field_path(owner_descriptor, &assoc.foreign_key)?;
            let target_column = assoc
                .target_key(&target)
                .ok_or_else(|| QueryError::missing_primary_key(target.type_name))?;
            let keys = collect_keys(&owners, &owner_path);
            if keys.is_empty() {
                return Ok(());
            }
            let rows = select_related(db, &target, &target_column, keys, conditions)?;
            (owner_path, target_column, rows)
        }
        AssociationKind::HasOne | AssociationKind::HasMany => {
            let owner_column = assoc
                .owner_key(owner_descriptor)
                .ok_or_else(|| QueryError::missing_primary_key(owner_descriptor.type_name))?;
            let owner_path = field_path(owner_descriptor, &owner_column)?;
            let keys = collect_keys(&owners, &owner_path);
            if keys.is_empty() {
                return Ok(());
            }
            let rows = select_related(db, &target, &assoc.foreign_key, keys, conditions)?;
            (owner_path, assoc.foreign_key.clone(), rows)
        }
        AssociationKind::ManyToMany => {
            let owner_column = assoc
                .owner_key(owner_descriptor)
                .ok_or_else(|| QueryError::missing_primary_key(owner_descriptor.type_name))?;
            let owner_path = field_path(owner_descriptor, &owner_column)?;
            let keys = collect_keys(&owners, &owner_path);
            if keys.is_empty() {
                return Ok(());
            }
            let rows = select_joined(db, &target, assoc, keys, conditions)?;
            (owner_path, OWNER_KEY_ALIAS.to_string(), rows)
        }
    };

    debug!(
        model = owner_descriptor.type_name,
        association = %assoc.name,
        owners = owners.len(),
        rows = rows.len(),
        "Preloaded association"
    );

    let groups = group_rows(rows.into_vec(), &match_column);
    for owner in owners {
        let Some(key) = key_of(&*owner, &owner_path) else {
            continue;
        };
        let matched = groups.get(&key).map(Vec::as_slice).unwrap_or_default();
        match owner.association_mut(&assoc.name) {
            Some(RelatedMut::One(mut slot)) => match matched.first() {
                Some(row) => {
                    let record = slot.fill();
                    scan_row_into(record, row)?;
                    record.call_hook(Hook::AfterFind, db)?;
                }
                None => slot.clear(),
            },
            Some(RelatedMut::Many(list)) => {
                list.clear();
                for row in matched {
                    let record = list.push_default();
                    scan_row_into(record, row)?;
                    record.call_hook(Hook::AfterFind, db)?;
                }
            }
            None => {}
        }
    }
    Ok(())
}

/// `SELECT * FROM target WHERE column IN (keys)`, soft-delete filtered.
fn select_related(
    db: &Db,
    target: &ModelDescriptor,
    column: &str,
    keys: Vec<Value>,
    conditions: &[Clause],
) -> QueryResult<crate::row::Rows> {
    let dialect = db.dialect_ref();
    let table = dialect.quote(&target.table_name(db.is_singular_table()));

    let mut b = SqlBuilder::new();
    b.push(format!(
        "SELECT * FROM {} WHERE {}.{} IN (",
        table,
        table,
        dialect.quote(column)
    ))
    .push_value(Value::List(keys))
    .push(")");
    push_filters(&mut b, db, target, &table, conditions)?;
    db.query_built(b)
}

/// Select targets through the join table, tagging each row with its owner.
fn select_joined(
    db: &Db,
    target: &ModelDescriptor,
    assoc: &AssociationDescriptor,
    keys: Vec<Value>,
    conditions: &[Clause],
) -> QueryResult<crate::row::Rows> {
    let dialect = db.dialect_ref();
    let table = dialect.quote(&target.table_name(db.is_singular_table()));
    let target_pk = target
        .primary_key()
        .ok_or_else(|| QueryError::missing_primary_key(target.type_name))?;
    let join_table = dialect.quote(assoc.join_table.as_deref().unwrap_or_default());
    let owner_column = format!("{}.{}", join_table, dialect.quote(&assoc.foreign_key));

    let mut b = SqlBuilder::new();
    b.push(format!(
        "SELECT {}.*, {} AS {} FROM {} INNER JOIN {} ON {}.{} = {}.{} WHERE {} IN (",
        table,
        owner_column,
        dialect.quote(OWNER_KEY_ALIAS),
        table,
        join_table,
        join_table,
        dialect.quote(&assoc.join_target_column()),
        table,
        dialect.quote(&target_pk.column),
        owner_column,
    ))
    .push_value(Value::List(keys))
    .push(")");
    push_filters(&mut b, db, target, &table, conditions)?;
    db.query_built(b)
}

fn push_filters(
    b: &mut SqlBuilder,
    db: &Db,
    target: &ModelDescriptor,
    quoted_table: &str,
    conditions: &[Clause],
) -> QueryResult<()> {
    if let Some(field) = target.soft_delete_field() {
        b.push(format!(
            " AND {}.{} IS NULL",
            quoted_table,
            db.dialect_ref().quote(&field.column)
        ));
    }
    for clause in conditions {
        b.push(" AND (");
        b.push_clause(&clause.sql, &clause.args)?;
        b.push(")");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Model;

    #[derive(Debug, Default, Model)]
    #[strata(crate = "crate")]
    struct Item {
        id: i64,
        order_id: i64,
    }

    #[derive(Debug, Default, Model)]
    #[strata(crate = "crate")]
    struct Order {
        id: i64,
        customer_id: i64,
        #[strata(has_many)]
        items: Vec<Item>,
    }

    #[derive(Debug, Default, Model)]
    #[strata(crate = "crate")]
    struct Customer {
        id: i64,
        #[strata(has_many)]
        orders: Vec<Order>,
    }

    #[test]
    fn test_resolve_nested_path() {
        let levels = resolve_path(&Customer::describe(), "orders.items").unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].0.type_name, "Customer");
        assert_eq!(levels[1].0.type_name, "Order");
        assert_eq!(levels[1].1.foreign_key, "order_id");
    }

    #[test]
    fn test_resolve_unknown_association() {
        let err = resolve_path(&Customer::describe(), "orders.shipments").unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::UnknownAssociation);
        assert_eq!(err.context.model.as_deref(), Some("Order"));
    }

    #[test]
    fn test_reach_collects_across_owners() {
        let mut customers = vec![
            Customer {
                id: 1,
                orders: vec![Order { id: 10, ..Default::default() }],
            },
            Customer {
                id: 2,
                orders: vec![
                    Order { id: 20, ..Default::default() },
                    Order { id: 21, ..Default::default() },
                ],
            },
        ];
        let owners: Vec<&mut dyn Record> =
            customers.iter_mut().map(|c| c as &mut dyn Record).collect();
        let orders = reach(owners, "orders");
        let keys = collect_keys(&orders, "id");
        assert_eq!(keys, vec![Value::Int(10), Value::Int(20), Value::Int(21)]);
    }

    #[test]
    fn test_group_rows_by_key() {
        let columns: Arc<[String]> = vec!["id".to_string(), "order_id".to_string()].into();
        let rows = vec![
            Row::new(Arc::clone(&columns), vec![Value::Int(1), Value::Int(10)]),
            Row::new(Arc::clone(&columns), vec![Value::Int(2), Value::Int(20)]),
            Row::new(Arc::clone(&columns), vec![Value::Int(3), Value::Int(10)]),
        ];
        let groups = group_rows(rows, "order_id");
        assert_eq!(groups[&Value::Int(10).to_key().unwrap()].len(), 2);
        assert_eq!(groups[&Value::Int(20).to_key().unwrap()].len(), 1);
    }
}
