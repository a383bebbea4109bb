//! Record types: declarations, cached descriptors and type-erased access.
//!
//! `#[derive(Model)]` implements [`Record`] and [`Model`] for a struct. The
//! engine only ever touches records through `dyn Record`, reading and writing
//! fields by path and reaching into associations through [`RelatedMut`].

pub mod cache;
pub mod declaration;
pub mod descriptor;

use std::sync::Arc;

pub use declaration::{
    AssociationDeclaration, ColumnDeclaration, MemberDeclaration, ModelDeclaration, StorageKind,
};
pub use descriptor::{AssociationDescriptor, AssociationKind, FieldDescriptor, ModelDescriptor};

use crate::error::{QueryError, QueryResult};
use crate::row::Row;
use crate::session::Db;
use crate::value::{FromValue, Value};

/// Type-erased access to one record.
pub trait Record {
    /// The record type's descriptor.
    fn descriptor(&self) -> Arc<ModelDescriptor>;

    /// Read a column field by path (`name`, or `base.id` for embedded).
    fn get_field(&self, path: &str) -> Option<Value>;

    /// Write a column field by path.
    fn set_field(&mut self, path: &str, value: Value) -> QueryResult<()>;

    /// Borrow an association field by name.
    fn association_mut(&mut self, name: &str) -> Option<RelatedMut<'_>>;

    /// Run one lifecycle hook.
    fn call_hook(&mut self, hook: Hook, db: &Db) -> QueryResult<()>;
}

/// A record type with a static declaration.
pub trait Model: Record + Hooks + Default + 'static {
    /// The raw member declaration.
    fn declaration() -> ModelDeclaration;

    /// The cached descriptor.
    fn describe() -> Arc<ModelDescriptor> {
        cache::describe::<Self>(Self::declaration)
    }
}

/// Lifecycle hooks. Every method defaults to a no-op; an error aborts the
/// running pipeline and rolls back its implicit transaction.
#[allow(unused_variables)]
pub trait Hooks {
    fn before_save(&mut self, db: &Db) -> QueryResult<()> {
        Ok(())
    }

    fn before_create(&mut self, db: &Db) -> QueryResult<()> {
        Ok(())
    }

    fn after_create(&mut self, db: &Db) -> QueryResult<()> {
        Ok(())
    }

    fn after_save(&mut self, db: &Db) -> QueryResult<()> {
        Ok(())
    }

    fn before_update(&mut self, db: &Db) -> QueryResult<()> {
        Ok(())
    }

    fn after_update(&mut self, db: &Db) -> QueryResult<()> {
        Ok(())
    }

    fn before_delete(&mut self, db: &Db) -> QueryResult<()> {
        Ok(())
    }

    fn after_delete(&mut self, db: &Db) -> QueryResult<()> {
        Ok(())
    }

    fn after_find(&mut self, db: &Db) -> QueryResult<()> {
        Ok(())
    }
}

/// Lifecycle hook selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    BeforeSave,
    BeforeCreate,
    AfterCreate,
    AfterSave,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
    AfterFind,
}

/// Dispatch a [`Hook`] to the matching [`Hooks`] method.
pub fn dispatch_hook<T: Hooks>(record: &mut T, hook: Hook, db: &Db) -> QueryResult<()> {
    match hook {
        Hook::BeforeSave => record.before_save(db),
        Hook::BeforeCreate => record.before_create(db),
        Hook::AfterCreate => record.after_create(db),
        Hook::AfterSave => record.after_save(db),
        Hook::BeforeUpdate => record.before_update(db),
        Hook::AfterUpdate => record.after_update(db),
        Hook::BeforeDelete => record.before_delete(db),
        Hook::AfterDelete => record.after_delete(db),
        Hook::AfterFind => record.after_find(db),
    }
}

/// A mutable borrow of an association field.
pub enum RelatedMut<'a> {
    /// A single-valued field.
    One(Box<dyn RecordSlot<'a> + 'a>),
    /// A sequence field.
    Many(&'a mut dyn RecordList),
}

/// A single-valued association field that may be empty.
pub trait RecordSlot<'a> {
    /// Descriptor of the slot's record type.
    fn descriptor(&self) -> Arc<ModelDescriptor>;

    /// The held record, if present.
    fn get(&mut self) -> Option<&mut dyn Record>;

    /// Reset to a fresh default record and return it.
    fn fill(&mut self) -> &mut dyn Record;

    /// Remove the held record.
    fn clear(&mut self);

    /// Give up the slot, keeping the borrow of the held record.
    fn into_present(self: Box<Self>) -> Option<&'a mut dyn Record>;
}

/// Slot over an `Option<T>` field.
pub struct OptionSlot<'a, T>(pub &'a mut Option<T>);

impl<'a, T: Model> RecordSlot<'a> for OptionSlot<'a, T> {
    fn descriptor(&self) -> Arc<ModelDescriptor> {
        T::describe()
    }

    fn get(&mut self) -> Option<&mut dyn Record> {
        self.0.as_mut().map(|r| r as &mut dyn Record)
    }

    fn fill(&mut self) -> &mut dyn Record {
        self.0.insert(T::default())
    }

    fn clear(&mut self) {
        *self.0 = None;
    }

    fn into_present(self: Box<Self>) -> Option<&'a mut dyn Record> {
        let OptionSlot(inner) = *self;
        inner.as_mut().map(|r| r as &mut dyn Record)
    }
}

/// Slot over an `Option<Box<T>>` field, for self-referencing types.
pub struct BoxSlot<'a, T>(pub &'a mut Option<Box<T>>);

impl<'a, T: Model> RecordSlot<'a> for BoxSlot<'a, T> {
    fn descriptor(&self) -> Arc<ModelDescriptor> {
        T::describe()
    }

    fn get(&mut self) -> Option<&mut dyn Record> {
        self.0.as_mut().map(|r| r.as_mut() as &mut dyn Record)
    }

    fn fill(&mut self) -> &mut dyn Record {
        self.0.insert(Box::default()).as_mut()
    }

    fn clear(&mut self) {
        *self.0 = None;
    }

    fn into_present(self: Box<Self>) -> Option<&'a mut dyn Record> {
        let BoxSlot(inner) = *self;
        inner.as_mut().map(|r| r.as_mut() as &mut dyn Record)
    }
}

/// Slot over a plain `T` field; it counts as present when any column is
/// non-zero.
pub struct InlineSlot<'a, T>(pub &'a mut T);

impl<'a, T: Model> RecordSlot<'a> for InlineSlot<'a, T> {
    fn descriptor(&self) -> Arc<ModelDescriptor> {
        T::describe()
    }

    fn get(&mut self) -> Option<&mut dyn Record> {
        if is_blank(&*self.0) {
            None
        } else {
            Some(&mut *self.0)
        }
    }

    fn fill(&mut self) -> &mut dyn Record {
        *self.0 = T::default();
        &mut *self.0
    }

    fn clear(&mut self) {
        *self.0 = T::default();
    }

    fn into_present(self: Box<Self>) -> Option<&'a mut dyn Record> {
        let InlineSlot(inner) = *self;
        if is_blank(&*inner) {
            None
        } else {
            Some(inner)
        }
    }
}

/// A sequence association field.
pub trait RecordList {
    /// Descriptor of the element type.
    fn descriptor(&self) -> Arc<ModelDescriptor>;

    /// Number of elements.
    fn len(&self) -> usize;

    /// Whether the list is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all elements.
    fn clear(&mut self);

    /// Append a default element and return it.
    fn push_default(&mut self) -> &mut dyn Record;

    /// Borrow one element.
    fn record_mut(&mut self, index: usize) -> Option<&mut dyn Record>;

    /// Borrow every element.
    fn records_mut(&mut self) -> Vec<&mut dyn Record>;
}

impl<T: Model> RecordList for Vec<T> {
    fn descriptor(&self) -> Arc<ModelDescriptor> {
        T::describe()
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn clear(&mut self) {
        Vec::clear(self);
    }

    fn push_default(&mut self) -> &mut dyn Record {
        self.push(T::default());
        let last = Vec::len(self) - 1;
        &mut self[last]
    }

    fn record_mut(&mut self, index: usize) -> Option<&mut dyn Record> {
        self.as_mut_slice()
            .get_mut(index)
            .map(|r| r as &mut dyn Record)
    }

    fn records_mut(&mut self) -> Vec<&mut dyn Record> {
        self.iter_mut().map(|r| r as &mut dyn Record).collect()
    }
}

/// The target an operation reads into or writes from.
pub enum Target<'a> {
    /// No record; conditions only.
    None,
    /// One record.
    One(&'a mut dyn Record),
    /// A sequence of records.
    Many(&'a mut dyn RecordList),
}

impl Target<'_> {
    /// Whether there is any record.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Whether every column of the record holds its zero value.
pub fn is_blank(record: &dyn Record) -> bool {
    record
        .descriptor()
        .fields
        .iter()
        .all(|f| record.get_field(&f.path).is_none_or(|v| v.is_zero()))
}

/// The record's primary key value, if it has a non-zero one.
pub fn primary_key_value(record: &dyn Record) -> Option<Value> {
    let descriptor = record.descriptor();
    let pk = descriptor.primary_key()?;
    record.get_field(&pk.path).filter(|v| !v.is_zero())
}

/// Assign a row's columns to the record's fields by column name.
///
/// The n-th occurrence of a column name goes to the n-th field mapped to
/// that column; unmatched columns are ignored.
pub fn scan_row_into(record: &mut dyn Record, row: &Row) -> QueryResult<()> {
    let descriptor = record.descriptor();
    let mut claimed = vec![false; descriptor.fields.len()];

    for (column, value) in row.columns().iter().zip(row.values()) {
        let slot = descriptor
            .fields
            .iter()
            .enumerate()
            .find(|(i, f)| !claimed[*i] && f.column == *column);
        if let Some((i, field)) = slot {
            claimed[i] = true;
            record
                .set_field(&field.path, value.clone())
                .map_err(|e| e.with_model(descriptor.type_name))?;
        }
    }
    Ok(())
}

/// Convert a value for a generated setter, naming the field on failure.
pub fn convert_field<T: FromValue>(field: &str, value: Value) -> QueryResult<T> {
    T::from_value(value).map_err(|message| QueryError::invalid_data_type(field, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Model;

    #[derive(Debug, Default, Model)]
    #[strata(crate = "crate")]
    struct Wheel {
        id: i64,
        size: i32,
    }

    #[derive(Debug, Default, Model)]
    #[strata(crate = "crate")]
    struct Car {
        id: i64,
        name: String,
        #[strata(has_many)]
        wheels: Vec<Wheel>,
    }

    fn row(columns: &[&str], values: Vec<Value>) -> Row {
        Row::new(columns.iter().map(|c| c.to_string()).collect(), values)
    }

    #[test]
    fn test_scan_assigns_duplicates_positionally() {
        let mut car = Car::default();
        scan_row_into(
            &mut car,
            &row(
                &["id", "name", "id", "unknown"],
                vec![Value::Int(3), "golf".into(), Value::Int(9), Value::Int(1)],
            ),
        )
        .unwrap();
        assert_eq!(car.id, 3);
        assert_eq!(car.name, "golf");
    }

    #[test]
    fn test_scan_type_mismatch() {
        let mut car = Car::default();
        let err = scan_row_into(&mut car, &row(&["id"], vec!["x".into()])).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::InvalidDataType);
    }

    #[test]
    fn test_list_access() {
        let mut car = Car::default();
        match car.association_mut("wheels") {
            Some(RelatedMut::Many(list)) => {
                list.push_default().set_field("size", Value::Int(17)).unwrap();
                assert_eq!(list.len(), 1);
            }
            _ => panic!("expected list"),
        }
        assert_eq!(car.wheels[0].size, 17);
        assert!(car.association_mut("engine").is_none());
    }

    #[test]
    fn test_blank_and_primary_key() {
        let mut wheel = Wheel::default();
        assert!(is_blank(&wheel));
        assert_eq!(primary_key_value(&wheel), None);
        wheel.id = 4;
        assert_eq!(primary_key_value(&wheel), Some(Value::Int(4)));
    }
}
