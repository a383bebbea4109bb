//! Table creation helpers.
//!
//! Enough DDL to stand up a schema from model declarations: create tables
//! (and many-to-many join tables), drop them, and add columns that a model
//! declares but the table lacks. Nothing is ever altered or removed.

use tracing::info;

use crate::connection::Executor;
use crate::error::QueryResult;
use crate::model::{AssociationDescriptor, AssociationKind, FieldDescriptor, Model, ModelDescriptor};
use crate::session::{Db, Outcome};

impl Db {
    /// Whether `table` exists.
    pub fn has_table(&self, table: &str) -> QueryResult<bool> {
        self.dialect_ref().has_table(self, table)
    }

    /// Whether the table of `T` exists.
    pub fn has_table_for<T: Model>(&self) -> QueryResult<bool> {
        let descriptor = T::describe();
        self.has_table(&descriptor.table_name(self.is_singular_table()))
    }

    /// Create the table of `T` and any join tables its many-to-many
    /// associations need that do not exist yet.
    pub fn create_table<T: Model>(&self) -> QueryResult<Outcome> {
        let descriptor = T::describe();
        let outcome = self.create_table_for(&descriptor)?;
        self.create_join_tables(&descriptor)?;
        Ok(outcome)
    }

    /// Drop the table of `T`.
    pub fn drop_table<T: Model>(&self) -> QueryResult<Outcome> {
        let descriptor = T::describe();
        let table = descriptor.table_name(self.is_singular_table());
        info!(table = %table, "Dropping table");
        self.exec(&format!("DROP TABLE {}", self.dialect_ref().quote(&table)), ())
    }

    /// Drop `table` if it exists.
    pub fn drop_table_if_exists(&self, table: &str) -> QueryResult<Outcome> {
        if !self.has_table(table)? {
            return Ok(Outcome::default());
        }
        info!(table, "Dropping table");
        self.exec(&format!("DROP TABLE {}", self.dialect_ref().quote(table)), ())
    }

    /// Create the table of `T` when missing, otherwise add the columns it
    /// lacks. Join tables are created when missing.
    pub fn auto_migrate<T: Model>(&self) -> QueryResult<()> {
        let descriptor = T::describe();
        let table = descriptor.table_name(self.is_singular_table()).into_owned();
        if !self.has_table(&table)? {
            self.create_table_for(&descriptor)?;
        } else {
            let dialect = self.dialect_ref();
            for field in &descriptor.fields {
                if dialect.has_column(self, &table, &field.column)? {
                    continue;
                }
                info!(table = %table, column = %field.column, "Adding column");
                let sql = format!(
                    "ALTER TABLE {} ADD {}",
                    dialect.quote(&table),
                    self.column_definition(field)
                );
                self.exec(&sql, ())?;
            }
        }
        self.create_join_tables(&descriptor)
    }

    fn create_table_for(&self, descriptor: &ModelDescriptor) -> QueryResult<Outcome> {
        let dialect = self.dialect_ref();
        let table = descriptor.table_name(self.is_singular_table());

        let mut columns: Vec<String> = descriptor
            .fields
            .iter()
            .map(|f| self.column_definition(f))
            .collect();

        // An inline `primary key` type (SQLite autoincrement) excludes a
        // table-level constraint.
        let inline_pk = descriptor
            .primary_keys()
            .any(|f| dialect.data_type_of(f).to_lowercase().contains("primary key"));
        if descriptor.has_primary_key() && !inline_pk {
            let keys: Vec<String> = descriptor
                .primary_keys()
                .map(|f| dialect.quote(&f.column))
                .collect();
            columns.push(format!("PRIMARY KEY ({})", keys.join(",")));
        }

        info!(table = %table, columns = descriptor.fields.len(), "Creating table");
        self.exec(
            &format!("CREATE TABLE {} ({})", dialect.quote(&table), columns.join(",")),
            (),
        )
    }

    fn create_join_tables(&self, owner: &ModelDescriptor) -> QueryResult<()> {
        for association in &owner.associations {
            if association.kind != AssociationKind::ManyToMany {
                continue;
            }
            let Some(join_table) = &association.join_table else {
                continue;
            };
            if self.has_table(join_table)? {
                continue;
            }
            self.create_join_table(owner, association, join_table)?;
        }
        Ok(())
    }

    fn create_join_table(
        &self,
        owner: &ModelDescriptor,
        association: &AssociationDescriptor,
        join_table: &str,
    ) -> QueryResult<()> {
        let dialect = self.dialect_ref();
        let target = association.target();

        let key_column = |descriptor: &ModelDescriptor, column: String| -> String {
            let data_type = match descriptor.primary_key() {
                Some(pk) => dialect.data_type_of(&plain_key(pk)),
                None => "bigint".to_string(),
            };
            format!("{} {}", dialect.quote(&column), data_type)
        };
        let owner_column = association.foreign_key.clone();
        let target_column = association.join_target_column();

        info!(table = join_table, "Creating join table");
        let sql = format!(
            "CREATE TABLE {} ({},{},PRIMARY KEY ({},{}))",
            dialect.quote(join_table),
            key_column(owner, owner_column.clone()),
            key_column(&target, target_column.clone()),
            dialect.quote(&owner_column),
            dialect.quote(&target_column),
        );
        self.exec(&sql, ())?;
        Ok(())
    }

    fn column_definition(&self, field: &FieldDescriptor) -> String {
        let dialect = self.dialect_ref();
        let mut definition = format!("{} {}", dialect.quote(&field.column), dialect.data_type_of(field));
        if field.not_null {
            definition.push_str(" NOT NULL");
        }
        if field.unique {
            definition.push_str(" UNIQUE");
        }
        if let Some(default) = &field.default {
            definition.push_str(" DEFAULT ");
            definition.push_str(default);
        }
        definition
    }
}

/// A key column as referenced from a join table: same type, no identity.
fn plain_key(pk: &FieldDescriptor) -> FieldDescriptor {
    FieldDescriptor {
        is_primary_key: false,
        auto_increment: false,
        ..pk.clone()
    }
}
