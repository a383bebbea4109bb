//! Raw member declarations emitted by `#[derive(Model)]`.
//!
//! A declaration is the literal shape of a struct: its members, their Rust
//! storage kinds and their tags. Naming rules, primary-key discovery,
//! embedded flattening and association key inference are applied later, once
//! per type, by the metadata cache.

use std::sync::Arc;

use super::descriptor::{AssociationKind, ModelDescriptor};
use crate::value::Value;

/// The storage kind of a column, derived from its Rust type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Boolean.
    Bool,
    /// Integer up to 32 bits.
    Int,
    /// 64-bit integer.
    BigInt,
    /// Floating point.
    Float,
    /// Text.
    Text,
    /// Binary data.
    Bytes,
    /// Timestamp.
    Timestamp,
    /// JSON document.
    Json,
    /// UUID stored as text.
    Uuid,
}

impl StorageKind {
    /// Whether the kind is integer-like, which makes an `id` field an
    /// implicit auto-increment primary key.
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Int | Self::BigInt)
    }
}

/// A plain column member.
#[derive(Debug, Clone)]
pub struct ColumnDeclaration {
    /// Rust field name.
    pub field: &'static str,
    /// Storage kind.
    pub kind: StorageKind,
    /// Declared as `Option<_>`.
    pub nullable: bool,
    /// Explicit column name.
    pub column: Option<&'static str>,
    /// Tagged as primary key.
    pub primary_key: bool,
    /// Explicit auto-increment setting.
    pub auto_increment: Option<bool>,
    /// `NOT NULL` constraint.
    pub not_null: bool,
    /// `UNIQUE` constraint.
    pub unique: bool,
    /// SQL default expression.
    pub default: Option<&'static str>,
    /// Size hint for text columns.
    pub size: Option<u32>,
    /// Explicit SQL type, bypassing dialect mapping.
    pub sql_type: Option<&'static str>,
    /// Marks the soft-delete timestamp.
    pub soft_delete: bool,
    /// Client-side primary key generator.
    pub generate: Option<fn() -> Value>,
}

impl ColumnDeclaration {
    /// Declare a column for the given field and kind.
    pub fn new(field: &'static str, kind: StorageKind) -> Self {
        Self {
            field,
            kind,
            nullable: false,
            column: None,
            primary_key: false,
            auto_increment: None,
            not_null: false,
            unique: false,
            default: None,
            size: None,
            sql_type: None,
            soft_delete: false,
            generate: None,
        }
    }

    /// Mark as nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Override the column name.
    pub fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    /// Mark as primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Set auto-increment explicitly.
    pub fn auto_increment(mut self, enabled: bool) -> Self {
        self.auto_increment = Some(enabled);
        self
    }

    /// Add a `NOT NULL` constraint.
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Add a `UNIQUE` constraint.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Set the SQL default.
    pub fn default_sql(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    /// Set the size hint.
    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Set an explicit SQL type.
    pub fn sql_type(mut self, sql_type: &'static str) -> Self {
        self.sql_type = Some(sql_type);
        self
    }

    /// Mark as the soft-delete column.
    pub fn soft_delete(mut self) -> Self {
        self.soft_delete = true;
        self
    }

    /// Set a client-side generator used when the value is zero on create.
    pub fn generate(mut self, generator: fn() -> Value) -> Self {
        self.generate = Some(generator);
        self
    }
}

/// An association member.
#[derive(Debug, Clone)]
pub struct AssociationDeclaration {
    /// Rust field name.
    pub field: &'static str,
    /// Declared kind, or `None` to infer it.
    pub kind: Option<AssociationKind>,
    /// Target type name.
    pub target_type: &'static str,
    /// Resolves the target descriptor lazily.
    pub target: fn() -> Arc<ModelDescriptor>,
    /// Declared as a sequence.
    pub many: bool,
    /// Explicit foreign key column.
    pub foreign_key: Option<&'static str>,
    /// Explicit association foreign key column.
    pub association_foreign_key: Option<&'static str>,
    /// Join table for many-to-many.
    pub join_table: Option<&'static str>,
    /// Cascade saves through this association.
    pub save: bool,
}

impl AssociationDeclaration {
    /// Declare an association to `target_type`.
    pub fn new(
        field: &'static str,
        target_type: &'static str,
        target: fn() -> Arc<ModelDescriptor>,
        many: bool,
    ) -> Self {
        Self {
            field,
            kind: None,
            target_type,
            target,
            many,
            foreign_key: None,
            association_foreign_key: None,
            join_table: None,
            save: true,
        }
    }

    /// Set the association kind.
    pub fn kind(mut self, kind: AssociationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set the foreign key column.
    pub fn foreign_key(mut self, column: &'static str) -> Self {
        self.foreign_key = Some(column);
        self
    }

    /// Set the association foreign key column.
    pub fn association_foreign_key(mut self, column: &'static str) -> Self {
        self.association_foreign_key = Some(column);
        self
    }

    /// Declare a many-to-many join table.
    pub fn join_table(mut self, table: &'static str) -> Self {
        self.kind = Some(AssociationKind::ManyToMany);
        self.join_table = Some(table);
        self
    }

    /// Disable cascading saves.
    pub fn skip_save(mut self) -> Self {
        self.save = false;
        self
    }
}

/// One declared struct member.
#[derive(Debug, Clone)]
pub enum MemberDeclaration {
    /// A column.
    Column(ColumnDeclaration),
    /// An embedded struct flattened into the parent's columns.
    Embedded {
        /// Rust field name.
        field: &'static str,
        /// Column name prefix.
        prefix: Option<&'static str>,
        /// The embedded type's declaration.
        declaration: fn() -> ModelDeclaration,
    },
    /// An association to another model.
    Association(AssociationDeclaration),
}

/// The declaration of one model type.
#[derive(Debug, Clone)]
pub struct ModelDeclaration {
    /// Rust type name.
    pub type_name: &'static str,
    /// Custom table name, used verbatim.
    pub table: Option<&'static str>,
    /// Members in declaration order.
    pub members: Vec<MemberDeclaration>,
}

impl ModelDeclaration {
    /// Start a declaration.
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            table: None,
            members: Vec::new(),
        }
    }

    /// Set a custom table name.
    pub fn table(mut self, table: &'static str) -> Self {
        self.table = Some(table);
        self
    }

    /// Add a column.
    pub fn column(mut self, column: ColumnDeclaration) -> Self {
        self.members.push(MemberDeclaration::Column(column));
        self
    }

    /// Add an embedded struct.
    pub fn embedded(
        mut self,
        field: &'static str,
        prefix: Option<&'static str>,
        declaration: fn() -> ModelDeclaration,
    ) -> Self {
        self.members.push(MemberDeclaration::Embedded {
            field,
            prefix,
            declaration,
        });
        self
    }

    /// Add an association.
    pub fn association(mut self, association: AssociationDeclaration) -> Self {
        self.members.push(MemberDeclaration::Association(association));
        self
    }
}
