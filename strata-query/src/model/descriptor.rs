//! Derived, immutable metadata for one model type.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;


use super::declaration::{MemberDeclaration, ModelDeclaration, StorageKind};
use crate::inflect;
use crate::value::Value;

/// The kind of a relationship between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    /// The owner row holds the foreign key to the target.
    BelongsTo,
    /// The target row holds the foreign key to the owner; at most one.
    HasOne,
    /// The target rows hold the foreign key to the owner.
    HasMany,
    /// Rows are linked through a join table.
    ManyToMany,
}

impl AssociationKind {
    /// Whether the owner must be saved before the associated values.
    pub fn saves_after_owner(&self) -> bool {
        !matches!(self, Self::BelongsTo)
    }
}

/// One column of a model, after naming and key discovery.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field path used with `Record::get_field`; embedded members are
    /// addressed as `outer.inner`.
    pub path: String,
    /// Column name.
    pub column: String,
    /// Storage kind.
    pub kind: StorageKind,
    /// Nullable-scalar wrapper.
    pub nullable: bool,
    /// Part of the primary key.
    pub is_primary_key: bool,
    /// Value assigned by the store on insert.
    pub auto_increment: bool,
    /// `NOT NULL` constraint.
    pub not_null: bool,
    /// `UNIQUE` constraint.
    pub unique: bool,
    /// SQL default expression.
    pub default: Option<String>,
    /// Size hint.
    pub size: Option<u32>,
    /// Explicit SQL type.
    pub sql_type: Option<String>,
    /// Soft-delete timestamp.
    pub soft_delete: bool,
    /// Client-side primary key generator.
    pub generate: Option<fn() -> Value>,
}

impl FieldDescriptor {
    /// `created_at` timestamps are set on create.
    pub fn is_created_at(&self) -> bool {
        self.column == "created_at" && self.kind == StorageKind::Timestamp
    }

    /// `updated_at` timestamps are set on create and update.
    pub fn is_updated_at(&self) -> bool {
        self.column == "updated_at" && self.kind == StorageKind::Timestamp
    }
}

/// A relationship from the owning model to a target model.
#[derive(Debug, Clone)]
pub struct AssociationDescriptor {
    /// Field name on the owner; also the preload directive name.
    pub name: String,
    /// Relationship kind.
    pub kind: AssociationKind,
    /// Target type name.
    pub target_type: &'static str,
    target: fn() -> Arc<ModelDescriptor>,
    /// Belongs-to: column on the owner. Has-one/has-many: column on the
    /// target. Many-to-many: join-table column referencing the owner.
    pub foreign_key: String,
    /// Belongs-to: column on the target (its primary key unless tagged).
    /// Has-one/has-many: column on the owner (its primary key unless
    /// tagged). Many-to-many: join-table column referencing the target.
    association_foreign_key: Option<String>,
    /// Join table for many-to-many.
    pub join_table: Option<String>,
    /// Cascade saves through this association.
    pub save: bool,
}

impl AssociationDescriptor {
    /// Resolve the target descriptor.
    pub fn target(&self) -> Arc<ModelDescriptor> {
        (self.target)()
    }

    /// The column on the owner side that identifies the owner.
    ///
    /// For has-one/has-many this is the value copied into the target's
    /// foreign key; for many-to-many it is the value written to the
    /// join-table's owner column.
    pub fn owner_key(&self, owner: &ModelDescriptor) -> Option<String> {
        match self.kind {
            AssociationKind::HasOne | AssociationKind::HasMany => self
                .association_foreign_key
                .clone()
                .or_else(|| owner.primary_key().map(|f| f.column.clone())),
            AssociationKind::ManyToMany => owner.primary_key().map(|f| f.column.clone()),
            AssociationKind::BelongsTo => Some(self.foreign_key.clone()),
        }
    }

    /// The column on the target side referenced by a belongs-to foreign
    /// key, or the target key written to a many-to-many join row.
    pub fn target_key(&self, target: &ModelDescriptor) -> Option<String> {
        match self.kind {
            AssociationKind::BelongsTo => self
                .association_foreign_key
                .clone()
                .or_else(|| target.primary_key().map(|f| f.column.clone())),
            AssociationKind::ManyToMany => target.primary_key().map(|f| f.column.clone()),
            AssociationKind::HasOne | AssociationKind::HasMany => Some(self.foreign_key.clone()),
        }
    }

    /// The join-table column referencing the target (many-to-many only).
    pub fn join_target_column(&self) -> String {
        self.association_foreign_key
            .clone()
            .unwrap_or_else(|| inflect::foreign_key_for(self.target_type))
    }
}

/// Cached structural metadata for one model type.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    /// Rust type name.
    pub type_name: &'static str,
    base_name: String,
    custom_table: Option<String>,
    /// Columns in declaration order, embedded members flattened.
    pub fields: Vec<FieldDescriptor>,
    /// Associations in declaration order.
    pub associations: Vec<AssociationDescriptor>,
    primary_keys: Vec<usize>,
}

impl ModelDescriptor {
    /// Derive a descriptor from a declaration.
    ///
    /// Primary keys: tagged fields win; otherwise a field whose column is
    /// `id` and whose kind is integer-like becomes an auto-increment key.
    pub fn derive(declaration: &ModelDeclaration) -> Self {
        let mut fields = Vec::new();
        let mut explicit_auto_increment = Vec::new();
        let mut associations = Vec::new();
        flatten(
            declaration,
            "",
            "",
            &mut fields,
            &mut explicit_auto_increment,
            &mut associations,
        );

        let mut primary_keys: Vec<usize> = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_primary_key)
            .map(|(i, _)| i)
            .collect();

        if primary_keys.is_empty() {
            if let Some(i) = fields
                .iter()
                .position(|f| f.column == "id" && f.kind.is_integer())
            {
                fields[i].is_primary_key = true;
                primary_keys.push(i);
            }
        }

        // A lone integer key without a generator is store-assigned unless
        // tagged `auto_increment = false`.
        if let [only] = primary_keys[..] {
            let field = &mut fields[only];
            if field.kind.is_integer() && field.generate.is_none() {
                field.auto_increment = explicit_auto_increment[only].unwrap_or(true);
            }
        }

        let base_name = inflect::to_snake(declaration.type_name);
        let owner_key_columns: HashSet<&str> = fields.iter().map(|f| f.column.as_str()).collect();
        let associations: Vec<_> = associations
            .into_iter()
            .map(|a| resolve_association(a, &base_name, &owner_key_columns))
            .collect();

        crate::strata_debug!(
            model = declaration.type_name,
            columns = fields.len(),
            primary_keys = ?primary_keys,
            associations = associations.len(),
            "Derived model descriptor"
        );

        Self {
            type_name: declaration.type_name,
            base_name,
            custom_table: declaration.table.map(str::to_string),
            fields,
            associations,
            primary_keys,
        }
    }

    /// Resolve the table name: the custom name verbatim, otherwise the
    /// snake-case type name, pluralized unless `singular` is set.
    pub fn table_name(&self, singular: bool) -> Cow<'_, str> {
        match &self.custom_table {
            Some(name) => Cow::Borrowed(name),
            None if singular => Cow::Borrowed(&self.base_name),
            None => Cow::Owned(inflect::pluralize(&self.base_name)),
        }
    }

    /// Snake-case singular base name.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// The first primary key field.
    pub fn primary_key(&self) -> Option<&FieldDescriptor> {
        self.primary_keys.first().map(|&i| &self.fields[i])
    }

    /// All primary key fields.
    pub fn primary_keys(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.primary_keys.iter().map(|&i| &self.fields[i])
    }

    /// Whether the type has any primary key.
    pub fn has_primary_key(&self) -> bool {
        !self.primary_keys.is_empty()
    }

    /// Look up a field by column name.
    pub fn field_by_column(&self, column: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.column == column)
    }

    /// Look up a field by column name or field path.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.column == name)
            .or_else(|| self.fields.iter().find(|f| f.path == name))
    }

    /// Look up an association by name.
    pub fn association(&self, name: &str) -> Option<&AssociationDescriptor> {
        self.associations.iter().find(|a| a.name == name)
    }

    /// The soft-delete column, if any.
    pub fn soft_delete_field(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.soft_delete)
    }
}

/// A declared association before key inference.
struct PendingAssociation {
    path: String,
    field: &'static str,
    kind: Option<AssociationKind>,
    many: bool,
    target_type: &'static str,
    target: fn() -> Arc<ModelDescriptor>,
    foreign_key: Option<&'static str>,
    association_foreign_key: Option<&'static str>,
    join_table: Option<&'static str>,
    save: bool,
}

fn flatten(
    declaration: &ModelDeclaration,
    path_prefix: &str,
    column_prefix: &str,
    fields: &mut Vec<FieldDescriptor>,
    explicit_auto_increment: &mut Vec<Option<bool>>,
    associations: &mut Vec<PendingAssociation>,
) {
    for member in &declaration.members {
        match member {
            MemberDeclaration::Column(c) => {
                let column = c.column.map(str::to_string).unwrap_or_else(|| c.field.to_string());
                let soft_delete = c.soft_delete
                    || (column == "deleted_at" && c.kind == StorageKind::Timestamp && c.nullable);
                explicit_auto_increment.push(c.auto_increment);
                fields.push(FieldDescriptor {
                    path: format!("{}{}", path_prefix, c.field),
                    column: format!("{}{}", column_prefix, column),
                    kind: c.kind,
                    nullable: c.nullable,
                    is_primary_key: c.primary_key,
                    auto_increment: c.auto_increment.unwrap_or(false),
                    not_null: c.not_null,
                    unique: c.unique,
                    default: c.default.map(str::to_string),
                    size: c.size,
                    sql_type: c.sql_type.map(str::to_string),
                    soft_delete,
                    generate: c.generate,
                });
            }
            MemberDeclaration::Embedded {
                field,
                prefix,
                declaration,
            } => {
                let inner = declaration();
                flatten(
                    &inner,
                    &format!("{}{}.", path_prefix, field),
                    &format!("{}{}", column_prefix, prefix.unwrap_or("")),
                    fields,
                    explicit_auto_increment,
                    associations,
                );
            }
            MemberDeclaration::Association(a) => associations.push(PendingAssociation {
                path: format!("{}{}", path_prefix, a.field),
                field: a.field,
                kind: a.kind,
                many: a.many,
                target_type: a.target_type,
                target: a.target,
                foreign_key: a.foreign_key,
                association_foreign_key: a.association_foreign_key,
                join_table: a.join_table,
                save: a.save,
            }),
        }
    }
}

/// Infer kind and key columns from the owner's own columns only, so that
/// mutually referencing types never need each other's descriptor here.
fn resolve_association(
    pending: PendingAssociation,
    owner_base: &str,
    owner_columns: &HashSet<&str>,
) -> AssociationDescriptor {
    let field_fk = format!("{}_id", pending.field);
    let kind = match pending.kind {
        Some(kind) => kind,
        None if pending.join_table.is_some() => AssociationKind::ManyToMany,
        None if pending.many => AssociationKind::HasMany,
        None => {
            let fk = pending.foreign_key.unwrap_or(field_fk.as_str());
            if owner_columns.contains(fk) {
                AssociationKind::BelongsTo
            } else {
                AssociationKind::HasOne
            }
        }
    };

    let owner_fk = format!("{}_id", owner_base);
    let foreign_key = match kind {
        AssociationKind::BelongsTo => pending.foreign_key.map(str::to_string).unwrap_or(field_fk),
        AssociationKind::HasOne | AssociationKind::HasMany | AssociationKind::ManyToMany => {
            pending.foreign_key.map(str::to_string).unwrap_or(owner_fk)
        }
    };

    let join_table = match kind {
        AssociationKind::ManyToMany => Some(pending.join_table.map(str::to_string).unwrap_or_else(
            || inflect::join_table_for(owner_base, &inflect::to_snake(pending.target_type)),
        )),
        _ => None,
    };

    AssociationDescriptor {
        name: pending.path,
        kind,
        target_type: pending.target_type,
        target: pending.target,
        foreign_key,
        association_foreign_key: pending.association_foreign_key.map(str::to_string),
        join_table,
        save: pending.save,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::declaration::{AssociationDeclaration, ColumnDeclaration};

    fn empty_target() -> Arc<ModelDescriptor> {
        Arc::new(ModelDescriptor::derive(&ModelDeclaration::new("Email")))
    }

    fn timestamps() -> ModelDeclaration {
        ModelDeclaration::new("Timestamps")
            .column(ColumnDeclaration::new("id", StorageKind::BigInt))
            .column(ColumnDeclaration::new("created_at", StorageKind::Timestamp))
            .column(ColumnDeclaration::new("deleted_at", StorageKind::Timestamp).nullable())
    }

    #[test]
    fn test_default_id_primary_key() {
        let d = ModelDescriptor::derive(
            &ModelDeclaration::new("User")
                .column(ColumnDeclaration::new("id", StorageKind::BigInt))
                .column(ColumnDeclaration::new("name", StorageKind::Text)),
        );
        let pk = d.primary_key().unwrap();
        assert_eq!(pk.column, "id");
        assert!(pk.auto_increment);
    }

    #[test]
    fn test_explicit_tag_wins_over_id() {
        let d = ModelDescriptor::derive(
            &ModelDeclaration::new("Token")
                .column(ColumnDeclaration::new("id", StorageKind::BigInt))
                .column(ColumnDeclaration::new("code", StorageKind::Text).primary_key()),
        );
        assert_eq!(d.primary_keys().count(), 1);
        assert_eq!(d.primary_key().unwrap().column, "code");
        assert!(!d.field_by_column("id").unwrap().is_primary_key);
    }

    #[test]
    fn test_no_primary_key_is_legal() {
        let d = ModelDescriptor::derive(
            &ModelDeclaration::new("LogLine").column(ColumnDeclaration::new("line", StorageKind::Text)),
        );
        assert!(!d.has_primary_key());
    }

    #[test]
    fn test_table_names() {
        let d = ModelDescriptor::derive(&ModelDeclaration::new("CreditCard"));
        assert_eq!(d.table_name(false), "credit_cards");
        assert_eq!(d.table_name(true), "credit_card");

        let custom = ModelDescriptor::derive(&ModelDeclaration::new("Cart").table("shopping_cart"));
        assert_eq!(custom.table_name(false), "shopping_cart");
        assert_eq!(custom.table_name(true), "shopping_cart");
    }

    #[test]
    fn test_embedded_flattening() {
        let d = ModelDescriptor::derive(
            &ModelDeclaration::new("Post")
                .embedded("base", None, timestamps)
                .embedded("author", Some("author_"), || {
                    ModelDeclaration::new("Author")
                        .column(ColumnDeclaration::new("name", StorageKind::Text))
                })
                .column(ColumnDeclaration::new("title", StorageKind::Text)),
        );
        let columns: Vec<_> = d.fields.iter().map(|f| f.column.as_str()).collect();
        assert_eq!(columns, vec!["id", "created_at", "deleted_at", "author_name", "title"]);
        assert_eq!(d.primary_key().unwrap().path, "base.id");
        assert_eq!(d.soft_delete_field().unwrap().column, "deleted_at");
        assert!(d.field_by_column("created_at").unwrap().is_created_at());
    }

    #[test]
    fn test_association_inference() {
        let d = ModelDescriptor::derive(
            &ModelDeclaration::new("User")
                .column(ColumnDeclaration::new("id", StorageKind::BigInt))
                .column(ColumnDeclaration::new("company_id", StorageKind::BigInt))
                .association(AssociationDeclaration::new("emails", "Email", empty_target, true))
                .association(AssociationDeclaration::new("company", "Company", empty_target, false))
                .association(AssociationDeclaration::new("card", "CreditCard", empty_target, false))
                .association(
                    AssociationDeclaration::new("languages", "Language", empty_target, true)
                        .join_table("user_languages"),
                ),
        );

        let emails = d.association("emails").unwrap();
        assert_eq!(emails.kind, AssociationKind::HasMany);
        assert_eq!(emails.foreign_key, "user_id");
        assert_eq!(emails.owner_key(&d).as_deref(), Some("id"));

        let company = d.association("company").unwrap();
        assert_eq!(company.kind, AssociationKind::BelongsTo);
        assert_eq!(company.foreign_key, "company_id");

        let card = d.association("card").unwrap();
        assert_eq!(card.kind, AssociationKind::HasOne);
        assert_eq!(card.foreign_key, "user_id");

        let languages = d.association("languages").unwrap();
        assert_eq!(languages.kind, AssociationKind::ManyToMany);
        assert_eq!(languages.join_table.as_deref(), Some("user_languages"));
        assert_eq!(languages.foreign_key, "user_id");
        assert_eq!(languages.join_target_column(), "language_id");
    }
}
