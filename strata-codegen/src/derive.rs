//! Implementation of the `#[derive(Model)]` macro.

use proc_macro2::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::meta::ParseNestedMeta;
use syn::{Data, DeriveInput, Fields, Ident, LitBool, LitInt, LitStr, Path, Token, Type};

use crate::types::{is_record_vec, last_ident, storage_kind, unwrap_generic};

/// Parse and generate code for the `#[derive(Model)]` macro.
pub fn derive_model_impl(input: &DeriveInput) -> Result<TokenStream, syn::Error> {
    let name = &input.ident;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Model derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Model derive only supports structs",
            ));
        }
    };
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Model derive does not support generic structs",
        ));
    }

    let struct_attrs = parse_struct_attrs(input)?;
    let krate = struct_attrs
        .krate
        .unwrap_or_else(|| syn::parse_quote!(::strata_query));
    let members: Vec<Member> = fields.iter().map(parse_field).collect::<Result<_, _>>()?;

    let type_name = name.to_string();
    let table = struct_attrs.table.map(|t| quote! { .table(#t) });
    let declarations = members.iter().filter_map(|m| m.declaration(&krate));

    let get_arms = members.iter().filter_map(|m| match m {
        Member::Column(c) => {
            let (ident, key) = (&c.ident, &c.key);
            Some(quote! {
                #key => ::core::option::Option::Some(#krate::value::ToValue::to_value(&self.#ident)),
            })
        }
        _ => None,
    });
    let set_arms = members.iter().filter_map(|m| match m {
        Member::Column(c) => {
            let (ident, key) = (&c.ident, &c.key);
            Some(quote! {
                #key => {
                    self.#ident = #krate::model::convert_field(path, value)?;
                    ::core::result::Result::Ok(())
                }
            })
        }
        _ => None,
    });
    let association_arms = members.iter().filter_map(|m| match m {
        Member::Association(a) => Some(a.accessor(&krate)),
        _ => None,
    });

    let embedded: Vec<(&Ident, String)> = members
        .iter()
        .filter_map(|m| match m {
            Member::Embedded { ident, key, .. } => Some((ident, format!("{}.", key))),
            _ => None,
        })
        .collect();
    let embedded_get = embedded.iter().map(|(ident, prefix)| {
        quote! {
            if let ::core::option::Option::Some(rest) = path.strip_prefix(#prefix) {
                return #krate::model::Record::get_field(&self.#ident, rest);
            }
        }
    });
    let embedded_set = embedded.iter().map(|(ident, prefix)| {
        quote! {
            if let ::core::option::Option::Some(rest) = path.strip_prefix(#prefix) {
                return #krate::model::Record::set_field(&mut self.#ident, rest, value);
            }
        }
    });
    let embedded_assoc = embedded.iter().map(|(ident, prefix)| {
        quote! {
            if let ::core::option::Option::Some(rest) = name.strip_prefix(#prefix) {
                return #krate::model::Record::association_mut(&mut self.#ident, rest);
            }
        }
    });

    let hooks_impl = (!struct_attrs.hooks).then(|| {
        quote! {
            impl #krate::model::Hooks for #name {}
        }
    });

    Ok(quote! {
        impl #krate::model::Record for #name {
            fn descriptor(&self) -> ::std::sync::Arc<#krate::model::ModelDescriptor> {
                <Self as #krate::model::Model>::describe()
            }

            fn get_field(&self, path: &str) -> ::core::option::Option<#krate::value::Value> {
                match path {
                    #(#get_arms)*
                    _ => {
                        #(#embedded_get)*
                        ::core::option::Option::None
                    }
                }
            }

            fn set_field(
                &mut self,
                path: &str,
                value: #krate::value::Value,
            ) -> #krate::error::QueryResult<()> {
                match path {
                    #(#set_arms)*
                    _ => {
                        #(#embedded_set)*
                        ::core::result::Result::Err(
                            #krate::error::QueryError::invalid_query(
                                ::std::format!("unknown field '{}' for {}", path, #type_name),
                            )
                            .with_model(#type_name)
                            .with_field(path),
                        )
                    }
                }
            }

            fn association_mut(
                &mut self,
                name: &str,
            ) -> ::core::option::Option<#krate::model::RelatedMut<'_>> {
                match name {
                    #(#association_arms)*
                    _ => {
                        #(#embedded_assoc)*
                        ::core::option::Option::None
                    }
                }
            }

            fn call_hook(
                &mut self,
                hook: #krate::model::Hook,
                db: &#krate::session::Db,
            ) -> #krate::error::QueryResult<()> {
                #krate::model::dispatch_hook(self, hook, db)
            }
        }

        impl #krate::model::Model for #name {
            fn declaration() -> #krate::model::ModelDeclaration {
                #krate::model::ModelDeclaration::new(#type_name)
                    #table
                    #(#declarations)*
            }
        }

        #hooks_impl
    })
}

/// Struct-level attributes parsed from `#[strata(...)]`.
#[derive(Default)]
struct StructAttrs {
    table: Option<String>,
    hooks: bool,
    krate: Option<Path>,
}

/// Parse struct-level `#[strata(...)]` attributes.
fn parse_struct_attrs(input: &DeriveInput) -> Result<StructAttrs, syn::Error> {
    let mut attrs = StructAttrs::default();

    for attr in &input.attrs {
        if !attr.path().is_ident("strata") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                attrs.table = Some(lit_str(&meta)?);
            } else if meta.path.is_ident("hooks") {
                attrs.hooks = true;
            } else if meta.path.is_ident("crate") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.krate = Some(value.parse()?);
            } else {
                return Err(meta.error("unknown strata attribute"));
            }
            Ok(())
        })?;
    }

    Ok(attrs)
}

/// Field-level attributes parsed from `#[strata(...)]`.
#[derive(Default)]
struct FieldAttrs {
    ignore: bool,
    primary_key: bool,
    column: Option<String>,
    auto_increment: Option<bool>,
    not_null: bool,
    unique: bool,
    default: Option<String>,
    size: Option<u32>,
    sql_type: Option<String>,
    embedded: bool,
    prefix: Option<String>,
    generate: Option<Path>,
    soft_delete: bool,
    kind: Option<&'static str>,
    association: bool,
    join_table: Option<String>,
    foreign_key: Option<String>,
    association_foreign_key: Option<String>,
    save: Option<bool>,
}

fn lit_str(meta: &ParseNestedMeta<'_>) -> Result<String, syn::Error> {
    let value: LitStr = meta.value()?.parse()?;
    Ok(value.value())
}

/// `flag` or `flag = true|false`.
fn flag(meta: &ParseNestedMeta<'_>) -> Result<bool, syn::Error> {
    if meta.input.peek(Token![=]) {
        let value: LitBool = meta.value()?.parse()?;
        Ok(value.value)
    } else {
        Ok(true)
    }
}

fn parse_field_attrs(field: &syn::Field) -> Result<FieldAttrs, syn::Error> {
    let mut attrs = FieldAttrs::default();

    for attr in &field.attrs {
        if !attr.path().is_ident("strata") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("ignore") || path.is_ident("skip") {
                attrs.ignore = true;
            } else if path.is_ident("primary_key") {
                attrs.primary_key = true;
            } else if path.is_ident("column") {
                attrs.column = Some(lit_str(&meta)?);
            } else if path.is_ident("auto_increment") {
                attrs.auto_increment = Some(flag(&meta)?);
            } else if path.is_ident("not_null") {
                attrs.not_null = true;
            } else if path.is_ident("unique") {
                attrs.unique = true;
            } else if path.is_ident("default") {
                attrs.default = Some(lit_str(&meta)?);
            } else if path.is_ident("size") {
                let value: LitInt = meta.value()?.parse()?;
                attrs.size = Some(value.base10_parse()?);
            } else if path.is_ident("sql_type") {
                attrs.sql_type = Some(lit_str(&meta)?);
            } else if path.is_ident("embedded") {
                attrs.embedded = true;
            } else if path.is_ident("prefix") {
                attrs.prefix = Some(lit_str(&meta)?);
            } else if path.is_ident("generate") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.generate = Some(value.parse()?);
            } else if path.is_ident("soft_delete") {
                attrs.soft_delete = true;
            } else if path.is_ident("association") {
                attrs.association = true;
            } else if path.is_ident("belongs_to") {
                attrs.kind = Some("BelongsTo");
            } else if path.is_ident("has_one") {
                attrs.kind = Some("HasOne");
            } else if path.is_ident("has_many") {
                attrs.kind = Some("HasMany");
            } else if path.is_ident("many_to_many") {
                attrs.kind = Some("ManyToMany");
                if meta.input.peek(Token![=]) {
                    attrs.join_table = Some(lit_str(&meta)?);
                }
            } else if path.is_ident("foreign_key") {
                attrs.foreign_key = Some(lit_str(&meta)?);
            } else if path.is_ident("association_foreign_key") {
                attrs.association_foreign_key = Some(lit_str(&meta)?);
            } else if path.is_ident("save_associations") {
                attrs.save = Some(flag(&meta)?);
            } else {
                return Err(meta.error("unknown strata attribute"));
            }
            Ok(())
        })?;
    }

    Ok(attrs)
}

/// One classified struct member.
enum Member {
    Column(ColumnInfo),
    Embedded {
        ident: Ident,
        key: String,
        ty: Type,
        prefix: Option<String>,
    },
    Association(AssociationInfo),
    Ignored,
}

struct ColumnInfo {
    ident: Ident,
    key: String,
    kind: &'static str,
    nullable: bool,
    attrs: FieldAttrs,
}

/// How an association field holds its record(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// `Vec<T>`
    Many,
    /// `Option<T>`
    Optional,
    /// `Option<Box<T>>`
    Boxed,
    /// `T`
    Inline,
}

struct AssociationInfo {
    ident: Ident,
    key: String,
    target: Type,
    shape: Shape,
    attrs: FieldAttrs,
}

fn parse_field(field: &syn::Field) -> Result<Member, syn::Error> {
    let ident = field
        .ident
        .clone()
        .ok_or_else(|| syn::Error::new_spanned(field, "Fields must be named"))?;
    let key = ident.unraw().to_string();
    let ty = field.ty.clone();
    let attrs = parse_field_attrs(field)?;

    if attrs.ignore {
        return Ok(Member::Ignored);
    }
    if attrs.embedded {
        return Ok(Member::Embedded {
            ident,
            key,
            ty,
            prefix: attrs.prefix,
        });
    }

    if attrs.kind.is_some() || attrs.association || is_record_vec(&ty) {
        let (shape, target) = if let Some(inner) = unwrap_generic(&ty, "Vec") {
            (Shape::Many, inner.clone())
        } else if let Some(inner) = unwrap_generic(&ty, "Option") {
            match unwrap_generic(inner, "Box") {
                Some(boxed) => (Shape::Boxed, boxed.clone()),
                None => (Shape::Optional, inner.clone()),
            }
        } else {
            (Shape::Inline, ty.clone())
        };

        let sequence_kind = matches!(attrs.kind, Some("HasMany") | Some("ManyToMany"));
        if shape == Shape::Many && attrs.kind.is_some() && !sequence_kind {
            return Err(syn::Error::new_spanned(
                &field.ty,
                "belongs_to and has_one need a single-valued field",
            ));
        }
        if shape != Shape::Many && sequence_kind {
            return Err(syn::Error::new_spanned(
                &field.ty,
                "has_many and many_to_many need a Vec field",
            ));
        }

        return Ok(Member::Association(AssociationInfo {
            ident,
            key,
            target,
            shape,
            attrs,
        }));
    }

    let (inner, nullable) = match unwrap_generic(&ty, "Option") {
        Some(inner) => (inner, true),
        None => (&ty, false),
    };
    let kind = storage_kind(inner).ok_or_else(|| {
        syn::Error::new_spanned(
            &field.ty,
            "unsupported column type: tag model fields with an association kind, \
             structs with #[strata(embedded)], or skip with #[strata(ignore)]",
        )
    })?;

    Ok(Member::Column(ColumnInfo {
        ident,
        key,
        kind,
        nullable,
        attrs,
    }))
}

impl Member {
    /// The builder call adding this member to the model declaration.
    fn declaration(&self, krate: &Path) -> Option<TokenStream> {
        match self {
            Member::Column(c) => Some(c.declaration(krate)),
            Member::Embedded { key, ty, prefix, .. } => {
                let prefix = match prefix {
                    Some(p) => quote! { ::core::option::Option::Some(#p) },
                    None => quote! { ::core::option::Option::None },
                };
                Some(quote! {
                    .embedded(#key, #prefix, <#ty as #krate::model::Model>::declaration)
                })
            }
            Member::Association(a) => Some(a.declaration(krate)),
            Member::Ignored => None,
        }
    }
}

impl ColumnInfo {
    fn declaration(&self, krate: &Path) -> TokenStream {
        let key = &self.key;
        let kind = Ident::new(self.kind, proc_macro2::Span::call_site());
        let attrs = &self.attrs;

        let mut modifiers = Vec::new();
        if self.nullable {
            modifiers.push(quote! { .nullable() });
        }
        if let Some(column) = &attrs.column {
            modifiers.push(quote! { .column(#column) });
        }
        if attrs.primary_key {
            modifiers.push(quote! { .primary_key() });
        }
        if let Some(enabled) = attrs.auto_increment {
            modifiers.push(quote! { .auto_increment(#enabled) });
        }
        if attrs.not_null {
            modifiers.push(quote! { .not_null() });
        }
        if attrs.unique {
            modifiers.push(quote! { .unique() });
        }
        if let Some(default) = &attrs.default {
            modifiers.push(quote! { .default_sql(#default) });
        }
        if let Some(size) = attrs.size {
            modifiers.push(quote! { .size(#size) });
        }
        if let Some(sql_type) = &attrs.sql_type {
            modifiers.push(quote! { .sql_type(#sql_type) });
        }
        if attrs.soft_delete {
            modifiers.push(quote! { .soft_delete() });
        }
        if let Some(generate) = &attrs.generate {
            modifiers.push(quote! { .generate(#generate) });
        }

        quote! {
            .column(
                #krate::model::ColumnDeclaration::new(#key, #krate::model::StorageKind::#kind)
                    #(#modifiers)*
            )
        }
    }
}

impl AssociationInfo {
    fn declaration(&self, krate: &Path) -> TokenStream {
        let key = &self.key;
        let target = &self.target;
        let target_name = last_ident(target).unwrap_or_default();
        let many = self.shape == Shape::Many;
        let attrs = &self.attrs;

        let mut modifiers = Vec::new();
        if let Some(kind) = attrs.kind {
            let kind = Ident::new(kind, proc_macro2::Span::call_site());
            modifiers.push(quote! { .kind(#krate::model::AssociationKind::#kind) });
        }
        if let Some(join_table) = &attrs.join_table {
            modifiers.push(quote! { .join_table(#join_table) });
        }
        if let Some(fk) = &attrs.foreign_key {
            modifiers.push(quote! { .foreign_key(#fk) });
        }
        if let Some(afk) = &attrs.association_foreign_key {
            modifiers.push(quote! { .association_foreign_key(#afk) });
        }
        if attrs.save == Some(false) {
            modifiers.push(quote! { .skip_save() });
        }

        quote! {
            .association(
                #krate::model::AssociationDeclaration::new(
                    #key,
                    #target_name,
                    <#target as #krate::model::Model>::describe,
                    #many,
                )
                #(#modifiers)*
            )
        }
    }

    /// The `association_mut` match arm.
    fn accessor(&self, krate: &Path) -> TokenStream {
        let (ident, key) = (&self.ident, &self.key);
        let related = match self.shape {
            Shape::Many => quote! {
                #krate::model::RelatedMut::Many(&mut self.#ident)
            },
            Shape::Optional => quote! {
                #krate::model::RelatedMut::One(::std::boxed::Box::new(
                    #krate::model::OptionSlot(&mut self.#ident),
                ))
            },
            Shape::Boxed => quote! {
                #krate::model::RelatedMut::One(::std::boxed::Box::new(
                    #krate::model::BoxSlot(&mut self.#ident),
                ))
            },
            Shape::Inline => quote! {
                #krate::model::RelatedMut::One(::std::boxed::Box::new(
                    #krate::model::InlineSlot(&mut self.#ident),
                ))
            },
        };
        quote! {
            #key => ::core::option::Option::Some(#related),
        }
    }
}
