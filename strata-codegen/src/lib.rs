//! Procedural macros for the Strata ORM.
//!
//! # Macros
//!
//! - [`Model`] - Derive record access and the model declaration for a struct
//!
//! # Example
//!
//! ```rust,ignore
//! #[derive(Debug, Default, strata::Model)]
//! #[strata(table = "people")]
//! struct User {
//!     id: i64,
//!     #[strata(unique, size = 255)]
//!     email: String,
//!     name: Option<String>,
//!     #[strata(has_many)]
//!     emails: Vec<Email>,
//! }
//! ```

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod derive;
mod types;

/// Derive macro implementing `Record` and `Model` for a struct.
///
/// The struct must implement `Default`. Unless `#[strata(hooks)]` is given,
/// an empty `Hooks` impl is generated as well.
///
/// # Attributes
///
/// ## Struct-level
/// - `#[strata(table = "name")]` - Use a custom table name verbatim
/// - `#[strata(hooks)]` - The type implements `Hooks` itself
/// - `#[strata(crate = "path")]` - Path to the core crate (default `::strata_query`)
///
/// ## Field-level
/// - `#[strata(primary_key)]` - Mark as (part of) the primary key
/// - `#[strata(column = "col_name")]` - Map to a different column
/// - `#[strata(auto_increment)]` / `#[strata(auto_increment = false)]`
/// - `#[strata(not_null)]`, `#[strata(unique)]`
/// - `#[strata(default = "sql")]` - SQL default; a zero value is left to it on insert
/// - `#[strata(size = 255)]`, `#[strata(sql_type = "...")]`
/// - `#[strata(generate = "path::to::fn")]` - Client-side key generator
/// - `#[strata(soft_delete)]` - Delete sets this timestamp instead
/// - `#[strata(embedded)]`, `#[strata(embedded, prefix = "p_")]` - Flatten a struct
/// - `#[strata(ignore)]` - Not stored
/// - `#[strata(belongs_to)]`, `#[strata(has_one)]`, `#[strata(has_many)]`,
///   `#[strata(many_to_many = "join_table")]` with optional
///   `foreign_key = "..."`, `association_foreign_key = "..."` and
///   `save_associations = false`
///
/// `#[strata(association)]` declares an association and leaves the kind to
/// inference: belongs-to when the struct has the `<field>_id` column,
/// has-one otherwise. Untagged `Vec<T>` fields (other than `Vec<u8>`) are
/// has-many associations.
#[proc_macro_derive(Model, attributes(strata))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive::derive_model_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
