//! # Strata
//!
//! A scope-and-callback ORM core for Rust.
//!
//! Strata provides:
//! - Models declared with `#[derive(Model)]`, described once and cached
//! - Chainable sessions that never share condition state between chains
//! - Per-operation callback pipelines that user code can extend, reorder
//!   or replace
//! - Association saving and batched eager loading
//! - Implicit and explicit transactions
//! - A bundled SQLite driver (feature `sqlite`, on by default)
//!
//! ## Quick Start
//!
//! ```rust
//! use strata::prelude::*;
//!
//! #[derive(Debug, Default, Model)]
//! #[strata(crate = "strata")]
//! struct User {
//!     id: i64,
//!     name: String,
//!     age: Option<i32>,
//! }
//!
//! # fn main() -> QueryResult<()> {
//! let db = strata::sqlite::open("sqlite::memory:")?;
//! db.auto_migrate::<User>()?;
//!
//! let mut user = User { name: "jinzhu".into(), age: Some(18), ..Default::default() };
//! db.create(&mut user)?;
//!
//! let mut adults: Vec<User> = Vec::new();
//! db.where_("age >= ?", 18).find(&mut adults)?;
//! assert_eq!(adults.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! The derive emits paths into `strata_query` by default; code that depends
//! only on this crate names it with `#[strata(crate = "strata")]`.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]

pub use strata_query::*;

/// The SQLite driver.
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub use strata_sqlite as sqlite;
