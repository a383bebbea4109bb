//! # strata-query
//!
//! The engine of the Strata ORM: a chainable session over a blocking SQL
//! connection, with per-operation callback pipelines, cached model
//! metadata and association handling.
//!
//! This crate provides:
//! - Chainable sessions (`where_`, `order`, `limit`, `preload`, ...) that
//!   never share condition state between chains
//! - Terminal operations (`first`, `find`, `create`, `save`, `update`,
//!   `delete`, `count`, `pluck`, `scan`, `exec`)
//! - Callback pipelines per operation kind, open to registration
//! - Association saving and eager loading (belongs-to, has-one, has-many,
//!   many-to-many)
//! - Implicit and explicit transactions
//! - Dialect adapters for Postgres, MySQL, SQL Server and SQLite
//!
//! ## Declaring models
//!
//! ```rust,ignore
//! use strata_query::Model;
//!
//! #[derive(Debug, Default, Model)]
//! struct User {
//!     id: i64,
//!     name: String,
//!     age: Option<i32>,
//!     #[strata(has_many)]
//!     emails: Vec<Email>,
//! }
//! ```
//!
//! ## Building expressions
//!
//! Arguments are positional; lists expand to one placeholder per element
//! and expressions splice in place:
//!
//! ```rust
//! use strata_query::{Db, Value};
//!
//! let expr = Db::expr("age IN (?) AND name <> ?", (vec![18, 21], "root")).unwrap();
//! assert_eq!(expr.sql, "age IN (?,?) AND name <> ?");
//! assert_eq!(expr.values[2], Value::from("root"));
//! ```
//!
//! ## Errors
//!
//! Every terminal returns [`QueryResult`]. Not-found is a distinguished
//! kind:
//!
//! ```rust
//! use strata_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::not_found("User");
//! assert!(err.is_not_found());
//! assert_eq!(err.code, ErrorCode::RecordNotFound);
//! ```

extern crate self as strata_query;

mod associations;
pub mod callbacks;
pub mod conditions;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod inflect;
pub mod logging;
pub mod model;
pub mod row;
pub mod schema;
pub mod scope;
pub mod session;
pub mod sql;
pub mod transaction;
pub mod value;

pub use callbacks::{Operation, Pipeline, Step, StepFn};
pub use conditions::{Clause, Conditions};
pub use config::{Config, Settings};
pub use connection::{
    Connection, ConnectionString, Driver, ExecResult, Executor, TransactionConnection,
};
pub use dialect::{Dialect, MsSql, MySql, Postgres, Sqlite};
pub use error::{ErrorCode, ErrorContext, QueryError, QueryResult, ResultExt};
pub use model::{
    AssociationKind, Hook, Hooks, Model, ModelDescriptor, Record, RecordList, StorageKind,
};
pub use row::{Row, RowError, Rows};
pub use scope::Scope;
pub use session::{Db, Outcome};
pub use sql::SqlBuilder;
pub use transaction::{AccessMode, IsolationLevel, TransactionConfig, TransactionStatus};
pub use value::{Arg, FromValue, IntoArgs, SqlExpr, ToValue, Value};

/// `#[derive(Model)]`.
pub use strata_codegen::Model;

// Re-export logging utilities
pub use logging::{init as init_logging, is_debug_enabled};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::attrs;
    pub use crate::callbacks::Operation;
    pub use crate::config::Config;
    pub use crate::error::{QueryError, QueryResult, ResultExt};
    pub use crate::Model;
    pub use crate::model::{Hooks, Record};
    pub use crate::session::{Db, Outcome};
    pub use crate::transaction::TransactionConfig;
    pub use crate::value::{SqlExpr, Value};
}
