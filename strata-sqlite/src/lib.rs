//! SQLite driver for the Strata ORM.
//!
//! This crate provides the connection capability the session engine
//! consumes, on top of `rusqlite` with the bundled SQLite library.
//!
//! # Features
//!
//! - In-memory and file-based databases
//! - Pragmas configured from the URL (`foreign_keys`, `busy_timeout`,
//!   `journal_mode`, `synchronous`)
//! - Transactions, read-only transactions, rollback of abandoned ones
//! - Constraint failures reported with distinct error codes
//!
//! # Example
//!
//! ```rust
//! use strata_query::Value;
//!
//! let db = strata_sqlite::open("sqlite::memory:").unwrap();
//! db.exec("CREATE TABLE kv (k text primary key, v text)", ()).unwrap();
//! db.exec("INSERT INTO kv (k, v) VALUES (?, ?)", ("a", "1")).unwrap();
//!
//! let row = db.raw("SELECT v FROM kv WHERE k = ?", "a").row().unwrap().unwrap();
//! assert_eq!(row.value("v"), Some(&Value::from("1")));
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod types;

pub use config::{DatabasePath, JournalMode, SqliteConfig, SynchronousMode};
pub use connection::SqliteConnection;
pub use error::{SqliteError, SqliteResult};

use strata_query::{Config, Db, QueryResult};

/// Open a session on the database named by `url` with default settings.
pub fn open(url: &str) -> QueryResult<Db> {
    open_with(SqliteConfig::from_url(url)?, Config::default())
}

/// Open a session from an explicit driver configuration and session
/// settings.
pub fn open_with(config: SqliteConfig, settings: Config) -> QueryResult<Db> {
    let conn = SqliteConnection::open(config)?;
    Db::open("sqlite", conn, settings)
}
