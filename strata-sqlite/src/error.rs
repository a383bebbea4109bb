//! Error types for SQLite operations.

use rusqlite::ffi;
use thiserror::Error;

use strata_query::error::{ErrorCode, QueryError};

/// Result type for SQLite operations.
pub type SqliteResult<T> = Result<T, SqliteError>;

/// Error type for SQLite operations.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite driver error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The handle was closed.
    #[error("Connection error: {0}")]
    Connection(String),
}

impl SqliteError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Whether another handle on the same shared cache holds a conflicting
    /// table lock. The busy timeout does not apply to these.
    pub fn is_locked(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == rusqlite::ErrorCode::DatabaseLocked
        )
    }

    /// The constraint code for a constraint failure, if this is one.
    pub fn constraint_code(&self) -> Option<ErrorCode> {
        let Self::Sqlite(rusqlite::Error::SqliteFailure(failure, _)) = self else {
            return None;
        };
        if failure.code != rusqlite::ErrorCode::ConstraintViolation {
            return None;
        }
        let code = match failure.extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                ErrorCode::UniqueConstraint
            }
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => ErrorCode::ForeignKeyConstraint,
            ffi::SQLITE_CONSTRAINT_NOTNULL => ErrorCode::NotNullConstraint,
            _ => ErrorCode::CheckConstraint,
        };
        Some(code)
    }

    /// The driver's own message, without this crate's prefix.
    fn driver_message(&self) -> String {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(_, Some(msg))) => msg.clone(),
            Self::Sqlite(e) => e.to_string(),
            Self::Config(msg) | Self::Connection(msg) => msg.clone(),
        }
    }
}

impl From<SqliteError> for QueryError {
    fn from(err: SqliteError) -> Self {
        if let Some(code) = err.constraint_code() {
            return QueryError::constraint(code, err.driver_message());
        }
        match err {
            SqliteError::Config(msg) => QueryError::invalid_configuration(msg),
            SqliteError::Connection(msg) => QueryError::connection(msg),
            SqliteError::Sqlite(rusqlite::Error::SqliteFailure(_, Some(msg))) => {
                QueryError::database(msg)
            }
            SqliteError::Sqlite(e) => QueryError::database(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(extended_code: i32, msg: &str) -> SqliteError {
        SqliteError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(extended_code),
            Some(msg.to_string()),
        ))
    }

    #[test]
    fn test_error_display() {
        let err = SqliteError::config("invalid path");
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("invalid path"));
    }

    #[test]
    fn test_constraint_mapping() {
        let err: QueryError =
            failure(ffi::SQLITE_CONSTRAINT_UNIQUE, "UNIQUE constraint failed: users.email").into();
        assert_eq!(err.code, ErrorCode::UniqueConstraint);
        assert_eq!(err.message, "UNIQUE constraint failed: users.email");
        assert!(err.is_constraint_violation());

        let err: QueryError = failure(ffi::SQLITE_CONSTRAINT_NOTNULL, "NOT NULL").into();
        assert_eq!(err.code, ErrorCode::NotNullConstraint);

        let err: QueryError = failure(ffi::SQLITE_CONSTRAINT_FOREIGNKEY, "FOREIGN KEY").into();
        assert_eq!(err.code, ErrorCode::ForeignKeyConstraint);
    }

    #[test]
    fn test_other_failures_keep_message() {
        let err: QueryError = failure(ffi::SQLITE_ERROR, "no such table: users").into();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert_eq!(err.message, "no such table: users");
    }

    #[test]
    fn test_shared_cache_lock_detection() {
        assert!(failure(ffi::SQLITE_LOCKED_SHAREDCACHE, "database table is locked").is_locked());
        assert!(!failure(ffi::SQLITE_BUSY, "database is locked").is_locked());
        assert!(!SqliteError::config("x").is_locked());
    }

    #[test]
    fn test_connection_error_conversion() {
        let err: QueryError = SqliteError::connection("closed").into();
        assert_eq!(err.code, ErrorCode::ConnectionFailed);
    }
}
