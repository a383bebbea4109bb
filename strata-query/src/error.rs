//! Error types for scope execution with actionable messages.
//!
//! Every terminal call on a [`Db`](crate::Db) returns a [`QueryResult`]. The
//! error carries a stable [`ErrorCode`] so callers can branch on the kind of
//! failure without matching on message text.
//!
//! # Error Codes
//!
//! Error codes follow a pattern: S{category}{number}
//! - 1xxx: Query errors (not found, unbuildable statement)
//! - 2xxx: Constraint violations (unique, foreign key, etc.)
//! - 3xxx: Connection errors (failed, closed)
//! - 4xxx: Transaction errors (failed, closed, cannot start)
//! - 5xxx: Execution errors reported by the driver
//! - 6xxx: Data conversion errors
//! - 7xxx: Configuration errors
//! - 8xxx: Safety rails and callback registration
//! - 9xxx: Internal errors
//!
//! # Testing for not-found
//!
//! ```rust
//! use strata_query::{QueryError, ErrorCode};
//!
//! let err = QueryError::not_found("User");
//! assert_eq!(err.code, ErrorCode::RecordNotFound);
//! assert!(err.is_not_found());
//! assert!(err.to_string().starts_with("[S1001]"));
//! ```

use std::fmt::{self, Write as _};
use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Query errors (1xxx)
    /// Record not found (S1001).
    RecordNotFound = 1001,
    /// The statement could not be built (S1002).
    InvalidQuery = 1002,
    /// Unknown association name (S1003).
    UnknownAssociation = 1003,
    /// Operation requires a primary key the type does not have (S1004).
    MissingPrimaryKey = 1004,

    // Constraint errors (2xxx)
    /// Unique constraint violation (S2001).
    UniqueConstraint = 2001,
    /// Foreign key constraint violation (S2002).
    ForeignKeyConstraint = 2002,
    /// Check constraint violation (S2003).
    CheckConstraint = 2003,
    /// Not null constraint violation (S2004).
    NotNullConstraint = 2004,

    // Connection errors (3xxx)
    /// Database connection failed (S3001).
    ConnectionFailed = 3001,
    /// Connection already closed (S3002).
    ConnectionClosed = 3002,

    // Transaction errors (4xxx)
    /// Transaction failed (S4001).
    TransactionFailed = 4001,
    /// A transaction cannot be started from this session (S4002).
    CannotStartTransaction = 4002,
    /// Transaction already committed/rolled back (S4004).
    TransactionClosed = 4004,

    // Execution (5xxx)
    /// The driver rejected the statement; its message is kept (S5005).
    DatabaseError = 5005,

    // Data conversion (6xxx)
    /// A value could not be assigned to a field (S6001).
    InvalidDataType = 6001,
    /// A result column could not be scanned (S6003).
    DeserializationError = 6003,

    // Configuration errors (7xxx)
    /// Invalid configuration (S7001).
    InvalidConfiguration = 7001,
    /// Unknown dialect name (S7002).
    UnknownDialect = 7002,
    /// Invalid connection string (S7003).
    InvalidConnectionString = 7003,

    // Safety rails and registration (8xxx)
    /// Update without conditions (S8001).
    GlobalUpdateBlocked = 8001,
    /// Delete without conditions (S8002).
    GlobalDeleteBlocked = 8002,
    /// Callback name not registered (S8501).
    CallbackNotFound = 8501,
    /// Callback name already registered (S8502).
    DuplicateCallback = 8502,

    // Internal errors (9xxx)
    /// Internal error (S9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "S1001").
    pub fn code(&self) -> String {
        format!("S{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::RecordNotFound => "Record not found",
            Self::InvalidQuery => "Invalid query",
            Self::UnknownAssociation => "Unknown association",
            Self::MissingPrimaryKey => "Missing primary key",
            Self::UniqueConstraint => "Unique constraint violation",
            Self::ForeignKeyConstraint => "Foreign key constraint violation",
            Self::CheckConstraint => "Check constraint violation",
            Self::NotNullConstraint => "Not null constraint violation",
            Self::ConnectionFailed => "Database connection failed",
            Self::ConnectionClosed => "Connection closed",
            Self::TransactionFailed => "Transaction failed",
            Self::CannotStartTransaction => "Cannot start transaction",
            Self::TransactionClosed => "Transaction already closed",
            Self::DatabaseError => "Database error",
            Self::InvalidDataType => "Invalid data type",
            Self::DeserializationError => "Deserialization error",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::UnknownDialect => "Unknown dialect",
            Self::InvalidConnectionString => "Invalid connection string",
            Self::GlobalUpdateBlocked => "Global update blocked",
            Self::GlobalDeleteBlocked => "Global delete blocked",
            Self::CallbackNotFound => "Callback not found",
            Self::DuplicateCallback => "Duplicate callback",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The model involved.
    pub model: Option<String>,
    /// The field involved.
    pub field: Option<String>,
    /// The SQL statement (if available).
    pub sql: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<String>,
    /// Help text.
    pub help: Option<String>,
    /// Errors recorded on the same scope after this one.
    pub related: Vec<String>,
}

/// Errors that can occur during scope execution.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl Clone for QueryError {
    fn clone(&self) -> Self {
        // The boxed source is not clonable; keep its rendering in `related`.
        let mut context = self.context.clone();
        if let Some(source) = &self.source {
            context.related.push(source.to_string());
        }
        Self {
            code: self.code,
            message: self.message.clone(),
            context,
            source: None,
        }
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(suggestion.into());
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.context.model = Some(model.into());
        self
    }

    /// Set the field.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.context.field = Some(field.into());
        self
    }

    /// Set the SQL statement.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.context.sql = Some(sql.into());
        self
    }

    /// Attach a later error recorded on the same scope.
    pub fn with_related(mut self, other: &QueryError) -> Self {
        self.context.related.push(other.to_string());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Create a not found error.
    pub fn not_found(model: impl Into<String>) -> Self {
        let model = model.into();
        Self::new(
            ErrorCode::RecordNotFound,
            format!("record not found: no {} matched the query", model),
        )
        .with_model(&model)
        .with_suggestion("Use find() into a Vec to get an empty result instead of an error")
    }

    /// Create an error for a statement that could not be built.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidQuery, message)
    }

    /// Create an unknown association error.
    pub fn unknown_association(model: impl Into<String>, name: impl Into<String>) -> Self {
        let model = model.into();
        let name = name.into();
        Self::new(
            ErrorCode::UnknownAssociation,
            format!("{} has no association named {}", model, name),
        )
        .with_model(&model)
        .with_field(&name)
    }

    /// Create a missing primary key error.
    pub fn missing_primary_key(model: impl Into<String>) -> Self {
        let model = model.into();
        Self::new(
            ErrorCode::MissingPrimaryKey,
            format!("{} has no primary key", model),
        )
        .with_model(&model)
        .with_help("Tag a field with #[strata(primary_key)] or name it `id`")
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::ConnectionFailed, format!("connection error: {}", message))
            .with_suggestion("Verify the connection URL is correct")
    }

    /// Create a connection closed error.
    pub fn connection_closed() -> Self {
        Self::new(ErrorCode::ConnectionClosed, "sql: database is closed")
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::TransactionFailed, format!("transaction error: {}", message))
    }

    /// Create an error for a begin issued on a session that cannot start one.
    pub fn cannot_start_transaction() -> Self {
        Self::new(
            ErrorCode::CannotStartTransaction,
            "can't start transaction: session is already inside a transaction",
        )
        .with_help("Transactions are single level; run the work on the existing transaction")
    }

    /// Create a transaction closed error.
    pub fn transaction_closed() -> Self {
        Self::new(
            ErrorCode::TransactionClosed,
            "sql: transaction has already been committed or rolled back",
        )
    }

    /// Create a general database error; the driver message is kept verbatim.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Create a constraint violation error with a driver message.
    pub fn constraint(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }

    /// Create an invalid data type error.
    pub fn invalid_data_type(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        let message = message.into();
        Self::new(
            ErrorCode::InvalidDataType,
            format!("cannot assign to {}: {}", field, message),
        )
        .with_field(&field)
    }

    /// Create a deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::DeserializationError,
            format!("failed to scan result: {}", message),
        )
        .with_suggestion("Check that the model matches the database schema")
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message)
    }

    /// Create an unknown dialect error.
    pub fn unknown_dialect(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::UnknownDialect,
            format!("unknown dialect {:?}", name),
        )
        .with_suggestion("Use one of: postgres, mysql, mssql, sqlite")
    }

    /// Create an invalid connection string error.
    pub fn invalid_connection_string(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::InvalidConnectionString,
            format!("invalid database source: {}", message),
        )
    }

    /// Create a global update rail error.
    pub fn global_update_blocked(table: impl Into<String>) -> Self {
        let table = table.into();
        Self::new(
            ErrorCode::GlobalUpdateBlocked,
            format!("missing WHERE clause while updating {}", table),
        )
        .with_suggestion("Add a condition, or call allow_global_update(true) on the session")
    }

    /// Create a global delete rail error.
    pub fn global_delete_blocked(table: impl Into<String>) -> Self {
        let table = table.into();
        Self::new(
            ErrorCode::GlobalDeleteBlocked,
            format!("missing WHERE clause while deleting from {}", table),
        )
        .with_suggestion("Add a condition, or call allow_global_update(true) on the session")
    }

    /// Create a callback-not-found error.
    pub fn callback_not_found(name: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::CallbackNotFound,
            format!("callback {} is not registered", name.into()),
        )
    }

    /// Create a duplicate callback error.
    pub fn duplicate_callback(name: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::DuplicateCallback,
            format!("callback {} is already registered", name.into()),
        )
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::Internal, format!("internal error: {}", message))
    }

    // ============== Error Checks ==============

    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::RecordNotFound
    }

    /// Check if this is a constraint violation.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::UniqueConstraint
                | ErrorCode::ForeignKeyConstraint
                | ErrorCode::CheckConstraint
                | ErrorCode::NotNullConstraint
        )
    }

    /// Check if this is a safety-rail rejection.
    pub fn is_safety_rail(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::GlobalUpdateBlocked | ErrorCode::GlobalDeleteBlocked
        )
    }

    /// Check if this is a configuration error.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::InvalidConfiguration
                | ErrorCode::UnknownDialect
                | ErrorCode::InvalidConnectionString
        )
    }

    /// Check if the transaction this error came from was already finished.
    pub fn is_transaction_closed(&self) -> bool {
        self.code == ErrorCode::TransactionClosed
    }

    /// Render the error with its context on separate lines, for logs and
    /// terminal output.
    pub fn display_full(&self) -> String {
        let mut out = format!("{}\n", self);
        let ctx = &self.context;
        let labeled = [
            ("operation", ctx.operation.as_deref()),
            ("model", ctx.model.as_deref()),
            ("field", ctx.field.as_deref()),
        ];
        for (label, value) in labeled {
            if let Some(value) = value {
                let _ = writeln!(out, "  {label:<9} {value}");
            }
        }
        if let Some(sql) = &ctx.sql {
            let shown: String = sql.chars().take(200).collect();
            let ellipsis = if shown.len() < sql.len() { "..." } else { "" };
            let _ = writeln!(out, "  {:<9} {shown}{ellipsis}", "sql");
        }
        for suggestion in &ctx.suggestions {
            let _ = writeln!(out, "  try: {suggestion}");
        }
        for related in &ctx.related {
            let _ = writeln!(out, "  also: {related}");
        }
        if let Some(help) = &ctx.help {
            let _ = writeln!(out, "  help: {help}");
        }
        out
    }
}

/// Extension methods for results of completed operations.
pub trait ResultExt {
    /// Whether the operation failed because no record matched.
    fn is_record_not_found(&self) -> bool;
}

impl<T> ResultExt for QueryResult<T> {
    fn is_record_not_found(&self) -> bool {
        matches!(self, Err(e) if e.is_not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::RecordNotFound.code(), "S1001");
        assert_eq!(ErrorCode::UniqueConstraint.code(), "S2001");
        assert_eq!(ErrorCode::GlobalUpdateBlocked.code(), "S8001");
    }

    #[test]
    fn test_not_found_error() {
        let err = QueryError::not_found("User");
        assert!(err.is_not_found());
        assert!(err.message.contains("User"));
        assert!(!err.is_safety_rail());
    }

    #[test]
    fn test_result_ext() {
        let missing: QueryResult<()> = Err(QueryError::not_found("User"));
        let failed: QueryResult<()> = Err(QueryError::database("near \"SELEC\": syntax error"));
        let ok: QueryResult<()> = Ok(());

        assert!(missing.is_record_not_found());
        assert!(!failed.is_record_not_found());
        assert!(!ok.is_record_not_found());
    }

    #[test]
    fn test_safety_rail_errors() {
        assert!(QueryError::global_update_blocked("users").is_safety_rail());
        assert!(QueryError::global_delete_blocked("users").is_safety_rail());
        assert!(!QueryError::database("boom").is_safety_rail());
    }

    #[test]
    fn test_configuration_errors() {
        assert!(QueryError::unknown_dialect("oracle").is_configuration_error());
        assert!(QueryError::invalid_connection_string("empty").is_configuration_error());
        assert!(
            QueryError::invalid_connection_string("empty")
                .message
                .contains("invalid database source")
        );
    }

    #[test]
    fn test_clone_keeps_source_text() {
        let io = std::io::Error::other("disk gone");
        let err = QueryError::database("write failed").with_source(io);
        let cloned = err.clone();

        assert_eq!(cloned.code, ErrorCode::DatabaseError);
        assert!(cloned.source.is_none());
        assert_eq!(cloned.context.related, vec!["disk gone".to_string()]);
    }

    #[test]
    fn test_display_full() {
        let err = QueryError::global_update_blocked("users")
            .with_context("update")
            .with_related(&QueryError::database("second failure"));

        let output = err.display_full();
        assert!(output.starts_with("[S8001] missing WHERE clause"));
        assert!(output.contains("operation update"));
        assert!(output.contains("also: [S5005] second failure"));
        assert!(output.contains("try: Add a condition"));
    }
}
