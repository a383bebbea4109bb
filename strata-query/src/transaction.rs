//! Transaction options and the state of one open transaction.
//!
//! A transactional [`Db`](crate::Db) carries shared transaction state. Once the
//! transaction is committed or rolled back every statement on it fails with
//! a transaction-closed error, while a further rollback is a no-op so that a
//! deferred "rollback unless committed" is always safe.
//!
//! ```rust
//! use strata_query::{AccessMode, IsolationLevel, TransactionConfig};
//!
//! let config = TransactionConfig::new()
//!     .isolation(IsolationLevel::Serializable)
//!     .read_only();
//! assert_eq!(config.isolation, Some(IsolationLevel::Serializable));
//! assert_eq!(config.access_mode, AccessMode::ReadOnly);
//! assert_eq!(IsolationLevel::ReadCommitted.as_sql(), "READ COMMITTED");
//! ```

use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::connection::{ExecResult, Executor, TransactionConnection};
use crate::error::{QueryError, QueryResult};
use crate::row::Rows;
use crate::value::Value;

/// Isolation level requested at begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Keywords following `ISOLATION LEVEL`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// Whether the transaction may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    #[default]
    ReadWrite,
    ReadOnly,
}

impl AccessMode {
    /// Keywords for `SET TRANSACTION`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadWrite => "READ WRITE",
            Self::ReadOnly => "READ ONLY",
        }
    }
}

/// Options passed to the driver when a transaction begins.
#[derive(Debug, Clone, Default)]
pub struct TransactionConfig {
    /// Isolation level; `None` keeps the engine default.
    pub isolation: Option<IsolationLevel>,
    /// Access mode.
    pub access_mode: AccessMode,
}

impl TransactionConfig {
    /// Engine defaults: no explicit isolation, read-write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the isolation level.
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    /// Set the access mode.
    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    /// Shorthand for `access_mode(AccessMode::ReadOnly)`.
    pub fn read_only(self) -> Self {
        self.access_mode(AccessMode::ReadOnly)
    }

    /// Whether the transaction is read-only.
    pub fn is_read_only(&self) -> bool {
        self.access_mode == AccessMode::ReadOnly
    }
}

/// Lifecycle of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Open.
    Active,
    /// Committed.
    Committed,
    /// Rolled back.
    RolledBack,
}

/// One open transaction shared by the sessions chained from it.
pub(crate) struct TxState {
    conn: Box<dyn TransactionConnection>,
    status: Mutex<TransactionStatus>,
}

impl TxState {
    pub(crate) fn new(conn: Box<dyn TransactionConnection>, config: &TransactionConfig) -> Self {
        info!(
            isolation = ?config.isolation.map(|i| i.as_sql()),
            access_mode = config.access_mode.as_sql(),
            "Transaction BEGIN"
        );
        Self {
            conn,
            status: Mutex::new(TransactionStatus::Active),
        }
    }

    pub(crate) fn status(&self) -> TransactionStatus {
        *self.status.lock()
    }

    /// Commit. Fails if the transaction is already finished.
    pub(crate) fn commit(&self) -> QueryResult<()> {
        let mut status = self.status.lock();
        match *status {
            TransactionStatus::Active => {
                self.conn.commit()?;
                *status = TransactionStatus::Committed;
                info!("Transaction COMMIT");
                Ok(())
            }
            _ => Err(QueryError::transaction_closed()),
        }
    }

    /// Roll back. A no-op once the transaction is finished.
    pub(crate) fn rollback(&self) -> QueryResult<()> {
        let mut status = self.status.lock();
        match *status {
            TransactionStatus::Active => {
                // The transaction is over even if the driver reports an error.
                *status = TransactionStatus::RolledBack;
                info!("Transaction ROLLBACK");
                self.conn.rollback()
            }
            finished => {
                debug!(status = ?finished, "Rollback on finished transaction ignored");
                Ok(())
            }
        }
    }

    fn ensure_active(&self) -> QueryResult<()> {
        match self.status() {
            TransactionStatus::Active => Ok(()),
            _ => Err(QueryError::transaction_closed()),
        }
    }
}

impl Executor for TxState {
    fn execute(&self, sql: &str, values: &[Value]) -> QueryResult<ExecResult> {
        self.ensure_active()?;
        self.conn.execute(sql, values)
    }

    fn query(&self, sql: &str, values: &[Value]) -> QueryResult<Rows> {
        self.ensure_active()?;
        self.conn.query(sql, values)
    }
}

/// Run `body`, rolling back through `rollback` if it returns an error or
/// unwinds. Unwinding resumes after the rollback. A failed rollback is
/// logged; the error from `body` or `commit` is the one returned.
pub(crate) fn run_guarded<T, E>(
    body: impl FnOnce() -> Result<T, E>,
    commit: impl FnOnce() -> QueryResult<()>,
    rollback: impl Fn() -> QueryResult<()>,
) -> Result<T, E>
where
    E: From<QueryError>,
{
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => {
            if let Err(err) = commit() {
                if let Err(rollback_err) = rollback() {
                    warn!(error = %rollback_err, "Rollback after failed commit failed");
                }
                return Err(err.into());
            }
            Ok(value)
        }
        Ok(Err(err)) => {
            if let Err(rollback_err) = rollback() {
                warn!(error = %rollback_err, "Rollback after failed transaction failed");
            }
            Err(err)
        }
        Err(payload) => {
            if let Err(rollback_err) = rollback() {
                warn!(error = %rollback_err, "Rollback after panic failed");
            }
            panic::resume_unwind(payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        commits: AtomicUsize,
        rollbacks: AtomicUsize,
    }

    struct FakeTx(Arc<Recorder>);

    impl Executor for FakeTx {
        fn execute(&self, _sql: &str, _values: &[Value]) -> QueryResult<ExecResult> {
            Ok(ExecResult::default())
        }

        fn query(&self, _sql: &str, _values: &[Value]) -> QueryResult<Rows> {
            Ok(Rows::default())
        }
    }

    impl TransactionConnection for FakeTx {
        fn commit(&self) -> QueryResult<()> {
            self.0.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn rollback(&self) -> QueryResult<()> {
            self.0.rollbacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn state() -> (TxState, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let tx = TxState::new(
            Box::new(FakeTx(Arc::clone(&recorder))),
            &TransactionConfig::new(),
        );
        (tx, recorder)
    }

    #[test]
    fn test_rollback_after_commit_is_noop() {
        let (tx, recorder) = state();
        tx.commit().unwrap();
        tx.rollback().unwrap();
        tx.rollback().unwrap();
        assert_eq!(recorder.commits.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.rollbacks.load(Ordering::SeqCst), 0);
        assert_eq!(tx.status(), TransactionStatus::Committed);
    }

    #[test]
    fn test_finished_transaction_rejects_statements() {
        let (tx, _) = state();
        tx.rollback().unwrap();
        assert!(tx.execute("DELETE FROM users", &[]).unwrap_err().is_transaction_closed());
        assert!(tx.commit().unwrap_err().is_transaction_closed());
    }

    #[test]
    fn test_run_guarded_rolls_back_on_panic() {
        let (tx, recorder) = state();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            run_guarded::<(), QueryError>(
                || panic!("boom"),
                || tx.commit(),
                || tx.rollback(),
            )
        }));
        assert!(result.is_err());
        assert_eq!(recorder.rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(tx.status(), TransactionStatus::RolledBack);
    }

    #[test]
    fn test_run_guarded_keeps_body_error_when_rollback_fails() {
        let err = run_guarded::<(), QueryError>(
            || Err(QueryError::invalid_query("body failed")),
            || Ok(()),
            || Err(QueryError::connection_closed()),
        )
        .unwrap_err();
        assert_eq!(err.message, "body failed");
    }

    #[test]
    fn test_run_guarded_keeps_commit_error_when_rollback_fails() {
        let err = run_guarded::<(), QueryError>(
            || Ok(()),
            || Err(QueryError::database("commit failed")),
            || Err(QueryError::connection_closed()),
        )
        .unwrap_err();
        assert_eq!(err.message, "commit failed");
    }

    #[test]
    fn test_config_builder() {
        let config = TransactionConfig::new().isolation(IsolationLevel::RepeatableRead);
        assert_eq!(config.isolation, Some(IsolationLevel::RepeatableRead));
        assert!(!config.is_read_only());
        assert!(config.read_only().is_read_only());
    }
}
