//! The session handle.
//!
//! A [`Db`] wraps a shared connection, the dialect, the callback registry
//! and the chain state: accumulated [`Conditions`] and [`Settings`]. Every
//! chaining call returns a new `Db` with copied chain state, so chains
//! derived from one base never observe each other's conditions and the
//! base can be shared freely across threads.
//!
//! ```rust,ignore
//! let db = strata_sqlite::open("sqlite::memory:")?;
//! let adults = db.where_("age >= ?", 18);
//! let named = adults.where_("name LIKE ?", "j%");
//!
//! let mut users: Vec<User> = Vec::new();
//! named.find(&mut users)?;   // both conditions
//! adults.count()?;           // only the first
//! ```

mod chain;
mod finish;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::callbacks::{self, CallbackSet, Operation, Pipeline};
use crate::conditions::Conditions;
use crate::config::{Config, Settings};
use crate::connection::{Connection, ExecResult, Executor};
use crate::dialect::{self, Dialect};
use crate::error::{QueryError, QueryResult};
use crate::row::Rows;
use crate::scope::Scope;
use crate::sql::SqlBuilder;
use crate::transaction::{TransactionConfig, TransactionStatus, TxState, run_guarded};
use crate::value::Value;

/// The result of a completed write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Rows affected by the operation's main statement.
    pub rows_affected: u64,
}

/// State shared by every session derived from one [`Db::open`].
struct Shared {
    conn: Arc<dyn Connection>,
    dialect: Arc<dyn Dialect>,
    callbacks: RwLock<CallbackSet>,
    config: Config,
    singular: AtomicBool,
    closed: AtomicBool,
}

/// A chainable session.
#[derive(Clone)]
pub struct Db {
    shared: Arc<Shared>,
    tx: Option<Arc<TxState>>,
    search: Conditions,
    settings: Settings,
}

impl Db {
    /// Open a session over `conn` using the named dialect.
    ///
    /// Fails with an unknown-dialect error for names other than
    /// `postgres`, `mysql`, `mssql` and `sqlite` (and their aliases).
    pub fn open(
        dialect_name: &str,
        conn: impl Connection + 'static,
        config: Config,
    ) -> QueryResult<Self> {
        let dialect = dialect::by_name(dialect_name)?;
        Ok(Self::with_dialect(dialect, Arc::new(conn), config))
    }

    /// Open a session with an explicit dialect.
    pub fn with_dialect(
        dialect: Arc<dyn Dialect>,
        conn: Arc<dyn Connection>,
        config: Config,
    ) -> Self {
        info!(dialect = dialect.name(), "Session opened");
        let settings = Settings::from_config(&config);
        Self {
            shared: Arc::new(Shared {
                conn,
                dialect,
                callbacks: RwLock::new(CallbackSet::default()),
                singular: AtomicBool::new(config.singular_table),
                closed: AtomicBool::new(false),
                config,
            }),
            tx: None,
            search: Conditions::default(),
            settings,
        }
    }

    /// Close the connection. Every later operation on any session sharing it
    /// fails with a connection-closed error.
    pub fn close(&self) -> QueryResult<()> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Session closed");
        self.shared.conn.close()
    }

    /// Whether [`Db::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// The dialect adapter.
    pub fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::clone(&self.shared.dialect)
    }

    pub(crate) fn dialect_ref(&self) -> &dyn Dialect {
        self.shared.dialect.as_ref()
    }

    /// The configuration the session was opened with.
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Toggle singular table names for every session sharing this
    /// connection. Takes effect for scopes created afterwards.
    pub fn singular_table(&self, enabled: bool) {
        self.shared.singular.store(enabled, Ordering::SeqCst);
    }

    /// Whether table names are resolved without pluralizing.
    pub fn is_singular_table(&self) -> bool {
        self.shared.singular.load(Ordering::SeqCst)
    }

    /// The registration handle for one operation's callback pipeline.
    pub fn callback(&self, op: Operation) -> Pipeline<'_> {
        Pipeline::new(&self.shared.callbacks, op)
    }

    /// The chain's settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn search(&self) -> &Conditions {
        &self.search
    }

    pub(crate) fn search_mut(&mut self) -> &mut Conditions {
        &mut self.search
    }

    /// A session with the same connection, transaction and settings but
    /// no conditions, for statements issued on behalf of another one.
    pub(crate) fn fresh(&self) -> Db {
        Db {
            search: Conditions::default(),
            ..self.clone()
        }
    }

    // ============== Transactions ==============

    /// Begin a transaction with default options.
    pub fn begin(&self) -> QueryResult<Db> {
        self.begin_with(TransactionConfig::default())
    }

    /// Begin a transaction. The returned session runs every statement on
    /// the transaction; transactions do not nest.
    pub fn begin_with(&self, config: TransactionConfig) -> QueryResult<Db> {
        if self.tx.is_some() {
            return Err(QueryError::cannot_start_transaction());
        }
        self.ensure_open()?;
        let conn = self.shared.conn.begin(&config)?;
        Ok(Db {
            tx: Some(Arc::new(TxState::new(conn, &config))),
            ..self.clone()
        })
    }

    /// Commit the session's transaction.
    pub fn commit(&self) -> QueryResult<()> {
        self.transaction_state()?.commit()
    }

    /// Roll back the session's transaction. A no-op once it is finished.
    pub fn rollback(&self) -> QueryResult<()> {
        self.transaction_state()?.rollback()
    }

    /// Roll back unless the transaction was already committed; meant for
    /// cleanup paths that run whether or not the work succeeded.
    pub fn rollback_unless_committed(&self) -> QueryResult<()> {
        let tx = self.transaction_state()?;
        match tx.status() {
            TransactionStatus::Active => tx.rollback(),
            _ => Ok(()),
        }
    }

    /// Whether the session runs on a transaction.
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// The transaction's status, if the session has one.
    pub fn transaction_status(&self) -> Option<TransactionStatus> {
        self.tx.as_ref().map(|tx| tx.status())
    }

    /// Run `f` in a transaction: commit when it returns `Ok`, roll back when
    /// it returns `Err` or panics. A panic resumes after the rollback.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Db) -> Result<T, E>,
        E: From<QueryError>,
    {
        self.transaction_with(TransactionConfig::default(), f)
    }

    /// [`Db::transaction`] with explicit transaction options.
    pub fn transaction_with<T, E, F>(&self, config: TransactionConfig, f: F) -> Result<T, E>
    where
        F: FnOnce(&Db) -> Result<T, E>,
        E: From<QueryError>,
    {
        let tx = self.begin_with(config)?;
        run_guarded(|| f(&tx), || tx.commit(), || tx.rollback())
    }

    fn transaction_state(&self) -> QueryResult<&TxState> {
        self.tx
            .as_deref()
            .ok_or_else(|| QueryError::transaction("session is not inside a transaction"))
    }

    // ============== Execution ==============

    fn ensure_open(&self) -> QueryResult<()> {
        if self.is_closed() {
            return Err(QueryError::connection_closed());
        }
        Ok(())
    }

    /// Run one pipeline over a prepared scope.
    pub(crate) fn run(&self, op: Operation, mut scope: Scope<'_>) -> QueryResult<Outcome> {
        callbacks::run(&self.shared.callbacks, op, &mut scope);
        match scope.take_error() {
            Some(err) => Err(err),
            None => Ok(Outcome {
                rows_affected: scope.rows_affected(),
            }),
        }
    }

    /// Run the row query pipeline for this chain.
    pub(crate) fn run_rows(&self) -> QueryResult<Rows> {
        let mut scope = Scope::new(self.clone(), crate::model::Target::None);
        callbacks::run(&self.shared.callbacks, Operation::RowQuery, &mut scope);
        match scope.take_error() {
            Some(err) => Err(err),
            None => Ok(scope.rows.take().unwrap_or_default()),
        }
    }

    pub(crate) fn run_exec(&self, sql: &str, values: &[Value]) -> QueryResult<ExecResult> {
        self.execute(sql, values)
    }

    pub(crate) fn run_query(&self, sql: &str, values: &[Value]) -> QueryResult<Rows> {
        self.query(sql, values)
    }

    /// Rebind and execute a built statement.
    pub(crate) fn exec_built(&self, b: SqlBuilder) -> QueryResult<ExecResult> {
        let (sql, values) = b.build(self.dialect_ref());
        self.execute(&sql, &values)
    }

    /// Rebind and run a built query.
    pub(crate) fn query_built(&self, b: SqlBuilder) -> QueryResult<Rows> {
        let (sql, values) = b.build(self.dialect_ref());
        self.query(&sql, &values)
    }

    fn log_statement(&self, sql: &str, params: usize, elapsed: Duration, rows: Result<u64, &QueryError>) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        if let Err(err) = rows {
            debug!(sql, params, elapsed_ms, error = %err, "Statement failed");
            return;
        }
        let rows = rows.unwrap_or_default();
        let slow = self.shared.config.slow_threshold.is_some_and(|t| elapsed >= t);
        if slow {
            warn!(sql, params, rows, elapsed_ms, "Slow statement");
        } else if self.settings.log_sql {
            info!(sql, params, rows, elapsed_ms, "Statement");
        } else {
            debug!(sql, params, rows, elapsed_ms, "Statement");
        }
    }
}

/// Statements run on the session's transaction when it has one, otherwise
/// on the shared connection, and are logged with their timing.
impl Executor for Db {
    fn execute(&self, sql: &str, values: &[Value]) -> QueryResult<ExecResult> {
        self.ensure_open()?;
        let started = Instant::now();
        let result = match &self.tx {
            Some(tx) => tx.execute(sql, values),
            None => self.shared.conn.execute(sql, values),
        };
        self.log_statement(
            sql,
            values.len(),
            started.elapsed(),
            result.as_ref().map(|r| r.rows_affected),
        );
        result.map_err(|e| e.with_sql(sql))
    }

    fn query(&self, sql: &str, values: &[Value]) -> QueryResult<Rows> {
        self.ensure_open()?;
        let started = Instant::now();
        let result = match &self.tx {
            Some(tx) => tx.query(sql, values),
            None => self.shared.conn.query(sql, values),
        };
        self.log_statement(
            sql,
            values.len(),
            started.elapsed(),
            result.as_ref().map(|r| r.len() as u64),
        );
        result.map_err(|e| e.with_sql(sql))
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("dialect", &self.shared.dialect.name())
            .field("in_transaction", &self.tx.is_some())
            .field("search", &self.search)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Build an attribute list for updates and `attrs`/`assign`.
///
/// ```rust
/// use strata_query::{Value, attrs};
///
/// let changes = attrs! { "name" => "hello", "age" => 18 };
/// assert_eq!(changes[1], ("age".to_string(), Value::Int(18)));
/// ```
#[macro_export]
macro_rules! attrs {
    ($($name:expr => $value:expr),* $(,)?) => {
        vec![$(($name.to_string(), $crate::Value::from($value))),*]
    };
}
