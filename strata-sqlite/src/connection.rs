//! SQLite connection handles.
//!
//! A [`SqliteConnection`] owns one `rusqlite` handle behind a mutex, so
//! statements from concurrent sessions are serialized. Every transaction
//! gets a dedicated handle of its own on the same database; in-memory
//! databases are opened in shared-cache mode so that this holds for them too.
//!
//! Shared-cache table locks fail with `SQLITE_LOCKED` instead of waiting on
//! the busy handler, so statements retry those until the busy timeout runs
//! out.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rusqlite::params_from_iter;
use tracing::{debug, trace, warn};

use strata_query::connection::{Connection, ExecResult, Executor, TransactionConnection};
use strata_query::error::{QueryError, QueryResult};
use strata_query::row::Rows;
use strata_query::transaction::TransactionConfig;
use strata_query::Value;

use crate::config::{Location, SqliteConfig};
use crate::error::{SqliteError, SqliteResult};
use crate::types::{from_sqlite, to_sqlite};

type Handle = Arc<Mutex<Option<rusqlite::Connection>>>;

/// A shared SQLite connection.
pub struct SqliteConnection {
    config: SqliteConfig,
    location: Location,
    handle: Handle,
}

impl SqliteConnection {
    /// Open a database with the given configuration.
    pub fn open(config: SqliteConfig) -> SqliteResult<Self> {
        let location = config.location();
        debug!(location = ?location, "Opening SQLite database");
        let conn = config.connect(&location)?;
        Ok(Self {
            config,
            location,
            handle: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Open a fresh in-memory database.
    pub fn memory() -> SqliteResult<Self> {
        Self::open(SqliteConfig::memory())
    }

    /// The configuration this connection was opened with.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }
}

impl Executor for SqliteConnection {
    fn execute(&self, sql: &str, values: &[Value]) -> QueryResult<ExecResult> {
        let wait = self.lock_wait();
        with_handle(&self.handle, |conn| retry_locked(wait, || execute_on(conn, sql, values)))
    }

    fn query(&self, sql: &str, values: &[Value]) -> QueryResult<Rows> {
        let wait = self.lock_wait();
        with_handle(&self.handle, |conn| retry_locked(wait, || query_on(conn, sql, values)))
    }
}

impl SqliteConnection {
    fn lock_wait(&self) -> Duration {
        Duration::from_millis(u64::from(self.config.busy_timeout_ms.unwrap_or(0)))
    }
}

impl Connection for SqliteConnection {
    fn begin(&self, config: &TransactionConfig) -> QueryResult<Box<dyn TransactionConnection>> {
        if self.handle.lock().is_none() {
            return Err(QueryError::connection_closed());
        }
        let handle: Handle = Arc::new(Mutex::new(Some(self.config.connect(&self.location)?)));
        let wait = self.lock_wait();

        if let Some(level) = config.isolation {
            // SQLite transactions are always serializable.
            trace!(isolation = level.as_sql(), "Isolation level not configurable on SQLite");
        }
        let read_only = config.is_read_only();
        with_handle(&handle, |conn| {
            if read_only {
                conn.execute_batch("PRAGMA query_only = ON")?;
            }
            retry_locked(wait, || Ok(conn.execute_batch("BEGIN")?))
        })?;

        Ok(Box::new(SqliteTransaction {
            handle,
            read_only,
            wait,
            finished: AtomicBool::new(false),
        }))
    }

    fn close(&self) -> QueryResult<()> {
        let Some(conn) = self.handle.lock().take() else {
            return Err(QueryError::connection_closed());
        };
        debug!(location = ?self.location, "Closing SQLite database");
        conn.close()
            .map_err(|(_, e)| SqliteError::from(e))
            .map_err(QueryError::from)
    }
}

/// A transaction in progress. Dropped without commit or rollback, it rolls
/// back.
struct SqliteTransaction {
    handle: Handle,
    read_only: bool,
    wait: Duration,
    finished: AtomicBool,
}

impl SqliteTransaction {
    fn finish(&self, statement: &str) -> QueryResult<()> {
        if self.finished.swap(true, Ordering::SeqCst) {
            return Err(QueryError::transaction_closed());
        }
        let read_only = self.read_only;
        with_handle(&self.handle, |conn| {
            let result = retry_locked(self.wait, || Ok(conn.execute_batch(statement)?));
            if read_only {
                conn.execute_batch("PRAGMA query_only = OFF")?;
            }
            Ok(result?)
        })
    }
}

impl Executor for SqliteTransaction {
    fn execute(&self, sql: &str, values: &[Value]) -> QueryResult<ExecResult> {
        with_handle(&self.handle, |conn| {
            retry_locked(self.wait, || execute_on(conn, sql, values))
        })
    }

    fn query(&self, sql: &str, values: &[Value]) -> QueryResult<Rows> {
        with_handle(&self.handle, |conn| {
            retry_locked(self.wait, || query_on(conn, sql, values))
        })
    }
}

impl TransactionConnection for SqliteTransaction {
    fn commit(&self) -> QueryResult<()> {
        self.finish("COMMIT")
    }

    fn rollback(&self) -> QueryResult<()> {
        self.finish("ROLLBACK")
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if self.finished.load(Ordering::SeqCst) {
            return;
        }
        warn!("Transaction dropped while open, rolling back");
        if let Err(err) = self.finish("ROLLBACK") {
            warn!(error = %err, "Rollback on drop failed");
        }
    }
}

fn with_handle<T>(
    handle: &Handle,
    f: impl FnOnce(&rusqlite::Connection) -> SqliteResult<T>,
) -> QueryResult<T> {
    let guard = handle.lock();
    let conn = guard.as_ref().ok_or_else(QueryError::connection_closed)?;
    f(conn).map_err(QueryError::from)
}

/// Run `f`, retrying while a shared-cache table lock is held elsewhere and
/// `wait` has not elapsed.
fn retry_locked<T>(wait: Duration, mut f: impl FnMut() -> SqliteResult<T>) -> SqliteResult<T> {
    let deadline = Instant::now() + wait;
    let mut pause = Duration::from_micros(200);
    loop {
        match f() {
            Err(err) if err.is_locked() && Instant::now() < deadline => {
                trace!(pause_us = pause.as_micros() as u64, "Table locked, retrying");
                thread::sleep(pause);
                pause = (pause * 2).min(Duration::from_millis(20));
            }
            result => return result,
        }
    }
}

fn execute_on(conn: &rusqlite::Connection, sql: &str, values: &[Value]) -> SqliteResult<ExecResult> {
    trace!(sql = %sql, params = values.len(), "Executing statement");
    let mut stmt = conn.prepare_cached(sql)?;
    let changed = stmt.execute(params_from_iter(values.iter().map(to_sqlite)))?;
    let is_insert = sql
        .trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("INSERT"));
    Ok(ExecResult {
        rows_affected: changed as u64,
        last_insert_id: (is_insert && changed > 0).then(|| conn.last_insert_rowid()),
    })
}

fn query_on(conn: &rusqlite::Connection, sql: &str, values: &[Value]) -> SqliteResult<Rows> {
    trace!(sql = %sql, params = values.len(), "Executing query");
    let mut stmt = conn.prepare_cached(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let width = columns.len();

    let mut rows = stmt.query(params_from_iter(values.iter().map(to_sqlite)))?;
    let mut buffered = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(from_sqlite(row.get_ref(i)?));
        }
        buffered.push(values);
    }
    Ok(Rows::from_values(columns, buffered))
}
