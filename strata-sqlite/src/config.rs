//! SQLite configuration.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use rusqlite::OpenFlags;

use strata_query::connection::{ConnectionString, Driver};
use tracing::debug;

use crate::error::{SqliteError, SqliteResult};

/// Options applied when a SQLite handle is opened.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Where the database lives.
    pub path: DatabasePath,
    /// Enable foreign keys.
    pub foreign_keys: bool,
    /// How long a locked database is retried, in milliseconds.
    pub busy_timeout_ms: Option<u32>,
    /// Synchronous mode.
    pub synchronous: SynchronousMode,
    /// Journal mode.
    pub journal_mode: JournalMode,
}

/// Location of a SQLite database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DatabasePath {
    /// In-memory database.
    #[default]
    Memory,
    /// File-based database.
    File(PathBuf),
}

impl DatabasePath {
    /// Whether the database lives only in memory.
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

/// `PRAGMA synchronous` setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SynchronousMode {
    Off,
    #[default]
    Normal,
    Full,
    Extra,
}

impl SynchronousMode {
    /// Value for the pragma.
    pub fn as_pragma(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
            Self::Extra => "EXTRA",
        }
    }

    fn parse(value: &str) -> SqliteResult<Self> {
        match value.to_ascii_uppercase().as_str() {
            "OFF" | "0" => Ok(Self::Off),
            "NORMAL" | "1" => Ok(Self::Normal),
            "FULL" | "2" => Ok(Self::Full),
            "EXTRA" | "3" => Ok(Self::Extra),
            other => Err(SqliteError::config(format!("unknown synchronous mode '{}'", other))),
        }
    }
}

/// `PRAGMA journal_mode` setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    /// Write-ahead log; readers do not block the writer.
    #[default]
    Wal,
    Off,
}

impl JournalMode {
    /// Value for the pragma.
    pub fn as_pragma(&self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Persist => "PERSIST",
            Self::Memory => "MEMORY",
            Self::Wal => "WAL",
            Self::Off => "OFF",
        }
    }

    fn parse(value: &str) -> SqliteResult<Self> {
        match value.to_ascii_uppercase().as_str() {
            "DELETE" => Ok(Self::Delete),
            "TRUNCATE" => Ok(Self::Truncate),
            "PERSIST" => Ok(Self::Persist),
            "MEMORY" => Ok(Self::Memory),
            "WAL" => Ok(Self::Wal),
            "OFF" => Ok(Self::Off),
            other => Err(SqliteError::config(format!("unknown journal mode '{}'", other))),
        }
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: DatabasePath::Memory,
            foreign_keys: true,
            busy_timeout_ms: Some(5000),
            synchronous: SynchronousMode::Normal,
            journal_mode: JournalMode::Wal,
        }
    }
}

impl SqliteConfig {
    /// A private in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// A database file at `path`, created when missing.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            path: DatabasePath::File(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Read a configuration from a URL.
    ///
    /// Accepts `sqlite::memory:`, `sqlite://path`, `file:path` and bare
    /// paths.
    ///
    /// Query parameters `foreign_keys`, `busy_timeout`, `journal_mode`,
    /// `synchronous` and `mode=memory` adjust the defaults.
    ///
    /// ```rust
    /// use strata_sqlite::{JournalMode, SqliteConfig};
    ///
    /// let config = SqliteConfig::from_url("sqlite://app.db?journal_mode=delete").unwrap();
    /// assert!(!config.path.is_memory());
    /// assert_eq!(config.journal_mode, JournalMode::Delete);
    /// ```
    pub fn from_url(url: impl AsRef<str>) -> SqliteResult<Self> {
        let url = url.as_ref().trim();
        if !url.is_empty() && !url.contains(':') {
            return Ok(Self::file(url));
        }

        let parsed =
            ConnectionString::parse(url).map_err(|e| SqliteError::config(e.message))?;
        if parsed.driver() != Driver::Sqlite {
            return Err(SqliteError::config(format!(
                "'{}' is not a sqlite url",
                parsed.driver()
            )));
        }

        let mut config = if parsed.is_memory() {
            Self::memory()
        } else {
            match parsed.database() {
                Some(path) => Self::file(path),
                None => return Err(SqliteError::config("database path is required")),
            }
        };

        for (key, value) in parsed.params() {
            match key.as_str() {
                "mode" if value == "memory" => config.path = DatabasePath::Memory,
                "foreign_keys" => config.foreign_keys = parse_flag(key, value)?,
                "busy_timeout" => {
                    let ms = value.parse().map_err(|_| {
                        SqliteError::config(format!("invalid busy_timeout '{}'", value))
                    })?;
                    config.busy_timeout_ms = Some(ms);
                }
                "journal_mode" => config.journal_mode = JournalMode::parse(value)?,
                "synchronous" => config.synchronous = SynchronousMode::parse(value)?,
                _ => debug!(key = %key, "Ignoring unknown sqlite url parameter"),
            }
        }

        Ok(config)
    }

    /// Set whether foreign keys are enforced.
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Set the busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = Some(ms);
        self
    }

    /// Set the journal mode.
    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }

    /// Set the synchronous mode.
    pub fn synchronous(mut self, mode: SynchronousMode) -> Self {
        self.synchronous = mode;
        self
    }

    /// The pragmas run on every new handle.
    pub fn init_sql(&self) -> String {
        let mut sql = String::new();
        sql.push_str(&format!(
            "PRAGMA foreign_keys = {};\n",
            if self.foreign_keys { "ON" } else { "OFF" }
        ));
        if let Some(ms) = self.busy_timeout_ms {
            sql.push_str(&format!("PRAGMA busy_timeout = {};\n", ms));
        }
        // In-memory databases only support the MEMORY journal.
        if !self.path.is_memory() {
            sql.push_str(&format!(
                "PRAGMA journal_mode = {};\n",
                self.journal_mode.as_pragma()
            ));
        }
        sql.push_str(&format!(
            "PRAGMA synchronous = {};\n",
            self.synchronous.as_pragma()
        ));
        sql
    }

    /// Pick the location every handle of one opened database connects to.
    /// Each call for an in-memory configuration names a new database.
    pub(crate) fn location(&self) -> Location {
        match &self.path {
            DatabasePath::Memory => {
                let n = MEMORY_DATABASES.fetch_add(1, Ordering::Relaxed);
                Location::SharedMemory(format!("file:strata-mem-{}?mode=memory&cache=shared", n))
            }
            DatabasePath::File(path) => Location::File(path.clone()),
        }
    }

    /// Open a new handle on `location` with the pragmas applied.
    pub(crate) fn connect(&self, location: &Location) -> SqliteResult<rusqlite::Connection> {
        let conn = match location {
            Location::SharedMemory(uri) => rusqlite::Connection::open_with_flags(
                uri,
                OpenFlags::default() | OpenFlags::SQLITE_OPEN_URI,
            )?,
            Location::File(path) => rusqlite::Connection::open(path)?,
        };
        conn.execute_batch(&self.init_sql())?;
        Ok(conn)
    }
}

static MEMORY_DATABASES: AtomicU64 = AtomicU64::new(0);

/// Where the handles of one opened database point.
///
/// An in-memory database is named and opened in shared-cache mode so that
/// transactions can run on handles of their own, as they do for files. It
/// lives until its last handle closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Location {
    SharedMemory(String),
    File(PathBuf),
}

fn parse_flag(key: &str, value: &str) -> SqliteResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" => Ok(false),
        _ => Err(SqliteError::config(format!("invalid {} '{}'", key, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_memory_locations_are_distinct() {
        let config = SqliteConfig::memory();
        let (a, b) = (config.location(), config.location());
        assert_ne!(a, b);
        let Location::SharedMemory(uri) = a else {
            panic!("expected a shared memory location");
        };
        assert!(uri.ends_with("?mode=memory&cache=shared"));

        let config = SqliteConfig::file("app.db");
        assert_eq!(config.location(), Location::File(PathBuf::from("app.db")));
    }

    #[test]
    fn test_memory_urls() {
        for url in ["sqlite::memory:", ":memory:", "sqlite://db.sqlite?mode=memory"] {
            assert!(SqliteConfig::from_url(url).unwrap().path.is_memory(), "{}", url);
        }
    }

    #[test]
    fn test_file_urls() {
        let config = SqliteConfig::from_url("sqlite://./data/app.db").unwrap();
        assert_eq!(config.path, DatabasePath::File(PathBuf::from("./data/app.db")));

        let config = SqliteConfig::from_url("file:test.db").unwrap();
        assert_eq!(config.path, DatabasePath::File(PathBuf::from("test.db")));

        let config = SqliteConfig::from_url("app.db").unwrap();
        assert_eq!(config.path, DatabasePath::File(PathBuf::from("app.db")));
    }

    #[test]
    fn test_url_pragmas() {
        let config = SqliteConfig::from_url(
            "sqlite://app.db?foreign_keys=off&busy_timeout=250&journal_mode=truncate&synchronous=full",
        )
        .unwrap();
        assert!(!config.foreign_keys);
        assert_eq!(config.busy_timeout_ms, Some(250));
        assert_eq!(config.journal_mode, JournalMode::Truncate);
        assert_eq!(config.synchronous, SynchronousMode::Full);
    }

    #[test]
    fn test_url_errors() {
        assert!(SqliteConfig::from_url("postgres://localhost/app").is_err());
        assert!(SqliteConfig::from_url("sqlite://app.db?busy_timeout=soon").is_err());
        assert!(SqliteConfig::from_url("sqlite://app.db?journal_mode=fast").is_err());
    }

    #[test]
    fn test_init_sql() {
        let sql = SqliteConfig::memory().init_sql();
        assert!(sql.contains("PRAGMA foreign_keys = ON;"));
        assert!(sql.contains("PRAGMA busy_timeout = 5000;"));
        assert!(!sql.contains("journal_mode"));

        let sql = SqliteConfig::file("app.db")
            .journal_mode(JournalMode::Delete)
            .init_sql();
        assert!(sql.contains("PRAGMA journal_mode = DELETE;"));
    }
}
