//! Session configuration and per-chain settings.

use std::collections::HashMap;
use std::time::Duration;

use crate::value::Value;

/// Options fixed when a [`Db`](crate::Db) is opened.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resolve table names without pluralizing.
    pub singular_table: bool,
    /// Let update/delete run without conditions.
    pub allow_global_update: bool,
    /// Log every statement at `info` instead of `debug`.
    pub log_sql: bool,
    /// Statements slower than this are logged at `warn`.
    pub slow_threshold: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            singular_table: false,
            allow_global_update: false,
            log_sql: false,
            slow_threshold: Some(Duration::from_millis(200)),
        }
    }
}

impl Config {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve table names without pluralizing.
    pub fn singular_table(mut self, enabled: bool) -> Self {
        self.singular_table = enabled;
        self
    }

    /// Allow unconditioned update/delete by default.
    pub fn allow_global_update(mut self, enabled: bool) -> Self {
        self.allow_global_update = enabled;
        self
    }

    /// Log statements at `info`.
    pub fn log_sql(mut self, enabled: bool) -> Self {
        self.log_sql = enabled;
        self
    }

    /// Set the slow statement threshold; `None` disables the warning.
    pub fn slow_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.slow_threshold = threshold;
        self
    }
}

/// Settings carried by one session chain and copied on every chaining call.
///
/// Recognized options are typed fields; `values` holds arbitrary pairs set
/// with [`Db::set`](crate::Db::set) for user callbacks.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Appended to the statement before its terminator (`FOR UPDATE`).
    pub query_option: Option<String>,
    /// Placed before the statement (`/*+ hint */`).
    pub query_hint: Option<String>,
    /// Appended to insert statements (`ON CONFLICT DO NOTHING`).
    pub insert_option: Option<String>,
    /// Let update/delete run without conditions.
    pub allow_global_update: bool,
    /// Cascade saves through associations.
    pub save_associations: bool,
    /// Update associated records that already have a primary key.
    pub association_autoupdate: bool,
    /// Log statements at `info`.
    pub log_sql: bool,
    /// User-defined values.
    pub values: HashMap<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            query_option: None,
            query_hint: None,
            insert_option: None,
            allow_global_update: false,
            save_associations: true,
            association_autoupdate: true,
            log_sql: false,
            values: HashMap::new(),
        }
    }
}

impl Settings {
    /// Initial settings for a freshly opened session.
    pub fn from_config(config: &Config) -> Self {
        Self {
            allow_global_update: config.allow_global_update,
            log_sql: config.log_sql,
            ..Self::default()
        }
    }
}
