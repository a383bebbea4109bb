//! Environment-driven logging setup.
//!
//! The engine logs through `tracing`: every statement at `debug` (or `info`
//! when the session has `log_sql` on), slow statements at `warn`, pipeline
//! steps at `trace` and transaction boundaries at `info`. Applications with
//! their own subscriber need nothing from this module; [`init`] installs a
//! subscriber when the `tracing-subscriber` feature is enabled.
//!
//! # Environment Variables
//!
//! - `STRATA_DEBUG=true|1|yes` - Enable debug logging
//! - `STRATA_LOG_LEVEL=trace|debug|info|warn|error` - Set the level
//! - `STRATA_LOG_FORMAT=json|pretty|compact` - Output format (default: json)
//!
//! ```rust,no_run
//! strata_query::logging::init();
//! ```

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Subscriber output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Multi-line human readable output.
    Pretty,
    /// Single-line human readable output.
    Compact,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "pretty" => Self::Pretty,
            "compact" => Self::Compact,
            _ => Self::Json,
        }
    }
}

/// Whether `STRATA_DEBUG` is set to "true", "1" or "yes" (case-insensitive).
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("STRATA_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// The level from `STRATA_LOG_LEVEL`; `debug` when `STRATA_DEBUG` is on,
/// `warn` otherwise.
pub fn log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("STRATA_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// The format from `STRATA_LOG_FORMAT`.
pub fn log_format() -> LogFormat {
    env::var("STRATA_LOG_FORMAT")
        .map(|f| LogFormat::parse(&f))
        .unwrap_or(LogFormat::Json)
}

/// Install the global subscriber once. A no-op unless logging was
/// requested through the environment, or without the
/// `tracing-subscriber` feature.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("STRATA_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = log_level();
            let filter = EnvFilter::try_new(format!(
                "strata={},strata_query={},strata_sqlite={}",
                level, level, level
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            let registry = tracing_subscriber::registry().with(filter);
            let installed = match log_format() {
                LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
                LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
                LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
            };
            if installed.is_ok() {
                tracing::info!(level, format = ?log_format(), "Strata logging initialized");
            }
        }
    });
}

/// Log at `debug` only when `STRATA_DEBUG` is enabled.
#[macro_export]
macro_rules! strata_debug {
    ($($arg:tt)*) => {
        if $crate::logging::is_debug_enabled() {
            ::tracing::debug!($($arg)*);
        }
    };
}
