//! Logging setup for the appsnap binaries.
//!
//! The configured level applies to the appsnap crates only. Dependencies
//! (the async runtime, the git bindings) stay at `warn` unless `RUST_LOG`
//! says otherwise, so `--verbose` shows snapshot activity rather than
//! runtime internals.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Crates whose events follow the configured level.
const APPSNAP_TARGETS: &[&str] = &[
    "appsnap",
    "appsnap_core",
    "appsnap_snapshot",
    "appsnap_util",
];

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parse a level name, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// Whether this level lets `other` through.
    fn admits(&self, other: LogLevel) -> bool {
        (other as u8) >= (*self as u8)
    }
}

/// Logging configuration.
pub struct LogConfig {
    /// Write events to stderr. When false, spans are still created but
    /// nothing is printed.
    pub print: bool,
    /// Level for the appsnap crates.
    pub level: LogLevel,
    /// Include file and line of each event.
    pub include_location: bool,
    /// Emit JSON lines instead of human readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            print: false,
            level: LogLevel::Info,
            include_location: false,
            json: false,
        }
    }
}

/// Filter directives for `level`: appsnap crates at `level`, everything
/// else at `warn` or quieter.
pub fn filter_directives(level: LogLevel) -> String {
    let floor = if LogLevel::Warn.admits(level) {
        level
    } else {
        LogLevel::Warn
    };
    let mut directives = vec![floor.as_str().to_string()];
    directives.extend(
        APPSNAP_TARGETS
            .iter()
            .map(|target| format!("{target}={}", level.as_str())),
    );
    directives.join(",")
}

/// Install the global subscriber. `RUST_LOG` replaces the configured
/// directives when set.
///
/// Call once at startup. Later calls are ignored so test binaries can call
/// it freely.
pub fn init(config: LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config.level)));

    let subscriber = tracing_subscriber::registry().with(filter);

    if !config.print {
        let _ = subscriber.try_init();
        return;
    }

    let result = if config.json {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location),
            )
            .try_init()
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(config.include_location)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location),
            )
            .try_init()
    };

    if let Err(e) = result {
        tracing::debug!("Logging already initialized: {}", e);
    }
}

/// Span for one engine operation on one app. Events logged inside it carry
/// the app id and operation name; the three-argument form also records the
/// snapshot being read or written.
#[macro_export]
macro_rules! op_span {
    ($app_id:expr, $op:expr) => {
        tracing::info_span!("app_op", app_id = %$app_id, op = $op)
    };
    ($app_id:expr, $op:expr, $snapshot:expr) => {
        tracing::info_span!("app_op", app_id = %$app_id, op = $op, snapshot = %$snapshot)
    };
}
