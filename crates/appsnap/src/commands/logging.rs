//! Logging initialization for the CLI.

use appsnap_util::log::{LogConfig, LogLevel};

/// Initialize logging to stderr.
///
/// `--verbose` forces debug output. Without it the configured level applies,
/// falling back to warnings only. `RUST_LOG` wins over both.
pub fn init_logging(verbose: bool, json: bool, configured: Option<LogLevel>) {
    appsnap_util::log::init(LogConfig {
        print: true,
        level: cli_level(verbose, configured),
        include_location: verbose,
        json,
    });
}

fn cli_level(verbose: bool, configured: Option<LogLevel>) -> LogLevel {
    if verbose {
        LogLevel::Debug
    } else {
        configured.unwrap_or(LogLevel::Warn)
    }
}
