//! Command handlers for the appsnap CLI.

pub mod app;
pub mod generate;
pub mod logging;
pub mod set_aside;
pub mod snapshot;

pub use app::*;
pub use logging::*;
pub use set_aside::*;
pub use snapshot::*;

use anyhow::bail;
use serde::Serialize;

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Default,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "default" => Ok(OutputFormat::Default),
            "json" => Ok(OutputFormat::Json),
            other => bail!("unknown output format: {other} (expected default or json)"),
        }
    }
}

/// Print `value` as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a change set one path per line, git-status style.
pub fn print_changes(changes: &appsnap_core::ChangeSet) {
    if changes.is_empty() {
        println!("No changes.");
        return;
    }
    for (path, kind) in changes.iter() {
        let marker = match kind {
            appsnap_core::ChangeKind::Added => 'A',
            appsnap_core::ChangeKind::Modified => 'M',
            appsnap_core::ChangeKind::Deleted => 'D',
        };
        println!("{marker} {path}");
    }
}
