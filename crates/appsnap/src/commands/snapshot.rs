//! Snapshot command handlers.
//!
//! Recording, rewinding and inspecting an app's history.

use super::generate::ItemsFileGenerator;
use super::{print_changes, print_json, OutputFormat};
use anyhow::bail;
use appsnap_core::{Engine, RetryPolicy};
use clap::Subcommand;
use std::io::Write;
use std::path::PathBuf;

/// Snapshot subcommands.
#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// Start tracking an app directory
    Init {
        /// App ID
        app: String,
    },
    /// Record the working tree as a new snapshot
    Commit {
        /// App ID
        app: String,
        /// Snapshot message
        #[arg(short, long, default_value = "Manual snapshot")]
        message: String,
    },
    /// Rewind or replay the working tree to a snapshot
    Checkout {
        /// App ID
        app: String,
        /// Snapshot ID or unique prefix
        snapshot: String,
    },
    /// List snapshots from the current one backwards
    History {
        /// App ID
        app: String,
        /// Maximum number of entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Print the current snapshot
    Current {
        /// App ID
        app: String,
    },
    /// Files changed between two snapshots
    Diff {
        /// App ID
        app: String,
        from: String,
        to: String,
    },
    /// Uncommitted changes in the working tree
    Status {
        /// App ID
        app: String,
    },
    /// Print a file as recorded in a snapshot
    Show {
        /// App ID
        app: String,
        snapshot: String,
        /// Relative file path
        path: String,
    },
    /// Unified diff of a file between a snapshot and the working tree
    FileDiff {
        /// App ID
        app: String,
        from: String,
        /// Relative file path
        path: String,
    },
    /// Apply generated items from a JSON file and record a snapshot
    Apply {
        /// App ID
        app: String,
        /// JSON array of items ({"type":"file",...} / {"type":"command",...})
        items: PathBuf,
        /// Task description, used as the snapshot message
        #[arg(short, long, default_value = "Apply generated items")]
        task: String,
    },
}

/// Handle snapshot commands.
pub async fn handle_snapshot(
    engine: &Engine,
    command: SnapshotCommands,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match command {
        SnapshotCommands::Init { app } => {
            engine.open_app(&app).await?;
            let id = engine.ensure_initialized(&app).await?;
            println!("{id}");
        }
        SnapshotCommands::Commit { app, message } => {
            engine.open_app(&app).await?;
            let id = engine.commit(&app, &message).await?;
            println!("{id}");
        }
        SnapshotCommands::Checkout { app, snapshot } => {
            engine.open_app(&app).await?;
            let changes = engine.checkout(&app, &snapshot).await?;
            engine.flush(&app).await?;
            match format {
                OutputFormat::Json => print_json(&changes)?,
                OutputFormat::Default => print_changes(&changes),
            }
        }
        SnapshotCommands::History { app, limit } => {
            engine.open_app(&app).await?;
            let history = engine.history(&app, limit).await?;
            match format {
                OutputFormat::Json => print_json(&history)?,
                OutputFormat::Default => {
                    for entry in history {
                        println!(
                            "{}  {}  {}",
                            entry.short_id,
                            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            entry.message
                        );
                    }
                }
            }
        }
        SnapshotCommands::Current { app } => {
            engine.open_app(&app).await?;
            match engine.current_snapshot(&app).await? {
                Some(id) => println!("{id}"),
                None => bail!("app {app} has no snapshots"),
            }
        }
        SnapshotCommands::Diff { app, from, to } => {
            engine.open_app(&app).await?;
            let changes = engine.diff(&app, &from, &to).await?;
            match format {
                OutputFormat::Json => print_json(&changes)?,
                OutputFormat::Default => print_changes(&changes),
            }
        }
        SnapshotCommands::Status { app } => {
            engine.open_app(&app).await?;
            let changes = engine.working_changes(&app).await?;
            match format {
                OutputFormat::Json => print_json(&changes)?,
                OutputFormat::Default => print_changes(&changes),
            }
        }
        SnapshotCommands::Show {
            app,
            snapshot,
            path,
        } => {
            engine.open_app(&app).await?;
            match engine.read_file_at(&app, &snapshot, &path).await? {
                Some(bytes) => std::io::stdout().write_all(&bytes)?,
                None => bail!("{path} does not exist in snapshot {snapshot}"),
            }
        }
        SnapshotCommands::FileDiff { app, from, path } => {
            engine.open_app(&app).await?;
            print!("{}", engine.file_diff(&app, &from, &path).await?);
        }
        SnapshotCommands::Apply { app, items, task } => {
            engine.open_app(&app).await?;
            let generator = ItemsFileGenerator::new(items);
            let outcome = engine
                .run_task(&app, &generator, &task, RetryPolicy::none())
                .await?;
            engine.flush(&app).await?;
            match format {
                OutputFormat::Json => print_json(&outcome)?,
                OutputFormat::Default => {
                    println!("Snapshot: {}", outcome.snapshot);
                    for command in &outcome.applied.commands {
                        let status = if command.success { "ok" } else { "failed" };
                        println!("[{status}] {}", command.command);
                    }
                    print_changes(&outcome.changes);
                }
            }
        }
    }
    Ok(())
}
