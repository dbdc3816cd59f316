//! Set-aside command handlers.

use super::{print_json, OutputFormat};
use appsnap_core::Engine;
use clap::Subcommand;

/// Set-aside subcommands.
#[derive(Subcommand)]
pub enum SetAsideCommands {
    /// List work set aside by earlier checkouts, newest first
    List {
        /// App ID
        app: String,
    },
    /// Re-apply set-aside work onto the working tree
    Restore {
        /// App ID
        app: String,
        /// Entry index from `set-aside list`
        #[arg(default_value_t = 0)]
        index: usize,
    },
}

/// Handle set-aside commands.
pub async fn handle_set_aside(
    engine: &Engine,
    command: SetAsideCommands,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match command {
        SetAsideCommands::List { app } => {
            engine.open_app(&app).await?;
            let entries = engine.set_aside_entries(&app).await?;
            match format {
                OutputFormat::Json => print_json(&entries)?,
                OutputFormat::Default if entries.is_empty() => println!("Nothing set aside."),
                OutputFormat::Default => {
                    for entry in entries {
                        println!("{}  {}", entry.index, entry.message);
                    }
                }
            }
        }
        SetAsideCommands::Restore { app, index } => {
            engine.open_app(&app).await?;
            engine.restore_set_aside(&app, index).await?;
            println!("Restored entry {index}");
        }
    }
    Ok(())
}
