//! appsnap - snapshot, rewind and replay generated app directories.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AppCommands, OutputFormat, SetAsideCommands, SnapshotCommands};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "appsnap")]
#[command(author, version, about = "Snapshot and rewind generated app directories", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Directory holding app working directories
    #[arg(long, global = true)]
    apps_dir: Option<PathBuf>,

    /// Output format: default or json
    #[arg(long, global = true, default_value = "default")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, list, rename and delete apps
    #[command(subcommand)]
    App(AppCommands),

    #[command(flatten)]
    Snapshot(SnapshotCommands),

    /// Inspect or restore work set aside by checkouts
    #[command(subcommand)]
    SetAside(SetAsideCommands),

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir()?;
    let (mut config, sources) = appsnap_core::EngineConfig::load(Some(&cwd)).await?;
    if let Some(apps_dir) = cli.apps_dir {
        config.apps_dir = Some(apps_dir);
    }

    let configured_level = config
        .log_level
        .as_deref()
        .and_then(appsnap_util::log::LogLevel::parse);
    commands::init_logging(cli.verbose, cli.log_json, configured_level);
    for source in &sources {
        tracing::debug!(path = %source.display(), "Loaded config");
    }

    let format = OutputFormat::parse(&cli.format)?;
    let engine = appsnap_core::Engine::new(config);

    match cli.command {
        Commands::App(command) => commands::handle_app(&engine, command, format).await,
        Commands::Snapshot(command) => commands::handle_snapshot(&engine, command, format).await,
        Commands::SetAside(command) => commands::handle_set_aside(&engine, command, format).await,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(engine.config())?);
            Ok(())
        }
    }
}
