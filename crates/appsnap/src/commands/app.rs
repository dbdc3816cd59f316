//! App management command handlers.
//!
//! Handles creating, listing, renaming and deleting apps.

use super::{print_json, OutputFormat};
use appsnap_core::{App, Engine};
use appsnap_util::{IdPrefix, Identifier};
use clap::Subcommand;

/// App subcommands.
#[derive(Subcommand)]
pub enum AppCommands {
    /// Create a new, empty app
    Create {
        /// Display name
        name: String,
    },
    /// List apps in the apps directory
    List,
    /// Show app details
    Show {
        /// App ID
        id: String,
    },
    /// Change an app's display name
    Rename {
        /// App ID
        id: String,
        /// New display name
        name: String,
    },
    /// Delete an app with its files and history
    Delete {
        /// App ID
        id: String,
    },
}

/// Handle app commands.
pub async fn handle_app(
    engine: &Engine,
    command: AppCommands,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match command {
        AppCommands::Create { name } => {
            let app = engine.create_app(&name).await?;
            match format {
                OutputFormat::Json => print_json(&app)?,
                OutputFormat::Default => {
                    println!("Created app: {}", app.id);
                    println!("Directory: {}", app.workdir.display());
                }
            }
        }
        AppCommands::List => {
            let apps = list_apps(engine).await?;
            match format {
                OutputFormat::Json => print_json(&apps)?,
                OutputFormat::Default if apps.is_empty() => println!("No apps found."),
                OutputFormat::Default => {
                    println!("{:<32} {:<30} {:<20}", "ID", "NAME", "UPDATED");
                    println!("{}", "-".repeat(82));
                    for app in apps {
                        let updated = app.updated_at.format("%Y-%m-%d %H:%M:%S");
                        println!("{:<32} {:<30} {:<20}", app.id, truncate(&app.name, 28), updated);
                    }
                }
            }
        }
        AppCommands::Show { id } => {
            let app = engine.open_app(&id).await?;
            let current = engine.current_snapshot(&id).await?;
            let dirty = !engine.working_changes(&id).await?.is_empty();
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "app": app,
                    "current": current,
                    "dirty": dirty,
                }))?,
                OutputFormat::Default => {
                    println!("App: {}", app.id);
                    println!("Name: {}", app.name);
                    println!("Directory: {}", app.workdir.display());
                    println!("Created: {}", app.created_at.format("%Y-%m-%d %H:%M:%S"));
                    println!("Updated: {}", app.updated_at.format("%Y-%m-%d %H:%M:%S"));
                    if let Some(current) = current {
                        println!("Current snapshot: {}", current.short());
                    }
                    println!("Working tree: {}", if dirty { "dirty" } else { "clean" });
                }
            }
        }
        AppCommands::Rename { id, name } => {
            engine.open_app(&id).await?;
            let app = engine.rename_app(&id, &name).await?;
            match format {
                OutputFormat::Json => print_json(&app)?,
                OutputFormat::Default => println!("Renamed {} to {}", app.id, app.name),
            }
        }
        AppCommands::Delete { id } => {
            engine.open_app(&id).await?;
            engine.delete_app(&id).await?;
            println!("App deleted: {id}");
        }
    }
    Ok(())
}

/// Apps found in the apps directory, oldest first.
async fn list_apps(engine: &Engine) -> anyhow::Result<Vec<App>> {
    let apps_dir = engine.config().apps_dir()?;
    let mut entries = match tokio::fs::read_dir(&apps_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut apps = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !Identifier::has_prefix(&name, IdPrefix::App) {
            continue;
        }
        let located = App::locate(&apps_dir, &name)?;
        apps.push(located.load_metadata().await?.unwrap_or(located));
    }

    // Ids are ULID based, so lexical order is creation order.
    apps.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(apps)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_names() {
        assert_eq!(truncate("Todo", 28), "Todo");
        assert_eq!(truncate("abcdefghij", 6), "abc...");
    }
}
