//! Content generator adapter.
//!
//! A generator turns a task description into project items: whole-file
//! writes and shell commands. The engine applies them to the working
//! directory in document order and then records a snapshot.

use crate::error::{CoreError, CoreResult};
use crate::retry::{RetryHelper, RetryPolicy};
use appsnap_util::path::{normalize_relative, safe_join};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Longest a single generated command may run.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// One parsed item of a generated project description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProjectItem {
    /// Replace `path` with `content`.
    File { path: String, content: String },
    /// Run `command` in the working directory.
    Command { command: String },
}

impl ProjectItem {
    pub fn file(path: impl Into<String>, content: impl Into<String>) -> Self {
        ProjectItem::File {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn command(command: impl Into<String>) -> Self {
        ProjectItem::Command {
            command: command.into(),
        }
    }
}

/// Generator failure.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// Worth retrying (overloaded, rate limited, network hiccup).
    #[error("transient generator failure: {0}")]
    Transient(String),

    #[error("generator failure: {0}")]
    Fatal(String),
}

impl GeneratorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GeneratorError::Transient(_))
    }
}

/// Produces project items for a task.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, task: &str) -> Result<Vec<ProjectItem>, GeneratorError>;
}

/// Call the generator, retrying transient failures per `policy`.
pub async fn generate_with_retry(
    generator: &dyn ContentGenerator,
    task: &str,
    policy: RetryPolicy,
) -> CoreResult<Vec<ProjectItem>> {
    let mut retry = RetryHelper::new(policy);

    loop {
        match generator.generate(task).await {
            Ok(items) => {
                debug!(items = items.len(), attempts = retry.current_attempt() + 1, "Generated items");
                return Ok(items);
            }
            Err(e) if e.is_transient() => match retry.next_attempt() {
                Some(delay) => {
                    warn!(error = %e, delay_ms = delay.as_millis() as u64, "Generator failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(CoreError::Generator(e.to_string())),
            },
            Err(e) => return Err(CoreError::Generator(e.to_string())),
        }
    }
}

/// Result of one shell command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub command: String,
    pub success: bool,
    /// `None` when the command was killed or timed out.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// What applying a batch of items did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppliedItems {
    /// Written paths, in application order.
    pub files_written: Vec<String>,
    pub commands: Vec<CommandOutcome>,
}

/// Apply items to `workdir` in document order.
///
/// Every file path is validated before anything is written; an invalid path
/// rejects the whole batch. A failing command is recorded and does not stop
/// later items.
pub async fn apply_items(workdir: &Path, items: &[ProjectItem]) -> CoreResult<AppliedItems> {
    let mut targets: Vec<Option<(String, PathBuf)>> = Vec::with_capacity(items.len());
    for item in items {
        targets.push(match item {
            ProjectItem::File { path, .. } => Some(validate_path(workdir, path)?),
            ProjectItem::Command { .. } => None,
        });
    }

    let mut applied = AppliedItems::default();
    for (item, target) in items.iter().zip(targets) {
        match (item, target) {
            (ProjectItem::File { content, .. }, Some((relative, full))) => {
                if let Some(parent) = full.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&full, content).await?;
                debug!(path = %relative, bytes = content.len(), "Wrote file");
                applied.files_written.push(relative);
            }
            (ProjectItem::Command { command }, _) => {
                applied.commands.push(run_command(workdir, command).await?);
            }
            (ProjectItem::File { path, .. }, None) => {
                return Err(CoreError::InvalidItem(path.clone()));
            }
        }
    }

    info!(
        files = applied.files_written.len(),
        commands = applied.commands.len(),
        "Applied generated items"
    );
    Ok(applied)
}

fn validate_path(workdir: &Path, path: &str) -> CoreResult<(String, PathBuf)> {
    let relative = normalize_relative(path);
    let inside_history = relative == ".git" || relative.starts_with(".git/");
    if inside_history || path.starts_with('/') {
        return Err(CoreError::InvalidItem(format!("refusing to write {path}")));
    }
    let full = safe_join(workdir, Path::new(&path.replace('\\', "/")))
        .ok_or_else(|| CoreError::InvalidItem(format!("path escapes app directory: {path}")))?;
    Ok((relative, full))
}

async fn run_command(workdir: &Path, command: &str) -> CoreResult<CommandOutcome> {
    info!(command = %command, "Running generated command");

    let mut cmd = shell(command);
    cmd.current_dir(workdir).kill_on_drop(true);

    let outcome = match tokio::time::timeout(COMMAND_TIMEOUT, cmd.output()).await {
        Ok(output) => {
            let output = output?;
            CommandOutcome {
                command: command.to_string(),
                success: output.status.success(),
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
        }
        Err(_) => CommandOutcome {
            command: command.to_string(),
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: format!("timed out after {}s", COMMAND_TIMEOUT.as_secs()),
        },
    };

    if !outcome.success {
        warn!(
            command = %command,
            exit_code = ?outcome.exit_code,
            stderr = %outcome.stderr.trim(),
            "Generated command failed"
        );
    }
    Ok(outcome)
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
