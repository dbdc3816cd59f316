//! Engine facade.
//!
//! Callers drive every app through the [`Engine`]. It owns the registry,
//! serializes snapshot operations per app, runs blocking repository work off
//! the async executor and publishes file events after every operation that
//! changes the tree.

use crate::app::App;
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::generator::{apply_items, generate_with_retry, AppliedItems, ContentGenerator};
use crate::notifier::{collect_events, NotificationReport};
use crate::registry::{AppHandle, AppRegistry};
use crate::retry::RetryPolicy;
use crate::subscriber::Subscriber;
use appsnap_snapshot::{
    ChangeSet, SetAsideEntry, SnapshotId, SnapshotResult, SnapshotStore, SnapshotSummary,
};
use appsnap_util::{Identifier, TimingGuard};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

/// Longest snapshot message derived from a task description.
const TASK_MESSAGE_LEN: usize = 72;

/// What a generator task did.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub snapshot: SnapshotId,
    pub changes: ChangeSet,
    pub applied: AppliedItems,
    pub notifications: NotificationReport,
}

/// App snapshot and synchronization engine.
pub struct Engine {
    config: EngineConfig,
    registry: AppRegistry,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let registry = AppRegistry::new(config.store_config());
        Self { config, registry }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &AppRegistry {
        &self.registry
    }

    /// Register an app directory with the engine.
    ///
    /// Idempotent. An interrupted checkout left in the directory is
    /// recovered before the handle is returned.
    pub async fn register(&self, app: App) -> CoreResult<Arc<AppHandle>> {
        let app_id = app.id.clone();
        traced(&app_id, "register", async {
            let handle = self.registry.register(app).await;
            {
                let _section = handle.exclusive(self.config.lock_timeout()).await?;
                if let Some(outcome) = blocking(handle.store(), |store| store.recover()).await? {
                    info!(outcome = ?outcome, "Recovered interrupted checkout");
                }
            }
            Ok(handle)
        })
        .await
    }

    /// Create a new app with an empty, initialized working directory.
    pub async fn create_app(&self, name: &str) -> CoreResult<App> {
        let apps_dir = self.config.apps_dir()?;
        tokio::fs::create_dir_all(&apps_dir).await?;

        let app = App::allocate(&apps_dir, name);
        tokio::fs::create_dir(&app.workdir).await?;
        app.save_metadata().await?;
        let initialized = match self.register(app.clone()).await {
            Ok(_) => self.ensure_initialized(&app.id).await,
            Err(e) => Err(e),
        };
        if let Err(e) = initialized {
            self.registry.unregister(&app.id).await;
            remove_app_files(&app).await;
            return Err(e);
        }

        info!(app_id = %app.id, name = %app.name, "Created app");
        Ok(app)
    }

    /// Open an existing app from the apps directory.
    pub async fn open_app(&self, app_id: &str) -> CoreResult<App> {
        if let Ok(handle) = self.registry.get(app_id).await {
            return Ok(handle.app().await);
        }

        let located = App::locate(&self.config.apps_dir()?, app_id)?;
        if !tokio::fs::metadata(&located.workdir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(CoreError::AppNotFound(app_id.to_string()));
        }

        let app = located.load_metadata().await?.unwrap_or(located);
        self.register(app.clone()).await?;
        self.ensure_initialized(app_id).await?;
        Ok(app)
    }

    /// Change an app's display name.
    pub async fn rename_app(&self, app_id: &str, name: &str) -> CoreResult<App> {
        traced(app_id, "rename", async {
            let handle = self.registry.get(app_id).await?;
            let app = handle.app().await.renamed(name);
            app.save_metadata().await?;
            handle.set_app(app.clone()).await;
            info!(name = %name, "Renamed app");
            Ok(app)
        })
        .await
    }

    /// Delete an app: subscribers, working directory and history together.
    pub async fn delete_app(&self, app_id: &str) -> CoreResult<()> {
        traced(app_id, "delete", async {
            let handle = self.registry.get(app_id).await?;
            let _section = handle.exclusive(self.config.lock_timeout()).await?;
            let app = handle.app().await;

            self.registry.unregister(app_id).await;
            remove_app_files(&app).await;
            info!("Deleted app");
            Ok(())
        })
        .await
    }

    /// All registered apps.
    pub async fn apps(&self) -> Vec<App> {
        self.registry.apps().await
    }

    /// Create the app's history if it does not exist yet.
    pub async fn ensure_initialized(&self, app_id: &str) -> CoreResult<SnapshotId> {
        traced(app_id, "ensure_initialized", async {
            let handle = self.registry.get(app_id).await?;
            let _section = handle.exclusive(self.config.lock_timeout()).await?;
            blocking(handle.store(), |store| store.ensure_initialized()).await
        })
        .await
    }

    /// Record the working tree as a new snapshot and notify subscribers of
    /// what changed since the previous one.
    pub async fn commit(&self, app_id: &str, message: &str) -> CoreResult<SnapshotId> {
        traced(app_id, "commit", async {
            let handle = self.registry.get(app_id).await?;
            let _section = handle.exclusive(self.config.lock_timeout()).await?;
            let (id, _, _) = self.commit_locked(&handle, message).await?;
            Ok(id)
        })
        .await
    }

    /// Rewind or replay the working tree to `snapshot` and notify
    /// subscribers of every file that changed.
    pub async fn checkout(&self, app_id: &str, snapshot: &str) -> CoreResult<ChangeSet> {
        traced(app_id, "checkout", async {
            let handle = self.registry.get(app_id).await?;
            let _section = handle.exclusive(self.config.lock_timeout()).await?;

            let target = snapshot.to_string();
            let changes = blocking(handle.store(), move |store| {
                store.checkout_snapshot(&target)
            })
            .instrument(appsnap_util::op_span!(app_id, "write_tree", snapshot))
            .await?;

            self.notify_locked(&handle, &changes).await;
            Ok(changes)
        })
        .await
    }

    /// Snapshots from the current one backwards, most recent first.
    pub async fn history(
        &self,
        app_id: &str,
        limit: Option<usize>,
    ) -> CoreResult<Vec<SnapshotSummary>> {
        traced(app_id, "history", async {
            let handle = self.registry.get(app_id).await?;
            blocking(handle.store(), move |store| store.list_history(limit)).await
        })
        .await
    }

    pub async fn current_snapshot(&self, app_id: &str) -> CoreResult<Option<SnapshotId>> {
        traced(app_id, "current", async {
            let handle = self.registry.get(app_id).await?;
            blocking(handle.store(), |store| store.current_snapshot()).await
        })
        .await
    }

    /// Change set between two snapshots.
    pub async fn diff(&self, app_id: &str, from: &str, to: &str) -> CoreResult<ChangeSet> {
        let (from, to) = (from.to_string(), to.to_string());
        traced(app_id, "diff", async {
            let handle = self.registry.get(app_id).await?;
            blocking(handle.store(), move |store| store.diff(&from, &to)).await
        })
        .await
    }

    /// Uncommitted changes in the working directory.
    pub async fn working_changes(&self, app_id: &str) -> CoreResult<ChangeSet> {
        traced(app_id, "status", async {
            let handle = self.registry.get(app_id).await?;
            blocking(handle.store(), |store| store.working_changes()).await
        })
        .await
    }

    /// Bytes of `path` as recorded in `snapshot`.
    pub async fn read_file_at(
        &self,
        app_id: &str,
        snapshot: &str,
        path: &str,
    ) -> CoreResult<Option<Vec<u8>>> {
        let (snapshot, path) = (snapshot.to_string(), path.to_string());
        traced(app_id, "read_file", async {
            let handle = self.registry.get(app_id).await?;
            blocking(handle.store(), move |store| store.read_file_at(&snapshot, &path)).await
        })
        .await
    }

    /// Unified diff of `path` between snapshot `from` and the working copy.
    pub async fn file_diff(&self, app_id: &str, from: &str, path: &str) -> CoreResult<String> {
        let (from, path) = (from.to_string(), path.to_string());
        traced(app_id, "file_diff", async {
            let handle = self.registry.get(app_id).await?;
            blocking(handle.store(), move |store| store.file_diff(&from, &path)).await
        })
        .await
    }

    /// Uncommitted work set aside by earlier checkouts.
    pub async fn set_aside_entries(&self, app_id: &str) -> CoreResult<Vec<SetAsideEntry>> {
        traced(app_id, "set_aside_list", async {
            let handle = self.registry.get(app_id).await?;
            blocking(handle.store(), |store| store.set_aside_entries()).await
        })
        .await
    }

    /// Re-apply set-aside work onto the working tree.
    pub async fn restore_set_aside(&self, app_id: &str, index: usize) -> CoreResult<()> {
        traced(app_id, "set_aside_restore", async {
            let handle = self.registry.get(app_id).await?;
            let _section = handle.exclusive(self.config.lock_timeout()).await?;
            blocking(handle.store(), move |store| store.restore_set_aside(index)).await
        })
        .await
    }

    pub async fn subscribe(&self, app_id: &str, subscriber: Arc<dyn Subscriber>) -> CoreResult<()> {
        self.registry.subscribe(app_id, subscriber).await
    }

    pub async fn unsubscribe(&self, app_id: &str, subscriber_id: &str) -> CoreResult<bool> {
        self.registry.unsubscribe(app_id, subscriber_id).await
    }

    /// Wait until every event published for the app so far was delivered.
    pub async fn flush(&self, app_id: &str) -> CoreResult<()> {
        self.registry.get(app_id).await?.flush().await;
        Ok(())
    }

    /// Ask the generator for `task`, apply its items, snapshot the result
    /// and notify subscribers.
    ///
    /// Generation happens outside the app's exclusive section; applying and
    /// recording happen inside it.
    pub async fn run_task(
        &self,
        app_id: &str,
        generator: &dyn ContentGenerator,
        task: &str,
        policy: RetryPolicy,
    ) -> CoreResult<TaskOutcome> {
        let task_id = Identifier::task();
        traced(app_id, "run_task", async {
            let handle = self.registry.get(app_id).await?;
            let items = generate_with_retry(generator, task, policy).await?;

            let _section = handle.exclusive(self.config.lock_timeout()).await?;
            let applied = apply_items(handle.store().workdir(), &items).await?;
            let (snapshot, changes, notifications) =
                self.commit_locked(&handle, &task_message(task)).await?;

            info!(task_id = %task_id, snapshot = %snapshot, "Task recorded");
            Ok(TaskOutcome {
                task_id: task_id.clone(),
                snapshot,
                changes,
                applied,
                notifications,
            })
        })
        .await
    }

    /// Commit while the caller holds the exclusive section.
    async fn commit_locked(
        &self,
        handle: &AppHandle,
        message: &str,
    ) -> CoreResult<(SnapshotId, ChangeSet, NotificationReport)> {
        let message = message.to_string();
        let (id, changes) = blocking(handle.store(), move |store| {
            let previous = store.current_snapshot()?;
            let id = store.create_snapshot(&message)?;
            let changes = match previous {
                Some(previous) => store.diff(previous.as_str(), id.as_str())?,
                None => ChangeSet::new(),
            };
            Ok((id, changes))
        })
        .await?;

        let report = self.notify_locked(handle, &changes).await;
        Ok((id, changes, report))
    }

    /// Read changed files and queue their events. Runs inside the exclusive
    /// section so contents match the snapshot just written.
    async fn notify_locked(&self, handle: &AppHandle, changes: &ChangeSet) -> NotificationReport {
        let _timing = TimingGuard::new(handle.id(), "notify");
        let report = collect_events(handle.id(), handle.store().workdir(), changes).await;
        if !report.is_complete() {
            warn!(
                failed = report.failures.len(),
                delivered = report.events.len(),
                "Some changed files could not be read"
            );
        }
        handle.publish(report.events.clone());
        report
    }
}

/// Run blocking store work on the blocking pool.
async fn blocking<T, F>(store: &SnapshotStore, f: F) -> CoreResult<T>
where
    F: FnOnce(&SnapshotStore) -> SnapshotResult<T> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    Ok(tokio::task::spawn_blocking(move || f(&store)).await??)
}

/// Run `fut` inside the operation span, timing it and logging failures.
async fn traced<T, F>(app_id: &str, op: &'static str, fut: F) -> CoreResult<T>
where
    F: Future<Output = CoreResult<T>>,
{
    let span = appsnap_util::op_span!(app_id, op);
    let _timing = TimingGuard::new(app_id, op);
    let result = fut.instrument(span.clone()).await;
    if let Err(e) = &result {
        span.in_scope(|| error!(error = %e, kind = e.kind(), "Operation failed"));
    }
    result
}

fn task_message(task: &str) -> String {
    let first_line = task.lines().next().unwrap_or("").trim();
    if first_line.is_empty() {
        return "Generated changes".to_string();
    }
    if first_line.chars().count() <= TASK_MESSAGE_LEN {
        return first_line.to_string();
    }
    let truncated: String = first_line.chars().take(TASK_MESSAGE_LEN - 3).collect();
    format!("{truncated}...")
}

async fn remove_app_files(app: &App) {
    if let Err(e) = tokio::fs::remove_dir_all(&app.workdir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(app_id = %app.id, error = %e, "Failed to remove app directory");
        }
    }
    if let Err(e) = tokio::fs::remove_file(app.metadata_path()).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(app_id = %app.id, error = %e, "Failed to remove app metadata");
        }
    }
}
