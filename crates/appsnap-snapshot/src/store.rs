//! Snapshot store for one app working directory.

use crate::diff::{tree_changes, unified_diff, working_changes};
use crate::guard::{set_aside_entries, RecoveryOutcome, WorkingTreeGuard};
use crate::snapshot::with_nonce;
use crate::{ChangeSet, SetAsideEntry, SnapshotError, SnapshotId, SnapshotResult, SnapshotSummary};
use appsnap_util::path::normalize_relative;
use git2::build::CheckoutBuilder;
use git2::{
    Commit, ErrorCode, IndexAddOption, ObjectType, Oid, Repository, RepositoryInitOptions,
    Signature,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Message of the snapshot recorded by [`SnapshotStore::ensure_initialized`].
pub const INITIAL_MESSAGE: &str = "Initial snapshot";

/// Every snapshot keeps a ref under this prefix. The ref both marks the
/// commit as part of the app's history and keeps it alive after a rewind
/// moves the current pointer behind it.
const SNAPSHOT_REF_PREFIX: &str = "refs/snapshots/";

/// Shortest accepted snapshot id prefix.
const MIN_ID_PREFIX: usize = 4;

/// Configuration for a snapshot store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Author recorded on every snapshot.
    pub author_name: String,

    /// Author email recorded on every snapshot.
    pub author_email: String,

    /// Honour `.gitignore` rules when capturing the tree.
    pub respect_ignore_files: bool,

    /// Default number of entries returned by [`SnapshotStore::list_history`].
    pub history_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            author_name: "appsnap".to_string(),
            author_email: "appsnap@localhost".to_string(),
            respect_ignore_files: false,
            history_limit: 100,
        }
    }
}

/// Versioned history of one app working directory.
///
/// History lives in a repository inside the working directory:
/// ```text
/// <workdir>/
///   .git/
///     HEAD                      # current pointer
///     refs/snapshots/<id>       # one ref per snapshot ever recorded
///     appsnap-checkout.json     # present only while a checkout runs
///   <app files>
/// ```
///
/// All methods are blocking. Callers serialize the mutating ones
/// (`ensure_initialized`, `create_snapshot`, `checkout_snapshot`,
/// `restore_set_aside`, `recover`) per app; the read-only ones may run at any
/// time and read the current pointer once per call.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    workdir: PathBuf,
    config: StoreConfig,
}

impl SnapshotStore {
    /// Create a store handle. Nothing is touched on disk until
    /// [`ensure_initialized`](Self::ensure_initialized).
    pub fn new(workdir: impl Into<PathBuf>, config: StoreConfig) -> Self {
        Self {
            workdir: workdir.into(),
            config,
        }
    }

    /// The working directory this store versions.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Whether the history exists and has at least one snapshot.
    pub fn is_initialized(&self) -> bool {
        matches!(self.open(), Ok(Some(repo)) if matches!(head_oid(&repo), Ok(Some(_))))
    }

    /// Whether an interrupted checkout is waiting for recovery.
    pub fn has_interrupted_checkout(&self) -> bool {
        matches!(self.open(), Ok(Some(repo)) if WorkingTreeGuard::has_pending_checkout(&repo))
    }

    /// Create the history with an initial snapshot of the current tree.
    ///
    /// Idempotent: an existing history is recovered if needed and its current
    /// snapshot returned. A failure while creating a new history removes it
    /// again, so the store is either fully initialized or absent.
    pub fn ensure_initialized(&self) -> SnapshotResult<SnapshotId> {
        if !self.workdir.is_dir() {
            return Err(SnapshotError::repository_init(
                &self.workdir,
                "working directory does not exist",
            ));
        }

        if let Some(mut repo) = self.open()? {
            WorkingTreeGuard::new(&self.config).recover(&mut repo)?;
            if let Some(head) = head_oid(&repo)? {
                self.adopt_chain(&repo, head)?;
                debug!(snapshot = %head, "History already initialized");
                return Ok(SnapshotId::from_oid(head));
            }

            // History exists but never got its first snapshot.
            let oid = self
                .record(&repo, INITIAL_MESSAGE, None)
                .map_err(|e| SnapshotError::repository_init(&self.workdir, e))?;
            info!(snapshot = %oid, "Completed initial snapshot");
            return Ok(SnapshotId::from_oid(oid));
        }

        let mut opts = RepositoryInitOptions::new();
        opts.no_reinit(true).initial_head("main");
        let repo = Repository::init_opts(&self.workdir, &opts)
            .map_err(|e| SnapshotError::repository_init(&self.workdir, e))?;

        match self.record(&repo, INITIAL_MESSAGE, None) {
            Ok(oid) => {
                info!(
                    workdir = %self.workdir.display(),
                    snapshot = %oid,
                    "Initialized snapshot history"
                );
                Ok(SnapshotId::from_oid(oid))
            }
            Err(e) => {
                let git_dir = repo.path().to_path_buf();
                drop(repo);
                if let Err(cleanup) = fs::remove_dir_all(&git_dir) {
                    warn!(
                        path = %git_dir.display(),
                        error = %cleanup,
                        "Failed to remove half-created history"
                    );
                }
                Err(SnapshotError::repository_init(&self.workdir, e))
            }
        }
    }

    /// Record the entire working tree as a new snapshot and move the current
    /// pointer to it.
    pub fn create_snapshot(&self, message: &str) -> SnapshotResult<SnapshotId> {
        let mut repo = self.open_required()?;
        WorkingTreeGuard::new(&self.config).recover(&mut repo)?;

        let parent = match head_oid(&repo)? {
            Some(oid) => Some(repo.find_commit(oid)?),
            None => None,
        };
        let oid = self.record(&repo, message, parent.as_ref())?;

        info!(snapshot = %oid, message = %message, "Created snapshot");
        Ok(SnapshotId::from_oid(oid))
    }

    /// Replace the working tree with snapshot `id` and move the pointer to it.
    ///
    /// Returns the change set from the previous current snapshot to the
    /// target. Uncommitted changes are set aside first and stay available
    /// through [`set_aside_entries`](Self::set_aside_entries). An unknown id
    /// fails before anything is touched.
    pub fn checkout_snapshot(&self, id: &str) -> SnapshotResult<ChangeSet> {
        let mut repo = self.open_required()?;
        let guard = WorkingTreeGuard::new(&self.config);
        guard.recover(&mut repo)?;

        let target = self.resolve(&repo, id)?.id();
        let current = head_oid(&repo)?
            .ok_or_else(|| SnapshotError::NotInitialized(self.workdir.display().to_string()))?;

        let changes = {
            let from = repo.find_commit(current)?.tree()?;
            let to = repo.find_commit(target)?.tree()?;
            tree_changes(&repo, &from, &to)?
        };

        let reason = format!("before checkout of {}", &target.to_string()[..7]);
        if let Some(entry) = guard.ensure_clean(&mut repo, current, &reason)? {
            info!(stash = %entry.id, "Uncommitted changes set aside");
        }

        if current == target {
            debug!(snapshot = %target, "Already at requested snapshot");
            return Ok(changes);
        }

        guard.begin_checkout(&repo, &current.to_string(), &target.to_string())?;

        if let Err(e) = self.switch_to(&repo, target) {
            warn!(from = %current, to = %target, error = %e, "Checkout failed, restoring previous tree");
            guard.restore_tree(&repo, &repo.find_commit(current)?)?;
            guard.finish_checkout(&repo)?;
            return Err(SnapshotError::Checkout(e.to_string()));
        }

        guard.finish_checkout(&repo)?;

        info!(
            from = %current,
            to = %target,
            added = changes.added.len(),
            modified = changes.modified.len(),
            deleted = changes.deleted.len(),
            "Checked out snapshot"
        );
        Ok(changes)
    }

    /// Snapshots from the current pointer back to the initial one, most
    /// recent first. `None` uses the configured default limit.
    ///
    /// A store without history yields an empty list.
    pub fn list_history(&self, limit: Option<usize>) -> SnapshotResult<Vec<SnapshotSummary>> {
        let limit = limit.unwrap_or(self.config.history_limit);
        let Some(repo) = self.open()? else {
            return Ok(Vec::new());
        };
        let Some(head) = head_oid(&repo)? else {
            return Ok(Vec::new());
        };

        let mut history = Vec::new();
        let mut next = Some(repo.find_commit(head)?);
        while let Some(commit) = next {
            if history.len() >= limit {
                break;
            }
            history.push(SnapshotSummary::from_commit(&commit));
            next = commit.parent(0).ok();
        }

        Ok(history)
    }

    /// Id of the snapshot the working tree is based on.
    pub fn current_snapshot(&self) -> SnapshotResult<Option<SnapshotId>> {
        match self.open()? {
            Some(repo) => Ok(head_oid(&repo)?.map(SnapshotId::from_oid)),
            None => Ok(None),
        }
    }

    /// Summary of one snapshot.
    pub fn snapshot(&self, id: &str) -> SnapshotResult<SnapshotSummary> {
        let repo = self.open_required()?;
        let commit = self.resolve(&repo, id)?;
        Ok(SnapshotSummary::from_commit(&commit))
    }

    /// Change set between two snapshots. Pure: nothing on disk changes.
    pub fn diff(&self, from: &str, to: &str) -> SnapshotResult<ChangeSet> {
        let repo = self.open_required()?;
        let from = self.resolve(&repo, from)?.tree()?;
        let to = self.resolve(&repo, to)?.tree()?;
        tree_changes(&repo, &from, &to)
    }

    /// Uncommitted changes relative to the current snapshot.
    pub fn working_changes(&self) -> SnapshotResult<ChangeSet> {
        let repo = self.open_required()?;
        let head = head_oid(&repo)?
            .ok_or_else(|| SnapshotError::NotInitialized(self.workdir.display().to_string()))?;
        let tree = repo.find_commit(head)?.tree()?;
        working_changes(&repo, &tree, !self.config.respect_ignore_files)
    }

    /// Bytes of `path` as recorded in snapshot `id`, or `None` when the
    /// snapshot has no such file.
    pub fn read_file_at(&self, id: &str, path: &str) -> SnapshotResult<Option<Vec<u8>>> {
        let repo = self.open_required()?;
        let tree = self.resolve(&repo, id)?.tree()?;
        let path = normalize_relative(path);

        let entry = match tree.get_path(Path::new(&path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if entry.kind() != Some(ObjectType::Blob) {
            return Ok(None);
        }

        let blob = repo.find_blob(entry.id())?;
        Ok(Some(blob.content().to_vec()))
    }

    /// Unified text diff of `path` between snapshot `id` and the working copy.
    pub fn file_diff(&self, id: &str, path: &str) -> SnapshotResult<String> {
        let path = normalize_relative(path);
        let old = self.read_file_at(id, &path)?.unwrap_or_default();
        let new = match fs::read(self.workdir.join(&path)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(unified_diff(
            &String::from_utf8_lossy(&old),
            &String::from_utf8_lossy(&new),
            &path,
        ))
    }

    /// Changes set aside by earlier checkouts, most recent first.
    pub fn set_aside_entries(&self) -> SnapshotResult<Vec<SetAsideEntry>> {
        match self.open()? {
            Some(mut repo) => set_aside_entries(&mut repo),
            None => Ok(Vec::new()),
        }
    }

    /// Re-apply set-aside entry `index` onto the working tree and drop it.
    pub fn restore_set_aside(&self, index: usize) -> SnapshotResult<()> {
        let mut repo = self.open_required()?;
        repo.stash_pop(index, None)?;
        info!(index, "Restored set-aside changes");
        Ok(())
    }

    /// Repair the tree after an interrupted checkout, if there was one.
    pub fn recover(&self) -> SnapshotResult<Option<RecoveryOutcome>> {
        match self.open()? {
            Some(mut repo) => WorkingTreeGuard::new(&self.config).recover(&mut repo),
            None => Ok(None),
        }
    }

    fn open(&self) -> SnapshotResult<Option<Repository>> {
        match Repository::open(&self.workdir) {
            Ok(repo) => Ok(Some(repo)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn open_required(&self) -> SnapshotResult<Repository> {
        self.open()?
            .ok_or_else(|| SnapshotError::NotInitialized(self.workdir.display().to_string()))
    }

    fn signature(&self) -> SnapshotResult<Signature<'static>> {
        Ok(Signature::now(
            &self.config.author_name,
            &self.config.author_email,
        )?)
    }

    /// Commit the whole working tree on top of `parent` and make it current.
    fn record(
        &self,
        repo: &Repository,
        message: &str,
        parent: Option<&Commit>,
    ) -> SnapshotResult<Oid> {
        let mut index = repo.index()?;
        index.clear()?;
        let flags = if self.config.respect_ignore_files {
            IndexAddOption::DEFAULT
        } else {
            IndexAddOption::FORCE
        };
        index.add_all(["*"].iter(), flags, None)?;
        index.write()?;

        let tree = repo.find_tree(index.write_tree()?)?;
        let sig = self.signature()?;
        let parents: Vec<&Commit> = parent.into_iter().collect();
        let oid = repo.commit(None, &sig, &sig, &with_nonce(message), &tree, &parents)?;

        register(repo, oid)?;
        move_pointer(repo, oid, message)?;
        Ok(oid)
    }

    fn switch_to(&self, repo: &Repository, target: Oid) -> SnapshotResult<()> {
        let commit = repo.find_commit(target)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
        move_pointer(repo, target, "checkout")?;
        Ok(())
    }

    /// Find the snapshot named by a full id or a unique prefix of one.
    fn resolve<'r>(&self, repo: &'r Repository, id: &str) -> SnapshotResult<Commit<'r>> {
        let needle = id.trim().to_ascii_lowercase();
        if needle.len() < MIN_ID_PREFIX || !needle.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SnapshotError::unknown(id));
        }

        let mut found: Option<String> = None;
        let mut refs = repo.references_glob(&format!("{SNAPSHOT_REF_PREFIX}*"))?;
        for name in refs.names() {
            let hex = name?.trim_start_matches(SNAPSHOT_REF_PREFIX);
            if !hex.starts_with(&needle) {
                continue;
            }
            if found.is_some() {
                debug!(prefix = %needle, "Ambiguous snapshot prefix");
                return Err(SnapshotError::unknown(id));
            }
            found = Some(hex.to_string());
        }

        let hex = found.ok_or_else(|| SnapshotError::unknown(id))?;
        let oid = Oid::from_str(&hex)?;
        repo.find_commit(oid)
            .map_err(|e| SnapshotError::Corrupted(format!("snapshot {hex} unreadable: {e}")))
    }

    /// Register every snapshot on the chain ending at `head` that is not yet
    /// known, for histories created outside the store.
    fn adopt_chain(&self, repo: &Repository, head: Oid) -> SnapshotResult<()> {
        if repo.find_reference(&snapshot_ref(head)).is_ok() {
            return Ok(());
        }

        let mut adopted = 0usize;
        let mut next = Some(repo.find_commit(head)?);
        while let Some(commit) = next {
            if repo.find_reference(&snapshot_ref(commit.id())).is_ok() {
                break;
            }
            register(repo, commit.id())?;
            adopted += 1;
            next = commit.parent(0).ok();
        }

        info!(adopted, "Registered existing history");
        Ok(())
    }
}

fn snapshot_ref(oid: Oid) -> String {
    format!("{SNAPSHOT_REF_PREFIX}{oid}")
}

fn register(repo: &Repository, oid: Oid) -> SnapshotResult<()> {
    repo.reference(&snapshot_ref(oid), oid, true, "snapshot")?;
    Ok(())
}

/// Point the current pointer at `oid`. Ref updates are a single rename on
/// disk, so readers see either the old or the new snapshot.
fn move_pointer(repo: &Repository, oid: Oid, message: &str) -> SnapshotResult<()> {
    let head = repo.find_reference("HEAD")?;
    match head.symbolic_target().map(str::to_string) {
        Some(branch) => {
            repo.reference(&branch, oid, true, message)?;
        }
        None => repo.set_head_detached(oid)?,
    }
    Ok(())
}

fn head_oid(repo: &Repository) -> SnapshotResult<Option<Oid>> {
    match repo.head() {
        Ok(head) => Ok(head.target()),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
