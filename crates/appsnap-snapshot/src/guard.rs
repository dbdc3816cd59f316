//! Working-tree guard.
//!
//! Keeps checkouts starting from a clean tree and repairs trees left behind
//! by an interrupted checkout.
//!
//! A checkout is bracketed by a marker file inside the repository directory:
//! ```text
//! <workdir>/.git/
//!   appsnap-checkout.json   # {"from": <id>, "to": <id>, "started_at": ...}
//! ```
//! The marker is written before the tree is touched and removed after the
//! current pointer has moved. Finding it on a later access means the process
//! stopped in between; the tree is set aside and then forced back to
//! whatever snapshot the pointer names, which is always one of the two
//! endpoints because the pointer itself is updated atomically.

use crate::diff::working_changes;
use crate::{ChangeSet, SetAsideEntry, SnapshotError, SnapshotResult, StoreConfig};
use chrono::{DateTime, Utc};
use git2::build::CheckoutBuilder;
use git2::{Commit, Oid, Repository, Signature, StashFlags};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

const MARKER_FILE: &str = "appsnap-checkout.json";

/// Which endpoint an interrupted checkout was recovered to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "endpoint", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// The pointer had not moved: the pre-checkout tree was restored.
    RolledBack { snapshot: String },
    /// The pointer had already moved: the target tree was completed.
    RolledForward { snapshot: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckoutMarker {
    from: String,
    to: String,
    started_at: DateTime<Utc>,
}

pub(crate) struct WorkingTreeGuard<'a> {
    config: &'a StoreConfig,
}

impl<'a> WorkingTreeGuard<'a> {
    pub(crate) fn new(config: &'a StoreConfig) -> Self {
        Self { config }
    }

    fn marker_path(repo: &Repository) -> PathBuf {
        repo.path().join(MARKER_FILE)
    }

    /// Whether an interrupted checkout left its marker behind.
    pub(crate) fn has_pending_checkout(repo: &Repository) -> bool {
        Self::marker_path(repo).exists()
    }

    /// Set aside uncommitted changes so `head` describes the tree exactly.
    ///
    /// Returns the set-aside entry when there was anything to preserve.
    pub(crate) fn ensure_clean(
        &self,
        repo: &mut Repository,
        head: Oid,
        reason: &str,
    ) -> SnapshotResult<Option<SetAsideEntry>> {
        let include_ignored = !self.config.respect_ignore_files;
        let drift = drift_from(repo, head, include_ignored)?;

        if drift.is_empty() {
            debug!("Working tree clean");
            return Ok(None);
        }

        info!(
            added = drift.added.len(),
            modified = drift.modified.len(),
            deleted = drift.deleted.len(),
            "Setting aside uncommitted changes"
        );

        let mut flags = StashFlags::INCLUDE_UNTRACKED;
        if include_ignored {
            flags |= StashFlags::INCLUDE_IGNORED;
        }

        let sig = Signature::now(&self.config.author_name, &self.config.author_email)
            .map_err(|e| SnapshotError::DirtyTreeRecovery(e.to_string()))?;
        let message = format!("appsnap: {reason}");
        let stash_id = repo
            .stash_save(&sig, &message, Some(flags))
            .map_err(|e| SnapshotError::DirtyTreeRecovery(format!("set-aside failed: {e}")))?;

        let remaining = drift_from(repo, head, include_ignored)?;
        if !remaining.is_empty() {
            return Err(SnapshotError::DirtyTreeRecovery(format!(
                "{} paths still differ after set-aside {}",
                remaining.len(),
                stash_id
            )));
        }

        Ok(Some(SetAsideEntry {
            index: 0,
            message,
            id: stash_id.to_string(),
        }))
    }

    /// Record that a checkout from `from` to `to` is about to touch the tree.
    pub(crate) fn begin_checkout(
        &self,
        repo: &Repository,
        from: &str,
        to: &str,
    ) -> SnapshotResult<()> {
        let marker = CheckoutMarker {
            from: from.to_string(),
            to: to.to_string(),
            started_at: Utc::now(),
        };
        let path = Self::marker_path(repo);
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, serde_json::to_vec_pretty(&marker)?)?;
        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    /// Clear the marker once the pointer has moved.
    pub(crate) fn finish_checkout(&self, repo: &Repository) -> SnapshotResult<()> {
        match fs::remove_file(Self::marker_path(repo)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Restore a consistent tree if a checkout was interrupted.
    ///
    /// Whatever differs from the current snapshot, including files written
    /// after the interruption, is set aside before the tree is forced.
    pub(crate) fn recover(&self, repo: &mut Repository) -> SnapshotResult<Option<RecoveryOutcome>> {
        let path = Self::marker_path(repo);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let marker: Option<CheckoutMarker> = match serde_json::from_slice(&raw) {
            Ok(marker) => Some(marker),
            Err(e) => {
                warn!(error = %e, "Unreadable checkout marker, restoring current snapshot");
                None
            }
        };

        let head = repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(|e| SnapshotError::Corrupted(format!("no current snapshot: {e}")))?
            .id();
        let current = head.to_string();

        let outcome = match &marker {
            Some(m) if m.to == current => RecoveryOutcome::RolledForward {
                snapshot: current.clone(),
            },
            Some(m) if m.from == current => RecoveryOutcome::RolledBack {
                snapshot: current.clone(),
            },
            Some(m) => {
                warn!(
                    from = %m.from,
                    to = %m.to,
                    current = %current,
                    "Current snapshot matches neither checkout endpoint"
                );
                RecoveryOutcome::RolledBack {
                    snapshot: current.clone(),
                }
            }
            None => RecoveryOutcome::RolledBack {
                snapshot: current.clone(),
            },
        };

        if let Some(entry) = self.ensure_clean(repo, head, "recovering interrupted checkout")? {
            info!(stash = %entry.id, "Interrupted tree set aside");
        }
        self.restore_tree(repo, &repo.find_commit(head)?)?;

        self.finish_checkout(repo)?;

        match &outcome {
            RecoveryOutcome::RolledForward { snapshot } => {
                warn!(snapshot = %snapshot, "Recovered interrupted checkout: completed target tree")
            }
            RecoveryOutcome::RolledBack { snapshot } => {
                warn!(snapshot = %snapshot, "Recovered interrupted checkout: restored previous tree")
            }
        }

        Ok(Some(outcome))
    }

    /// Force the tree back to `commit` after a failed checkout step.
    pub(crate) fn restore_tree(&self, repo: &Repository, commit: &Commit) -> SnapshotResult<()> {
        let mut checkout = CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
        Ok(())
    }
}

fn drift_from(repo: &Repository, head: Oid, include_ignored: bool) -> SnapshotResult<ChangeSet> {
    let tree = repo.find_commit(head)?.tree()?;
    working_changes(repo, &tree, include_ignored)
        .map_err(|e| SnapshotError::DirtyTreeRecovery(format!("status failed: {e}")))
}

/// List preserved set-aside entries, most recent first.
pub(crate) fn set_aside_entries(repo: &mut Repository) -> SnapshotResult<Vec<SetAsideEntry>> {
    let mut entries = Vec::new();
    repo.stash_foreach(|index, message, id| {
        entries.push(SetAsideEntry {
            index,
            message: message.to_string(),
            id: id.to_string(),
        });
        true
    })?;
    Ok(entries)
}
