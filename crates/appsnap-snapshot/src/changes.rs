//! Change sets between two trees.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a path differs between two trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified difference between two trees.
///
/// Paths are relative, forward-slash separated and compared case-sensitively.
/// A path is in at most one of the three sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a path. A path already present in another set is moved.
    pub fn insert(&mut self, path: impl Into<String>, kind: ChangeKind) {
        let path = path.into();
        self.remove(&path);
        match kind {
            ChangeKind::Added => self.added.insert(path),
            ChangeKind::Modified => self.modified.insert(path),
            ChangeKind::Deleted => self.deleted.insert(path),
        };
    }

    fn remove(&mut self, path: &str) {
        self.added.remove(path);
        self.modified.remove(path);
        self.deleted.remove(path);
    }

    /// Classification of `path`, if it changed.
    pub fn kind_of(&self, path: &str) -> Option<ChangeKind> {
        if self.added.contains(path) {
            Some(ChangeKind::Added)
        } else if self.modified.contains(path) {
            Some(ChangeKind::Modified)
        } else if self.deleted.contains(path) {
            Some(ChangeKind::Deleted)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Number of changed paths.
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    /// Iterate every changed path with its classification.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ChangeKind)> {
        self.added
            .iter()
            .map(|p| (p.as_str(), ChangeKind::Added))
            .chain(self.modified.iter().map(|p| (p.as_str(), ChangeKind::Modified)))
            .chain(self.deleted.iter().map(|p| (p.as_str(), ChangeKind::Deleted)))
    }

    /// The change set of the opposite direction.
    pub fn reversed(&self) -> Self {
        Self {
            added: self.deleted.clone(),
            modified: self.modified.clone(),
            deleted: self.added.clone(),
        }
    }
}
