//! Snapshot error types.

use thiserror::Error;

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Errors that can occur during snapshot operations.
///
/// Every variant except [`SnapshotError::Io`] and [`SnapshotError::Git`]
/// leaves the app's current snapshot pointer and working tree as they were
/// before the failed operation started.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The working directory could not be turned into a tracked store.
    #[error("Cannot initialize snapshot history at {path}: {message}")]
    RepositoryInit { path: String, message: String },

    /// The store has no history yet.
    #[error("Snapshot history not initialized at {0}")]
    NotInitialized(String),

    /// Requested snapshot id is not part of this app's history.
    #[error("Unknown snapshot: {0}")]
    UnknownSnapshot(String),

    /// Uncommitted changes could not be set aside before a checkout.
    #[error("Could not reach a clean working tree: {0}")]
    DirtyTreeRecovery(String),

    /// Writing the target tree failed and the previous tree was restored.
    #[error("Checkout failed: {0}")]
    Checkout(String),

    /// On-disk history is in a state recovery cannot repair.
    #[error("Snapshot storage corrupted: {0}")]
    Corrupted(String),

    /// Underlying repository error.
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SnapshotError {
    /// Create a repository init error.
    pub fn repository_init(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        Self::RepositoryInit {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    /// Create an unknown snapshot error.
    pub fn unknown(id: impl Into<String>) -> Self {
        Self::UnknownSnapshot(id.into())
    }

    /// Short, stable name of the error kind for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RepositoryInit { .. } => "repository_init",
            Self::NotInitialized(_) => "not_initialized",
            Self::UnknownSnapshot(_) => "unknown_snapshot",
            Self::DirtyTreeRecovery(_) => "dirty_tree_recovery",
            Self::Checkout(_) => "checkout",
            Self::Corrupted(_) => "corrupted",
            Self::Git(_) => "git",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}
