//! Snapshot data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SHORT_ID_LEN: usize = 7;

/// Trailer carrying a fresh ULID in every snapshot's commit message.
///
/// Two snapshots with identical trees, parents, messages and timestamps
/// still hash to different ids.
pub(crate) const NONCE_TRAILER: &str = "Snapshot-Nonce";

/// Append the nonce trailer to a snapshot message.
pub(crate) fn with_nonce(message: &str) -> String {
    format!(
        "{}\n\n{NONCE_TRAILER}: {}\n",
        message.trim_end(),
        ulid::Ulid::new().to_string().to_lowercase()
    )
}

/// The caller's message, without the nonce trailer.
pub(crate) fn without_nonce(raw: &str) -> &str {
    let marker = format!("\n\n{NONCE_TRAILER}: ");
    match raw.rfind(&marker) {
        Some(at) => &raw[..at],
        None => raw.trim_end(),
    }
}

/// Content-addressed identifier of a snapshot.
///
/// This is the full hex object id of the commit recording the snapshot, so it
/// covers the tree contents, the parent link and the commit metadata,
/// including a per-snapshot nonce, so ids are never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Wrap a full hex id.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for display (first 7 characters).
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_ID_LEN) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }

    pub(crate) fn from_oid(oid: git2::Oid) -> Self {
        Self(oid.to_string())
    }

    #[cfg(test)]
    pub(crate) fn to_oid(&self) -> Option<git2::Oid> {
        git2::Oid::from_str(&self.0).ok()
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SnapshotId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Read-only view of one snapshot in an app's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    /// Full snapshot id.
    pub id: SnapshotId,
    /// Abbreviated id (7 characters).
    pub short_id: String,
    /// Snapshot message.
    pub message: String,
    /// Author name.
    pub author: String,
    /// Author email.
    pub email: String,
    /// When the snapshot was recorded.
    pub timestamp: DateTime<Utc>,
    /// Parent snapshot; `None` for the initial snapshot.
    pub parent: Option<SnapshotId>,
}

impl SnapshotSummary {
    pub(crate) fn from_commit(commit: &git2::Commit) -> Self {
        let id = SnapshotId::from_oid(commit.id());
        let author = commit.author();
        Self {
            short_id: id.short().to_string(),
            id,
            message: without_nonce(commit.message().unwrap_or("")).to_string(),
            author: author.name().unwrap_or("").to_string(),
            email: author.email().unwrap_or("").to_string(),
            timestamp: DateTime::<Utc>::from_timestamp(commit.time().seconds(), 0)
                .unwrap_or_default(),
            parent: commit.parent_id(0).ok().map(SnapshotId::from_oid),
        }
    }

    /// Whether this is the first snapshot of the history.
    pub fn is_initial(&self) -> bool {
        self.parent.is_none()
    }
}

/// Uncommitted changes that were set aside before a checkout.
///
/// Entries stay in the store until explicitly restored, so a rewind never
/// loses work that had not been snapshotted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetAsideEntry {
    /// Position in the set-aside stack (0 is the most recent).
    pub index: usize,
    /// Description recorded when the changes were set aside.
    pub message: String,
    /// Object id of the preserved state.
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_id_short_form() {
        let id = SnapshotId::from_string("0123456789abcdef0123456789abcdef01234567");
        assert_eq!(id.short(), "0123456");
        assert_eq!(id.to_string(), id.as_str());
    }

    #[test]
    fn snapshot_id_short_form_of_short_input() {
        let id = SnapshotId::from_string("abc");
        assert_eq!(id.short(), "abc");
        assert!(id.to_oid().is_none());
    }

    #[test]
    fn snapshot_id_short_form_respects_char_boundaries() {
        let id = SnapshotId::from_string("ééééééééé");
        assert_eq!(id.short(), "ééééééé");
        assert!(id.to_oid().is_none());
    }

    #[test]
    fn nonce_trailer_is_hidden_from_messages() {
        let raw = with_nonce("Add landing page\n");
        assert!(raw.contains("\n\nSnapshot-Nonce: "));
        assert_eq!(without_nonce(&raw), "Add landing page");
        assert_ne!(with_nonce("same"), with_nonce("same"));
        assert_eq!(without_nonce("legacy message\n"), "legacy message");
    }

    #[test]
    fn snapshot_id_serializes_as_plain_string() {
        let id = SnapshotId::from_string("abc1234");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""abc1234""#);
    }

    #[test]
    fn summary_serializes_for_history_display() {
        let summary = SnapshotSummary {
            id: SnapshotId::from_string("abc1234567890"),
            short_id: "abc1234".to_string(),
            message: "Add landing page".to_string(),
            author: "appsnap".to_string(),
            email: "appsnap@localhost".to_string(),
            timestamp: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
            parent: None,
        };

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains(r#""short_id":"abc1234""#));
        assert!(json.contains(r#""message":"Add landing page""#));
        assert!(json.contains(r#""parent":null"#));
        assert!(summary.is_initial());
    }
}
