//! Change notifier.
//!
//! Turns a change set into one event per changed path by reading the
//! current bytes from the working directory.

use crate::subscriber::{FileContent, FileEvent};
use appsnap_snapshot::{ChangeKind, ChangeSet};
use appsnap_util::path::safe_join;
use serde::Serialize;
use std::path::Path;
use tracing::warn;

/// A path whose contents could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReadFailure {
    pub path: String,
    pub error: String,
}

/// Events built for a change set, plus the paths that could not be read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationReport {
    pub events: Vec<FileEvent>,
    pub failures: Vec<FileReadFailure>,
}

impl NotificationReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Build events for `changes`, reading contents from `workdir`.
///
/// Every path appears exactly once, either as an event or as a failure.
/// A read failure never stops the remaining paths.
pub async fn collect_events(app_id: &str, workdir: &Path, changes: &ChangeSet) -> NotificationReport {
    let mut report = NotificationReport::default();

    for (path, kind) in changes.iter() {
        if kind == ChangeKind::Deleted {
            report.events.push(FileEvent::deleted(app_id, path));
            continue;
        }

        match read_file(workdir, path).await {
            Ok(bytes) => report.events.push(FileEvent::changed(
                app_id,
                path,
                kind,
                FileContent::from_bytes(bytes),
            )),
            Err(e) => {
                warn!(app_id = %app_id, path = %path, error = %e, "Failed to read changed file");
                report.failures.push(FileReadFailure {
                    path: path.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    report
}

async fn read_file(workdir: &Path, path: &str) -> std::io::Result<Vec<u8>> {
    let full = safe_join(workdir, Path::new(path)).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("path escapes working directory: {path}"),
        )
    })?;
    tokio::fs::read(full).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reads_each_changed_path_once() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "1").await.unwrap();
        tokio::fs::write(dir.path().join("new.txt"), "fresh").await.unwrap();

        let mut changes = ChangeSet::new();
        changes.insert("a.txt", ChangeKind::Modified);
        changes.insert("new.txt", ChangeKind::Added);
        changes.insert("b.txt", ChangeKind::Deleted);

        let report = collect_events("app_1", dir.path(), &changes).await;

        assert!(report.is_complete());
        assert_eq!(report.events.len(), 3);
        let modified = report.events.iter().find(|e| e.path == "a.txt").unwrap();
        assert_eq!(modified.kind, ChangeKind::Modified);
        assert_eq!(modified.content.as_ref().and_then(|c| c.as_text()), Some("1"));
        let deleted = report.events.iter().find(|e| e.path == "b.txt").unwrap();
        assert!(deleted.content.is_none());
    }

    #[tokio::test]
    async fn unreadable_path_is_reported_not_fatal() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("ok.txt"), "fine").await.unwrap();

        let mut changes = ChangeSet::new();
        changes.insert("missing.txt", ChangeKind::Added);
        changes.insert("ok.txt", ChangeKind::Added);
        changes.insert("../outside.txt", ChangeKind::Modified);

        let report = collect_events("app_1", dir.path(), &changes).await;

        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].path, "ok.txt");
        let failed: Vec<_> = report.failures.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(failed, vec!["missing.txt", "../outside.txt"]);
        assert!(!report.is_complete());
    }
}
