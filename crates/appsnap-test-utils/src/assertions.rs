//! Assertion helpers for change sets and working trees.

use appsnap_core::ChangeSet;
use std::path::Path;

/// Assert the exact contents of a change set.
///
/// # Example
///
/// ```rust
/// use appsnap_core::{ChangeKind, ChangeSet};
/// use appsnap_test_utils::assertions::assert_changes;
///
/// let mut changes = ChangeSet::new();
/// changes.insert("b.txt", ChangeKind::Added);
/// changes.insert("a.txt", ChangeKind::Modified);
///
/// assert_changes(&changes, &["b.txt"], &["a.txt"], &[]);
/// ```
pub fn assert_changes(changes: &ChangeSet, added: &[&str], modified: &[&str], deleted: &[&str]) {
    let as_vec = |set: &std::collections::BTreeSet<String>| -> Vec<String> {
        set.iter().cloned().collect()
    };
    let sorted = |paths: &[&str]| -> Vec<String> {
        let mut paths: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
        paths.sort();
        paths
    };

    assert_eq!(as_vec(&changes.added), sorted(added), "added paths differ");
    assert_eq!(
        as_vec(&changes.modified),
        sorted(modified),
        "modified paths differ"
    );
    assert_eq!(as_vec(&changes.deleted), sorted(deleted), "deleted paths differ");
}

/// Assert that a file's content equals expected text exactly.
pub fn assert_file_equals(path: &Path, expected: &str) {
    let content = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read file {}: {}", path.display(), e));

    assert_eq!(
        content,
        expected,
        "File {} content does not match expected.\nExpected:\n{}\nActual:\n{}",
        path.display(),
        expected,
        content
    );
}

/// Assert that a path does not exist.
pub fn assert_missing(path: &Path) {
    assert!(!path.exists(), "Expected {} to be absent", path.display());
}
