//! Tree comparisons.
//!
//! Classification only looks at blob ids, so two versions of a file are equal
//! exactly when their bytes are equal. Rename and similarity detection are
//! never enabled: a moved file is one deletion plus one addition.

use crate::{ChangeKind, ChangeSet, SnapshotResult};
use appsnap_util::path::to_slash;
use git2::{Delta, Diff, DiffOptions, Repository, Tree};
use similar::{ChangeTag, TextDiff};

/// Change set between two snapshot trees.
pub(crate) fn tree_changes(repo: &Repository, from: &Tree, to: &Tree) -> SnapshotResult<ChangeSet> {
    let mut opts = DiffOptions::new();
    opts.include_typechange(true);
    let diff = repo.diff_tree_to_tree(Some(from), Some(to), Some(&mut opts))?;
    Ok(classify(&diff))
}

/// Change set between a snapshot tree and the files currently on disk.
///
/// With `include_ignored` every file counts, including ones matched by
/// ignore rules.
pub(crate) fn working_changes(
    repo: &Repository,
    base: &Tree,
    include_ignored: bool,
) -> SnapshotResult<ChangeSet> {
    let mut opts = DiffOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(include_ignored)
        .recurse_ignored_dirs(include_ignored)
        .include_typechange(true)
        .ignore_filemode(true);
    let diff = repo.diff_tree_to_workdir(Some(base), Some(&mut opts))?;
    Ok(classify(&diff))
}

fn classify(diff: &Diff) -> ChangeSet {
    let mut changes = ChangeSet::new();

    for delta in diff.deltas() {
        let kind = match delta.status() {
            Delta::Added | Delta::Untracked | Delta::Ignored => ChangeKind::Added,
            Delta::Deleted => ChangeKind::Deleted,
            Delta::Modified | Delta::Typechange => {
                // Mode-only change: same bytes on both sides
                if !delta.old_file().id().is_zero() && delta.old_file().id() == delta.new_file().id()
                {
                    continue;
                }
                ChangeKind::Modified
            }
            _ => continue,
        };

        let file = match kind {
            ChangeKind::Deleted => delta.old_file(),
            _ => delta.new_file(),
        };
        if let Some(path) = file.path() {
            changes.insert(to_slash(path), kind);
        }
    }

    changes
}

/// Generate a unified diff between two strings.
pub fn unified_diff(old: &str, new: &str, path: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = format!("--- a/{path}\n+++ b/{path}\n");

    for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
        if idx > 0 {
            output.push_str("...\n");
        }

        for op in group {
            for change in diff.iter_changes(op) {
                output.push(match change.tag() {
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                    ChangeTag::Equal => ' ',
                });
                output.push_str(change.value());
                if !change.value().ends_with('\n') {
                    output.push('\n');
                }
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unified_diff_marks_changed_lines() {
        let diff = unified_diff("line 1\nline 2\nline 3\n", "line 1\nchanged\nline 3\n", "a.txt");

        assert!(diff.starts_with("--- a/a.txt\n+++ b/a.txt\n"));
        assert!(diff.contains("-line 2\n"));
        assert!(diff.contains("+changed\n"));
        assert!(diff.contains(" line 1\n"));
    }

    #[test]
    fn unified_diff_of_equal_text_has_only_header() {
        let diff = unified_diff("same\n", "same\n", "a.txt");
        assert_eq!(diff, "--- a/a.txt\n+++ b/a.txt\n");
    }

    #[test]
    fn unified_diff_from_nothing_is_all_insertions() {
        let diff = unified_diff("", "new file", "b.txt");
        assert!(diff.contains("+new file\n"));
        assert!(!diff.contains("\n-"));
    }
}
