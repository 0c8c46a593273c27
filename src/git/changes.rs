//! Changed-file collection between two tree snapshots.

use std::collections::HashSet;

/// Kind of change reported for one tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Present only in the source tree.
    Added,
    /// Present in both trees with different content or mode.
    Modified,
    /// Present only in the base tree.
    Deleted,
    /// Moved, possibly with edits.
    Renamed,
    /// Copied from another path.
    Copied,
    /// Changed between blob, symlink or submodule.
    TypeChange,
}

impl ChangeKind {
    /// Maps a git status letter (`A`, `M`, `D`, `R`, `C`, `T`) to a kind.
    ///
    /// Rename and copy letters may carry a similarity score (`R087`).
    pub fn from_status_letter(status: &str) -> Option<Self> {
        match status.chars().next()? {
            'A' => Some(Self::Added),
            'M' => Some(Self::Modified),
            'D' => Some(Self::Deleted),
            'R' => Some(Self::Renamed),
            'C' => Some(Self::Copied),
            'T' => Some(Self::TypeChange),
            _ => None,
        }
    }
}

/// One entry of a tree-to-tree diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeChange {
    /// What happened to the entry.
    pub kind: ChangeKind,
    /// Path on the base side, if any.
    pub old_path: Option<String>,
    /// Path on the source side, if any.
    pub new_path: Option<String>,
}

impl TreeChange {
    /// Creates a change record.
    pub fn new(kind: ChangeKind, old_path: Option<String>, new_path: Option<String>) -> Self {
        Self {
            kind,
            old_path,
            new_path,
        }
    }

    /// The path this change contributes to a split: the new side, else the old side.
    pub fn path(&self) -> Option<&str> {
        self.new_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .or_else(|| self.old_path.as_deref().filter(|p| !p.is_empty()))
    }
}

/// Reduces a diff to the ordered, distinct list of files a split should carry.
///
/// Deletions are dropped: a file removed on the source side never ends up in a
/// split branch. Order follows the diff; the first occurrence of a path wins.
pub fn collect_changed_files(changes: &[TreeChange]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for change in changes {
        if change.kind == ChangeKind::Deleted {
            continue;
        }

        if let Some(path) = change.path() {
            if seen.insert(path) {
                files.push(path.to_string());
            }
        }
    }

    files
}
