//! Replays a split plan against the repository, one branch per group.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::data::{BranchGroup, SplitPlan};
use crate::git::{short_hash, BlobKind, BranchSnapshot, FileContent, GitBackend};

/// What happened to one group of the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutcome {
    /// A branch was created and a commit recorded on it.
    Committed {
        /// Full hash of the new commit.
        commit: String,
    },
    /// A branch was created but the copied files matched the base, so nothing was committed.
    NoChanges,
    /// The group listed no files; no branch was created.
    SkippedEmpty,
}

/// Per-group result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReport {
    /// Branch name from the plan.
    pub name: String,
    /// Outcome for the group.
    pub outcome: GroupOutcome,
    /// Files copied from the source snapshot and staged.
    pub copied: Vec<String>,
    /// Files listed in the plan but absent from the source snapshot.
    pub missing: Vec<String>,
}

/// Result of materializing a whole plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    /// Branch that was checked out before the run and restored after it.
    pub original_branch: String,
    /// One entry per plan group, in plan order.
    pub groups: Vec<GroupReport>,
}

impl MaterializeReport {
    /// Groups that produced a commit.
    pub fn committed(&self) -> impl Iterator<Item = &GroupReport> {
        self.groups
            .iter()
            .filter(|g| matches!(g.outcome, GroupOutcome::Committed { .. }))
    }

    /// Number of branches created, with or without a commit.
    pub fn branches_created(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| g.outcome != GroupOutcome::SkippedEmpty)
            .count()
    }
}

/// Creates split branches from a plan.
///
/// File content always comes from the source snapshot taken at the start of
/// the run, never from the live working tree.
pub struct BranchMaterializer<'a> {
    git: &'a dyn GitBackend,
    base: &'a BranchSnapshot,
    source: &'a BranchSnapshot,
    history_messages: bool,
}

impl<'a> BranchMaterializer<'a> {
    /// Creates a materializer rooting every branch at `base` and copying from `source`.
    pub fn new(
        git: &'a dyn GitBackend,
        base: &'a BranchSnapshot,
        source: &'a BranchSnapshot,
    ) -> Self {
        Self {
            git,
            base,
            source,
            history_messages: false,
        }
    }

    /// Appends the source history of each copied file to commit messages.
    #[must_use]
    pub fn with_history_messages(mut self, enabled: bool) -> Self {
        self.history_messages = enabled;
        self
    }

    /// Creates one branch per non-empty group, then returns to the branch that
    /// was checked out when the call began, whether or not a group failed.
    pub fn materialize(&self, plan: &SplitPlan) -> Result<MaterializeReport> {
        let original_branch = self
            .git
            .current_branch()
            .context("Failed to record the current branch")?;
        info!(branch = %original_branch, "Recorded original branch");

        let guard = RestoreBranch::new(self.git, original_branch.clone());

        let mut groups = Vec::with_capacity(plan.branches.len());
        let result = self.materialize_groups(plan, &mut groups);
        let restored = guard.restore();

        match (result, restored) {
            (Ok(()), Ok(())) => {
                println!("✅ Done. Back on original branch '{original_branch}'");
                Ok(MaterializeReport {
                    original_branch,
                    groups,
                })
            }
            (Ok(()), Err(restore_err)) => Err(restore_err),
            (Err(e), Ok(())) => {
                println!("↩️  Returned to original branch '{original_branch}'");
                Err(e)
            }
            (Err(e), Err(restore_err)) => {
                error!(error = %format!("{restore_err:#}"), "Failed to restore original branch");
                eprintln!("⚠️  Could not return to '{original_branch}': {restore_err:#}");
                Err(e)
            }
        }
    }

    fn materialize_groups(&self, plan: &SplitPlan, reports: &mut Vec<GroupReport>) -> Result<()> {
        for group in &plan.branches {
            reports.push(self.materialize_group(group)?);
        }
        Ok(())
    }

    fn materialize_group(&self, group: &BranchGroup) -> Result<GroupReport> {
        let name = group.name.as_str();

        if group.files.is_empty() {
            info!(branch = name, "Skipping group without files");
            println!("⏭️  Branch '{name}' has no files; skipping");
            return Ok(GroupReport {
                name: name.to_string(),
                outcome: GroupOutcome::SkippedEmpty,
                copied: Vec::new(),
                missing: Vec::new(),
            });
        }

        println!("==> Creating branch '{name}' ({} files)", group.files.len());

        self.git
            .checkout_branch(&self.base.name)
            .with_context(|| format!("Failed to check out base branch '{}'", self.base.name))?;
        self.git
            .create_branch(name, &self.base.commit)
            .with_context(|| format!("Failed to create branch '{name}'"))?;

        let workdir = self.git.workdir()?;
        let mut copied = Vec::new();
        let mut missing = Vec::new();

        for path in &group.files {
            let content = if is_plain_relative(path) {
                self.git.read_file(self.source, path)?
            } else {
                None
            };

            let Some(content) = content else {
                warn!(file = %path, branch = %self.source.name, "File not on source branch");
                println!(
                    "⚠️  '{path}' does not exist on source branch '{}'; skipping",
                    self.source.name
                );
                missing.push(path.clone());
                continue;
            };

            write_worktree_file(&workdir, path, &content)?;
            self.git.stage(path)?;
            println!("  updated: {path}");
            copied.push(path.clone());
        }

        let outcome = if self.git.has_staged_changes()? {
            let message = self.commit_message(&copied)?;
            let commit = self
                .git
                .commit(&message, self.source.time)
                .with_context(|| format!("Failed to commit on branch '{name}'"))?;
            println!("✅ Committed {} on '{name}'", short_hash(&commit));
            GroupOutcome::Committed { commit }
        } else {
            println!("No changes on '{name}'; skipping commit");
            GroupOutcome::NoChanges
        };

        Ok(GroupReport {
            name: name.to_string(),
            outcome,
            copied,
            missing,
        })
    }

    /// Builds the commit message listing the files updated on this branch.
    fn commit_message(&self, files: &[String]) -> Result<String> {
        let plural = if files.len() == 1 { "" } else { "s" };
        let mut message = format!(
            "Split {} file{plural} from {}\n\n",
            files.len(),
            self.source.name
        );
        for file in files {
            message.push_str(&format!("- {file}\n"));
        }

        if self.history_messages {
            let mut seen = HashSet::new();
            let mut subjects = Vec::new();
            for file in files {
                for subject in self.git.file_history(self.source, file)? {
                    if !subject.is_empty() && seen.insert(subject.clone()) {
                        subjects.push(subject);
                    }
                }
            }

            if !subjects.is_empty() {
                message.push_str("\nHistory:\n");
                for subject in subjects {
                    message.push_str(&format!("- {subject}\n"));
                }
            }
        }

        Ok(message)
    }
}

/// Checks the original branch back out when dropped without an explicit restore.
struct RestoreBranch<'a> {
    git: &'a dyn GitBackend,
    branch: String,
    armed: bool,
}

impl<'a> RestoreBranch<'a> {
    fn new(git: &'a dyn GitBackend, branch: String) -> Self {
        Self {
            git,
            branch,
            armed: true,
        }
    }

    fn restore(mut self) -> Result<()> {
        self.armed = false;
        self.git
            .checkout_branch(&self.branch)
            .with_context(|| format!("Failed to return to original branch '{}'", self.branch))
    }
}

impl Drop for RestoreBranch<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        debug!(branch = %self.branch, "Restoring original branch during unwind");
        if let Err(e) = self.git.checkout_branch(&self.branch) {
            error!(branch = %self.branch, error = %e, "Failed to restore original branch");
        }
    }
}

/// Whether `path` stays inside the working tree: relative, no `..`, no `.`.
fn is_plain_relative(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// Overwrites (or creates) a working-tree entry with content from a snapshot,
/// recreating symlinks as links and setting the executable bit on Unix.
fn write_worktree_file(workdir: &Path, path: &str, content: &FileContent) -> Result<()> {
    let target = workdir.join(path);

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory '{}'", parent.display()))?;
    }

    // Never write through an existing link.
    if let Ok(metadata) = fs::symlink_metadata(&target) {
        if metadata.file_type().is_symlink() || content.kind == BlobKind::Symlink {
            fs::remove_file(&target)
                .with_context(|| format!("Failed to replace '{}'", target.display()))?;
        }
    }

    match content.kind {
        #[cfg(unix)]
        BlobKind::Symlink => {
            use std::ffi::OsStr;
            use std::os::unix::ffi::OsStrExt;

            std::os::unix::fs::symlink(OsStr::from_bytes(&content.data), &target)
                .with_context(|| format!("Failed to create symlink '{}'", target.display()))?;
        }
        _ => {
            fs::write(&target, &content.data)
                .with_context(|| format!("Failed to write '{}'", target.display()))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;

                let mode = if content.kind == BlobKind::Executable {
                    0o755
                } else {
                    0o644
                };
                fs::set_permissions(&target, fs::Permissions::from_mode(mode)).with_context(
                    || format!("Failed to set permissions on '{}'", target.display()),
                )?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;

    use crate::git::{CommitTime, TreeChange};

    #[test]
    fn plain_relative_paths() {
        assert!(is_plain_relative("a.txt"));
        assert!(is_plain_relative("src/lib.rs"));
        assert!(!is_plain_relative(""));
        assert!(!is_plain_relative("/etc/passwd"));
        assert!(!is_plain_relative("../outside"));
        assert!(!is_plain_relative("./a.txt"));
        assert!(!is_plain_relative("src/../../x"));
    }

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let content = FileContent {
            data: b"hello".to_vec(),
            kind: BlobKind::Regular,
        };
        write_worktree_file(dir.path(), "deep/nested/file.txt", &content).unwrap();
        assert_eq!(
            fs::read(dir.path().join("deep/nested/file.txt")).unwrap(),
            b"hello"
        );
    }

    #[cfg(unix)]
    #[test]
    fn write_sets_executable_bit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let content = FileContent {
            data: b"#!/bin/sh\n".to_vec(),
            kind: BlobKind::Executable,
        };
        write_worktree_file(dir.path(), "run.sh", &content).unwrap();
        let mode = fs::metadata(dir.path().join("run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[cfg(unix)]
    #[test]
    fn write_recreates_symlink() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("link"), "stale").unwrap();
        let content = FileContent {
            data: b"a.txt".to_vec(),
            kind: BlobKind::Symlink,
        };
        write_worktree_file(dir.path(), "link", &content).unwrap();

        let link = dir.path().join("link");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("a.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn write_replaces_symlink_instead_of_following_it() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("real.txt"), "keep").unwrap();
        std::os::unix::fs::symlink("real.txt", dir.path().join("link")).unwrap();

        let content = FileContent {
            data: b"new".to_vec(),
            kind: BlobKind::Regular,
        };
        write_worktree_file(dir.path(), "link", &content).unwrap();

        let link = dir.path().join("link");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_file());
        assert_eq!(fs::read_to_string(&link).unwrap(), "new");
        assert_eq!(fs::read_to_string(dir.path().join("real.txt")).unwrap(), "keep");
    }

    /// In-memory backend that records every call.
    struct FakeGit {
        workdir: PathBuf,
        source_files: Vec<(&'static str, &'static str)>,
        existing_branches: Vec<&'static str>,
        staged: RefCell<bool>,
        calls: RefCell<Vec<String>>,
        head: RefCell<String>,
        history: Vec<&'static str>,
    }

    impl FakeGit {
        fn new(workdir: PathBuf) -> Self {
            Self {
                workdir,
                source_files: vec![("a.txt", "A2"), ("c.txt", "C")],
                existing_branches: vec!["main", "feature"],
                staged: RefCell::new(false),
                calls: RefCell::new(Vec::new()),
                head: RefCell::new("feature".to_string()),
                history: Vec::new(),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn record(&self, call: String) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl GitBackend for FakeGit {
        fn workdir(&self) -> Result<PathBuf> {
            Ok(self.workdir.clone())
        }

        fn current_branch(&self) -> Result<String> {
            Ok(self.head.borrow().clone())
        }

        fn list_branches(&self) -> Result<Vec<String>> {
            Ok(self.existing_branches.iter().map(|b| (*b).to_string()).collect())
        }

        fn resolve_branch(&self, _name: &str) -> Result<BranchSnapshot> {
            unreachable!("materializer receives snapshots")
        }

        fn diff_trees(&self, _: &BranchSnapshot, _: &BranchSnapshot) -> Result<Vec<TreeChange>> {
            unreachable!("materializer never diffs")
        }

        fn read_file(&self, _: &BranchSnapshot, path: &str) -> Result<Option<FileContent>> {
            Ok(self
                .source_files
                .iter()
                .find(|(p, _)| *p == path)
                .map(|(_, data)| FileContent {
                    data: data.as_bytes().to_vec(),
                    kind: BlobKind::Regular,
                }))
        }

        fn checkout_branch(&self, name: &str) -> Result<()> {
            self.record(format!("checkout {name}"));
            *self.head.borrow_mut() = name.to_string();
            Ok(())
        }

        fn create_branch(&self, name: &str, commit: &str) -> Result<()> {
            self.record(format!("create {name} {commit}"));
            if self.existing_branches.iter().any(|b| *b == name) {
                anyhow::bail!("branch '{name}' already exists");
            }
            *self.head.borrow_mut() = name.to_string();
            Ok(())
        }

        fn stage(&self, path: &str) -> Result<()> {
            self.record(format!("stage {path}"));
            *self.staged.borrow_mut() = true;
            Ok(())
        }

        fn has_staged_changes(&self) -> Result<bool> {
            Ok(*self.staged.borrow())
        }

        fn commit(&self, message: &str, when: CommitTime) -> Result<String> {
            let subject = message.lines().next().unwrap_or("");
            self.record(format!("commit {subject} @{}", when.seconds));
            *self.staged.borrow_mut() = false;
            Ok("0123456789abcdef0123456789abcdef01234567".to_string())
        }

        fn identity(&self) -> Result<(String, String)> {
            Ok(("Test".to_string(), "test@example.com".to_string()))
        }

        fn file_history(&self, _: &BranchSnapshot, _: &str) -> Result<Vec<String>> {
            Ok(self.history.iter().map(|s| (*s).to_string()).collect())
        }

        fn dirty_paths(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn snapshot(name: &str, commit: &str, seconds: i64) -> BranchSnapshot {
        BranchSnapshot {
            name: name.to_string(),
            commit: commit.to_string(),
            tree: format!("{commit}-tree"),
            time: CommitTime {
                seconds,
                offset_minutes: 0,
            },
        }
    }

    fn plan(groups: &[(&str, &[&str])]) -> SplitPlan {
        SplitPlan {
            branches: groups
                .iter()
                .map(|(name, files)| {
                    BranchGroup::new(*name, files.iter().map(|f| (*f).to_string()).collect())
                })
                .collect(),
        }
    }

    #[test]
    fn replays_groups_in_order_and_restores() {
        let dir = tempfile::tempdir().unwrap();
        let git = FakeGit::new(dir.path().to_path_buf());
        let base = snapshot("main", "base123", 1);
        let source = snapshot("feature", "src456", 1_700_000_000);

        let report = BranchMaterializer::new(&git, &base, &source)
            .materialize(&plan(&[("split_1", &["a.txt"]), ("split_2", &["c.txt"])]))
            .unwrap();

        assert_eq!(report.original_branch, "feature");
        assert_eq!(report.branches_created(), 2);
        assert_eq!(report.committed().count(), 2);
        assert_eq!(
            git.calls(),
            vec![
                "checkout main",
                "create split_1 base123",
                "stage a.txt",
                "commit Split 1 file from feature @1700000000",
                "checkout main",
                "create split_2 base123",
                "stage c.txt",
                "commit Split 1 file from feature @1700000000",
                "checkout feature",
            ]
        );
        assert_eq!(fs::read_to_string(dir.path().join("c.txt")).unwrap(), "C");
    }

    #[test]
    fn empty_group_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let git = FakeGit::new(dir.path().to_path_buf());
        let base = snapshot("main", "base123", 1);
        let source = snapshot("feature", "src456", 2);

        let report = BranchMaterializer::new(&git, &base, &source)
            .materialize(&plan(&[("split_1", &[])]))
            .unwrap();

        assert_eq!(report.groups[0].outcome, GroupOutcome::SkippedEmpty);
        assert_eq!(report.branches_created(), 0);
        assert_eq!(git.calls(), vec!["checkout feature"]);
    }

    #[test]
    fn missing_file_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let git = FakeGit::new(dir.path().to_path_buf());
        let base = snapshot("main", "base123", 1);
        let source = snapshot("feature", "src456", 2);

        let report = BranchMaterializer::new(&git, &base, &source)
            .materialize(&plan(&[("split_1", &["nope.txt", "../escape", "a.txt"])]))
            .unwrap();

        let group = &report.groups[0];
        assert_eq!(group.missing, vec!["nope.txt", "../escape"]);
        assert_eq!(group.copied, vec!["a.txt"]);
        assert!(!dir.path().join("nope.txt").exists());
    }

    #[test]
    fn group_with_only_missing_files_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let git = FakeGit::new(dir.path().to_path_buf());
        let base = snapshot("main", "base123", 1);
        let source = snapshot("feature", "src456", 2);

        let report = BranchMaterializer::new(&git, &base, &source)
            .materialize(&plan(&[("split_1", &["nope.txt"])]))
            .unwrap();

        assert_eq!(report.groups[0].outcome, GroupOutcome::NoChanges);
        assert!(!git.calls().iter().any(|c| c.starts_with("commit")));
    }

    #[test]
    fn existing_branch_aborts_but_restores() {
        let dir = tempfile::tempdir().unwrap();
        let git = FakeGit::new(dir.path().to_path_buf());
        let base = snapshot("main", "base123", 1);
        let source = snapshot("feature", "src456", 2);

        let err = BranchMaterializer::new(&git, &base, &source)
            .materialize(&plan(&[("main", &["a.txt"]), ("split_2", &["c.txt"])]))
            .unwrap_err();

        assert!(format!("{err:#}").contains("Failed to create branch 'main'"));
        let calls = git.calls();
        assert!(!calls.iter().any(|c| c.contains("split_2")));
        assert_eq!(calls.last().unwrap(), "checkout feature");
    }

    #[test]
    fn history_messages_are_appended_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut git = FakeGit::new(dir.path().to_path_buf());
        git.history = vec!["Add c", "Tweak a", "Add c"];
        let base = snapshot("main", "base123", 1);
        let source = snapshot("feature", "src456", 2);

        let materializer =
            BranchMaterializer::new(&git, &base, &source).with_history_messages(true);
        let message = materializer
            .commit_message(&["a.txt".to_string(), "c.txt".to_string()])
            .unwrap();

        assert_eq!(
            message,
            "Split 2 files from feature\n\n- a.txt\n- c.txt\n\nHistory:\n- Add c\n- Tweak a\n"
        );
    }

    #[test]
    fn plain_commit_message_lists_files() {
        let dir = tempfile::tempdir().unwrap();
        let git = FakeGit::new(dir.path().to_path_buf());
        let base = snapshot("main", "base123", 1);
        let source = snapshot("feature", "src456", 2);

        let message = BranchMaterializer::new(&git, &base, &source)
            .commit_message(&["a.txt".to_string()])
            .unwrap();
        assert_eq!(message, "Split 1 file from feature\n\n- a.txt\n");
    }
}
