//! Git repository operations backed by libgit2.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use git2::{
    build::CheckoutBuilder, BranchType, Delta, DiffOptions, ErrorCode, ObjectType, Oid,
    Repository, Signature, Status, StatusOptions, Time,
};
use tracing::debug;

use crate::error::SplitError;
use crate::git::{
    BlobKind, BranchSnapshot, ChangeKind, CommitTime, FileContent, GitBackend, TreeChange,
};

/// Git repository wrapper
pub struct GitRepository {
    repo: Repository,
}

/// Working directory status
#[derive(Debug)]
pub struct WorkingDirectoryStatus {
    /// Whether the working directory has no changes
    pub clean: bool,
    /// Files with uncommitted changes
    pub changes: Vec<FileStatus>,
}

/// File status information
#[derive(Debug)]
pub struct FileStatus {
    /// Git status flags (e.g., "AM", "??", "M ")
    pub status: String,
    /// Path to the file relative to repository root
    pub file: String,
    /// Whether the index differs from HEAD for this file
    pub staged: bool,
}

impl GitRepository {
    /// Open repository at current directory
    pub fn open() -> Result<Self> {
        let repo = Repository::open(".").context("Not in a git repository")?;

        Ok(Self { repo })
    }

    /// Open repository at specified path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Repository::open(path).context("Failed to open git repository")?;

        Ok(Self { repo })
    }

    /// Get working directory status
    pub fn get_working_directory_status(&self) -> Result<WorkingDirectoryStatus> {
        let mut options = StatusOptions::new();
        options.include_untracked(true).include_ignored(false);

        let statuses = self
            .repo
            .statuses(Some(&mut options))
            .context("Failed to get repository status")?;

        let mut changes = Vec::new();

        for entry in statuses.iter() {
            let status_flags = entry.status();
            if status_flags.is_ignored() {
                continue;
            }
            if let Some(path) = entry.path() {
                changes.push(FileStatus {
                    status: format_status_flags(status_flags),
                    file: path.to_string(),
                    staged: is_staged(status_flags),
                });
            }
        }

        Ok(WorkingDirectoryStatus {
            clean: changes.is_empty(),
            changes,
        })
    }

    fn find_local_branch(&self, name: &str) -> Result<git2::Branch<'_>> {
        match self.repo.find_branch(name, BranchType::Local) {
            Ok(branch) => Ok(branch),
            Err(e) if e.code() == ErrorCode::NotFound => Err(SplitError::BranchNotFound {
                name: name.to_string(),
                available: self.list_branches().unwrap_or_default(),
            }
            .into()),
            Err(e) => Err(e).with_context(|| format!("Failed to look up branch '{name}'")),
        }
    }

    fn tree_of(&self, snapshot: &BranchSnapshot) -> Result<git2::Tree<'_>> {
        let oid = Oid::from_str(&snapshot.tree)
            .with_context(|| format!("Invalid tree id for '{}'", snapshot.name))?;
        self.repo
            .find_tree(oid)
            .with_context(|| format!("Failed to find tree of '{}'", snapshot.name))
    }

    /// Checks out `target` into the working tree and points HEAD at `refname`.
    fn switch_to(&self, target: &git2::Object<'_>, refname: &str) -> Result<()> {
        let mut checkout = CheckoutBuilder::new();
        checkout.safe();

        self.repo
            .checkout_tree(target, Some(&mut checkout))
            .with_context(|| format!("Failed to check out working tree for {refname}"))?;
        self.repo
            .set_head(refname)
            .with_context(|| format!("Failed to move HEAD to {refname}"))?;

        Ok(())
    }
}

impl GitBackend for GitRepository {
    fn workdir(&self) -> Result<PathBuf> {
        self.repo
            .workdir()
            .map(Path::to_path_buf)
            .context("Repository has no working tree")
    }

    fn current_branch(&self) -> Result<String> {
        let head = self.repo.head().context("Failed to get HEAD reference")?;

        if head.is_branch() {
            if let Some(name) = head.shorthand() {
                return Ok(name.to_string());
            }
        }

        Err(SplitError::DetachedHead.into())
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for branch in self
            .repo
            .branches(Some(BranchType::Local))
            .context("Failed to list branches")?
        {
            let (branch, _) = branch.context("Failed to read branch")?;
            if let Some(name) = branch.name().context("Failed to read branch name")? {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn resolve_branch(&self, name: &str) -> Result<BranchSnapshot> {
        let branch = self.find_local_branch(name)?;
        let commit = branch
            .get()
            .peel_to_commit()
            .with_context(|| format!("Failed to get commit of branch '{name}'"))?;
        let tree = commit
            .tree()
            .with_context(|| format!("Failed to get tree of branch '{name}'"))?;
        let when = commit.author().when();

        Ok(BranchSnapshot {
            name: name.to_string(),
            commit: commit.id().to_string(),
            tree: tree.id().to_string(),
            time: CommitTime {
                seconds: when.seconds(),
                offset_minutes: when.offset_minutes(),
            },
        })
    }

    fn diff_trees(
        &self,
        base: &BranchSnapshot,
        source: &BranchSnapshot,
    ) -> Result<Vec<TreeChange>> {
        let base_tree = self.tree_of(base)?;
        let source_tree = self.tree_of(source)?;

        let mut options = DiffOptions::new();
        options.include_typechange(true);

        let diff = self
            .repo
            .diff_tree_to_tree(Some(&base_tree), Some(&source_tree), Some(&mut options))
            .context("Failed to create diff")?;

        let mut changes = Vec::new();
        for delta in diff.deltas() {
            let kind = match delta.status() {
                Delta::Added => ChangeKind::Added,
                Delta::Deleted => ChangeKind::Deleted,
                Delta::Modified => ChangeKind::Modified,
                Delta::Renamed => ChangeKind::Renamed,
                Delta::Copied => ChangeKind::Copied,
                Delta::Typechange => ChangeKind::TypeChange,
                other => {
                    debug!(status = ?other, "Ignoring diff delta");
                    continue;
                }
            };

            let old_path = delta.old_file().path().map(path_to_string).transpose()?;
            let new_path = delta.new_file().path().map(path_to_string).transpose()?;

            changes.push(TreeChange::new(kind, old_path, new_path));
        }

        Ok(changes)
    }

    fn read_file(&self, snapshot: &BranchSnapshot, path: &str) -> Result<Option<FileContent>> {
        let tree = self.tree_of(snapshot)?;

        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to look up '{path}' in '{}'", snapshot.name))
            }
        };

        if entry.kind() != Some(ObjectType::Blob) {
            return Ok(None);
        }

        let blob = self
            .repo
            .find_blob(entry.id())
            .with_context(|| format!("Failed to read '{path}' from '{}'", snapshot.name))?;

        Ok(Some(FileContent {
            data: blob.content().to_vec(),
            kind: u32::try_from(entry.filemode())
                .ok()
                .and_then(BlobKind::from_mode)
                .unwrap_or(BlobKind::Regular),
        }))
    }

    fn checkout_branch(&self, name: &str) -> Result<()> {
        let branch = self.find_local_branch(name)?;
        let refname = branch
            .get()
            .name()
            .context("Branch reference name is not valid UTF-8")?
            .to_string();
        let target = branch
            .get()
            .peel(ObjectType::Commit)
            .with_context(|| format!("Failed to resolve branch '{name}'"))?;

        self.switch_to(&target, &refname)
            .with_context(|| format!("Failed to check out branch '{name}'"))
    }

    fn create_branch(&self, name: &str, commit: &str) -> Result<()> {
        let oid = Oid::from_str(commit).with_context(|| format!("Invalid commit id: {commit}"))?;
        let commit = self
            .repo
            .find_commit(oid)
            .with_context(|| format!("Commit not found: {commit}"))?;

        let branch = self
            .repo
            .branch(name, &commit, false)
            .with_context(|| format!("Failed to create branch '{name}'"))?;
        let refname = branch
            .get()
            .name()
            .context("Branch reference name is not valid UTF-8")?
            .to_string();

        self.switch_to(commit.as_object(), &refname)
            .with_context(|| format!("Failed to check out new branch '{name}'"))
    }

    fn stage(&self, path: &str) -> Result<()> {
        let mut index = self.repo.index().context("Failed to open index")?;
        index
            .add_path(Path::new(path))
            .with_context(|| format!("Failed to stage '{path}'"))?;
        index.write().context("Failed to write index")?;
        Ok(())
    }

    fn has_staged_changes(&self) -> Result<bool> {
        let status = self.get_working_directory_status()?;
        Ok(status.changes.iter().any(|f| f.staged))
    }

    fn commit(&self, message: &str, when: CommitTime) -> Result<String> {
        let (name, email) = self.identity()?;
        let signature = Signature::new(
            &name,
            &email,
            &Time::new(when.seconds, when.offset_minutes),
        )
        .context("Failed to build commit signature")?;

        let mut index = self.repo.index().context("Failed to open index")?;
        let tree_id = index.write_tree().context("Failed to write tree")?;
        let tree = self.repo.find_tree(tree_id).context("Failed to find tree")?;
        let parent = self
            .repo
            .head()
            .context("Failed to get HEAD")?
            .peel_to_commit()
            .context("Failed to peel HEAD to commit")?;

        let oid = self
            .repo
            .commit(
                Some("HEAD"),
                &signature,
                &signature,
                message,
                &tree,
                &[&parent],
            )
            .context("Failed to create commit")?;

        Ok(oid.to_string())
    }

    fn identity(&self) -> Result<(String, String)> {
        let config = self.repo.config().context("Failed to read git config")?;
        let name = config.get_string("user.name").ok();
        let email = config.get_string("user.email").ok();

        match (name, email) {
            (Some(name), Some(email)) if !name.is_empty() && !email.is_empty() => {
                Ok((name, email))
            }
            _ => Err(SplitError::MissingIdentity.into()),
        }
    }

    fn file_history(&self, snapshot: &BranchSnapshot, path: &str) -> Result<Vec<String>> {
        let start = Oid::from_str(&snapshot.commit)
            .with_context(|| format!("Invalid commit id for '{}'", snapshot.name))?;
        let mut walker = self.repo.revwalk().context("Failed to create revwalk")?;
        walker.push(start).context("Failed to push start commit")?;

        let path = Path::new(path);
        let mut subjects = Vec::new();

        for oid in walker {
            let oid = oid.context("Failed to get commit OID from walker")?;
            let commit = self.repo.find_commit(oid).context("Failed to find commit")?;
            let current = entry_id(&commit.tree()?, path);

            // Any parent with the same blob means this commit did not touch the path.
            let touched = if commit.parent_count() == 0 {
                current.is_some()
            } else {
                commit
                    .parents()
                    .map(|parent| parent.tree().ok().and_then(|t| entry_id(&t, path)))
                    .all(|previous| previous != current)
            };

            if touched {
                subjects.push(commit.summary().unwrap_or("").to_string());
            }
        }

        Ok(subjects)
    }

    fn dirty_paths(&self) -> Result<Vec<String>> {
        let status = self.get_working_directory_status()?;
        Ok(status
            .changes
            .into_iter()
            .map(|f| format!("{} {}", f.status, f.file))
            .collect())
    }
}

fn path_to_string(path: &Path) -> Result<String> {
    path.to_str()
        .map(String::from)
        .with_context(|| format!("Changed path is not valid UTF-8: {}", path.display()))
}

fn entry_id(tree: &git2::Tree<'_>, path: &Path) -> Option<Oid> {
    tree.get_path(path).ok().map(|entry| entry.id())
}

fn is_staged(flags: Status) -> bool {
    flags.intersects(
        Status::INDEX_NEW
            | Status::INDEX_MODIFIED
            | Status::INDEX_DELETED
            | Status::INDEX_RENAMED
            | Status::INDEX_TYPECHANGE,
    )
}

/// Format git status flags into string representation
fn format_status_flags(flags: Status) -> String {
    let mut status = String::new();

    if flags.contains(Status::INDEX_NEW) {
        status.push('A');
    } else if flags.contains(Status::INDEX_MODIFIED) {
        status.push('M');
    } else if flags.contains(Status::INDEX_DELETED) {
        status.push('D');
    } else if flags.contains(Status::INDEX_RENAMED) {
        status.push('R');
    } else if flags.contains(Status::INDEX_TYPECHANGE) {
        status.push('T');
    } else {
        status.push(' ');
    }

    if flags.contains(Status::WT_NEW) {
        status.push('?');
    } else if flags.contains(Status::WT_MODIFIED) {
        status.push('M');
    } else if flags.contains(Status::WT_DELETED) {
        status.push('D');
    } else if flags.contains(Status::WT_TYPECHANGE) {
        status.push('T');
    } else if flags.contains(Status::WT_RENAMED) {
        status.push('R');
    } else {
        status.push(' ');
    }

    status
}
