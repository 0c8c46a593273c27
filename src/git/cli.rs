//! Repository access by invoking the `git` binary.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result};
use tracing::debug;

use crate::error::SplitError;
use crate::git::{
    BlobKind, BranchSnapshot, ChangeKind, CommitTime, FileContent, GitBackend, TreeChange,
};

/// Drives a working tree through the `git` executable.
pub struct GitCli {
    root: PathBuf,
}

impl GitCli {
    /// Opens the repository containing the current directory.
    pub fn open() -> Result<Self> {
        Self::open_at(".")
    }

    /// Opens the repository containing `path`.
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(path.as_ref())
            .output()
            .context("Failed to execute git")?;

        if !output.status.success() {
            return Err(command_error(&["rev-parse", "--show-toplevel"], &output))
                .context("Not in a git repository");
        }

        let root = String::from_utf8(output.stdout)
            .context("git printed a non UTF-8 repository path")?
            .trim_end_matches(['\n', '\r'])
            .to_string();

        Ok(Self {
            root: PathBuf::from(root),
        })
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new("git");
        command.current_dir(&self.root).args(args);
        command
    }

    /// Runs git and returns its output, failing on a non-zero exit.
    fn run(&self, args: &[&str]) -> Result<Output> {
        Self::run_with(self.command(args), args)
    }

    fn run_with(mut command: Command, args: &[&str]) -> Result<Output> {
        debug!(args = ?args, "Running git");
        let output = command
            .output()
            .with_context(|| format!("Failed to execute git {}", args.join(" ")))?;

        if !output.status.success() {
            return Err(command_error(args, &output).into());
        }

        Ok(output)
    }

    /// Runs git and returns trimmed stdout.
    fn run_text(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        let refname = format!("refs/heads/{name}");
        let output = self
            .command(["show-ref", "--verify", "--quiet", refname.as_str()])
            .output()
            .context("Failed to execute git show-ref")?;
        Ok(output.status.success())
    }
}

impl GitBackend for GitCli {
    fn workdir(&self) -> Result<PathBuf> {
        Ok(self.root.clone())
    }

    fn current_branch(&self) -> Result<String> {
        let output = self
            .command(["symbolic-ref", "--quiet", "--short", "HEAD"])
            .output()
            .context("Failed to execute git symbolic-ref")?;

        if !output.status.success() {
            return Err(SplitError::DetachedHead.into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn list_branches(&self) -> Result<Vec<String>> {
        let text = self.run_text(&["for-each-ref", "--format=%(refname:short)", "refs/heads"])?;
        Ok(text.lines().map(String::from).collect())
    }

    fn resolve_branch(&self, name: &str) -> Result<BranchSnapshot> {
        if !self.branch_exists(name)? {
            return Err(SplitError::BranchNotFound {
                name: name.to_string(),
                available: self.list_branches().unwrap_or_default(),
            }
            .into());
        }

        let refname = format!("refs/heads/{name}");
        let commit = self
            .run_text(&["rev-parse", "--verify", &format!("{refname}^{{commit}}")])
            .with_context(|| format!("Failed to get commit of branch '{name}'"))?;
        let tree = self
            .run_text(&["rev-parse", "--verify", &format!("{commit}^{{tree}}")])
            .with_context(|| format!("Failed to get tree of branch '{name}'"))?;
        let raw_date = self
            .run_text(&["log", "-1", "--format=%ad", "--date=raw", &commit])
            .with_context(|| format!("Failed to get author date of branch '{name}'"))?;

        Ok(BranchSnapshot {
            name: name.to_string(),
            commit,
            tree,
            time: CommitTime::parse_raw(&raw_date)?,
        })
    }

    fn diff_trees(
        &self,
        base: &BranchSnapshot,
        source: &BranchSnapshot,
    ) -> Result<Vec<TreeChange>> {
        let output = self
            .run(&[
                "diff-tree",
                "-r",
                "-z",
                "--no-renames",
                "--name-status",
                &base.tree,
                &source.tree,
            ])
            .context("Failed to create diff")?;

        parse_name_status(&output.stdout)
    }

    fn read_file(&self, snapshot: &BranchSnapshot, path: &str) -> Result<Option<FileContent>> {
        let listing = self
            .run(&["ls-tree", "-z", "--full-tree", &snapshot.tree, "--", path])
            .with_context(|| format!("Failed to look up '{path}' in '{}'", snapshot.name))?;

        let Some(entry) = parse_ls_tree_entry(&listing.stdout, path) else {
            return Ok(None);
        };

        let blob = self
            .run(&["cat-file", "blob", &entry.id])
            .with_context(|| format!("Failed to read '{path}' from '{}'", snapshot.name))?;

        Ok(Some(FileContent {
            data: blob.stdout,
            kind: u32::from_str_radix(&entry.mode, 8)
                .ok()
                .and_then(BlobKind::from_mode)
                .unwrap_or(BlobKind::Regular),
        }))
    }

    fn checkout_branch(&self, name: &str) -> Result<()> {
        if !self.branch_exists(name)? {
            return Err(SplitError::BranchNotFound {
                name: name.to_string(),
                available: self.list_branches().unwrap_or_default(),
            }
            .into());
        }

        self.run(&["checkout", "--quiet", name, "--"])
            .with_context(|| format!("Failed to check out branch '{name}'"))?;
        Ok(())
    }

    fn create_branch(&self, name: &str, commit: &str) -> Result<()> {
        self.run(&["checkout", "--quiet", "-b", name, commit])
            .with_context(|| format!("Failed to create branch '{name}'"))?;
        Ok(())
    }

    fn stage(&self, path: &str) -> Result<()> {
        self.run(&["add", "--", path])
            .with_context(|| format!("Failed to stage '{path}'"))?;
        Ok(())
    }

    fn has_staged_changes(&self) -> Result<bool> {
        let output = self
            .command(["diff", "--cached", "--quiet"])
            .output()
            .context("Failed to execute git diff --cached")?;

        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(command_error(&["diff", "--cached", "--quiet"], &output).into()),
        }
    }

    fn commit(&self, message: &str, when: CommitTime) -> Result<String> {
        let raw = when.to_raw();
        let args = ["commit", "--quiet", "--no-verify", "--file", "-"];

        let mut command = self.command(args);
        command
            .env("GIT_AUTHOR_DATE", &raw)
            .env("GIT_COMMITTER_DATE", &raw)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = command.spawn().context("Failed to execute git commit")?;
        if let Some(mut stdin) = child.stdin.take() {
            use std::io::Write;
            stdin
                .write_all(message.as_bytes())
                .context("Failed to pass commit message to git")?;
        }
        let output = child
            .wait_with_output()
            .context("Failed to wait for git commit")?;

        if !output.status.success() {
            return Err(command_error(&args, &output))
                .context("Failed to create commit");
        }

        self.run_text(&["rev-parse", "HEAD"])
    }

    fn identity(&self) -> Result<(String, String)> {
        let name = self.run_text(&["config", "user.name"]).ok();
        let email = self.run_text(&["config", "user.email"]).ok();

        match (name, email) {
            (Some(name), Some(email)) if !name.is_empty() && !email.is_empty() => {
                Ok((name, email))
            }
            _ => Err(SplitError::MissingIdentity.into()),
        }
    }

    fn file_history(&self, snapshot: &BranchSnapshot, path: &str) -> Result<Vec<String>> {
        let text = self
            .run_text(&["log", "--format=%s", &snapshot.commit, "--", path])
            .with_context(|| format!("Failed to read history of '{path}'"))?;
        Ok(text.lines().map(String::from).collect())
    }

    fn dirty_paths(&self) -> Result<Vec<String>> {
        let text = self.run(&["status", "--porcelain"])?;
        Ok(String::from_utf8_lossy(&text.stdout)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(String::from)
            .collect())
    }
}

fn command_error(args: &[&str], output: &Output) -> SplitError {
    SplitError::GitCommand {
        args: args.iter().map(|a| (*a).to_string()).collect(),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}

/// Parses `git diff-tree -z --name-status` output.
///
/// Records are NUL separated: a status token followed by one path, or two
/// paths for renames and copies.
fn parse_name_status(raw: &[u8]) -> Result<Vec<TreeChange>> {
    let text = std::str::from_utf8(raw).context("git diff-tree printed non UTF-8 paths")?;
    let mut tokens = text.split('\0').filter(|t| !t.is_empty());
    let mut changes = Vec::new();

    while let Some(status) = tokens.next() {
        let kind = ChangeKind::from_status_letter(status)
            .with_context(|| format!("Unknown diff status '{status}'"))?;
        let first = tokens
            .next()
            .with_context(|| format!("Missing path after diff status '{status}'"))?
            .to_string();

        let change = match kind {
            ChangeKind::Renamed | ChangeKind::Copied => {
                let second = tokens
                    .next()
                    .with_context(|| format!("Missing destination after '{first}'"))?
                    .to_string();
                TreeChange::new(kind, Some(first), Some(second))
            }
            ChangeKind::Added => TreeChange::new(kind, None, Some(first)),
            ChangeKind::Deleted => TreeChange::new(kind, Some(first), None),
            ChangeKind::Modified | ChangeKind::TypeChange => {
                TreeChange::new(kind, Some(first.clone()), Some(first))
            }
        };
        changes.push(change);
    }

    Ok(changes)
}

struct LsTreeEntry {
    mode: String,
    id: String,
}

/// Finds the blob entry for exactly `path` in `git ls-tree -z` output.
fn parse_ls_tree_entry(raw: &[u8], path: &str) -> Option<LsTreeEntry> {
    let text = String::from_utf8_lossy(raw);
    text.split('\0').find_map(|record| {
        let (meta, entry_path) = record.split_once('\t')?;
        if entry_path != path {
            return None;
        }
        let mut fields = meta.split_whitespace();
        let mode = fields.next()?;
        let kind = fields.next()?;
        let id = fields.next()?;
        (kind == "blob").then(|| LsTreeEntry {
            mode: mode.to_string(),
            id: id.to_string(),
        })
    })
}
