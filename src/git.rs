//! Git operations and repository access.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};

pub mod changes;
pub mod cli;
pub mod materializer;
pub mod repository;

pub use changes::{collect_changed_files, ChangeKind, TreeChange};
pub use cli::GitCli;
pub use materializer::{BranchMaterializer, GroupOutcome, GroupReport, MaterializeReport};
pub use repository::GitRepository;

/// Number of hex characters to show in abbreviated commit hashes.
pub const SHORT_HASH_LEN: usize = 8;

/// Truncates a commit hash to [`SHORT_HASH_LEN`] characters.
pub fn short_hash(hash: &str) -> &str {
    hash.get(..SHORT_HASH_LEN).unwrap_or(hash)
}

/// A branch resolved once at the start of a run.
///
/// Ids are hex strings so the snapshot means the same thing to every backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchSnapshot {
    /// Short branch name as given on the command line.
    pub name: String,
    /// Full hash of the commit the branch pointed at.
    pub commit: String,
    /// Full hash of that commit's root tree.
    pub tree: String,
    /// Author time of the commit.
    pub time: CommitTime,
}

/// A git timestamp: seconds since the epoch plus the author's UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitTime {
    /// Seconds since the Unix epoch.
    pub seconds: i64,
    /// Offset from UTC in minutes.
    pub offset_minutes: i32,
}

impl CommitTime {
    /// Converts to a zoned chrono timestamp for display.
    pub fn to_datetime(self) -> Result<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(self.offset_minutes * 60)
            .context("Invalid commit timezone offset")?;
        let utc = DateTime::from_timestamp(self.seconds, 0).context("Invalid commit timestamp")?;
        Ok(utc.with_timezone(&offset))
    }

    /// Formats as git's raw date format, e.g. `1700000000 +0900`.
    pub fn to_raw(self) -> String {
        let sign = if self.offset_minutes < 0 { '-' } else { '+' };
        let abs = self.offset_minutes.abs();
        format!("{} {}{:02}{:02}", self.seconds, sign, abs / 60, abs % 60)
    }

    /// Parses git's raw date format (`<seconds> <+|-hhmm>`).
    pub fn parse_raw(raw: &str) -> Result<Self> {
        let (seconds, offset) = raw
            .trim()
            .split_once(' ')
            .with_context(|| format!("Malformed raw date: {raw}"))?;
        let seconds: i64 = seconds
            .parse()
            .with_context(|| format!("Malformed timestamp in raw date: {raw}"))?;

        let (sign, digits) = match offset.as_bytes().first() {
            Some(b'-') => (-1, &offset[1..]),
            Some(b'+') => (1, &offset[1..]),
            _ => (1, offset),
        };
        if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            anyhow::bail!("Malformed timezone in raw date: {raw}");
        }
        let hours: i32 = digits[..2]
            .parse()
            .with_context(|| format!("Malformed timezone in raw date: {raw}"))?;
        let minutes: i32 = digits[2..]
            .parse()
            .with_context(|| format!("Malformed timezone in raw date: {raw}"))?;

        Ok(Self {
            seconds,
            offset_minutes: sign * (hours * 60 + minutes),
        })
    }
}

/// How a blob is recorded in a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    /// Mode 100644.
    Regular,
    /// Mode 100755.
    Executable,
    /// Mode 120000; the blob holds the link target.
    Symlink,
}

impl BlobKind {
    /// Maps a git tree entry mode to a blob kind.
    ///
    /// Returns `None` for modes that are not blobs (trees, submodules).
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode {
            0o100_644 | 0o100_664 => Some(Self::Regular),
            0o100_755 => Some(Self::Executable),
            0o120_000 => Some(Self::Symlink),
            _ => None,
        }
    }

    /// The tree entry mode git records for this kind.
    pub fn mode(self) -> u32 {
        match self {
            Self::Regular => 0o100_644,
            Self::Executable => 0o100_755,
            Self::Symlink => 0o120_000,
        }
    }
}

/// Content of a file taken from a tree snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    /// Raw blob bytes.
    pub data: Vec<u8>,
    /// Entry mode on the source side.
    pub kind: BlobKind,
}

/// Everything the split pipeline needs from a repository.
///
/// The working tree is a single-owner resource: implementations are driven
/// sequentially and never concurrently.
pub trait GitBackend {
    /// Root of the working tree.
    fn workdir(&self) -> Result<PathBuf>;

    /// Short name of the branch HEAD points at.
    fn current_branch(&self) -> Result<String>;

    /// Short names of all local branches.
    fn list_branches(&self) -> Result<Vec<String>>;

    /// Resolves a local branch to its commit, tree and author time.
    fn resolve_branch(&self, name: &str) -> Result<BranchSnapshot>;

    /// Diffs two snapshots' trees.
    fn diff_trees(&self, base: &BranchSnapshot, source: &BranchSnapshot)
        -> Result<Vec<TreeChange>>;

    /// Reads a file from a snapshot's tree, or `None` if no blob lives at `path`.
    fn read_file(&self, snapshot: &BranchSnapshot, path: &str) -> Result<Option<FileContent>>;

    /// Checks out an existing local branch.
    fn checkout_branch(&self, name: &str) -> Result<()>;

    /// Creates a branch at `commit` and checks it out.
    ///
    /// Fails if the branch already exists or the name is invalid.
    fn create_branch(&self, name: &str, commit: &str) -> Result<()>;

    /// Stages a path relative to the working tree root.
    fn stage(&self, path: &str) -> Result<()>;

    /// Whether the index differs from HEAD.
    fn has_staged_changes(&self) -> Result<bool>;

    /// Commits the index on the current branch using the configured identity
    /// and the given time for both author and committer. Returns the new hash.
    fn commit(&self, message: &str, when: CommitTime) -> Result<String>;

    /// The `user.name` and `user.email` configured for the repository.
    fn identity(&self) -> Result<(String, String)>;

    /// Subjects of commits reachable from `snapshot` that touched `path`,
    /// newest first.
    fn file_history(&self, snapshot: &BranchSnapshot, path: &str) -> Result<Vec<String>>;

    /// Paths with uncommitted changes, excluding ignored files.
    fn dirty_paths(&self) -> Result<Vec<String>>;
}
