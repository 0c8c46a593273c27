//! Preflight validation checks for early failure detection
//!
//! These run before any branch is touched so that a misconfigured repository
//! fails with a clear message instead of half-way through a split.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::error::SplitError;
use crate::git::GitBackend;

/// Ensures commits can be attributed to the repository's configured identity.
pub fn check_commit_identity(git: &dyn GitBackend) -> Result<(String, String)> {
    let (name, email) = git
        .identity()
        .context("Commit identity check failed")?;
    info!(%name, %email, "Using commit identity");
    Ok((name, email))
}

/// Fails if the index differs from HEAD.
///
/// Every split commit is written from the whole index, so anything staged
/// before the run would leak into the first split branch.
pub fn ensure_nothing_staged(git: &dyn GitBackend) -> Result<()> {
    if !git
        .has_staged_changes()
        .context("Failed to inspect the index")?
    {
        return Ok(());
    }

    let entries = git
        .dirty_paths()
        .context("Failed to get working directory status")?
        .into_iter()
        .filter(|entry| is_staged_entry(entry))
        .collect();

    Err(SplitError::StagedChanges { entries }.into())
}

/// Whether a two-letter status entry (`XY path`) has an index-side change.
fn is_staged_entry(entry: &str) -> bool {
    !matches!(entry.chars().next(), None | Some(' ' | '?' | '!'))
}

/// Warns about uncommitted changes, which may block checking out the base branch.
///
/// Returns the offending entries so callers can report them.
pub fn warn_if_dirty(git: &dyn GitBackend) -> Result<Vec<String>> {
    let dirty = git
        .dirty_paths()
        .context("Failed to get working directory status")?;

    if !dirty.is_empty() {
        warn!(count = dirty.len(), "Working directory has uncommitted changes");
        println!("⚠️  Working directory has uncommitted changes:");
        for entry in &dirty {
            println!("  {entry}");
        }
        println!("   Checking out the base branch may fail if they conflict.");
    }

    Ok(dirty)
}
