//! # git-split
//!
//! Splits the files that differ between a base branch and a source branch
//! into several smaller branches, one per group of files.
//!
//! The changed files are partitioned into groups of a fixed size, the plan is
//! opened as YAML in the user's editor, and each group in the edited plan is
//! turned into a new branch off the base carrying the source version of its
//! files.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::num::NonZeroUsize;
//!
//! use git_split::git::GitRepository;
//! use git_split::utils::ExternalEditor;
//! use git_split::{run, SplitConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let git = GitRepository::open()?;
//! let size = NonZeroUsize::new(5).unwrap_or(NonZeroUsize::MIN);
//! let config = SplitConfig::new("feature", "main", size);
//! let outcome = run(&config, &git, &ExternalEditor::from_env())?;
//! println!("{} files changed", outcome.changed_files.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod cli;
pub mod data;
pub mod error;
pub mod git;
pub mod split;
pub mod utils;

pub use crate::cli::Cli;
pub use crate::error::SplitError;
pub use crate::split::{run, SplitConfig, SplitOutcome};

/// The current version of git-split.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
