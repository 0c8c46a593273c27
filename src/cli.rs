//! CLI interface for git-split.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use crate::git::{short_hash, GitBackend, GitCli, GitRepository, GroupOutcome};
use crate::split::{run, SplitConfig, SplitOutcome, DEFAULT_BASE, DEFAULT_PREFIX};
use crate::utils::{get_env_var, ExternalEditor};

/// git-split: break one large set of changes into several small branches.
///
/// Files added or modified on SOURCE relative to BASE are grouped, the plan is
/// opened in $EDITOR, and every group becomes a new branch off BASE carrying
/// SOURCE's version of its files.
#[derive(Parser, Debug)]
#[command(name = "git-split")]
#[command(about = "Split the files changed between two branches into several small branches")]
#[command(version)]
pub struct Cli {
    /// Branch whose file contents are split out.
    #[arg(short, long)]
    pub source: String,

    /// Branch every new branch starts from [default: $GIT_SPLIT_BASE, else main].
    #[arg(short, long)]
    pub base: Option<String>,

    /// Maximum number of files per new branch.
    #[arg(short, long)]
    pub number: NonZeroUsize,

    /// Prefix for generated branch names.
    #[arg(short, long, default_value = DEFAULT_PREFIX)]
    pub prefix: String,

    /// How to talk to the repository.
    #[arg(long, value_enum, default_value_t = Backend::Native)]
    pub backend: Backend,

    /// Append the subjects of source commits that touched each file to commit messages.
    #[arg(long)]
    pub history_messages: bool,

    /// Also append log events to this file.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

/// Repository access implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// libgit2 through the git2 crate.
    Native,
    /// The `git` executable on PATH.
    Git,
}

impl Cli {
    /// Builds the run configuration from the parsed flags.
    pub fn config(&self) -> SplitConfig {
        let base = self
            .base
            .clone()
            .or_else(|| get_env_var("GIT_SPLIT_BASE").ok())
            .unwrap_or_else(|| DEFAULT_BASE.to_string());

        SplitConfig {
            source: self.source.clone(),
            base,
            group_size: self.number,
            prefix: self.prefix.clone(),
            history_messages: self.history_messages,
        }
    }

    /// Executes the split.
    pub fn execute(self) -> Result<()> {
        let config = self.config();

        let git: Box<dyn GitBackend> = match self.backend {
            Backend::Native => Box::new(GitRepository::open()?),
            Backend::Git => Box::new(GitCli::open()?),
        };
        let editor = ExternalEditor::from_env();

        let outcome = run(&config, git.as_ref(), &editor)?;
        print_summary(&outcome);

        Ok(())
    }
}

fn print_summary(outcome: &SplitOutcome) {
    let Some(report) = &outcome.report else {
        return;
    };

    println!("\nSummary:");
    for group in &report.groups {
        match &group.outcome {
            GroupOutcome::Committed { commit } => println!(
                "  {} -> {} ({} file(s))",
                group.name,
                short_hash(commit),
                group.copied.len()
            ),
            GroupOutcome::NoChanges => println!("  {} -> created, nothing to commit", group.name),
            GroupOutcome::SkippedEmpty => println!("  {} -> skipped (no files)", group.name),
        }
        if !group.missing.is_empty() {
            println!("      not on source: {}", group.missing.join(", "));
        }
    }
    println!(
        "{} branch(es) created, {} with commits",
        report.branches_created(),
        report.committed().count()
    );
}
