//! The split pipeline: diff, plan, edit, materialize.

use std::num::NonZeroUsize;

use anyhow::{Context, Result};
use tracing::info;

use crate::data::SplitPlan;
use crate::git::{
    collect_changed_files, short_hash, BranchMaterializer, GitBackend, MaterializeReport,
};
use crate::utils::{check_commit_identity, ensure_nothing_staged, warn_if_dirty, PlanEditor};

/// Branch-name prefix used when none is given.
pub const DEFAULT_PREFIX: &str = "split";

/// Base branch used when none is given on the command line or in settings.
pub const DEFAULT_BASE: &str = "main";

/// Immutable parameters of one split run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitConfig {
    /// Branch whose content is copied into the split branches.
    pub source: String,
    /// Branch every split branch starts from.
    pub base: String,
    /// Maximum number of files per planned group.
    pub group_size: NonZeroUsize,
    /// Prefix for generated branch names (`<prefix>_<n>`).
    pub prefix: String,
    /// Append the source history of each file to commit messages.
    pub history_messages: bool,
}

impl SplitConfig {
    /// Creates a configuration with the default prefix and plain commit messages.
    pub fn new(
        source: impl Into<String>,
        base: impl Into<String>,
        group_size: NonZeroUsize,
    ) -> Self {
        Self {
            source: source.into(),
            base: base.into(),
            group_size,
            prefix: DEFAULT_PREFIX.to_string(),
            history_messages: false,
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Default)]
pub struct SplitOutcome {
    /// Files added or modified on the source branch relative to the base.
    pub changed_files: Vec<String>,
    /// The plan as returned by the editor.
    pub plan: SplitPlan,
    /// Materialization result, absent when there was nothing to split.
    pub report: Option<MaterializeReport>,
}

/// Runs the whole pipeline against `git`, letting `editor` rewrite the plan.
///
/// Every failure is fatal and returned as-is; once branch creation has begun,
/// the originally checked-out branch is restored before returning.
pub fn run(
    config: &SplitConfig,
    git: &dyn GitBackend,
    editor: &dyn PlanEditor,
) -> Result<SplitOutcome> {
    check_commit_identity(git)?;
    ensure_nothing_staged(git)?;

    let base = git
        .resolve_branch(&config.base)
        .with_context(|| format!("Failed to resolve base branch '{}'", config.base))?;
    println!("Base branch '{}' at {}", base.name, short_hash(&base.commit));

    let source = git
        .resolve_branch(&config.source)
        .with_context(|| format!("Failed to resolve source branch '{}'", config.source))?;
    println!(
        "Source branch '{}' at {} ({})",
        source.name,
        short_hash(&source.commit),
        source.time.to_datetime()?.format("%Y-%m-%d %H:%M:%S %z")
    );

    let changes = git
        .diff_trees(&base, &source)
        .with_context(|| {
            format!("Failed to diff '{}' against '{}'", source.name, base.name)
        })?;
    let changed_files = collect_changed_files(&changes);
    println!(
        "{} changed file(s) between base '{}' and source '{}'",
        changed_files.len(),
        base.name,
        source.name
    );

    if changed_files.is_empty() {
        println!("No changed files; nothing to split.");
        return Ok(SplitOutcome {
            changed_files,
            ..SplitOutcome::default()
        });
    }

    let plan = SplitPlan::partition(&changed_files, config.group_size, &config.prefix);
    info!(groups = plan.branches.len(), "Planned split");
    println!("Planned {} branch(es); opening plan for editing", plan.branches.len());

    let text = plan.encode(true)?;
    let edited = editor.edit(&text).context("Failed to edit split plan")?;
    let plan = SplitPlan::decode(&edited)?;
    info!(
        groups = plan.branches.len(),
        files = plan.total_files(),
        "Loaded edited plan"
    );

    // The index may have changed while the editor was open.
    warn_if_dirty(git)?;
    ensure_nothing_staged(git)?;

    let report = BranchMaterializer::new(git, &base, &source)
        .with_history_messages(config.history_messages)
        .materialize(&plan)?;

    Ok(SplitOutcome {
        changed_files,
        plan,
        report: Some(report),
    })
}
