//! Typed errors for the split pipeline.

use thiserror::Error;

/// Fatal conditions callers may want to match on.
///
/// These travel inside `anyhow::Error`; use `downcast_ref::<SplitError>()` to
/// inspect them.
#[derive(Error, Debug)]
pub enum SplitError {
    /// A branch name could not be resolved to a commit.
    #[error("Branch '{name}' not found. Available branches: {}", format_list(.available))]
    BranchNotFound {
        /// The branch that was requested.
        name: String,
        /// Local branches present in the repository.
        available: Vec<String>,
    },

    /// HEAD does not point at a branch, so there is nothing to restore afterwards.
    #[error("Repository is in detached HEAD state; check out a branch first")]
    DetachedHead,

    /// The edited plan is not well-formed.
    #[error("Failed to parse split plan: {0}")]
    PlanParse(String),

    /// The editor process could not be started.
    #[error("Failed to launch editor '{command}'")]
    EditorLaunch {
        /// Editor command line as resolved from the environment.
        command: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The editor exited with a non-zero status.
    #[error("Editor '{command}' exited with status {}", format_status(.code.as_ref()))]
    EditorFailed {
        /// Editor command line as resolved from the environment.
        command: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
    },

    /// A shelled-out git command failed.
    #[error("git {} failed{}: {}", .args.join(" "), format_exit(.code.as_ref()), .stderr.trim())]
    GitCommand {
        /// Arguments passed to `git`.
        args: Vec<String>,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The index already holds changes that would end up in a split commit.
    #[error("Index has staged changes; unstage or commit them first: {}", format_list(.entries))]
    StagedChanges {
        /// Status entries for the staged paths.
        entries: Vec<String>,
    },

    /// `user.name` or `user.email` is not configured for the repository.
    #[error("git config has no user.name or user.email; configure an identity before splitting")]
    MissingIdentity,
}

fn format_status(code: Option<&i32>) -> String {
    code.map_or_else(|| "unknown".to_string(), ToString::to_string)
}

fn format_exit(code: Option<&i32>) -> String {
    code.map(|c| format!(" with exit code {c}")).unwrap_or_default()
}

fn format_list(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}
