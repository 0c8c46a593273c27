//! Hands the encoded plan to the operator's editor and reads back the result.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::error::SplitError;
use crate::utils::settings::get_env_vars;

/// Editor used when neither `GIT_SPLIT_EDITOR` nor `EDITOR` is set.
pub const DEFAULT_EDITOR: &str = "vi";

/// Lets a human (or a test) rewrite the plan text.
pub trait PlanEditor {
    /// Returns the edited version of `text`.
    fn edit(&self, text: &str) -> Result<String>;
}

impl<F> PlanEditor for F
where
    F: Fn(&str) -> Result<String>,
{
    fn edit(&self, text: &str) -> Result<String> {
        self(text)
    }
}

/// Edits text through an external, terminal-attached editor process.
#[derive(Debug, Clone)]
pub struct ExternalEditor {
    command: String,
}

impl ExternalEditor {
    /// Uses `command` as the editor; whitespace-separated words after the
    /// first are passed as leading arguments.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Uses the editor configured in the environment or settings file.
    pub fn from_env() -> Self {
        Self::new(resolve_editor_command())
    }

    /// The configured editor command line.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Runs the editor on `path` and waits for it to exit.
    fn launch(&self, path: &Path) -> Result<()> {
        let (editor_cmd, args) = parse_editor_command(&self.command);
        debug!(editor = editor_cmd, ?args, path = %path.display(), "Launching editor");

        let status = Command::new(editor_cmd)
            .args(&args)
            .arg(path)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|source| SplitError::EditorLaunch {
                command: self.command.clone(),
                source,
            })?;

        if !status.success() {
            return Err(SplitError::EditorFailed {
                command: self.command.clone(),
                code: status.code(),
            }
            .into());
        }

        Ok(())
    }
}

impl PlanEditor for ExternalEditor {
    fn edit(&self, text: &str) -> Result<String> {
        let mut file = tempfile::Builder::new()
            .prefix("split-config-")
            .suffix(".yaml")
            .tempfile()
            .context("Failed to create temporary plan file")?;
        file.write_all(text.as_bytes())
            .and_then(|()| file.flush())
            .context("Failed to write temporary plan file")?;

        // Close our handle so the editor is free to replace the file.
        let path = file.into_temp_path();

        let edited = self.launch(&path).and_then(|()| {
            fs::read_to_string(&path)
                .with_context(|| format!("Failed to read edited plan: {}", path.display()))
        });

        let shown = path.display().to_string();
        if let Err(e) = path.close() {
            warn!(path = %shown, error = %e, "Failed to remove temporary plan file");
        }

        edited
    }
}

/// Resolves the editor command: `GIT_SPLIT_EDITOR`, then `EDITOR`, then [`DEFAULT_EDITOR`].
pub fn resolve_editor_command() -> String {
    get_env_vars(&["GIT_SPLIT_EDITOR", "EDITOR"])
        .ok()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| DEFAULT_EDITOR.to_string())
}

/// Splits an editor command string into the executable and its arguments.
///
/// Handles editors specified with arguments, e.g. `"code --wait"` becomes
/// `("code", vec!["--wait"])`.
pub fn parse_editor_command(editor: &str) -> (&str, Vec<&str>) {
    let mut parts = editor.split_whitespace();
    let cmd = parts.next().unwrap_or(editor);
    let args: Vec<&str> = parts.collect();
    (cmd, args)
}
