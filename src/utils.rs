//! Utility functions and helpers.

pub mod editor;
pub mod preflight;
pub mod settings;

pub use editor::{ExternalEditor, PlanEditor};
pub use preflight::{check_commit_identity, ensure_nothing_staged, warn_if_dirty};
pub use settings::{get_env_var, get_env_vars, Settings};
