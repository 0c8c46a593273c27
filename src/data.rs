//! Split plan data structures and their YAML form.

pub mod plan;
pub mod yaml;

pub use plan::{BranchGroup, SplitPlan};
pub use yaml::to_yaml;
