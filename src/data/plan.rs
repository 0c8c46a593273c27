//! Split plan data structures, partitioning and the editable YAML form.

use std::num::NonZeroUsize;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::yaml::{null_as_default, to_yaml};
use crate::error::SplitError;

/// Comment block placed above the plan when it is handed to the editor.
pub const PLAN_HEADER: &str = "\
# git-split plan
#
# Each entry under `branches` becomes one new branch created from the base
# branch. `name` is the branch name; `files` lists the paths whose content is
# copied from the source branch and committed on that branch.
#
# - Delete a whole entry to skip creating that branch.
# - Delete a path to leave it out of the split.
# - Rename entries or move paths between them as you like.
# - An entry whose file list is empty is skipped.
#
# Lines starting with '#' are ignored.
";

/// Plan for splitting one diff into several branches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitPlan {
    /// Branches to create, in creation order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub branches: Vec<BranchGroup>,
}

/// One branch of a split plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BranchGroup {
    /// Name of the branch to create.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Paths whose source-branch content goes on this branch.
    #[serde(default, deserialize_with = "null_as_default")]
    pub files: Vec<String>,
}

impl BranchGroup {
    /// Creates a new group.
    pub fn new(name: impl Into<String>, files: Vec<String>) -> Self {
        Self {
            name: name.into(),
            files,
        }
    }
}

impl SplitPlan {
    /// Chunks `files` into groups of at most `group_size`, in order.
    ///
    /// Group `i` is named `<prefix>_<i + 1>`.
    pub fn partition(files: &[String], group_size: NonZeroUsize, prefix: &str) -> Self {
        let branches = files
            .chunks(group_size.get())
            .enumerate()
            .map(|(i, chunk)| BranchGroup::new(format!("{prefix}_{}", i + 1), chunk.to_vec()))
            .collect();

        Self { branches }
    }

    /// Total number of file entries across all groups.
    pub fn total_files(&self) -> usize {
        self.branches.iter().map(|b| b.files.len()).sum()
    }

    /// Whether the plan has no groups at all.
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Renders the plan as YAML, optionally preceded by [`PLAN_HEADER`].
    pub fn encode(&self, with_header: bool) -> Result<String> {
        let body = to_yaml(self).context("Failed to encode split plan")?;
        if with_header {
            Ok(format!("{PLAN_HEADER}\n{body}"))
        } else {
            Ok(body)
        }
    }

    /// Parses a plan from its YAML form.
    ///
    /// A document holding nothing but comments decodes to an empty plan.
    pub fn decode(text: &str) -> Result<Self> {
        if is_blank_document(text) {
            return Ok(Self::default());
        }

        serde_yaml::from_str(text).map_err(|e| SplitError::PlanParse(e.to_string()).into())
    }
}

fn is_blank_document(text: &str) -> bool {
    text.lines().map(str::trim).all(|line| {
        line.is_empty() || line.starts_with('#') || line == "---" || line == "..."
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    // ── partition ───────────────────────────────────────────────────

    #[test]
    fn partition_five_files_by_two() {
        let plan = SplitPlan::partition(&files(&["f1", "f2", "f3", "f4", "f5"]), size(2), "split");
        assert_eq!(
            plan.branches,
            vec![
                BranchGroup::new("split_1", files(&["f1", "f2"])),
                BranchGroup::new("split_2", files(&["f3", "f4"])),
                BranchGroup::new("split_3", files(&["f5"])),
            ]
        );
    }

    #[test]
    fn partition_empty_list_has_no_groups() {
        let plan = SplitPlan::partition(&[], size(3), "split");
        assert!(plan.is_empty());
    }

    #[test]
    fn partition_group_larger_than_list() {
        let plan = SplitPlan::partition(&files(&["a", "b"]), size(10), "part");
        assert_eq!(plan.branches.len(), 1);
        assert_eq!(plan.branches[0].name, "part_1");
        assert_eq!(plan.total_files(), 2);
    }

    proptest! {
        #[test]
        fn partition_preserves_order_and_sizes(
            list in proptest::collection::vec("[a-z]{1,8}", 0..60),
            n in 1usize..12,
        ) {
            let plan = SplitPlan::partition(&list, size(n), "split");

            prop_assert_eq!(plan.branches.len(), list.len().div_ceil(n));

            let rebuilt: Vec<String> =
                plan.branches.iter().flat_map(|b| b.files.clone()).collect();
            prop_assert_eq!(&rebuilt, &list);

            if let Some((_, head)) = plan.branches.split_last() {
                for group in head {
                    prop_assert_eq!(group.files.len(), n);
                }
            }
            for (i, group) in plan.branches.iter().enumerate() {
                prop_assert_eq!(&group.name, &format!("split_{}", i + 1));
            }
        }
    }

    // ── codec ───────────────────────────────────────────────────────

    #[test]
    fn encode_with_header_starts_with_comments() {
        let plan = SplitPlan::partition(&files(&["a.txt"]), size(1), "split");
        let text = plan.encode(true).unwrap();
        assert!(text.starts_with("# git-split plan"));
        assert!(text.contains("branches:"));
        assert!(text.contains("name: split_1"));
    }

    #[test]
    fn decode_hand_written_plan() {
        let text = r"
# leading comment
branches:
  - name: feature-ui
    files:
      - src/ui.rs
      - src/theme.rs
  - name: feature-db
    files:
      - src/db.rs
";
        let plan = SplitPlan::decode(text).unwrap();
        assert_eq!(plan.branches.len(), 2);
        assert_eq!(plan.branches[0].name, "feature-ui");
        assert_eq!(plan.branches[0].files, files(&["src/ui.rs", "src/theme.rs"]));
        assert_eq!(plan.branches[1].files, files(&["src/db.rs"]));
    }

    #[test]
    fn decode_accepts_emptied_file_list() {
        let text = "branches:\n  - name: split_1\n    files:\n  - name: split_2\n    files: []\n";
        let plan = SplitPlan::decode(text).unwrap();
        assert_eq!(plan.branches.len(), 2);
        assert!(plan.branches.iter().all(|b| b.files.is_empty()));
    }

    #[test]
    fn decode_accepts_all_groups_removed() {
        assert!(SplitPlan::decode("branches:\n").unwrap().is_empty());
        assert!(SplitPlan::decode("branches: []\n").unwrap().is_empty());
    }

    #[test]
    fn decode_comment_only_document_is_empty_plan() {
        let plan = SplitPlan::decode(PLAN_HEADER).unwrap();
        assert!(plan.is_empty());
        assert!(SplitPlan::decode("").unwrap().is_empty());
        assert!(SplitPlan::decode("---\n").unwrap().is_empty());
    }

    #[test]
    fn decode_rejects_malformed_yaml() {
        let err = SplitPlan::decode("branches:\n  - name: [unterminated\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SplitError>(),
            Some(SplitError::PlanParse(_))
        ));
    }

    #[test]
    fn decode_rejects_misspelled_field() {
        let err = SplitPlan::decode("branches:\n  - name: a\n    file:\n      - x\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SplitError>(),
            Some(SplitError::PlanParse(_))
        ));
    }

    #[test]
    fn decode_keeps_number_like_names() {
        let text = "branches:\n  - name: 007\n    files: [a]\n  - name: 0o17\n    files: [b]\n";
        let plan = SplitPlan::decode(text).unwrap();
        assert_eq!(plan.branches[0].name, "007");
        assert_eq!(plan.branches[1].name, "0o17");
    }

    #[test]
    fn round_trip_keeps_number_like_names() {
        let plan = SplitPlan {
            branches: vec![
                BranchGroup::new("0o17", files(&["x.rs"])),
                BranchGroup::new("0b101", files(&["y.rs"])),
                BranchGroup::new("007", Vec::new()),
            ],
        };
        let decoded = SplitPlan::decode(&plan.encode(true).unwrap()).unwrap();
        assert_eq!(decoded, plan);
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        assert!(SplitPlan::decode("- a\n- b\n").is_err());
    }

    #[test]
    fn round_trip_keeps_reordered_and_renamed_groups() {
        let plan = SplitPlan {
            branches: vec![
                BranchGroup::new("second", files(&["b/2.rs"])),
                BranchGroup::new("first", files(&["a/1.rs", "a/0.rs"])),
                BranchGroup::new("empty", Vec::new()),
            ],
        };
        let decoded = SplitPlan::decode(&plan.encode(true).unwrap()).unwrap();
        assert_eq!(decoded, plan);
    }

    proptest! {
        #[test]
        fn decode_of_encode_is_identity(
            groups in proptest::collection::vec(
                (
                    prop_oneof![
                        "[a-z]{2,8}_[0-9]{1,3}",
                        "0o[0-7]{1,3}",
                        "0b[01]{1,4}",
                        "0x[0-9A-F]{1,3}",
                        "0[0-9]{1,3}",
                    ],
                    proptest::collection::vec("[a-z]{1,6}/[a-z]{1,6}\\.(rs|txt|md)", 0..5),
                ),
                0..6,
            ),
            with_header in any::<bool>(),
        ) {
            let plan = SplitPlan {
                branches: groups
                    .into_iter()
                    .map(|(name, files)| BranchGroup::new(name, files))
                    .collect(),
            };
            let text = plan.encode(with_header).unwrap();
            let decoded = SplitPlan::decode(&text).unwrap();
            prop_assert_eq!(&decoded, &plan);

            let again = decoded.encode(with_header).unwrap();
            prop_assert_eq!(again, text);
        }
    }
}
