use indexmap::IndexMap;
use tracing::instrument;

use super::{BranchRefs, CommitRef};

/// Where a branch was forked from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseBranch {
    /// The fork point, named relative to another branch.
    pub base_ref: CommitRef,

    /// How many of the branch's own commits sit on top of the fork point.
    pub commit_count: usize,
}

/// Base of each branch which is layered on another branch, in the order the
/// branches were resolved.
pub type BaseBranches = IndexMap<String, BaseBranch>;

/// Find the base of every branch in `branch_refs` (as produced by
/// [`super::branches_ahead_shas_to_refs`]).
///
/// Scanning from the tip backwards, the first reference which names another
/// branch is the fork point. Branches with no such reference sit directly on
/// main and are left out.
#[instrument(skip(branch_refs))]
pub fn base_branches_from_refs(branch_refs: &BranchRefs) -> BaseBranches {
    let mut result = BaseBranches::new();
    for (branch, refs) in branch_refs {
        let fork_point = refs
            .iter()
            .rev()
            .enumerate()
            .find(|(_, commit_ref)| commit_ref.branch_name() != branch);
        if let Some((commit_count, base_ref)) = fork_point {
            result.insert(
                branch.clone(),
                BaseBranch {
                    base_ref: base_ref.clone(),
                    commit_count,
                },
            );
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use crate::core::rewrite::testing::{ahead_shas, format_base_branches};
    use crate::core::rewrite::{branches_ahead_shas_to_refs, AheadShas};

    use super::*;

    #[test]
    fn test_base_branches() {
        let input = ahead_shas(vec![
            ("b2", vec!["38089"]),
            ("b3", vec!["38089", "42d83", "21d67"]),
            ("b5", vec!["b4a32", "31b9b"]),
            ("b6", vec!["b4a32", "31b9b", "975a7"]),
        ]);
        let base_branches = base_branches_from_refs(&branches_ahead_shas_to_refs(&input));
        insta::assert_snapshot!(format_base_branches(&base_branches), @r###"
        b3: b2 (2)
        b6: b5 (1)
        "###);
    }

    #[test]
    fn test_base_branches_fork_from_middle() {
        let input = ahead_shas(vec![
            ("b5", vec!["42792", "d208f", "dee9e", "48865", "3569e", "51348", "9e021", "69b22"]),
            ("b7", vec!["42792", "51348"]),
            ("b6", vec!["42792", "48865", "3569e"]),
        ]);
        let base_branches = base_branches_from_refs(&branches_ahead_shas_to_refs(&input));
        insta::assert_snapshot!(format_base_branches(&base_branches), @r###"
        b6: b7~1 (2)
        b5: b7 (2)
        "###);
    }

    #[test]
    fn test_base_branches_same_tip() {
        // Two branches pointing at the same commit: the later one is layered
        // on the earlier one with nothing of its own.
        let input = ahead_shas(vec![("b3", vec!["aaaaa", "bbbbb"]), ("b4", vec!["aaaaa", "bbbbb"])]);
        let base_branches = base_branches_from_refs(&branches_ahead_shas_to_refs(&input));
        insta::assert_snapshot!(format_base_branches(&base_branches), @"b4: b3 (0)");
    }

    #[test]
    fn test_base_branches_self_referential_is_omitted() {
        let branch_refs = vec![(
            "lonely".to_string(),
            vec![CommitRef::from("lonely~1"), CommitRef::from("lonely")],
        )];
        assert!(base_branches_from_refs(&branch_refs).is_empty());
    }

    #[test]
    fn test_base_branches_stable_under_recompression() {
        let input = ahead_shas(vec![
            ("b2", vec!["38089"]),
            ("b3", vec!["38089", "42d83", "21d67"]),
            ("b4", vec!["38089", "42d83", "21d67", "11111"]),
            ("b6", vec!["b4a32", "31b9b", "975a7"]),
        ]);
        let branch_refs = branches_ahead_shas_to_refs(&input);
        let base_branches = base_branches_from_refs(&branch_refs);

        // Feed the references back in as if they were commit ids.
        let recompressed_input: AheadShas = branch_refs
            .iter()
            .map(|(branch, refs)| {
                (
                    branch.clone(),
                    refs.iter().map(ToString::to_string).collect(),
                )
            })
            .collect();
        let recompressed_refs = branches_ahead_shas_to_refs(&recompressed_input);
        assert_eq!(recompressed_refs, branch_refs);
        assert_eq!(base_branches_from_refs(&recompressed_refs), base_branches);
        insta::assert_snapshot!(format_base_branches(&base_branches), @r###"
        b3: b2 (2)
        b4: b3 (1)
        "###);
    }
}
