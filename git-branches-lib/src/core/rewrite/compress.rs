use std::collections::HashMap;

use itertools::Itertools;
use tracing::instrument;

use super::{AheadShas, BranchRefs, CommitRef};

/// Name every ahead-of-main commit relative to the branch that "owns" it.
///
/// Branches are visited shortest ahead-list first (ties by name), so a commit
/// shared by several branches is named after the shortest branch containing
/// it. The result keeps that visiting order, and each reference list is
/// parallel to the branch's commit list.
#[instrument(skip(branches_ahead_shas))]
pub fn branches_ahead_shas_to_refs(branches_ahead_shas: &AheadShas) -> BranchRefs {
    let mut sha_to_ref: HashMap<&str, CommitRef> = HashMap::new();
    let mut result = Vec::with_capacity(branches_ahead_shas.len());

    let sorted_branches = branches_ahead_shas
        .iter()
        .sorted_by(|(lhs_branch, lhs_shas), (rhs_branch, rhs_shas)| {
            (lhs_shas.len(), lhs_branch).cmp(&(rhs_shas.len(), rhs_branch))
        });
    for (branch, shas) in sorted_branches {
        let mut refs = Vec::with_capacity(shas.len());
        for (index, sha) in shas.iter().enumerate() {
            let commit_ref = sha_to_ref
                .entry(sha.as_str())
                .or_insert_with(|| CommitRef::new(branch, shas.len() - index - 1));
            refs.push(commit_ref.clone());
        }
        result.push((branch.clone(), refs));
    }

    result
}
