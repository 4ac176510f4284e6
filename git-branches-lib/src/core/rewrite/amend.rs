use std::collections::HashSet;

use tracing::instrument;

use super::{plan_update_commands, AheadShas, Result, UpdateCommand, UpdatePlanInput};

/// Inputs for planning an amend of the current branch's tip.
#[derive(Clone, Debug, Default)]
pub struct AmendPlanInput {
    /// The branch whose tip commit is amended.
    pub current_branch: String,

    /// Never force-push.
    pub no_push: bool,

    /// Branches to delete. Only descendants of the current branch are
    /// considered.
    pub branches_deletable: Vec<String>,

    /// Commits each branch has beyond main, oldest first.
    pub branches_ahead_shas: AheadShas,

    /// Branches containing a merge commit.
    pub branches_with_merge_commits: HashSet<String>,

    /// Branches which may be force-pushed.
    pub branches_safe_to_push: HashSet<String>,
}

/// The branches built on top of `current_branch`, each with the current
/// branch's commits cut off the front of its ahead-list.
pub fn descendant_ahead_shas(current_branch: &str, branches_ahead_shas: &AheadShas) -> AheadShas {
    let current_shas = branches_ahead_shas
        .get(current_branch)
        .map(Vec::as_slice)
        .unwrap_or_default();
    branches_ahead_shas
        .iter()
        .filter(|(branch, shas)| branch.as_str() != current_branch && shas.starts_with(current_shas))
        .map(|(branch, shas)| (branch.clone(), shas[current_shas.len()..].to_vec()))
        .collect()
}

/// Amend the current branch's tip, then move every branch built on it to the
/// amended commit.
#[instrument]
pub fn plan_amend_commands(input: &AmendPlanInput) -> Result<Vec<UpdateCommand>> {
    let AmendPlanInput {
        current_branch,
        no_push,
        branches_deletable,
        branches_ahead_shas,
        branches_with_merge_commits,
        branches_safe_to_push,
    } = input;

    let descendants = descendant_ahead_shas(current_branch, branches_ahead_shas);
    let descendant_branches: Vec<String> = descendants.keys().cloned().collect();
    let update_commands = plan_update_commands(&UpdatePlanInput {
        branches: descendant_branches.clone(),
        main_branch: current_branch.clone(),
        no_push: *no_push,
        unsynced_main: false,
        main_branch_is_a_base_branch: true,
        branches_deletable: branches_deletable
            .iter()
            .filter(|branch| descendants.contains_key(*branch))
            .cloned()
            .collect(),
        branches_behind: descendant_branches.into_iter().collect(),
        branches_ahead_shas: descendants,
        branches_with_merge_commits: branches_with_merge_commits.clone(),
        branches_safe_to_push: branches_safe_to_push.clone(),
    })?;

    let mut commands = vec![UpdateCommand::AmendHead];
    commands.extend(update_commands);
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use maplit::hashset;

    use crate::core::rewrite::testing::{ahead_shas, format_commands};

    use super::*;

    fn stack() -> AheadShas {
        ahead_shas(vec![
            ("b1", vec!["11111"]),
            ("b2", vec!["11111", "22222"]),
            ("b3", vec!["11111", "22222", "33333"]),
            ("b3-copy", vec!["11111", "22222", "33333"]),
            ("b4", vec!["11111", "22222", "44444", "55555"]),
            ("other", vec!["99999"]),
        ])
    }

    #[test]
    fn test_descendant_ahead_shas() {
        let descendants = descendant_ahead_shas("b2", &stack());
        assert_eq!(
            descendants,
            ahead_shas(vec![
                ("b3", vec!["33333"]),
                ("b3-copy", vec!["33333"]),
                ("b4", vec!["44444", "55555"]),
            ])
        );
    }

    #[test]
    fn test_plan_amend() -> eyre::Result<()> {
        let commands = plan_amend_commands(&AmendPlanInput {
            current_branch: "b2".to_string(),
            branches_ahead_shas: stack(),
            branches_safe_to_push: hashset! {"b4".to_string()},
            ..Default::default()
        })?;
        insta::assert_snapshot!(format_commands(&commands), @r###"
        git commit --amend --no-edit
        git checkout b3 && git rebase --onto b2 b3~1
        git checkout b3-copy && git reset --hard b3
        git checkout b4 && git rebase --onto b2 b4~2 && git push --force
        git checkout b2
        "###);
        Ok(())
    }

    #[test]
    fn test_plan_amend_nested() -> eyre::Result<()> {
        let commands = plan_amend_commands(&AmendPlanInput {
            current_branch: "b1".to_string(),
            no_push: true,
            branches_ahead_shas: stack(),
            branches_safe_to_push: hashset! {"b4".to_string()},
            ..Default::default()
        })?;
        insta::assert_snapshot!(format_commands(&commands), @r###"
        git commit --amend --no-edit
        git checkout b2 && git rebase --onto b1 b2~1
        git checkout b3 && git rebase --onto b2 b3~1
        git checkout b3-copy && git reset --hard b3
        git checkout b4 && git rebase --onto b2 b4~2
        git checkout b1
        "###);
        Ok(())
    }

    #[test]
    fn test_plan_amend_without_descendants() -> eyre::Result<()> {
        let commands = plan_amend_commands(&AmendPlanInput {
            current_branch: "other".to_string(),
            branches_deletable: vec!["b1".to_string()],
            branches_ahead_shas: stack(),
            ..Default::default()
        })?;
        insta::assert_snapshot!(format_commands(&commands), @"git commit --amend --no-edit");
        Ok(())
    }
}
