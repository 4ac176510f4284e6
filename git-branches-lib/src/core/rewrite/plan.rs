use std::collections::HashSet;
use std::fmt::Display;

use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, instrument};

use super::{base_branches_from_refs, branches_ahead_shas_to_refs, AheadShas, BaseBranch, BaseBranches, CommitRef};

/// Malformed planner input.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("branch {branch:?} is its own base: {}", cycle.join(" -> "))]
    BaseCycle { branch: String, cycle: Vec<String> },
}

/// Result type for rebase planning.
pub type Result<T> = std::result::Result<T, PlanError>;

/// How a branch is moved on top of its base.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebaseKind {
    /// Replay every commit the branch has beyond its target.
    Plain,

    /// The branch has no commits of its own: point it at the target.
    Reset,

    /// Replay only the branch's last `offset` commits onto the target.
    Onto {
        /// Number of commits, counted back from the tip, to replay.
        offset: usize,
    },
}

impl RebaseKind {
    fn from_offset(offset: usize) -> Self {
        match offset {
            0 => RebaseKind::Reset,
            offset => RebaseKind::Onto { offset },
        }
    }
}

/// One branch's part of the plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RebaseEntry {
    /// The branch to check out and move.
    pub branch: String,

    /// What it's moved on top of.
    pub target: CommitRef,

    /// How it's moved.
    pub kind: RebaseKind,

    /// Whether the hosted copy is force-updated afterwards.
    pub force_push: bool,
}

/// A single step of the update, rendered as one or more chained Git
/// invocations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateCommand {
    /// Check out main and pull its hosted copy.
    SyncMain {
        /// The main branch.
        main_branch: String,
    },

    /// Check out a branch without touching it.
    CheckOut {
        /// The branch to check out.
        branch: String,
    },

    /// Delete a local branch.
    DeleteBranch {
        /// The branch to delete.
        branch: String,
    },

    /// Move a branch onto its base.
    Rebase(RebaseEntry),

    /// Fold the staged changes into the commit at `HEAD`.
    AmendHead,
}

impl UpdateCommand {
    /// The Git invocations (arguments after `git`) this command runs, in
    /// order. Each one only runs if the previous one succeeded.
    pub fn git_invocations(&self) -> Vec<Vec<String>> {
        fn args(args: &[&str]) -> Vec<String> {
            args.iter().map(|arg| arg.to_string()).collect()
        }

        match self {
            UpdateCommand::SyncMain { main_branch } => {
                vec![args(&["checkout", main_branch.as_str()]), args(&["pull"])]
            }
            UpdateCommand::CheckOut { branch } => vec![args(&["checkout", branch.as_str()])],
            UpdateCommand::DeleteBranch { branch } => {
                vec![args(&["branch", "--delete", "--force", branch.as_str()])]
            }
            UpdateCommand::Rebase(RebaseEntry {
                branch,
                target,
                kind,
                force_push,
            }) => {
                let mut result = vec![args(&["checkout", branch.as_str()])];
                result.push(match kind {
                    RebaseKind::Plain => args(&["rebase", target.as_str()]),
                    RebaseKind::Reset => args(&["reset", "--hard", target.as_str()]),
                    RebaseKind::Onto { offset } => args(&[
                        "rebase",
                        "--onto",
                        target.as_str(),
                        CommitRef::new(branch, *offset).as_str(),
                    ]),
                });
                if *force_push {
                    result.push(args(&["push", "--force"]));
                }
                result
            }
            UpdateCommand::AmendHead => vec![args(&["commit", "--amend", "--no-edit"])],
        }
    }
}

impl Display for UpdateCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let invocations = self
            .git_invocations()
            .into_iter()
            .map(|args| format!("git {}", args.join(" ")))
            .join(" && ");
        write!(f, "{invocations}")
    }
}

/// Everything known about the branches that the planner needs.
#[derive(Clone, Debug, Default)]
pub struct UpdatePlanInput {
    /// The branches to consider, in display order.
    pub branches: Vec<String>,

    /// The branch everything is ultimately rebased onto.
    pub main_branch: String,

    /// Never force-push.
    pub no_push: bool,

    /// Main's hosted copy has moved: pull it and rebase everything.
    pub unsynced_main: bool,

    /// Branches with no recorded base are still offset against `main_branch`
    /// rather than rebased wholesale. Used after amending, when "main" is the
    /// amended branch.
    pub main_branch_is_a_base_branch: bool,

    /// Branches to delete, in order.
    pub branches_deletable: Vec<String>,

    /// Branches missing some of main's commits.
    pub branches_behind: HashSet<String>,

    /// Commits each branch has beyond main, oldest first.
    pub branches_ahead_shas: AheadShas,

    /// Branches containing a merge commit. These are never touched.
    pub branches_with_merge_commits: HashSet<String>,

    /// Branches which may be force-pushed.
    pub branches_safe_to_push: HashSet<String>,
}

/// Order the branches of `base_branches` so that every base comes before the
/// branches layered on it, even transitively.
pub fn rebase_order(base_branches: &BaseBranches) -> Result<Vec<String>> {
    let mut placed: HashSet<&str> = HashSet::new();
    let mut result = Vec::new();
    for branch in base_branches.keys() {
        for ancestor in ancestor_chain(base_branches, branch)? {
            if placed.insert(ancestor) {
                result.push(ancestor.to_owned());
            }
        }
    }
    Ok(result)
}

/// `branch` and its bases, outermost base first.
fn ancestor_chain<'a>(base_branches: &'a BaseBranches, branch: &'a str) -> Result<Vec<&'a str>> {
    let mut chain = vec![branch];
    let mut current = branch;
    while let Some(BaseBranch { base_ref, .. }) = base_branches.get(current) {
        let base = base_ref.branch_name();
        if chain.contains(&base) {
            chain.push(base);
            return Err(PlanError::BaseCycle {
                branch: branch.to_owned(),
                cycle: chain.into_iter().map(ToOwned::to_owned).collect(),
            });
        }
        chain.push(base);
        current = base;
    }
    chain.reverse();
    Ok(chain)
}

/// Produce the commands which bring every branch of `input` up to date.
#[instrument]
pub fn plan_update_commands(input: &UpdatePlanInput) -> Result<Vec<UpdateCommand>> {
    let UpdatePlanInput {
        branches,
        main_branch,
        no_push,
        unsynced_main,
        main_branch_is_a_base_branch,
        branches_deletable,
        branches_behind,
        branches_ahead_shas,
        branches_with_merge_commits,
        branches_safe_to_push,
    } = input;

    let mut commands = Vec::new();
    let mut branches_ahead_shas = branches_ahead_shas.clone();
    let branches_deletable: Vec<&String> = branches_deletable
        .iter()
        .filter(|branch| !branches_with_merge_commits.contains(*branch))
        .collect();

    let branches_behind: HashSet<&str> = if *unsynced_main {
        commands.push(UpdateCommand::SyncMain {
            main_branch: main_branch.clone(),
        });
        branches.iter().map(String::as_str).collect()
    } else {
        if !branches_deletable.is_empty() {
            commands.push(UpdateCommand::CheckOut {
                branch: main_branch.clone(),
            });
        }
        branches_behind.iter().map(String::as_str).collect()
    };

    let mut branches_to_rebase: Vec<&str> = Vec::new();
    for branch in branches {
        if branches_with_merge_commits.contains(branch) {
            debug!(?branch, "Skipping branch with merge commit");
            branches_ahead_shas.shift_remove(branch);
            continue;
        }
        if branches_behind.contains(branch.as_str())
            && !branches_deletable.contains(&branch)
            && branch != main_branch
        {
            branches_to_rebase.push(branch);
        }
    }

    for branch in &branches_deletable {
        commands.push(UpdateCommand::DeleteBranch {
            branch: (*branch).clone(),
        });
    }

    if !branches_to_rebase.is_empty() {
        for branch in &branches_deletable {
            branches_ahead_shas.shift_remove(*branch);
        }
        let base_branches =
            base_branches_from_refs(&branches_ahead_shas_to_refs(&branches_ahead_shas));
        let order = rebase_order(&base_branches)?;

        let mut rebased: HashSet<&str> = HashSet::new();
        for branch in order
            .iter()
            .map(String::as_str)
            .chain(branches_to_rebase.iter().copied())
        {
            if !branches_to_rebase.contains(&branch) || !rebased.insert(branch) {
                continue;
            }

            let (target, kind) = match base_branches.get(branch) {
                Some(BaseBranch {
                    base_ref,
                    commit_count,
                }) => (base_ref.clone(), RebaseKind::from_offset(*commit_count)),
                None if *main_branch_is_a_base_branch => {
                    let offset = branches_ahead_shas.get(branch).map_or(0, Vec::len);
                    (
                        CommitRef::from(main_branch.as_str()),
                        RebaseKind::from_offset(offset),
                    )
                }
                None => (CommitRef::from(main_branch.as_str()), RebaseKind::Plain),
            };
            commands.push(UpdateCommand::Rebase(RebaseEntry {
                branch: branch.to_owned(),
                target,
                kind,
                force_push: branches_safe_to_push.contains(branch) && !*no_push,
            }));
        }
    }

    if !commands.is_empty() {
        commands.push(UpdateCommand::CheckOut {
            branch: main_branch.clone(),
        });
    }
    Ok(commands)
}

/// Branches among `branches` which would have to be rebased but contain a
/// merge commit.
pub fn blocking_merge_commit_branches<'a>(
    branches: &'a [String],
    branches_behind: &HashSet<String>,
    branches_with_merge_commits: &HashSet<String>,
) -> Vec<&'a str> {
    branches
        .iter()
        .filter(|branch| {
            branches_behind.contains(*branch) && branches_with_merge_commits.contains(*branch)
        })
        .map(String::as_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use maplit::hashset;

    use crate::core::rewrite::testing::{ahead_shas, format_commands};

    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn fixture_ahead_shas() -> AheadShas {
        ahead_shas(vec![
            ("b5", vec!["42792", "d208f", "dee9e", "48865", "3569e", "51348", "9e021", "69b22"]),
            ("b7", vec!["42792", "51348"]),
            ("b6", vec!["42792", "48865", "3569e"]),
        ])
    }

    #[test]
    fn test_rebase_order_bases_first() -> eyre::Result<()> {
        let input = ahead_shas(vec![
            ("b2", vec!["d0001"]),
            ("b3", vec!["d0001", "d0002"]),
            ("b4", vec!["d0001", "d0002", "d0003"]),
            ("b5", vec!["e0001", "e0002"]),
            ("b6", vec!["e0001", "e0003"]),
            ("b7", vec!["e0001", "e0003", "e0004"]),
            ("b8", vec!["e0001", "e0005"]),
            ("b9", vec!["e0001", "e0005", "e0006"]),
        ]);
        let base_branches = base_branches_from_refs(&branches_ahead_shas_to_refs(&input));
        insta::assert_snapshot!(rebase_order(&base_branches)?.join(" "), @"b2 b3 b5 b6 b8 b4 b7 b9");
        Ok(())
    }

    #[test]
    fn test_rebase_order_detects_cycle() {
        let mut base_branches = BaseBranches::new();
        base_branches.insert(
            "a".to_string(),
            BaseBranch {
                base_ref: CommitRef::from("b~1"),
                commit_count: 1,
            },
        );
        base_branches.insert(
            "b".to_string(),
            BaseBranch {
                base_ref: CommitRef::from("a"),
                commit_count: 2,
            },
        );
        let error = rebase_order(&base_branches).unwrap_err();
        insta::assert_snapshot!(error, @r###"branch "a" is its own base: a -> b -> a"###);
    }

    #[test]
    fn test_plan_onto_offsets() -> eyre::Result<()> {
        let commands = plan_update_commands(&UpdatePlanInput {
            branches: strings(&["main", "b5", "b7", "b6"]),
            main_branch: "main".to_string(),
            branches_behind: hashset! {"b5".to_string(), "b6".to_string(), "b7".to_string()},
            branches_ahead_shas: fixture_ahead_shas(),
            ..Default::default()
        })?;
        insta::assert_snapshot!(format_commands(&commands), @r###"
        git checkout b7 && git rebase main
        git checkout b6 && git rebase --onto b7~1 b6~2
        git checkout b5 && git rebase --onto b7 b5~2
        git checkout main
        "###);
        Ok(())
    }

    #[test]
    fn test_plan_nothing_behind() -> eyre::Result<()> {
        let commands = plan_update_commands(&UpdatePlanInput {
            branches: strings(&["main", "b5", "b7", "b6"]),
            main_branch: "main".to_string(),
            branches_ahead_shas: fixture_ahead_shas(),
            ..Default::default()
        })?;
        assert!(commands.is_empty());
        Ok(())
    }

    #[test]
    fn test_plan_force_push_and_no_push() -> eyre::Result<()> {
        let input = UpdatePlanInput {
            branches: strings(&["main", "b7", "b6"]),
            main_branch: "main".to_string(),
            branches_behind: hashset! {"b6".to_string(), "b7".to_string()},
            branches_ahead_shas: ahead_shas(vec![
                ("b7", vec!["42792", "51348"]),
                ("b6", vec!["42792", "51348", "3569e"]),
            ]),
            branches_safe_to_push: hashset! {"b6".to_string()},
            ..Default::default()
        };
        insta::assert_snapshot!(format_commands(&plan_update_commands(&input)?), @r###"
        git checkout b7 && git rebase main
        git checkout b6 && git rebase --onto b7 b6~1 && git push --force
        git checkout main
        "###);

        let input = UpdatePlanInput {
            no_push: true,
            ..input
        };
        insta::assert_snapshot!(format_commands(&plan_update_commands(&input)?), @r###"
        git checkout b7 && git rebase main
        git checkout b6 && git rebase --onto b7 b6~1
        git checkout main
        "###);
        Ok(())
    }

    #[test]
    fn test_plan_reset_when_sharing_tip() -> eyre::Result<()> {
        let commands = plan_update_commands(&UpdatePlanInput {
            branches: strings(&["main", "b3", "b4"]),
            main_branch: "main".to_string(),
            branches_behind: hashset! {"b3".to_string(), "b4".to_string()},
            branches_ahead_shas: ahead_shas(vec![
                ("b3", vec!["aaaaa", "bbbbb"]),
                ("b4", vec!["aaaaa", "bbbbb"]),
            ]),
            ..Default::default()
        })?;
        insta::assert_snapshot!(format_commands(&commands), @r###"
        git checkout b3 && git rebase main
        git checkout b4 && git reset --hard b3
        git checkout main
        "###);
        Ok(())
    }

    #[test]
    fn test_plan_deletable_branch_falls_back_to_main() -> eyre::Result<()> {
        let commands = plan_update_commands(&UpdatePlanInput {
            branches: strings(&["main", "b2", "b3"]),
            main_branch: "main".to_string(),
            branches_deletable: strings(&["b2"]),
            branches_behind: hashset! {"b2".to_string(), "b3".to_string()},
            branches_ahead_shas: ahead_shas(vec![
                ("b2", vec!["38089"]),
                ("b3", vec!["38089", "42d83", "21d67"]),
            ]),
            ..Default::default()
        })?;
        insta::assert_snapshot!(format_commands(&commands), @r###"
        git checkout main
        git branch --delete --force b2
        git checkout b3 && git rebase main
        git checkout main
        "###);
        Ok(())
    }

    #[test]
    fn test_plan_deletable_only() -> eyre::Result<()> {
        let commands = plan_update_commands(&UpdatePlanInput {
            branches: strings(&["main", "b2"]),
            main_branch: "main".to_string(),
            branches_deletable: strings(&["b2"]),
            branches_ahead_shas: ahead_shas(vec![("b2", vec!["38089"])]),
            ..Default::default()
        })?;
        insta::assert_snapshot!(format_commands(&commands), @r###"
        git checkout main
        git branch --delete --force b2
        git checkout main
        "###);
        Ok(())
    }

    #[test]
    fn test_plan_unsynced_main_rebases_everything() -> eyre::Result<()> {
        let commands = plan_update_commands(&UpdatePlanInput {
            branches: strings(&["main", "b3", "b2", "b9"]),
            main_branch: "main".to_string(),
            unsynced_main: true,
            branches_deletable: strings(&["b9"]),
            branches_ahead_shas: ahead_shas(vec![
                ("b2", vec!["38089"]),
                ("b3", vec!["38089", "42d83"]),
                ("b9", vec!["99999"]),
            ]),
            ..Default::default()
        })?;
        insta::assert_snapshot!(format_commands(&commands), @r###"
        git checkout main && git pull
        git branch --delete --force b9
        git checkout b2 && git rebase main
        git checkout b3 && git rebase --onto b2 b3~1
        git checkout main
        "###);
        Ok(())
    }

    #[test]
    fn test_plan_skips_merge_commit_branches() -> eyre::Result<()> {
        let input = UpdatePlanInput {
            branches: strings(&["main", "b2", "b3", "b4"]),
            main_branch: "main".to_string(),
            branches_deletable: strings(&["b4"]),
            branches_behind: hashset! {"b2".to_string(), "b3".to_string(), "b4".to_string()},
            branches_ahead_shas: ahead_shas(vec![
                ("b2", vec!["38089"]),
                ("b3", vec!["38089", "42d83"]),
                ("b4", vec!["44444"]),
            ]),
            branches_with_merge_commits: hashset! {"b2".to_string(), "b4".to_string()},
            ..Default::default()
        };
        let commands = plan_update_commands(&input)?;
        insta::assert_snapshot!(format_commands(&commands), @r###"
        git checkout b3 && git rebase main
        git checkout main
        "###);
        for command in &commands {
            if let UpdateCommand::Rebase(RebaseEntry { branch, .. })
            | UpdateCommand::DeleteBranch { branch } = command
            {
                assert!(!input.branches_with_merge_commits.contains(branch));
            }
        }
        assert_eq!(
            blocking_merge_commit_branches(
                &input.branches,
                &input.branches_behind,
                &input.branches_with_merge_commits
            ),
            vec!["b2", "b4"]
        );
        Ok(())
    }

    #[test]
    fn test_plan_bases_come_first() -> eyre::Result<()> {
        let input = UpdatePlanInput {
            branches: strings(&["main", "b4", "b9", "b3", "b8", "b2", "b5"]),
            main_branch: "main".to_string(),
            branches_behind: strings(&["b4", "b9", "b3", "b8", "b2", "b5"])
                .into_iter()
                .collect(),
            branches_ahead_shas: ahead_shas(vec![
                ("b4", vec!["d0001", "d0002", "d0003"]),
                ("b9", vec!["e0001", "e0005", "e0006"]),
                ("b3", vec!["d0001", "d0002"]),
                ("b8", vec!["e0001", "e0005"]),
                ("b2", vec!["d0001"]),
                ("b5", vec!["e0001", "e0002"]),
            ]),
            ..Default::default()
        };
        let commands = plan_update_commands(&input)?;
        insta::assert_snapshot!(format_commands(&commands), @r###"
        git checkout b2 && git rebase main
        git checkout b3 && git rebase --onto b2 b3~1
        git checkout b5 && git rebase main
        git checkout b8 && git rebase --onto b5~1 b8~1
        git checkout b4 && git rebase --onto b3 b4~1
        git checkout b9 && git rebase --onto b8 b9~1
        git checkout main
        "###);

        let position = |branch: &str| {
            commands.iter().position(|command| {
                matches!(command, UpdateCommand::Rebase(entry) if entry.branch == branch)
            })
        };
        let base_branches =
            base_branches_from_refs(&branches_ahead_shas_to_refs(&input.branches_ahead_shas));
        for (dependent, BaseBranch { base_ref, .. }) in &base_branches {
            if let Some(base_position) = position(base_ref.branch_name()) {
                assert!(base_position < position(dependent.as_str()).unwrap());
            }
        }
        Ok(())
    }

    #[test]
    fn test_plan_main_as_base() -> eyre::Result<()> {
        let commands = plan_update_commands(&UpdatePlanInput {
            branches: strings(&["b2", "b3"]),
            main_branch: "b1".to_string(),
            main_branch_is_a_base_branch: true,
            branches_behind: hashset! {"b2".to_string(), "b3".to_string()},
            branches_ahead_shas: ahead_shas(vec![("b2", vec!["22222", "33333"]), ("b3", vec![])]),
            ..Default::default()
        })?;
        insta::assert_snapshot!(format_commands(&commands), @r###"
        git checkout b2 && git rebase --onto b1 b2~2
        git checkout b3 && git reset --hard b1
        git checkout b1
        "###);
        Ok(())
    }
}
