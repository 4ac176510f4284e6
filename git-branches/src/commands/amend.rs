//! Amend the current branch's tip commit and move the branches stacked on it.

use std::fmt::Write;

use lib::core::effects::{Effects, OperationType};
use lib::core::rewrite::{descendant_ahead_shas, plan_amend_commands, AmendPlanInput};
use lib::git::{GitRunInfo, Repo};
use lib::try_exit_code;
use lib::util::{ExitCode, EyreExitOr};
use tracing::instrument;

use super::gather::{gather_branch_facts, BranchFacts};
use super::update::{confirm_and_run, print_merge_commit_error, print_table};

/// Fold the staged changes into the tip of the current branch, then rebase
/// the branches built on top of it.
#[instrument]
pub fn amend(
    effects: &Effects,
    git_run_info: &GitRunInfo,
    repo: &Repo,
    no_push: bool,
    skip_confirmation: bool,
) -> EyreExitOr<()> {
    let current_branch = match repo.get_current_branch()? {
        Some(current_branch) => current_branch,
        None => {
            writeln!(
                effects.get_error_stream(),
                "HEAD is detached. Check out the branch to amend first."
            )?;
            return Ok(Err(ExitCode(1)));
        }
    };
    if !repo.has_staged_changes()? {
        writeln!(
            effects.get_error_stream(),
            "There are no staged changes to amend. Stage them with: git add"
        )?;
        return Ok(Err(ExitCode(1)));
    }

    let BranchFacts {
        rows,
        current_branch: _,
        all_branches_ahead_shas,
        plan_input,
    } = try_exit_code!(gather_branch_facts(
        effects,
        git_run_info,
        repo,
        true,
        no_push
    )?);

    if current_branch == plan_input.main_branch {
        writeln!(
            effects.get_error_stream(),
            "Cannot amend the main branch {current_branch}. Use git commit --amend directly."
        )?;
        return Ok(Err(ExitCode(1)));
    }
    if !all_branches_ahead_shas.contains_key(&current_branch) {
        writeln!(
            effects.get_error_stream(),
            "Branch {current_branch} has no commits beyond {} to amend.",
            plan_input.main_branch
        )?;
        return Ok(Err(ExitCode(1)));
    }
    let descendants = descendant_ahead_shas(&current_branch, &all_branches_ahead_shas);
    let blocking_branches: Vec<&str> = std::iter::once(&current_branch)
        .chain(descendants.keys())
        .filter(|branch| plan_input.branches_with_merge_commits.contains(*branch))
        .map(String::as_str)
        .collect();
    if !blocking_branches.is_empty() {
        print_merge_commit_error(effects, &blocking_branches)?;
        return Ok(Err(ExitCode(1)));
    }

    print_table(effects, &rows)?;
    let commands = {
        let _progress = effects.start_operation(OperationType::PlanUpdate);
        plan_amend_commands(&AmendPlanInput {
            current_branch,
            no_push,
            branches_deletable: plan_input.branches_deletable,
            branches_ahead_shas: plan_input.branches_ahead_shas,
            branches_with_merge_commits: plan_input.branches_with_merge_commits,
            branches_safe_to_push: plan_input.branches_safe_to_push,
        })?
    };
    confirm_and_run(effects, git_run_info, &commands, skip_confirmation)
}
