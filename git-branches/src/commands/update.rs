//! Bring every displayed branch up to date with the main branch.

use std::collections::HashSet;
use std::fmt::Write;
use std::io::{BufRead, BufReader};

use itertools::Itertools;
use lib::core::effects::{Effects, OperationType};
use lib::core::rewrite::{blocking_merge_commit_branches, plan_update_commands, UpdateCommand};
use lib::git::{GitRunInfo, Repo};
use lib::try_exit_code;
use lib::util::{ExitCode, EyreExitOr};
use tracing::instrument;

use super::gather::{gather_branch_facts, BranchFacts, BranchRow};
use super::render::render_branch_table;

/// Print the branch table.
pub(super) fn print_table(effects: &Effects, rows: &[BranchRow]) -> eyre::Result<()> {
    for line in render_branch_table(effects.get_glyphs(), rows)? {
        writeln!(effects.get_output_stream(), "{line}")?;
    }
    Ok(())
}

/// Report branches which can't be handled automatically because they contain
/// merge commits.
pub(super) fn print_merge_commit_error(effects: &Effects, branches: &[&str]) -> eyre::Result<()> {
    writeln!(
        effects.get_error_stream(),
        "These branches contain merge commits, which git branches can't rebase: {}",
        branches.iter().join(", ")
    )?;
    writeln!(
        effects.get_error_stream(),
        "Rebase them by hand and try again."
    )?;
    Ok(())
}

fn confirm(effects: &Effects) -> eyre::Result<bool> {
    write!(effects.get_output_stream(), "Run update commands? [yN] ")?;
    let mut user_input = String::new();
    let mut reader = BufReader::new(std::io::stdin());
    // End of input reads as an empty answer.
    let confirmed = match reader.read_line(&mut user_input) {
        Ok(_size) => {
            let user_input = user_input.trim();
            user_input == "y" || user_input == "Y"
        }
        Err(_) => false,
    };
    Ok(confirmed)
}

/// Show `commands`, ask before running them unless `skip_confirmation` is
/// set, then run them in order until one fails.
pub(super) fn confirm_and_run(
    effects: &Effects,
    git_run_info: &GitRunInfo,
    commands: &[UpdateCommand],
    skip_confirmation: bool,
) -> EyreExitOr<()> {
    if commands.is_empty() {
        writeln!(effects.get_output_stream(), "Everything is up to date.")?;
        return Ok(Ok(()));
    }

    writeln!(
        effects.get_output_stream(),
        "{}",
        commands.iter().join(" && \\\n")
    )?;
    let confirmed = skip_confirmation || confirm(effects)?;
    if !confirmed {
        writeln!(effects.get_output_stream(), "Aborted.")?;
        return Ok(Err(ExitCode(1)));
    }

    for command in commands {
        for args in command.git_invocations() {
            try_exit_code!(git_run_info.run(effects, args.as_slice())?);
        }
    }
    Ok(Ok(()))
}

/// Show the branch table and rebase every branch which is behind main onto
/// its base.
#[instrument]
pub fn update(
    effects: &Effects,
    git_run_info: &GitRunInfo,
    repo: &Repo,
    short: bool,
    no_push: bool,
    skip_confirmation: bool,
) -> EyreExitOr<()> {
    let BranchFacts {
        rows,
        current_branch: _,
        all_branches_ahead_shas: _,
        plan_input,
    } = try_exit_code!(gather_branch_facts(
        effects,
        git_run_info,
        repo,
        short,
        no_push
    )?);
    print_table(effects, &rows)?;

    if short {
        // Pulling main moves every branch behind it.
        let branches_behind: HashSet<String> = if plan_input.unsynced_main {
            plan_input.branches.iter().cloned().collect()
        } else {
            plan_input.branches_behind.clone()
        };
        let blocking_branches = blocking_merge_commit_branches(
            &plan_input.branches,
            &branches_behind,
            &plan_input.branches_with_merge_commits,
        );
        if !blocking_branches.is_empty() {
            print_merge_commit_error(effects, &blocking_branches)?;
            return Ok(Err(ExitCode(1)));
        }
    }

    let commands = {
        let _progress = effects.start_operation(OperationType::PlanUpdate);
        plan_update_commands(&plan_input)?
    };
    confirm_and_run(effects, git_run_info, &commands, skip_confirmation)
}
