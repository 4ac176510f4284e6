//! The `git branches` command and its `amend` workflow.

mod amend;
pub mod gather;
pub mod render;
mod update;

use git_branches_invoke::CommandContext;
use git_branches_opts::{BranchesArgs, Operation, Opts};
use lib::git::Repo;
use lib::util::EyreExitOr;

/// Run `git branches` with the parsed command line.
pub fn command_main(ctx: CommandContext, opts: Opts) -> EyreExitOr<()> {
    let CommandContext {
        effects,
        git_run_info,
    } = ctx;
    let Opts {
        global_args: _,
        branches_args:
            BranchesArgs {
                short,
                no_push,
                yes,
                operation,
            },
    } = opts;

    let repo = Repo::from_dir(&git_run_info.working_directory)?;
    match operation {
        None => update::update(&effects, &git_run_info, &repo, short, no_push, yes),
        Some(Operation::Amend) => amend::amend(&effects, &git_run_info, &repo, no_push, yes),
    }
}
