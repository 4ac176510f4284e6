//! The command-line options for `git-branches`.

#![warn(missing_docs)]
#![warn(
    clippy::all,
    clippy::as_conversions,
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro
)]

use std::path::PathBuf;

use clap::{Args, Parser, ValueEnum};

/// Whether to display terminal colors.
#[derive(Clone, Debug, ValueEnum)]
pub enum ColorSetting {
    /// Automatically determine whether to display colors from the terminal and environment variables.
    /// This is the default behavior.
    Auto,
    /// Always display terminal colors.
    Always,
    /// Never display terminal colors.
    Never,
}

/// Arguments which apply to all commands. Used during setup.
#[derive(Debug, Parser)]
pub struct GlobalArgs {
    /// Change to the given directory before executing the rest of the program.
    /// (The option is called `-C` for symmetry with Git.)
    #[clap(value_parser, short = 'C', global = true)]
    pub working_directory: Option<PathBuf>,

    /// Flag to force enable or disable terminal colors.
    #[clap(value_parser, long = "color", value_enum, global = true)]
    pub color: Option<ColorSetting>,
}

/// A workflow other than the default "update everything" one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Operation {
    /// Amend the staged changes into the current branch's tip commit, then
    /// rebase the branches stacked on top of it. Implies `--short`.
    Amend,
}

/// Options for the `git branches` command itself.
#[derive(Debug, Args)]
pub struct BranchesArgs {
    /// Only show the main branch, the current branch, and the branches they
    /// are stacked on or that are stacked on them.
    #[clap(action, short = 's', long = "short")]
    pub short: bool,

    /// Don't suggest force-pushing rebased branches.
    #[clap(action, long = "no-push")]
    pub no_push: bool,

    /// Run the proposed commands without asking for confirmation.
    #[clap(action, short = 'y', long = "yes")]
    pub yes: bool,

    /// The workflow to run instead of updating all branches.
    #[clap(value_enum, conflicts_with = "short")]
    pub operation: Option<Operation>,
}

/// Show how local branches are stacked on each other, and bring them up to
/// date with the main branch.
#[derive(Debug, Parser)]
#[clap(name = "git-branches", version = env!("CARGO_PKG_VERSION"))]
pub struct Opts {
    /// Global arguments.
    #[clap(flatten)]
    pub global_args: GlobalArgs,

    /// Command arguments.
    #[clap(flatten)]
    pub branches_args: BranchesArgs,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_opts_are_well_formed() {
        Opts::command().debug_assert();
    }

    #[test]
    fn test_parse_amend() {
        let opts = Opts::parse_from(["git-branches", "--no-push", "amend"]);
        assert!(opts.branches_args.no_push);
        assert!(!opts.branches_args.short);
        assert_eq!(opts.branches_args.operation, Some(Operation::Amend));

        let opts = Opts::parse_from(["git-branches", "-s", "-y", "-C", "/tmp"]);
        assert!(opts.branches_args.short);
        assert!(opts.branches_args.yes);
        assert_eq!(opts.branches_args.operation, None);
        assert_eq!(opts.global_args.working_directory, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_amend_rejects_short() {
        let err = Opts::try_parse_from(["git-branches", "-s", "amend"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
        assert!(Opts::try_parse_from(["git-branches", "--short", "amend"]).is_err());
    }
}
