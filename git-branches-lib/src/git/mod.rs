//! Tools for interfacing with the Git repository.

mod remote;
mod repo;
mod run;

pub use remote::{fetch_commit, list_remote_tips};
pub use repo::{CommitInfo, Error as RepoError, Repo, Result as RepoResult};
pub use run::{GitRunInfo, GitRunOpts, GitRunResult};

/// Abbreviate a commit hash for display.
pub fn short_sha(sha: &str) -> &str {
    sha.get(..5).unwrap_or(sha)
}
