//! Queries against the hosting remote that `libgit2` can't answer offline.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{instrument, warn};

use crate::core::effects::{Effects, OperationType};
use crate::git::repo::Repo;
use crate::git::run::{GitRunInfo, GitRunOpts};

/// Look up the current tip of each of `branches` on the remote with a single
/// `git ls-remote` call. Branches which don't exist on the remote are absent
/// from the result.
///
/// If the remote can't be reached, a warning is logged and the result is
/// empty, as if no branch had been pushed.
#[instrument]
pub fn list_remote_tips(
    effects: &Effects,
    git_run_info: &GitRunInfo,
    repo: &Repo,
    remote_name: &str,
    branches: &[String],
) -> eyre::Result<HashMap<String, String>> {
    if branches.is_empty() {
        return Ok(HashMap::new());
    }

    let _progress = effects.start_operation(OperationType::QueryRemote);
    let mut args = vec!["ls-remote", "--heads", remote_name];
    args.extend(branches.iter().map(String::as_str));
    let result = git_run_info.run_silent(
        repo,
        &args,
        GitRunOpts {
            treat_git_failure_as_error: false,
        },
    )?;
    if !result.exit_code.is_success() {
        warn!(
            ?remote_name,
            stderr = %String::from_utf8_lossy(&result.stderr),
            "Could not list remote branches"
        );
        return Ok(HashMap::new());
    }

    let stdout = String::from_utf8(result.stdout)?;
    let mut tips = parse_ls_remote_output(&stdout);
    // Patterns match on any trailing path component, so `feature` also
    // matches `other/feature`.
    tips.retain(|branch_name, _| branches.contains(branch_name));
    Ok(tips)
}

fn parse_ls_remote_output(stdout: &str) -> HashMap<String, String> {
    stdout
        .lines()
        .filter_map(|line| {
            let (sha, reference_name) = line.split_once('\t')?;
            let branch_name = reference_name.trim().strip_prefix("refs/heads/")?;
            Some((branch_name.to_owned(), sha.trim().to_owned()))
        })
        .collect()
}

/// Make sure that `sha` is available locally, fetching it from the remote if
/// needed. Returns whether the commit is available afterwards.
#[instrument]
pub fn fetch_commit(
    effects: &Effects,
    git_run_info: &GitRunInfo,
    repo: &Repo,
    remote_name: &str,
    sha: &str,
) -> eyre::Result<bool> {
    if repo.resolve_sha(sha)?.is_some() {
        return Ok(true);
    }

    let _progress = effects.start_operation(OperationType::FetchCommit(Arc::new(sha.to_owned())));
    let result = git_run_info.run_silent(
        repo,
        &["fetch", "--quiet", remote_name, sha],
        GitRunOpts {
            treat_git_failure_as_error: false,
        },
    )?;
    if !result.exit_code.is_success() {
        warn!(
            ?sha,
            stderr = %String::from_utf8_lossy(&result.stderr),
            "Could not fetch remote commit"
        );
    }
    Ok(repo.resolve_sha(sha)?.is_some())
}
