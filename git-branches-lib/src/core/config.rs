//! Accesses repo-specific configuration.

use tracing::instrument;

use crate::git::Repo;

/// Branch names tried, in order, when the main branch is neither configured
/// nor recorded as the remote's default branch.
pub const CONVENTIONAL_MAIN_BRANCH_NAMES: &[&str] = &["main", "release", "master"];

/// Get the name of the remote which hosts the branches.
///
/// Reads `branches.core.remote`, defaulting to `origin`.
#[instrument]
pub fn get_remote_name(repo: &Repo) -> eyre::Result<String> {
    Ok(repo
        .get_config_string("branches.core.remote")?
        .unwrap_or_else(|| "origin".to_string()))
}

/// Get the configured name of the main branch.
///
/// The following are resolved, in order. The first valid value is returned.
/// - `branches.core.mainBranch`
/// - the branch that `refs/remotes/<remote>/HEAD` points to
/// - the first of `main`, `release` or `master` that exists locally
///
/// Returns `None` if none of these apply.
#[instrument]
pub fn get_main_branch_name(repo: &Repo) -> eyre::Result<Option<String>> {
    if let Some(branch_name) = repo.get_config_string("branches.core.mainBranch")? {
        return Ok(Some(branch_name));
    }

    let remote_name = get_remote_name(repo)?;
    if let Some(branch_name) = repo.get_remote_default_branch(&remote_name)? {
        return Ok(Some(branch_name));
    }

    for branch_name in CONVENTIONAL_MAIN_BRANCH_NAMES {
        if repo.branch_exists(branch_name)? {
            return Ok(Some(branch_name.to_string()));
        }
    }
    Ok(None)
}

/// Whether to look up change requests on the hosting service.
#[instrument]
pub fn get_forge_enabled(repo: &Repo) -> eyre::Result<bool> {
    Ok(repo
        .get_config_bool("branches.forge.enabled")?
        .unwrap_or(true))
}

/// Environment variables which affect the functioning of `git-branches`.
pub mod env_vars {
    use std::path::PathBuf;
    use std::process::Command;

    use chrono::{DateTime, Utc};
    use eyre::Context;
    use tracing::instrument;

    /// Path to the Git executable to shell out to as a subprocess when
    /// appropriate. This may be set during tests.
    pub const TEST_GIT: &str = "TEST_GIT";

    /// "Path to wherever your core Git programs are installed". You can find
    /// the default value by running `git --exec-path`.
    ///
    /// See <https://git-scm.com/docs/git#Documentation/git.txt---exec-pathltpathgt>.
    pub const TEST_GIT_EXEC_PATH: &str = "TEST_GIT_EXEC_PATH";

    /// A Unix timestamp to use as the current time when computing branch ages,
    /// so that test output doesn't depend on the day it was run.
    pub const TEST_CURRENT_TIME: &str = "TEST_CURRENT_TIME";

    fn find_git_on_path() -> Option<PathBuf> {
        let path = std::env::var_os("PATH")?;
        std::env::split_paths(&path)
            .map(|dir| dir.join("git"))
            .find(|candidate| candidate.is_file())
    }

    /// Get the path to the Git executable for testing, falling back to the
    /// `git` found on `PATH`.
    #[instrument]
    pub fn get_path_to_git() -> eyre::Result<PathBuf> {
        match std::env::var_os(TEST_GIT) {
            Some(path_to_git) => Ok(PathBuf::from(path_to_git)),
            None => find_git_on_path().ok_or_else(|| {
                eyre::eyre!(
                    "No path to Git executable was set and none was found on PATH. \
Try running as: `{0}=$(which git) cargo test ...`",
                    TEST_GIT,
                )
            }),
        }
    }

    /// Get the `GIT_EXEC_PATH` environment variable for testing, falling back
    /// to asking the Git executable itself.
    #[instrument]
    pub fn get_git_exec_path() -> eyre::Result<PathBuf> {
        if let Some(git_exec_path) = std::env::var_os(TEST_GIT_EXEC_PATH) {
            return Ok(PathBuf::from(git_exec_path));
        }

        let output = Command::new(get_path_to_git()?)
            .arg("--exec-path")
            .output()
            .wrap_err("Querying Git exec path")?;
        if !output.status.success() {
            eyre::bail!(
                "No Git exec path was set. Try running as: `{0}=$(git --exec-path) cargo test ...`",
                TEST_GIT_EXEC_PATH,
            );
        }
        let git_exec_path = String::from_utf8(output.stdout)?;
        Ok(PathBuf::from(git_exec_path.trim_end()))
    }

    /// The time against which branch ages are measured.
    pub fn get_current_time() -> DateTime<Utc> {
        std::env::var(TEST_CURRENT_TIME)
            .ok()
            .and_then(|timestamp| timestamp.parse::<i64>().ok())
            .and_then(|timestamp| DateTime::from_timestamp(timestamp, 0))
            .unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{make_git, make_git_with_remote_repo, GitInitOptions};

    #[test]
    fn test_main_branch_from_conventional_names() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;
        assert_eq!(get_main_branch_name(&repo)?, Some("master".to_string()));

        git.run(&["branch", "release"])?;
        assert_eq!(get_main_branch_name(&repo)?, Some("release".to_string()));

        git.run(&["config", "branches.core.mainBranch", "trunk"])?;
        assert_eq!(get_main_branch_name(&repo)?, Some("trunk".to_string()));
        Ok(())
    }

    #[test]
    fn test_main_branch_unresolvable() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo_with_options(&GitInitOptions {
            make_initial_commit: false,
        })?;
        let repo = git.get_repo()?;
        assert_eq!(get_main_branch_name(&repo)?, None);
        Ok(())
    }

    #[test]
    fn test_main_branch_from_remote_head() -> eyre::Result<()> {
        let git_wrapper = make_git_with_remote_repo()?;
        let original_repo = &git_wrapper.original_repo;
        original_repo.init_repo()?;
        original_repo.run(&["branch", "-m", "trunk"])?;
        original_repo.clone_repo_into(&git_wrapper.cloned_repo, &[])?;

        let cloned_repo = git_wrapper.cloned_repo.get_repo()?;
        assert_eq!(get_main_branch_name(&cloned_repo)?, Some("trunk".to_string()));
        assert_eq!(get_remote_name(&cloned_repo)?, "origin");
        Ok(())
    }
}
