//! Operations on the Git repository. Every lookup that `git2` reports as
//! `NotFound` is surfaced here as `None` instead of an error, and every other
//! failure carries enough context to say which query went wrong.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use thiserror::Error;
use tracing::instrument;

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not open repository: {0}")]
    OpenRepo(#[source] git2::Error),

    #[error("could not read config: {0}")]
    ReadConfig(#[source] git2::Error),

    #[error("could not read config key {key:?}: {source}")]
    ReadConfigKey { source: git2::Error, key: String },

    #[error("could not enumerate branches: {0}")]
    GetBranches(#[source] git2::Error),

    #[error("could not read branch information: {0}")]
    ReadBranch(#[source] git2::Error),

    #[error("could not find branch with name '{name}': {source}")]
    FindBranch { source: git2::Error, name: String },

    #[error("could not find reference '{name}': {source}")]
    FindReference { source: git2::Error, name: String },

    #[error("could not parse revision '{spec}': {source}")]
    RevParse { source: git2::Error, spec: String },

    #[error("could not find commit {sha}: {source}")]
    FindCommit { source: git2::Error, sha: String },

    #[error("could not calculate ahead/behind counts between {lhs} and {rhs}: {source}")]
    AheadBehind {
        source: git2::Error,
        lhs: String,
        rhs: String,
    },

    #[error("could not walk commits: {0}")]
    Revwalk(#[source] git2::Error),

    #[error("could not diff HEAD and index: {0}")]
    DiffTreeToIndex(#[source] git2::Error),

    #[error("could not find remote '{name}': {source}")]
    FindRemote { source: git2::Error, name: String },

    #[error("could not decode UTF-8 value for {item}")]
    DecodeUtf8 { item: &'static str },
}

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The commit metadata needed to describe a branch tip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitInfo {
    /// The full hash of the commit.
    pub sha: String,

    /// The email address of the commit author, if it was valid UTF-8.
    pub author_email: Option<String>,

    /// When the commit was authored.
    pub author_time: DateTime<Utc>,

    /// When the commit was last committed (e.g. rebased).
    pub commit_time: DateTime<Utc>,
}

fn git_time_to_utc(time: git2::Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.seconds(), 0).unwrap_or_default()
}

/// Wrapper around `git2::Repository`.
pub struct Repo {
    inner: git2::Repository,
}

impl std::fmt::Debug for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Git repository at: {:?}>", self.get_path())
    }
}

impl Repo {
    /// Get the Git repository associated with the given directory.
    #[instrument]
    pub fn from_dir(path: &Path) -> Result<Self> {
        let repo = git2::Repository::discover(path).map_err(Error::OpenRepo)?;
        Ok(Repo { inner: repo })
    }

    /// Get the path to the `.git` directory for the repository.
    pub fn get_path(&self) -> &Path {
        self.inner.path()
    }

    /// Get the path to the working copy for this repository. If the repository
    /// is bare (has no working copy), returns `None`.
    pub fn get_working_copy_path(&self) -> Option<PathBuf> {
        self.inner.workdir().map(Path::to_owned)
    }

    /// Read a string value from the repository's configuration.
    #[instrument]
    pub fn get_config_string(&self, key: &str) -> Result<Option<String>> {
        let config = self.inner.config().map_err(Error::ReadConfig)?;
        match config.get_string(key) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(source) => Err(Error::ReadConfigKey {
                source,
                key: key.to_owned(),
            }),
        }
    }

    /// Read a boolean value from the repository's configuration.
    #[instrument]
    pub fn get_config_bool(&self, key: &str) -> Result<Option<bool>> {
        let config = self.inner.config().map_err(Error::ReadConfig)?;
        match config.get_bool(key) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(source) => Err(Error::ReadConfigKey {
                source,
                key: key.to_owned(),
            }),
        }
    }

    /// The configured `user.email`, i.e. the person running the command.
    pub fn get_user_email(&self) -> Result<Option<String>> {
        self.get_config_string("user.email")
    }

    /// Get the names of all local branches, most recently authored tip first.
    /// Branches authored at the same moment are ordered by name.
    #[instrument]
    pub fn list_local_branches(&self) -> Result<Vec<String>> {
        let mut branches = Vec::new();
        for branch in self
            .inner
            .branches(Some(git2::BranchType::Local))
            .map_err(Error::GetBranches)?
        {
            let (branch, _branch_type) = branch.map_err(Error::ReadBranch)?;
            let name = match branch.name().map_err(Error::ReadBranch)? {
                Some(name) => name.to_owned(),
                None => return Err(Error::DecodeUtf8 { item: "branch name" }),
            };
            let author_time = match branch.get().peel_to_commit() {
                Ok(commit) => commit.author().when().seconds(),
                Err(_) => i64::MIN,
            };
            branches.push((author_time, name));
        }
        Ok(branches
            .into_iter()
            .sorted_by(|(lhs_time, lhs_name), (rhs_time, rhs_name)| {
                rhs_time.cmp(lhs_time).then_with(|| lhs_name.cmp(rhs_name))
            })
            .map(|(_, name)| name)
            .collect())
    }

    /// Whether a local branch with the given name exists.
    #[instrument]
    pub fn branch_exists(&self, name: &str) -> Result<bool> {
        match self.inner.find_branch(name, git2::BranchType::Local) {
            Ok(_) => Ok(true),
            Err(err) if err.code() == git2::ErrorCode::NotFound => Ok(false),
            Err(source) => Err(Error::FindBranch {
                source,
                name: name.to_owned(),
            }),
        }
    }

    /// Get the name of the checked-out branch, or `None` if `HEAD` is detached.
    #[instrument]
    pub fn get_current_branch(&self) -> Result<Option<String>> {
        let head = match self.inner.find_reference("HEAD") {
            Ok(head) => head,
            Err(err) if err.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(source) => {
                return Err(Error::FindReference {
                    source,
                    name: "HEAD".to_owned(),
                })
            }
        };
        Ok(head
            .symbolic_target()
            .and_then(|target| target.strip_prefix("refs/heads/"))
            .map(ToOwned::to_owned))
    }

    /// Get the branch that `refs/remotes/<remote>/HEAD` points to, if the remote
    /// has a recorded default branch.
    #[instrument]
    pub fn get_remote_default_branch(&self, remote_name: &str) -> Result<Option<String>> {
        let name = format!("refs/remotes/{remote_name}/HEAD");
        let reference = match self.inner.find_reference(&name) {
            Ok(reference) => reference,
            Err(err) if err.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(source) => return Err(Error::FindReference { source, name }),
        };
        let prefix = format!("refs/remotes/{remote_name}/");
        Ok(reference
            .symbolic_target()
            .and_then(|target| target.strip_prefix(prefix.as_str()))
            .map(ToOwned::to_owned))
    }

    /// Get the URL of the named remote, if it exists.
    #[instrument]
    pub fn get_remote_url(&self, remote_name: &str) -> Result<Option<String>> {
        match self.inner.find_remote(remote_name) {
            Ok(remote) => Ok(remote.url().map(ToOwned::to_owned)),
            Err(err) if err.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(err) if err.code() == git2::ErrorCode::InvalidSpec => Ok(None),
            Err(source) => Err(Error::FindRemote {
                source,
                name: remote_name.to_owned(),
            }),
        }
    }

    fn resolve_oid(&self, spec: &str) -> Result<Option<git2::Oid>> {
        match self.inner.revparse_single(spec) {
            Ok(object) => match object.peel_to_commit() {
                Ok(commit) => Ok(Some(commit.id())),
                Err(_) => Ok(None),
            },
            Err(err)
                if err.code() == git2::ErrorCode::NotFound
                    || err.code() == git2::ErrorCode::Ambiguous =>
            {
                Ok(None)
            }
            Err(source) => Err(Error::RevParse {
                source,
                spec: spec.to_owned(),
            }),
        }
    }

    fn resolve_oid_or_fail(&self, spec: &str) -> Result<git2::Oid> {
        match self.inner.revparse_single(spec) {
            Ok(object) => object
                .peel_to_commit()
                .map(|commit| commit.id())
                .map_err(|source| Error::RevParse {
                    source,
                    spec: spec.to_owned(),
                }),
            Err(source) => Err(Error::RevParse {
                source,
                spec: spec.to_owned(),
            }),
        }
    }

    /// Resolve a revision (branch name, hash, `branch~N`...) to a full commit
    /// hash. Returns `None` if the commit isn't present locally.
    #[instrument]
    pub fn resolve_sha(&self, spec: &str) -> Result<Option<String>> {
        Ok(self.resolve_oid(spec)?.map(|oid| oid.to_string()))
    }

    /// Look up metadata for the given commit. Returns `None` if the commit
    /// isn't present locally.
    #[instrument]
    pub fn find_commit_info(&self, spec: &str) -> Result<Option<CommitInfo>> {
        let oid = match self.resolve_oid(spec)? {
            Some(oid) => oid,
            None => return Ok(None),
        };
        let commit = self
            .inner
            .find_commit(oid)
            .map_err(|source| Error::FindCommit {
                source,
                sha: oid.to_string(),
            })?;
        let info = CommitInfo {
            sha: oid.to_string(),
            author_email: commit.author().email().map(ToOwned::to_owned),
            author_time: git_time_to_utc(commit.author().when()),
            commit_time: git_time_to_utc(commit.time()),
        };
        Ok(Some(info))
    }

    /// Count the commits only reachable from `lhs` and only reachable from
    /// `rhs`, respectively.
    #[instrument]
    pub fn ahead_behind(&self, lhs: &str, rhs: &str) -> Result<(usize, usize)> {
        let lhs_oid = self.resolve_oid_or_fail(lhs)?;
        let rhs_oid = self.resolve_oid_or_fail(rhs)?;
        self.inner
            .graph_ahead_behind(lhs_oid, rhs_oid)
            .map_err(|source| Error::AheadBehind {
                source,
                lhs: lhs.to_owned(),
                rhs: rhs.to_owned(),
            })
    }

    /// The hashes of the commits reachable from `tip` but not from `base`,
    /// oldest first.
    #[instrument]
    pub fn commits_ahead(&self, base: &str, tip: &str) -> Result<Vec<String>> {
        let base_oid = self.resolve_oid_or_fail(base)?;
        let tip_oid = self.resolve_oid_or_fail(tip)?;
        let mut revwalk = self.inner.revwalk().map_err(Error::Revwalk)?;
        revwalk
            .set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::REVERSE)
            .map_err(Error::Revwalk)?;
        revwalk.push(tip_oid).map_err(Error::Revwalk)?;
        revwalk.hide(base_oid).map_err(Error::Revwalk)?;
        revwalk
            .map(|oid| oid.map(|oid| oid.to_string()).map_err(Error::Revwalk))
            .collect()
    }

    /// The first `depth` commits reachable from `spec`, newest first, each as
    /// its own hash followed by the hashes of its parents. A merge commit is
    /// any entry with more than two hashes.
    #[instrument]
    pub fn parent_shas(&self, spec: &str, depth: usize) -> Result<Vec<Vec<String>>> {
        let tip_oid = self.resolve_oid_or_fail(spec)?;
        let mut revwalk = self.inner.revwalk().map_err(Error::Revwalk)?;
        revwalk
            .set_sorting(git2::Sort::TOPOLOGICAL)
            .map_err(Error::Revwalk)?;
        revwalk.push(tip_oid).map_err(Error::Revwalk)?;

        let mut result = Vec::new();
        for oid in revwalk.take(depth) {
            let oid = oid.map_err(Error::Revwalk)?;
            let commit = self
                .inner
                .find_commit(oid)
                .map_err(|source| Error::FindCommit {
                    source,
                    sha: oid.to_string(),
                })?;
            let mut level = vec![oid.to_string()];
            level.extend(commit.parent_ids().map(|parent_oid| parent_oid.to_string()));
            result.push(level);
        }
        Ok(result)
    }

    /// Whether the index differs from the `HEAD` commit's tree.
    #[instrument]
    pub fn has_staged_changes(&self) -> Result<bool> {
        let head_tree = match self.inner.head() {
            Ok(head) => Some(head.peel_to_tree().map_err(Error::DiffTreeToIndex)?),
            Err(err) if err.code() == git2::ErrorCode::UnbornBranch => None,
            Err(err) if err.code() == git2::ErrorCode::NotFound => None,
            Err(source) => {
                return Err(Error::FindReference {
                    source,
                    name: "HEAD".to_owned(),
                })
            }
        };
        let diff = self
            .inner
            .diff_tree_to_index(head_tree.as_ref(), None, None)
            .map_err(Error::DiffTreeToIndex)?;
        Ok(diff.deltas().len() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::make_git;

    #[test]
    fn test_list_local_branches_by_author_time() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        git.run(&["branch", "old"])?;
        git.commit_file("test1", 1)?;
        git.run(&["branch", "zzz"])?;
        git.run(&["branch", "aaa"])?;

        let repo = git.get_repo()?;
        assert_eq!(repo.list_local_branches()?, vec!["aaa", "master", "zzz", "old"]);
        assert_eq!(repo.get_current_branch()?, Some("master".to_string()));
        Ok(())
    }

    #[test]
    fn test_commits_ahead_and_parent_shas() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        git.run(&["checkout", "-b", "feature"])?;
        let test1_oid = git.commit_file("test1", 1)?;
        let test2_oid = git.commit_file("test2", 2)?;

        let repo = git.get_repo()?;
        assert_eq!(
            repo.commits_ahead("master", "feature")?,
            vec![test1_oid.clone(), test2_oid.clone()]
        );
        assert_eq!(repo.ahead_behind("feature", "master")?, (2, 0));

        let parents = repo.parent_shas("feature", 2)?;
        assert_eq!(parents.len(), 2);
        assert_eq!(parents[0], vec![test2_oid, test1_oid]);
        Ok(())
    }

    #[test]
    fn test_has_staged_changes() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;

        let repo = git.get_repo()?;
        assert!(!repo.has_staged_changes()?);
        git.write_file_txt("test1", "staged contents\n")?;
        git.run(&["add", "test1.txt"])?;
        assert!(repo.has_staged_changes()?);
        Ok(())
    }
}
