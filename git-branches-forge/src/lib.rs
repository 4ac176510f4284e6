//! "Forge" refers to a Git hosting provider, such as GitHub, GitLab, etc.
//! `git branches` asks the forge whether each branch has a change request
//! (pull request) and what became of it.

#![warn(missing_docs)]
#![warn(clippy::all, clippy::as_conversions, clippy::clone_on_ref_ptr)]

mod github;
mod mock;

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::instrument;

pub use github::{parse_github_remote_url, GithubForge, GithubRepository};
pub use mock::MockForge;

/// Points the forge at a JSON fixture file instead of the network. The file
/// maps branch names to the list of pull requests GitHub would return for
/// them.
pub const GIT_BRANCHES_FORGE_MOCK: &str = "GIT_BRANCHES_FORGE_MOCK";

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("could not run {program:?}: {source}")]
    Spawn {
        source: std::io::Error,
        program: PathBuf,
    },

    #[error("{program:?} exited with code {exit_code}: {stderr}")]
    CommandFailed {
        program: PathBuf,
        exit_code: i32,
        stderr: String,
    },

    #[error("could not parse change request data: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("could not read forge fixture {path:?}: {source}")]
    ReadFixture {
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Result type.
pub type Result<T> = std::result::Result<T, ForgeError>;

/// What happened to a change request.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeRequestState {
    Open,
    Closed,
    Merged,
}

impl std::fmt::Display for ChangeRequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeRequestState::Open => write!(f, "open"),
            ChangeRequestState::Closed => write!(f, "closed"),
            ChangeRequestState::Merged => write!(f, "merged"),
        }
    }
}

/// A code review unit on the forge, such as a GitHub pull request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeRequest {
    /// The number used to refer to the change request, as in `#123`.
    pub number: u64,

    /// Whether the change request is open, closed or merged.
    pub state: ChangeRequestState,

    /// The commit hash of the change request's head at its last update.
    pub head_sha: String,

    /// Where to view the change request.
    pub url: String,

    /// The login of the person who opened the change request.
    pub author: String,

    /// When the change request was merged, if it was.
    pub merged_at: Option<String>,
}

/// A hosting service which can be asked about change requests.
pub trait Forge: Debug {
    /// Find the most recent change request whose head is `branch`, in any
    /// state.
    fn find_change_request(&mut self, branch: &str) -> Result<Option<ChangeRequest>>;
}

/// Choose the forge for the repository whose hosting remote has the given
/// URL. Returns `None` if the remote isn't hosted anywhere we know how to
/// query.
///
/// If `GIT_BRANCHES_FORGE_MOCK` is set, the fixture file it names is used
/// regardless of the remote.
#[instrument]
pub fn make_forge(
    remote_url: Option<&str>,
    working_directory: &Path,
) -> Option<Box<dyn Forge>> {
    if let Some(fixture_path) = std::env::var_os(GIT_BRANCHES_FORGE_MOCK) {
        return Some(Box::new(MockForge::new(PathBuf::from(fixture_path))));
    }

    let repository = parse_github_remote_url(remote_url?)?;
    Some(Box::new(GithubForge::new(
        repository,
        working_directory.to_owned(),
    )))
}
