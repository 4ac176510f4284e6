//! The [GitHub](https://en.wikipedia.org/wiki/GitHub) code hosting platform.
//! This forge integrates specifically with the `gh` command-line utility, which
//! takes care of authentication.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{ChangeRequest, ChangeRequestState, Forge, ForgeError, Result};

/// The owner and name of a repository on GitHub.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GithubRepository {
    pub owner: String,
    pub name: String,
}

/// Extract the owner and repository name from a GitHub remote URL, in either
/// its HTTPS or SSH form. Returns `None` for other hosts.
pub fn parse_github_remote_url(url: &str) -> Option<GithubRepository> {
    lazy_static! {
        static ref GITHUB_URL_RE: Regex =
            Regex::new(r"github\.com(?::|/)([\w\-.]+)/([\w\-.]+?)(?:\.git)?/?$").unwrap();
    }
    let captures = GITHUB_URL_RE.captures(url.trim())?;
    Some(GithubRepository {
        owner: captures[1].to_owned(),
        name: captures[2].to_owned(),
    })
}

#[derive(Clone, Debug, Deserialize)]
struct GithubUser {
    login: String,
}

#[derive(Clone, Debug, Deserialize)]
struct GithubCommitRef {
    sha: String,
}

/// An entry of the "list pull requests" endpoint, trimmed to what we use.
///
/// See <https://docs.github.com/en/rest/pulls/pulls#list-pull-requests>.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct GithubPullRequest {
    number: u64,
    state: String,
    html_url: String,
    merged_at: Option<String>,
    head: GithubCommitRef,
    user: GithubUser,
}

impl From<GithubPullRequest> for ChangeRequest {
    fn from(pull_request: GithubPullRequest) -> Self {
        let GithubPullRequest {
            number,
            state,
            html_url,
            merged_at,
            head,
            user,
        } = pull_request;
        // A closed pull request was merged only if it has a merge time.
        let merged_at = merged_at.filter(|merged_at| !merged_at.is_empty());
        let state = if state == "open" {
            ChangeRequestState::Open
        } else if merged_at.is_some() {
            ChangeRequestState::Merged
        } else {
            ChangeRequestState::Closed
        };
        ChangeRequest {
            number,
            state,
            head_sha: head.sha,
            url: html_url,
            author: user.login,
            merged_at,
        }
    }
}

/// Parse the response body of the "list pull requests" endpoint, keeping the
/// first (most recently created) pull request.
pub(crate) fn parse_pull_requests(json: &[u8]) -> Result<Option<ChangeRequest>> {
    let pull_requests: Vec<GithubPullRequest> =
        serde_json::from_slice(json).map_err(ForgeError::Parse)?;
    Ok(pull_requests.into_iter().next().map(ChangeRequest::from))
}

/// Queries GitHub by way of `gh api`.
#[derive(Debug)]
pub struct GithubForge {
    repository: GithubRepository,
    path_to_gh: PathBuf,
    working_directory: PathBuf,
}

impl GithubForge {
    /// Constructor. `gh` is looked up on `PATH`.
    pub fn new(repository: GithubRepository, working_directory: PathBuf) -> Self {
        Self {
            repository,
            path_to_gh: PathBuf::from("gh"),
            working_directory,
        }
    }
}

impl Forge for GithubForge {
    #[instrument]
    fn find_change_request(&mut self, branch: &str) -> Result<Option<ChangeRequest>> {
        let GithubRepository { owner, name } = &self.repository;
        let endpoint = format!("repos/{owner}/{name}/pulls");
        let head = format!("head={owner}:{branch}");
        let args = [
            "api",
            "--method",
            "GET",
            "-H",
            "Accept: application/vnd.github+json",
            "-H",
            "X-GitHub-Api-Version: 2022-11-28",
            endpoint.as_str(),
            "-f",
            head.as_str(),
            "-f",
            "state=all",
        ];
        debug!(?args, "Querying GitHub");

        let output = Command::new(&self.path_to_gh)
            .args(args)
            .current_dir(&self.working_directory)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ForgeError::Spawn {
                source,
                program: self.path_to_gh.clone(),
            })?;
        if !output.status.success() {
            return Err(ForgeError::CommandFailed {
                program: self.path_to_gh.clone(),
                exit_code: output.status.code().unwrap_or(1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        parse_pull_requests(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_github_remote_url() {
        let expected = Some(GithubRepository {
            owner: "owner".to_string(),
            name: "repo".to_string(),
        });
        assert_eq!(
            parse_github_remote_url("https://github.com/owner/repo.git"),
            expected
        );
        assert_eq!(
            parse_github_remote_url("git@github.com:owner/repo.git"),
            expected
        );
        assert_eq!(
            parse_github_remote_url("https://github.com/owner/repo"),
            expected
        );
        assert_eq!(parse_github_remote_url("file:///tmp/original"), None);
        assert_eq!(
            parse_github_remote_url("https://gitlab.com/owner/repo.git"),
            None
        );
    }

    #[test]
    fn test_parse_pull_request_states() -> eyre::Result<()> {
        let json = br#"[
            {
                "number": 12,
                "state": "closed",
                "html_url": "https://github.com/owner/repo/pull/12",
                "merged_at": "2024-01-02T03:04:05Z",
                "head": {"sha": "62fc20d2a290daea0d52bdc2ed2ad4be6491010e", "ref": "feature"},
                "user": {"login": "octocat"}
            },
            {
                "number": 7,
                "state": "open",
                "html_url": "https://github.com/owner/repo/pull/7",
                "merged_at": null,
                "head": {"sha": "96d1c37a3d4363611c49f7e52186e189a04c531f", "ref": "feature"},
                "user": {"login": "octocat"}
            }
        ]"#;
        let change_request = parse_pull_requests(json)?;
        insta::assert_debug_snapshot!(change_request, @r###"
        Some(
            ChangeRequest {
                number: 12,
                state: Merged,
                head_sha: "62fc20d2a290daea0d52bdc2ed2ad4be6491010e",
                url: "https://github.com/owner/repo/pull/12",
                author: "octocat",
                merged_at: Some(
                    "2024-01-02T03:04:05Z",
                ),
            },
        )
        "###);

        let closed = br#"[{
            "number": 3,
            "state": "closed",
            "html_url": "https://github.com/owner/repo/pull/3",
            "merged_at": "",
            "head": {"sha": "abc"},
            "user": {"login": "octocat"}
        }]"#;
        let change_request = parse_pull_requests(closed)?;
        assert_eq!(
            change_request.map(|change_request| change_request.state),
            Some(ChangeRequestState::Closed)
        );

        assert_eq!(parse_pull_requests(b"[]")?, None);
        assert!(parse_pull_requests(b"{\"message\": \"Not Found\"}").is_err());
        Ok(())
    }
}
