//! A forge backed by a fixture file, for tests.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::instrument;

use crate::github::GithubPullRequest;
use crate::{ChangeRequest, Forge, ForgeError, Result};

/// Answers change request lookups from a JSON file mapping branch names to
/// the pull requests GitHub would list for them. Branches missing from the
/// file have no change request.
#[derive(Debug)]
pub struct MockForge {
    fixture_path: PathBuf,
    pull_requests: Option<HashMap<String, Vec<GithubPullRequest>>>,
}

impl MockForge {
    /// Constructor. The fixture is read on first use.
    pub fn new(fixture_path: PathBuf) -> Self {
        Self {
            fixture_path,
            pull_requests: None,
        }
    }

    fn load(&mut self) -> Result<&HashMap<String, Vec<GithubPullRequest>>> {
        if self.pull_requests.is_none() {
            let contents =
                std::fs::read(&self.fixture_path).map_err(|source| ForgeError::ReadFixture {
                    source,
                    path: self.fixture_path.clone(),
                })?;
            let pull_requests = serde_json::from_slice(&contents).map_err(ForgeError::Parse)?;
            self.pull_requests = Some(pull_requests);
        }
        Ok(self.pull_requests.get_or_insert_with(HashMap::new))
    }
}

impl Forge for MockForge {
    #[instrument]
    fn find_change_request(&mut self, branch: &str) -> Result<Option<ChangeRequest>> {
        let pull_requests = self.load()?;
        Ok(pull_requests
            .get(branch)
            .and_then(|pull_requests| pull_requests.first())
            .cloned()
            .map(ChangeRequest::from))
    }
}
