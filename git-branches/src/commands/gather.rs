//! Collecting what is known about each local branch: its relationship to
//! main, its hosted copy, and its change request.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cursive_core::theme::BaseColor;
use cursive_core::utils::markup::StyledString;
use git_branches_forge::{make_forge, ChangeRequest, ChangeRequestState, Forge};
use indexmap::IndexMap;
use lib::core::config::env_vars::get_current_time;
use lib::core::config::{get_forge_enabled, get_main_branch_name, get_remote_name};
use lib::core::effects::{Effects, OperationType};
use lib::core::rewrite::{
    base_branches_from_refs, branches_ahead_shas_to_refs, AheadShas, BaseBranch, BaseBranches,
    CommitRef, UpdatePlanInput,
};
use lib::git::{fetch_commit, list_remote_tips, GitRunInfo, Repo};
use lib::util::{ExitCode, EyreExitOr};
use tracing::{instrument, warn};

/// Where a branch stands relative to its copy on the hosting remote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    /// The remote has no branch of this name.
    NotPushed,

    /// The remote branch points to the same commit.
    Synced,

    /// The remote branch points elsewhere.
    Unsynced {
        /// Whether the remote tip was committed after the local one, if the
        /// remote commit could be examined.
        remote_is_newer: Option<bool>,
    },
}

/// Everything displayed about one branch.
#[derive(Clone, Debug)]
pub struct BranchRow {
    /// The branch name.
    pub branch: String,

    /// Whether the branch is checked out.
    pub is_current: bool,

    /// The full hash of the local tip.
    pub local_sha: String,

    /// The full hash of the remote tip, if the branch was pushed.
    pub remote_sha: Option<String>,

    /// How the local and remote tips compare.
    pub sync_status: SyncStatus,

    /// Some commit beyond main on the local tip was authored by someone else.
    pub local_foreign_author: bool,

    /// Some commit beyond main on the remote tip was authored by someone else.
    pub remote_foreign_author: bool,

    /// The commits beyond main include a merge commit.
    pub has_merge_commit: bool,

    /// Whole days since the local tip was authored.
    pub age_days: i64,

    /// Number of main's commits the branch lacks.
    pub behind: usize,

    /// Number of commits the branch has beyond main.
    pub ahead: usize,

    /// Where the branch forked from another branch, if it did.
    pub base: Option<CommitRef>,

    /// The branch's change request on the forge, if any.
    pub change_request: Option<ChangeRequest>,
}

/// The result of examining the repository.
#[derive(Debug)]
pub struct BranchFacts {
    /// One row per displayed branch, in display order.
    pub rows: Vec<BranchRow>,

    /// The checked-out branch, if `HEAD` isn't detached.
    pub current_branch: Option<String>,

    /// Commits beyond main for every branch, including those with merge
    /// commits.
    pub all_branches_ahead_shas: AheadShas,

    /// What the planner needs to know about the displayed branches.
    pub plan_input: UpdatePlanInput,
}

/// Choose which branches are displayed, and in what order.
///
/// Without `short`, every branch is listed, with main first and the current
/// branch second. With `short`, only main, the current branch and the branches
/// reachable from it by following bases and dependents are listed.
pub fn local_branches_order(
    all_branches: &[String],
    main_branch: &str,
    current_branch: Option<&str>,
    base_branches: &BaseBranches,
    short: bool,
) -> Vec<String> {
    if !short {
        let mut result: Vec<String> = Vec::with_capacity(all_branches.len());
        result.push(main_branch.to_owned());
        if let Some(current_branch) = current_branch {
            if current_branch != main_branch {
                result.push(current_branch.to_owned());
            }
        }
        result.extend(
            all_branches
                .iter()
                .filter(|branch| {
                    branch.as_str() != main_branch && Some(branch.as_str()) != current_branch
                })
                .cloned(),
        );
        return result;
    }

    let mut dependent_branches: IndexMap<&str, Vec<&str>> = IndexMap::new();
    for (dependent_branch, BaseBranch { base_ref, .. }) in base_branches {
        dependent_branches
            .entry(base_ref.branch_name())
            .or_default()
            .push(dependent_branch.as_str());
    }

    let mut result = vec![main_branch.to_owned()];
    let mut stack: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    if let Some(current_branch) = current_branch {
        if current_branch != main_branch {
            result.push(current_branch.to_owned());
            stack.push(current_branch);
            seen.insert(current_branch);
        }
    }

    while let Some(branch) = stack.pop() {
        let base = base_branches
            .get(branch)
            .map(|BaseBranch { base_ref, .. }| base_ref.branch_name());
        let dependents = dependent_branches.get(branch).into_iter().flatten().copied();
        for branch_to_add in base.into_iter().chain(dependents) {
            if seen.insert(branch_to_add) {
                result.push(branch_to_add.to_owned());
                stack.push(branch_to_add);
            }
        }
    }
    result
}

/// Whether any commit reachable from `tip` but not main was authored by
/// someone other than `user_email`.
fn has_foreign_author(
    repo: &Repo,
    main_branch: &str,
    tip: &str,
    user_email: Option<&str>,
) -> eyre::Result<bool> {
    for sha in repo.commits_ahead(main_branch, tip)? {
        let author_email = repo
            .find_commit_info(&sha)?
            .and_then(|commit_info| commit_info.author_email);
        if author_email.as_deref() != user_email {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Look up change requests, giving up after the first failure.
struct ChangeRequestLookup {
    forge: Option<Box<dyn Forge>>,
}

impl ChangeRequestLookup {
    fn find(&mut self, effects: &Effects, branch: &str) -> eyre::Result<Option<ChangeRequest>> {
        let forge = match self.forge.as_mut() {
            Some(forge) => forge,
            None => return Ok(None),
        };
        let _progress =
            effects.start_operation(OperationType::QueryForge(Arc::new(branch.to_owned())));
        match forge.find_change_request(branch) {
            Ok(change_request) => Ok(change_request),
            Err(err) => {
                warn!(?err, "Change request lookup failed");
                writeln!(
                    effects.get_error_stream(),
                    "{}",
                    effects.get_glyphs().render(StyledString::styled(
                        format!(
                            "Warning: could not look up change requests ({err}). \
Change request information will not be shown."
                        ),
                        BaseColor::Yellow.light(),
                    ))?
                )?;
                self.forge = None;
                Ok(None)
            }
        }
    }
}

/// Examine the repository and work out everything displayed in the table and
/// needed for planning.
#[instrument]
pub fn gather_branch_facts(
    effects: &Effects,
    git_run_info: &GitRunInfo,
    repo: &Repo,
    short: bool,
    no_push: bool,
) -> EyreExitOr<BranchFacts> {
    let main_branch = match get_main_branch_name(repo)? {
        Some(main_branch) => main_branch,
        None => {
            writeln!(
                effects.get_error_stream(),
                "Could not determine the main branch: there is no remote default branch, \
and none of main, release or master exist. Set one with: git config branches.core.mainBranch <branch>"
            )?;
            return Ok(Err(ExitCode(1)));
        }
    };
    if !repo.branch_exists(&main_branch)? {
        writeln!(
            effects.get_error_stream(),
            "The main branch {main_branch} does not exist locally. Check it out with: git checkout {main_branch}"
        )?;
        return Ok(Err(ExitCode(1)));
    }

    let current_branch = repo.get_current_branch()?;
    let all_branches = repo.list_local_branches()?;

    let mut distances: HashMap<String, (usize, usize)> = HashMap::new();
    let mut branches_with_merge_commits: HashSet<String> = HashSet::new();
    let mut branches_ahead_shas = AheadShas::new();
    let mut all_branches_ahead_shas = AheadShas::new();
    {
        let _progress = effects.start_operation(OperationType::GatherBranches);
        for branch in &all_branches {
            let (ahead, behind) = repo.ahead_behind(branch, &main_branch)?;
            distances.insert(branch.clone(), (ahead, behind));
            if branch == &main_branch || ahead == 0 {
                continue;
            }

            let has_merge_commit = repo
                .parent_shas(branch, ahead)?
                .iter()
                .any(|level| level.len() > 2);
            let ahead_shas = repo.commits_ahead(&main_branch, branch)?;
            if has_merge_commit {
                branches_with_merge_commits.insert(branch.clone());
            } else {
                branches_ahead_shas.insert(branch.clone(), ahead_shas.clone());
            }
            all_branches_ahead_shas.insert(branch.clone(), ahead_shas);
        }
    }

    let base_branches =
        base_branches_from_refs(&branches_ahead_shas_to_refs(&branches_ahead_shas));
    let branches = local_branches_order(
        &all_branches,
        &main_branch,
        current_branch.as_deref(),
        &base_branches,
        short,
    );

    let remote_name = get_remote_name(repo)?;
    let remote_url = repo.get_remote_url(&remote_name)?;
    let remote_tips = match remote_url {
        Some(_) => list_remote_tips(effects, git_run_info, repo, &remote_name, &branches)?,
        None => HashMap::new(),
    };
    let mut change_requests = ChangeRequestLookup {
        forge: if get_forge_enabled(repo)? {
            make_forge(remote_url.as_deref(), &git_run_info.working_directory)
        } else {
            None
        },
    };
    let user_email = repo.get_user_email()?;
    let now: DateTime<Utc> = get_current_time();

    let mut rows = Vec::with_capacity(branches.len());
    let mut plan_input = UpdatePlanInput {
        branches: branches.clone(),
        main_branch: main_branch.clone(),
        no_push,
        branches_ahead_shas,
        branches_with_merge_commits: branches_with_merge_commits.clone(),
        ..Default::default()
    };
    for branch in &branches {
        let local_commit = match repo.find_commit_info(branch)? {
            Some(local_commit) => local_commit,
            None => eyre::bail!("Could not find tip commit of branch {branch:?}"),
        };
        let is_main = branch == &main_branch;
        let remote_sha = remote_tips.get(branch).cloned();

        let sync_status = match &remote_sha {
            None => SyncStatus::NotPushed,
            Some(remote_sha) if remote_sha == &local_commit.sha => SyncStatus::Synced,
            Some(remote_sha) => {
                if is_main {
                    plan_input.unsynced_main = true;
                }
                let remote_commit =
                    if fetch_commit(effects, git_run_info, repo, &remote_name, remote_sha)? {
                        repo.find_commit_info(remote_sha)?
                    } else {
                        None
                    };
                SyncStatus::Unsynced {
                    remote_is_newer: remote_commit.map(|remote_commit| {
                        remote_commit.commit_time >= local_commit.commit_time
                    }),
                }
            }
        };

        let local_foreign_author =
            has_foreign_author(repo, &main_branch, branch, user_email.as_deref())?;
        let remote_foreign_author = match (&remote_sha, sync_status) {
            (Some(remote_sha), SyncStatus::Synced)
            | (
                Some(remote_sha),
                SyncStatus::Unsynced {
                    remote_is_newer: Some(_),
                },
            ) if !is_main => {
                has_foreign_author(repo, &main_branch, remote_sha, user_email.as_deref())?
            }
            _ => false,
        };

        let change_request = if is_main {
            None
        } else {
            change_requests.find(effects, branch)?
        };
        if let Some(change_request) = &change_request {
            if change_request.state == ChangeRequestState::Merged
                && change_request.head_sha == local_commit.sha
                && sync_status == SyncStatus::NotPushed
            {
                plan_input.branches_deletable.push(branch.clone());
            }
        }

        if sync_status == SyncStatus::Synced && !local_foreign_author && !remote_foreign_author {
            plan_input.branches_safe_to_push.insert(branch.clone());
        }

        let (ahead, behind) = distances.get(branch).copied().unwrap_or_default();
        if behind > 0 {
            plan_input.branches_behind.insert(branch.clone());
        }

        rows.push(BranchRow {
            branch: branch.clone(),
            is_current: current_branch.as_deref() == Some(branch.as_str()),
            local_sha: local_commit.sha.clone(),
            remote_sha,
            sync_status,
            local_foreign_author,
            remote_foreign_author,
            has_merge_commit: branches_with_merge_commits.contains(branch),
            age_days: (now - local_commit.author_time).num_days(),
            behind,
            ahead,
            base: base_branches
                .get(branch)
                .map(|BaseBranch { base_ref, .. }| base_ref.clone()),
            change_request,
        });
    }

    Ok(Ok(BranchFacts {
        rows,
        current_branch,
        all_branches_ahead_shas,
        plan_input,
    }))
}
