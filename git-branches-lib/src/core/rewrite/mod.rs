//! Inferring which branch each branch was forked from, and planning the
//! commands which move every branch back on top of its base.
//!
//! The data flows through these stages:
//!
//! 1. The commits each branch has beyond main ([`AheadShas`]).
//! 2. Each of those commits named relative to the shortest branch containing
//!    it ([`branches_ahead_shas_to_refs`]).
//! 3. The fork point of every branch layered on another branch
//!    ([`base_branches_from_refs`]).
//! 4. The order to rebase in and the command for each branch
//!    ([`plan_update_commands`], [`plan_amend_commands`]).
//!
//! Everything here is a pure function of its inputs.

mod amend;
mod base;
mod compress;
mod plan;
mod refs;

use indexmap::IndexMap;

pub use amend::{descendant_ahead_shas, plan_amend_commands, AmendPlanInput};
pub use base::{base_branches_from_refs, BaseBranch, BaseBranches};
pub use compress::branches_ahead_shas_to_refs;
pub use plan::{
    blocking_merge_commit_branches, plan_update_commands, rebase_order, PlanError, RebaseEntry,
    RebaseKind, Result, UpdateCommand, UpdatePlanInput,
};
pub use refs::{branch_name_from_reference, CommitRef};

/// The commits each branch has that main doesn't, oldest first, keyed by
/// branch name.
pub type AheadShas = IndexMap<String, Vec<String>>;

/// Each branch paired with its ahead-of-main commits as [`CommitRef`]s.
pub type BranchRefs = Vec<(String, Vec<CommitRef>)>;
