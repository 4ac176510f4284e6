//! Core functionality for git-branches: inferring which branch each local
//! branch was forked from, and planning the commands that bring them all up to
//! date.

#![warn(missing_docs)]
#![warn(clippy::all, clippy::as_conversions, clippy::clone_on_ref_ptr)]
#![allow(clippy::too_many_arguments)]

pub mod core;
pub mod git;
pub mod testing;
pub mod util;
