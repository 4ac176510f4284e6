//! Show how local branches are stacked on each other, and bring them up to
//! date with the main branch.

#![warn(missing_docs)]
#![warn(
    clippy::all,
    clippy::as_conversions,
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro
)]

pub mod commands;
