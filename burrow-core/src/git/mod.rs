//! Git operations on leased clone directories
//!
//! This module turns a [`DirectoryLease`](crate::lease::DirectoryLease) into a
//! working copy: cloning into fresh directories, refreshing reused ones, and
//! recognizing reused directories that no longer hold a usable clone.

mod checkout;
mod clone;
mod repo;

pub use checkout::checkout;
pub use clone::{clone_args, clone_depth, populate, refresh_args, RepoUrl};
pub use repo::{is_usable_clone, ClonedRepo};
