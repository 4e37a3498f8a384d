//! # wb-vcs
//!
//! Version-control orchestration for workbench.
//!
//! Translates high-level intents (status, stash, merge, branch) into the
//! primitive operations of an underlying VCS engine. The orchestrator owns
//! no per-workspace state: every call is handed the [`Repo`] it acts on, and
//! callers rebuild their [`VcsSnapshot`] from the result.
//!
//! ## Key components
//!
//! - [`VcsEngine`] — the primitive engine seam; [`GitCli`] runs the `git` binary.
//! - [`FileStorage`] — the file storage seam; [`LocalStorage`] is rooted at a checkout.
//! - [`StashStrategy`] — stash isolated behind a trait; [`SyntheticStash`]
//!   builds it from commit + reset because the engine has no native stash.
//! - [`VcsOrchestrator`] — status/stash/merge/branch operations.

pub mod config;
pub mod engine;
pub mod error;
pub mod git;
pub mod orchestrator;
pub mod repo;
pub mod stash;
pub mod storage;
mod tree;
pub mod types;

#[cfg(test)]
mod testutil;

pub use config::{GitIdentity, VcsConfig};
pub use engine::VcsEngine;
pub use error::{StorageError, VcsError};
pub use git::GitCli;
pub use orchestrator::VcsOrchestrator;
pub use repo::Repo;
pub use stash::{StashIndex, StashStrategy, SyntheticStash};
pub use storage::{FileStorage, LocalStorage};
pub use types::{
    CommitSummary, FileState, MergeOptions, MergeOutcome, PendingMerge, Stash, StatusEntry,
    TreeFile, TreeSnapshot, VcsSnapshot,
};
