//! # wb-workspace
//!
//! Workspace store for workbench.
//!
//! A workspace is one open project session: its buffers, its unsaved edits
//! and the last VCS snapshot of its checkout. The [`WorkspaceStore`] owns
//! every record and the single active-workspace pointer; every mutation runs
//! under the workspace's own lock and lands only if it succeeds.
//!
//! ## Key components
//!
//! - [`Workspace`] / [`Project`] — the records.
//! - [`WorkspaceStore`] — create/switch/close/update lifecycle plus VCS
//!   operations that refresh the snapshot on success.
//! - [`WorkspacePersistence`] — trait for surviving restarts;
//!   [`JsonFilePersistence`] writes one JSON file per workspace.

pub mod error;
pub mod persistence;
pub mod store;
pub mod vcs_ops;
pub mod workspace;

pub use error::WorkspaceError;
pub use persistence::{JsonFilePersistence, MemoryPersistence, WorkspacePersistence};
pub use store::{RepoFactory, WorkspaceDraft, WorkspaceStore};
pub use vcs_ops::refreshed_snapshot;
pub use workspace::{CloseMode, Project, SwitchOutcome, Workspace, WorkspacePatch};
