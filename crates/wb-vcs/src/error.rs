// error.rs — Error types for VCS orchestration and file storage.

use thiserror::Error;
use wb_diff::DiffError;

/// Errors from the file-storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    /// The path escapes the workspace root.
    #[error("path traversal detected: '{path}' resolves outside the workspace root")]
    PathTraversal { path: String },
}

/// Errors that can occur during version-control operations.
#[derive(Debug, Error)]
pub enum VcsError {
    /// Stash or commit attempted with nothing to record.
    #[error("no changes to record")]
    NoChanges,

    /// The operation requires a clean working tree.
    #[error("working tree has uncommitted changes: {}", .paths.join(", "))]
    DirtyWorkingTree { paths: Vec<String> },

    /// Conflicting paths that need manual resolution.
    #[error("merge conflict in: {}", .paths.join(", "))]
    MergeConflict { paths: Vec<String> },

    /// Fast-forward-only merge against a diverged branch.
    #[error("cannot fast-forward to '{branch}': histories have diverged")]
    NotFastForward { branch: String },

    #[error("branch not found: '{0}'")]
    BranchNotFound(String),

    /// The repository has no commits yet.
    #[error("repository has no HEAD commit")]
    NoHead,

    #[error("stash not found: {0}")]
    StashNotFound(String),

    /// The underlying engine command failed.
    #[error("VCS engine failed: {0}")]
    Engine(String),

    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("stash index lock poisoned")]
    LockPoisoned,
}
