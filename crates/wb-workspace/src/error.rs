// error.rs — Error types for the workspace store.

use thiserror::Error;
use uuid::Uuid;
use wb_vcs::VcsError;

/// Errors that can occur during workspace operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace not found: {0}")]
    NotFound(Uuid),

    /// The workspace holds edits not yet flushed to storage.
    #[error("workspace {workspace_id} has unsaved changes: {}", .paths.join(", "))]
    UnsavedChanges {
        workspace_id: Uuid,
        paths: Vec<String>,
    },

    /// A partial update would break a workspace invariant.
    #[error("invalid workspace update: {0}")]
    InvalidUpdate(String),

    #[error("workspace {workspace_id} has a merge in progress; continue or abort it first")]
    MergeInProgress { workspace_id: Uuid },

    #[error("workspace {workspace_id} has no merge in progress")]
    NoMergeInProgress { workspace_id: Uuid },

    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("workspace lock poisoned")]
    LockPoisoned,
}
