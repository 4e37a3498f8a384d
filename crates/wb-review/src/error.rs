// error.rs — Error types for the change review queue.

use thiserror::Error;
use uuid::Uuid;
use wb_diff::DiffError;
use wb_vcs::{StorageError, VcsError};
use wb_workspace::WorkspaceError;

use crate::change::ChangeStatus;

#[derive(Debug, Error)]
pub enum ReviewError {
    /// Writing an accepted change through to file storage failed. The change
    /// stays pending.
    #[error("failed to write {path}: {source}")]
    StorageWriteFailed { path: String, source: StorageError },

    /// A batch accept failed; nothing in the batch was accepted.
    #[error("batch accept failed for: {}", .failed_paths.join(", "))]
    BatchFailed { failed_paths: Vec<String> },

    #[error("{path} already has pending change {existing} in workspace {workspace_id}")]
    DuplicatePendingChange {
        workspace_id: Uuid,
        path: String,
        existing: Uuid,
    },

    #[error("change not found: {0}")]
    NotFound(Uuid),

    #[error("change {change_id} is already {status}")]
    NotPending { change_id: Uuid, status: ChangeStatus },

    /// The proposal's shape does not fit its operation, or its path is unusable.
    #[error("invalid change: {0}")]
    InvalidChange(String),

    #[error("content hash mismatch for change {0}")]
    HashMismatch(Uuid),

    #[error("invalid path pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: glob::PatternError,
    },

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("review queue lock poisoned")]
    LockPoisoned,
}
