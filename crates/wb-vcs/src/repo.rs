// repo.rs — Repo: the engine/storage pair the orchestrator operates on.

use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::VcsConfig;
use crate::engine::VcsEngine;
use crate::error::VcsError;
use crate::git::GitCli;
use crate::storage::{FileStorage, LocalStorage};

/// One workspace's repository handle.
///
/// The orchestrator is stateless with respect to workspaces; every call
/// receives the `Repo` it should act on.
#[derive(Clone)]
pub struct Repo {
    pub workspace_id: Uuid,
    pub engine: Arc<dyn VcsEngine>,
    pub storage: Arc<dyn FileStorage>,
}

impl Repo {
    pub fn new(
        workspace_id: Uuid,
        engine: Arc<dyn VcsEngine>,
        storage: Arc<dyn FileStorage>,
    ) -> Self {
        Self {
            workspace_id,
            engine,
            storage,
        }
    }

    /// A git checkout on the local filesystem.
    pub fn local(workspace_id: Uuid, root: &Path, config: &VcsConfig) -> Self {
        Self::new(
            workspace_id,
            Arc::new(GitCli::new(root, config)),
            Arc::new(LocalStorage::new(root)),
        )
    }

    /// The `HEAD` commit id, or `None` before the first commit.
    pub fn head(&self) -> Result<Option<String>, VcsError> {
        self.engine.resolve("HEAD")
    }

    pub(crate) fn require_head(&self) -> Result<String, VcsError> {
        self.head()?.ok_or(VcsError::NoHead)
    }
}

impl std::fmt::Debug for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repo")
            .field("workspace_id", &self.workspace_id)
            .finish_non_exhaustive()
    }
}
