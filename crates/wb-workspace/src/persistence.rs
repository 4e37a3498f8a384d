// persistence.rs — WorkspacePersistence: survive restarts.
//
// JsonFilePersistence stores each Workspace as `<dir>/<workspace_id>.json`
// plus `<dir>/active.json` naming the active one.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorkspaceError;
use crate::workspace::Workspace;

const ACTIVE_FILE: &str = "active.json";

/// Key-value persistence for workspace records, keyed by workspace id.
pub trait WorkspacePersistence: Send + Sync {
    /// Create or overwrite a record.
    fn save(&self, workspace: &Workspace) -> Result<(), WorkspaceError>;

    /// Delete a record. Removing a missing record succeeds.
    fn remove(&self, id: Uuid) -> Result<(), WorkspaceError>;

    fn load_all(&self) -> Result<Vec<Workspace>, WorkspaceError>;

    fn save_active(&self, active: Option<Uuid>) -> Result<(), WorkspaceError>;

    fn load_active(&self) -> Result<Option<Uuid>, WorkspaceError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ActiveRecord {
    active: Option<Uuid>,
}

/// One JSON file per workspace in a directory.
pub struct JsonFilePersistence {
    dir: PathBuf,
}

impl JsonFilePersistence {
    /// Create a store backed by the given directory, creating it if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| WorkspaceError::IoError {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    fn record_file(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn write_json(path: &Path, json: String) -> Result<(), WorkspaceError> {
        fs::write(path, json).map_err(|source| WorkspaceError::IoError {
            path: path.display().to_string(),
            source,
        })
    }
}

impl WorkspacePersistence for JsonFilePersistence {
    fn save(&self, workspace: &Workspace) -> Result<(), WorkspaceError> {
        let json = serde_json::to_string_pretty(workspace)?;
        Self::write_json(&self.record_file(workspace.id), json)
    }

    fn remove(&self, id: Uuid) -> Result<(), WorkspaceError> {
        let path = self.record_file(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WorkspaceError::IoError {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    fn load_all(&self) -> Result<Vec<Workspace>, WorkspaceError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| WorkspaceError::IoError {
            path: self.dir.display().to_string(),
            source,
        })?;

        let mut workspaces = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| WorkspaceError::IoError {
                path: self.dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && path.file_name().is_some_and(|name| name != ACTIVE_FILE);
            if !is_record {
                continue;
            }

            let json = fs::read_to_string(&path).map_err(|source| WorkspaceError::IoError {
                path: path.display().to_string(),
                source,
            })?;
            match serde_json::from_str::<Workspace>(&json) {
                Ok(workspace) => workspaces.push(workspace),
                Err(e) => tracing::warn!("skipping unreadable workspace record {}: {}", path.display(), e),
            }
        }

        workspaces.sort_by_key(|w| w.created_at);
        Ok(workspaces)
    }

    fn save_active(&self, active: Option<Uuid>) -> Result<(), WorkspaceError> {
        let json = serde_json::to_string_pretty(&ActiveRecord { active })?;
        Self::write_json(&self.dir.join(ACTIVE_FILE), json)
    }

    fn load_active(&self) -> Result<Option<Uuid>, WorkspaceError> {
        let path = self.dir.join(ACTIVE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).map_err(|source| WorkspaceError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        let record: ActiveRecord = serde_json::from_str(&json)?;
        Ok(record.active)
    }
}

/// In-process persistence for tests and embedding hosts.
#[derive(Default)]
pub struct MemoryPersistence {
    records: Mutex<HashMap<Uuid, Workspace>>,
    active: Mutex<Option<Uuid>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkspacePersistence for MemoryPersistence {
    fn save(&self, workspace: &Workspace) -> Result<(), WorkspaceError> {
        self.records
            .lock()
            .map_err(|_| WorkspaceError::LockPoisoned)?
            .insert(workspace.id, workspace.clone());
        Ok(())
    }

    fn remove(&self, id: Uuid) -> Result<(), WorkspaceError> {
        self.records
            .lock()
            .map_err(|_| WorkspaceError::LockPoisoned)?
            .remove(&id);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Workspace>, WorkspaceError> {
        let records = self.records.lock().map_err(|_| WorkspaceError::LockPoisoned)?;
        let mut workspaces: Vec<Workspace> = records.values().cloned().collect();
        workspaces.sort_by_key(|w| w.created_at);
        Ok(workspaces)
    }

    fn save_active(&self, active: Option<Uuid>) -> Result<(), WorkspaceError> {
        *self.active.lock().map_err(|_| WorkspaceError::LockPoisoned)? = active;
        Ok(())
    }

    fn load_active(&self) -> Result<Option<Uuid>, WorkspaceError> {
        Ok(*self.active.lock().map_err(|_| WorkspaceError::LockPoisoned)?)
    }
}
