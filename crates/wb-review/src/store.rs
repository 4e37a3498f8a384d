// store.rs — ChangeStore trait and JsonlChangeStore implementation.
//
// Each workspace gets its own append-only log: `<dir>/<workspace_id>.jsonl`.
// Every state transition appends the full record; reading a log keeps the
// last record per change id, in order of first appearance. Nothing is ever
// rewritten, so a crash mid-append loses at most the final line.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use uuid::Uuid;

use crate::change::PendingChange;
use crate::error::ReviewError;

/// Persistence for change records.
pub trait ChangeStore: Send + Sync {
    /// Record the current state of a change.
    fn append(&self, change: &PendingChange) -> Result<(), ReviewError>;

    /// Latest state of every change in one workspace, oldest first.
    fn load(&self, workspace_id: Uuid) -> Result<Vec<PendingChange>, ReviewError>;

    /// Latest state of every change in every workspace.
    fn load_all(&self) -> Result<Vec<PendingChange>, ReviewError>;
}

/// Append-only JSON Lines log per workspace.
pub struct JsonlChangeStore {
    dir: PathBuf,
}

impl JsonlChangeStore {
    /// Create a store backed by the given directory, creating it if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, ReviewError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| ReviewError::IoError {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    fn workspace_file(&self, workspace_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.jsonl", workspace_id))
    }

    fn read_log(path: &Path) -> Result<Vec<PendingChange>, ReviewError> {
        let file = File::open(path).map_err(|source| ReviewError::IoError {
            path: path.display().to_string(),
            source,
        })?;

        let mut order: Vec<Uuid> = Vec::new();
        let mut latest: HashMap<Uuid, PendingChange> = HashMap::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| ReviewError::IoError {
                path: path.display().to_string(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let change: PendingChange = match serde_json::from_str(&line) {
                Ok(change) => change,
                Err(e) => {
                    tracing::warn!(
                        "skipping unreadable change record {}:{}: {}",
                        path.display(),
                        index + 1,
                        e
                    );
                    continue;
                }
            };
            if !latest.contains_key(&change.id) {
                order.push(change.id);
            }
            latest.insert(change.id, change);
        }

        Ok(order
            .into_iter()
            .filter_map(|id| latest.remove(&id))
            .collect())
    }
}

impl ChangeStore for JsonlChangeStore {
    fn append(&self, change: &PendingChange) -> Result<(), ReviewError> {
        let path = self.workspace_file(change.workspace_id);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ReviewError::IoError {
                path: path.display().to_string(),
                source,
            })?;

        let mut writer = BufWriter::new(file);
        let json = serde_json::to_string(change)?;
        writeln!(writer, "{}", json).map_err(|source| ReviewError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        writer.flush().map_err(|source| ReviewError::IoError {
            path: path.display().to_string(),
            source,
        })
    }

    fn load(&self, workspace_id: Uuid) -> Result<Vec<PendingChange>, ReviewError> {
        let path = self.workspace_file(workspace_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        Self::read_log(&path)
    }

    fn load_all(&self) -> Result<Vec<PendingChange>, ReviewError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| ReviewError::IoError {
            path: self.dir.display().to_string(),
            source,
        })?;

        let mut logs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ReviewError::IoError {
                path: self.dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                logs.push(path);
            }
        }
        logs.sort();

        let mut changes = Vec::new();
        for path in logs {
            changes.extend(Self::read_log(&path)?);
        }
        changes.sort_by_key(|c| c.created_at);
        Ok(changes)
    }
}

/// In-process store for tests and embedding hosts.
#[derive(Default)]
pub struct MemoryChangeStore {
    records: Mutex<Vec<PendingChange>>,
}

impl MemoryChangeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeStore for MemoryChangeStore {
    fn append(&self, change: &PendingChange) -> Result<(), ReviewError> {
        let mut records = self.records.lock().map_err(|_| ReviewError::LockPoisoned)?;
        match records.iter_mut().find(|c| c.id == change.id) {
            Some(existing) => *existing = change.clone(),
            None => records.push(change.clone()),
        }
        Ok(())
    }

    fn load(&self, workspace_id: Uuid) -> Result<Vec<PendingChange>, ReviewError> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|c| c.workspace_id == workspace_id)
            .collect())
    }

    fn load_all(&self) -> Result<Vec<PendingChange>, ReviewError> {
        Ok(self
            .records
            .lock()
            .map_err(|_| ReviewError::LockPoisoned)?
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{ChangeOrigin, ChangeStatus, ProposedChange};
    use chrono::Utc;
    use tempfile::tempdir;

    fn change(workspace_id: Uuid, path: &str) -> PendingChange {
        let proposal =
            ProposedChange::create(workspace_id, ChangeOrigin::Human, path, "content\n").unwrap();
        PendingChange::from_proposal(proposal, Utc::now())
    }

    #[test]
    fn last_record_per_id_wins() {
        let dir = tempdir().unwrap();
        let store = JsonlChangeStore::new(dir.path().join("changes")).unwrap();
        let ws = Uuid::new_v4();

        let mut first = change(ws, "a.txt");
        let second = change(ws, "b.txt");
        store.append(&first).unwrap();
        store.append(&second).unwrap();
        first.decide(ChangeStatus::Accepted, None, Utc::now());
        store.append(&first).unwrap();

        let loaded = store.load(ws).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, first.id);
        assert_eq!(loaded[0].status, ChangeStatus::Accepted);
        assert_eq!(loaded[1], second);
    }

    #[test]
    fn load_all_spans_workspaces_and_skips_bad_lines() {
        let dir = tempdir().unwrap();
        let store = JsonlChangeStore::new(dir.path()).unwrap();
        let a = change(Uuid::new_v4(), "a.txt");
        let b = change(Uuid::new_v4(), "b.txt");
        store.append(&a).unwrap();
        store.append(&b).unwrap();

        let log = dir.path().join(format!("{}.jsonl", a.workspace_id));
        let mut file = OpenOptions::new().append(true).open(&log).unwrap();
        writeln!(file, "{{ truncated").unwrap();

        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 2);
        assert!(store.load(Uuid::new_v4()).unwrap().is_empty());
    }
}
