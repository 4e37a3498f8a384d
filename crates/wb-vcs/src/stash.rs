// stash.rs — Stash behind a strategy trait, synthesized from commit + reset.
//
// The engine has no native stash. SyntheticStash records the working-tree
// delta as a commit that no ref points at, then hard-resets to HEAD. The
// commit is built in a scratch index, so a failure before the reset leaves
// the working tree and the real index untouched.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wb_diff::MergeLabels;

use crate::config::VcsConfig;
use crate::error::VcsError;
use crate::repo::Repo;
use crate::storage::apply_updates;
use crate::tree::{merge_entry, worktree_tree, EntryMerge};
use crate::types::{FileState, Stash, TreeFile};

/// Stash operations, isolated so an engine with native stash support can
/// replace the synthesized one without changing callers.
pub trait StashStrategy: Send + Sync {
    /// Record every differing path and reset the working tree to `HEAD`.
    fn save(&self, repo: &Repo, message: Option<&str>) -> Result<Stash, VcsError>;

    /// Replay a stash onto the working tree, keeping the record.
    /// Returns the paths written.
    fn apply(&self, repo: &Repo, stash_id: &str) -> Result<Vec<String>, VcsError>;

    /// Forget a stash record. The underlying commit is left alone.
    fn drop_stash(&self, workspace_id: Uuid, stash_id: &str) -> Result<Stash, VcsError>;

    /// Stashes of one workspace, newest first.
    fn list(&self, workspace_id: Uuid) -> Result<Vec<Stash>, VcsError>;
}

/// Bookkeeping for synthesized stashes, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashIndex {
    #[serde(default)]
    stashes: Vec<Stash>,
}

impl StashIndex {
    /// Load an index file; a missing file is an empty index.
    pub fn load(path: &Path) -> Result<Self, VcsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path).map_err(|source| VcsError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), VcsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| VcsError::IoError {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| VcsError::IoError {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn push(&mut self, stash: Stash) {
        self.stashes.insert(0, stash);
    }

    pub fn get(&self, workspace_id: Uuid, stash_id: &str) -> Option<&Stash> {
        self.stashes
            .iter()
            .find(|s| s.workspace_id == workspace_id && s.id == stash_id)
    }

    pub fn remove(&mut self, workspace_id: Uuid, stash_id: &str) -> Option<Stash> {
        let pos = self
            .stashes
            .iter()
            .position(|s| s.workspace_id == workspace_id && s.id == stash_id)?;
        Some(self.stashes.remove(pos))
    }

    pub fn for_workspace(&self, workspace_id: Uuid) -> Vec<Stash> {
        self.stashes
            .iter()
            .filter(|s| s.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stashes.is_empty()
    }
}

/// Stash synthesized from `write_commit` + `reset_hard`.
pub struct SyntheticStash {
    index: Mutex<StashIndex>,
    message_prefix: String,
}

impl SyntheticStash {
    pub fn new(config: &VcsConfig) -> Self {
        Self::with_index(StashIndex::default(), config)
    }

    pub fn with_index(index: StashIndex, config: &VcsConfig) -> Self {
        Self {
            index: Mutex::new(index),
            message_prefix: config.stash_message_prefix.clone(),
        }
    }

    /// Copy of the current index, for persisting between runs.
    pub fn index_snapshot(&self) -> Result<StashIndex, VcsError> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, StashIndex>, VcsError> {
        self.index.lock().map_err(|_| VcsError::LockPoisoned)
    }

    fn default_message(&self, repo: &Repo, branch: &str, head: &str) -> Result<String, VcsError> {
        let summary = match repo.engine.log(head, 1)?.into_iter().next() {
            Some(commit) => format!("{} {}", commit.short_id, commit.subject),
            None => head.chars().take(7).collect(),
        };
        Ok(format!("{} {}: {}", self.message_prefix, branch, summary))
    }
}

impl StashStrategy for SyntheticStash {
    fn save(&self, repo: &Repo, message: Option<&str>) -> Result<Stash, VcsError> {
        let status = repo.engine.status()?;
        if status.is_empty() {
            return Err(VcsError::NoChanges);
        }
        let head = repo.require_head()?;
        let branch = repo.engine.current_branch()?;

        let head_tree = repo.engine.read_tree(&head)?;
        let tree = worktree_tree(repo, &head_tree, &status)?;
        let message = match message {
            Some(m) => m.to_string(),
            None => self.default_message(repo, &branch, &head)?,
        };
        let commit = repo
            .engine
            .write_commit(&tree, std::slice::from_ref(&head), &message)?;

        let stash = Stash {
            id: commit,
            workspace_id: repo.workspace_id,
            message,
            created_at: Utc::now(),
            parent_ref: head.clone(),
            branch,
        };
        // Record before resetting: once the commit exists the changes are
        // recoverable through the index even if the reset fails.
        self.lock()?.push(stash.clone());

        repo.engine.reset_hard(&head)?;
        for entry in status.iter().filter(|e| e.head_state == FileState::Added) {
            repo.storage.remove(&entry.path)?;
        }

        tracing::info!(
            workspace_id = %repo.workspace_id,
            "stash saved: {} ({} paths)",
            stash.id,
            status.len()
        );
        Ok(stash)
    }

    fn apply(&self, repo: &Repo, stash_id: &str) -> Result<Vec<String>, VcsError> {
        let stash = self
            .lock()?
            .get(repo.workspace_id, stash_id)
            .cloned()
            .ok_or_else(|| VcsError::StashNotFound(stash_id.to_string()))?;

        let base = repo.engine.read_tree(&stash.parent_ref)?;
        let stashed = repo.engine.read_tree(&stash.id)?;
        let changed: BTreeSet<&String> = base
            .keys()
            .chain(stashed.keys())
            .filter(|p| base.get(*p) != stashed.get(*p))
            .collect();

        let labels = MergeLabels {
            ours: "working tree",
            theirs: "stash",
        };
        let mut writes = Vec::new();
        let mut conflicts = Vec::new();
        for path in changed {
            let mode = base
                .get(path)
                .or_else(|| stashed.get(path))
                .map_or(TreeFile::REGULAR, |f| f.mode);
            let current = repo
                .storage
                .read(path)?
                .map(|content| TreeFile { mode, content });

            match merge_entry(base.get(path), current.as_ref(), stashed.get(path), labels) {
                EntryMerge::Keep => {}
                EntryMerge::Take(result) => writes.push((path.clone(), result)),
                EntryMerge::Conflict(_) => conflicts.push(path.clone()),
            }
        }

        // All-or-nothing: nothing is written if any path conflicts.
        if !conflicts.is_empty() {
            tracing::warn!(
                workspace_id = %repo.workspace_id,
                "stash {} does not apply cleanly: {}",
                stash.id,
                conflicts.join(", ")
            );
            return Err(VcsError::MergeConflict { paths: conflicts });
        }

        let updates: Vec<(&str, Option<&[u8]>)> = writes
            .iter()
            .map(|(path, result)| (path.as_str(), result.as_ref().map(|f| f.content.as_slice())))
            .collect();
        apply_updates(repo.storage.as_ref(), &updates)?;

        tracing::info!(
            workspace_id = %repo.workspace_id,
            "stash applied: {} ({} paths)",
            stash.id,
            writes.len()
        );
        Ok(writes.into_iter().map(|(path, _)| path).collect())
    }

    fn drop_stash(&self, workspace_id: Uuid, stash_id: &str) -> Result<Stash, VcsError> {
        let stash = self
            .lock()?
            .remove(workspace_id, stash_id)
            .ok_or_else(|| VcsError::StashNotFound(stash_id.to_string()))?;
        tracing::info!(workspace_id = %workspace_id, "stash dropped: {}", stash.id);
        Ok(stash)
    }

    fn list(&self, workspace_id: Uuid) -> Result<Vec<Stash>, VcsError> {
        Ok(self.lock()?.for_workspace(workspace_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{commit_all, init_git_repo, FailingStorage};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn repo_at(dir: &Path) -> Repo {
        Repo::local(Uuid::new_v4(), dir, &VcsConfig::default())
    }

    fn read(dir: &Path, path: &str) -> Option<String> {
        std::fs::read_to_string(dir.join(path)).ok()
    }

    #[test]
    fn save_on_clean_tree_is_no_changes() {
        let dir = tempdir().unwrap();
        init_git_repo(dir.path());
        let stash = SyntheticStash::new(&VcsConfig::default());

        let err = stash.save(&repo_at(dir.path()), None).unwrap_err();
        assert!(matches!(err, VcsError::NoChanges));
        assert!(stash.index_snapshot().unwrap().is_empty());
    }

    #[test]
    fn save_then_apply_restores_working_tree() {
        let dir = tempdir().unwrap();
        init_git_repo(dir.path());
        std::fs::write(dir.path().join("keep.txt"), "keep\n").unwrap();
        commit_all(dir.path(), "add keep");

        std::fs::write(dir.path().join("README.md"), "# Changed\n").unwrap();
        std::fs::remove_file(dir.path().join("keep.txt")).unwrap();
        std::fs::create_dir(dir.path().join("new")).unwrap();
        std::fs::write(dir.path().join("new/file.txt"), "fresh\n").unwrap();

        let repo = repo_at(dir.path());
        let stash = SyntheticStash::new(&VcsConfig::default());
        let saved = stash.save(&repo, None).unwrap();

        assert!(saved.message.starts_with("WIP on main: "));
        assert!(saved.message.ends_with("add keep"));
        assert!(repo.engine.status().unwrap().is_empty());
        assert_eq!(read(dir.path(), "README.md").as_deref(), Some("# Test\n"));
        assert_eq!(read(dir.path(), "keep.txt").as_deref(), Some("keep\n"));
        assert!(read(dir.path(), "new/file.txt").is_none());
        assert!(!dir.path().join("new").exists());

        let mut written = stash.apply(&repo, &saved.id).unwrap();
        written.sort();
        assert_eq!(written, vec!["README.md", "keep.txt", "new/file.txt"]);
        assert_eq!(read(dir.path(), "README.md").as_deref(), Some("# Changed\n"));
        assert!(read(dir.path(), "keep.txt").is_none());
        assert_eq!(read(dir.path(), "new/file.txt").as_deref(), Some("fresh\n"));

        // The record survives apply.
        assert_eq!(stash.list(repo.workspace_id).unwrap().len(), 1);
    }

    #[test]
    fn conflicting_apply_writes_nothing() {
        let dir = tempdir().unwrap();
        init_git_repo(dir.path());
        std::fs::write(dir.path().join("a.txt"), "base\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "base\n").unwrap();
        commit_all(dir.path(), "add a and b");

        std::fs::write(dir.path().join("a.txt"), "stashed\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "stashed\n").unwrap();
        let repo = repo_at(dir.path());
        let stash = SyntheticStash::new(&VcsConfig::default());
        let saved = stash.save(&repo, Some("both files")).unwrap();
        assert_eq!(saved.message, "both files");

        std::fs::write(dir.path().join("a.txt"), "local edit\n").unwrap();
        let err = stash.apply(&repo, &saved.id).unwrap_err();
        match err {
            VcsError::MergeConflict { paths } => assert_eq!(paths, vec!["a.txt"]),
            other => panic!("expected MergeConflict, got {other:?}"),
        }
        assert_eq!(read(dir.path(), "a.txt").as_deref(), Some("local edit\n"));
        assert_eq!(read(dir.path(), "b.txt").as_deref(), Some("base\n"));
    }

    #[test]
    fn failed_apply_write_restores_working_tree() {
        let dir = tempdir().unwrap();
        init_git_repo(dir.path());
        std::fs::write(dir.path().join("README.md"), "# Changed\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "new\n").unwrap();
        let repo = repo_at(dir.path());
        let stash = SyntheticStash::new(&VcsConfig::default());
        let saved = stash.save(&repo, None).unwrap();

        // README.md is written first, then notes.txt fails.
        let flaky = Repo::new(
            repo.workspace_id,
            repo.engine.clone(),
            Arc::new(FailingStorage::new(dir.path(), "notes.txt")),
        );
        let err = stash.apply(&flaky, &saved.id).unwrap_err();
        assert!(matches!(err, VcsError::Storage(_)));

        assert_eq!(read(dir.path(), "README.md").as_deref(), Some("# Test\n"));
        assert!(read(dir.path(), "notes.txt").is_none());
        assert!(repo.engine.status().unwrap().is_empty());

        // Nothing was half-applied, so a retry on working storage succeeds.
        stash.apply(&repo, &saved.id).unwrap();
        assert_eq!(read(dir.path(), "notes.txt").as_deref(), Some("new\n"));
    }

    #[test]
    fn drop_forgets_record_but_keeps_commit() {
        let dir = tempdir().unwrap();
        init_git_repo(dir.path());
        std::fs::write(dir.path().join("README.md"), "edited\n").unwrap();
        let repo = repo_at(dir.path());
        let stash = SyntheticStash::new(&VcsConfig::default());
        let saved = stash.save(&repo, None).unwrap();

        let dropped = stash.drop_stash(repo.workspace_id, &saved.id).unwrap();
        assert_eq!(dropped.id, saved.id);
        assert!(stash.list(repo.workspace_id).unwrap().is_empty());
        assert!(repo.engine.resolve(&saved.id).unwrap().is_some());

        let err = stash.apply(&repo, &saved.id).unwrap_err();
        assert!(matches!(err, VcsError::StashNotFound(_)));
    }

    #[test]
    fn stashes_are_scoped_to_their_workspace() {
        let dir = tempdir().unwrap();
        init_git_repo(dir.path());
        std::fs::write(dir.path().join("README.md"), "edited\n").unwrap();
        let repo = repo_at(dir.path());
        let stash = SyntheticStash::new(&VcsConfig::default());
        let saved = stash.save(&repo, None).unwrap();

        let other = Repo {
            workspace_id: Uuid::new_v4(),
            ..repo.clone()
        };
        assert!(stash.list(other.workspace_id).unwrap().is_empty());
        assert!(matches!(
            stash.apply(&other, &saved.id),
            Err(VcsError::StashNotFound(_))
        ));
    }

    #[test]
    fn index_persists_to_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state/stashes.json");
        assert!(StashIndex::load(&path).unwrap().is_empty());

        let mut index = StashIndex::default();
        index.push(Stash {
            id: "abc123".into(),
            workspace_id: Uuid::new_v4(),
            message: "WIP".into(),
            created_at: Utc::now(),
            parent_ref: "def456".into(),
            branch: "main".into(),
        });
        index.save(&path).unwrap();

        assert_eq!(StashIndex::load(&path).unwrap(), index);
    }
}
