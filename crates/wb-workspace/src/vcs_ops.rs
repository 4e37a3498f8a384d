// vcs_ops.rs — VCS operations scoped to a workspace.
//
// Each call runs the orchestrator under the workspace's lock and refreshes
// `vcs_snapshot` from the engine afterwards. The snapshot is replaced only
// when both the operation and the refresh succeed, so it always reflects the
// last completed call.

use uuid::Uuid;
use wb_vcs::{
    MergeOptions, MergeOutcome, PendingMerge, Repo, Stash, VcsError, VcsOrchestrator, VcsSnapshot,
};

use crate::error::WorkspaceError;
use crate::store::WorkspaceStore;
use crate::workspace::Workspace;

/// Fresh snapshot that carries over an in-progress merge.
pub fn refreshed_snapshot(
    vcs: &VcsOrchestrator,
    repo: &Repo,
    pending_merge: Option<PendingMerge>,
) -> Result<VcsSnapshot, VcsError> {
    let mut snapshot = vcs.snapshot(repo)?;
    snapshot.pending_merge = pending_merge;
    Ok(snapshot)
}

fn refuse_during_merge(ws: &Workspace) -> Result<(), WorkspaceError> {
    if ws.vcs_snapshot.is_conflicted() {
        return Err(WorkspaceError::MergeInProgress {
            workspace_id: ws.id,
        });
    }
    Ok(())
}

fn pending_merge(ws: &Workspace) -> Result<PendingMerge, WorkspaceError> {
    ws.vcs_snapshot
        .pending_merge
        .clone()
        .ok_or(WorkspaceError::NoMergeInProgress {
            workspace_id: ws.id,
        })
}

impl WorkspaceStore {
    /// Recompute the workspace's snapshot from the engine.
    pub fn refresh_status(
        &self,
        id: Uuid,
        vcs: &VcsOrchestrator,
    ) -> Result<VcsSnapshot, WorkspaceError> {
        self.with_workspace(id, |ws, repo| {
            ws.vcs_snapshot = refreshed_snapshot(vcs, repo, ws.vcs_snapshot.pending_merge.clone())?;
            Ok(ws.vcs_snapshot.clone())
        })
    }

    pub fn commit(
        &self,
        id: Uuid,
        vcs: &VcsOrchestrator,
        message: &str,
    ) -> Result<String, WorkspaceError> {
        self.with_workspace(id, |ws, repo| {
            refuse_during_merge(ws)?;
            let commit = vcs.commit(repo, message)?;
            ws.vcs_snapshot = refreshed_snapshot(vcs, repo, None)?;
            Ok(commit)
        })
    }

    pub fn stash_save(
        &self,
        id: Uuid,
        vcs: &VcsOrchestrator,
        message: Option<&str>,
    ) -> Result<Stash, WorkspaceError> {
        self.with_workspace(id, |ws, repo| {
            refuse_during_merge(ws)?;
            let stash = vcs.stash_save(repo, message)?;
            ws.vcs_snapshot = refreshed_snapshot(vcs, repo, None)?;
            Ok(stash)
        })
    }

    /// Replay a stash; returns the paths written.
    pub fn stash_apply(
        &self,
        id: Uuid,
        vcs: &VcsOrchestrator,
        stash_id: &str,
    ) -> Result<Vec<String>, WorkspaceError> {
        self.with_workspace(id, |ws, repo| {
            refuse_during_merge(ws)?;
            let written = vcs.stash_apply(repo, stash_id)?;
            ws.vcs_snapshot = refreshed_snapshot(vcs, repo, None)?;
            Ok(written)
        })
    }

    pub fn stash_drop(
        &self,
        id: Uuid,
        vcs: &VcsOrchestrator,
        stash_id: &str,
    ) -> Result<Stash, WorkspaceError> {
        self.with_workspace(id, |_, repo| Ok(vcs.stash_drop(repo, stash_id)?))
    }

    pub fn stash_list(
        &self,
        id: Uuid,
        vcs: &VcsOrchestrator,
    ) -> Result<Vec<Stash>, WorkspaceError> {
        let repo = self.repo(id)?;
        Ok(vcs.stash_list(&repo)?)
    }

    /// Merge a branch. A conflicted outcome leaves the pending merge on the
    /// snapshot until `merge_continue` or `merge_abort`.
    pub fn merge(
        &self,
        id: Uuid,
        vcs: &VcsOrchestrator,
        branch: &str,
        options: MergeOptions,
    ) -> Result<MergeOutcome, WorkspaceError> {
        self.with_workspace(id, |ws, repo| {
            refuse_during_merge(ws)?;
            let outcome = vcs.merge(repo, branch, options)?;
            ws.vcs_snapshot = refreshed_snapshot(vcs, repo, outcome.pending.clone())?;
            Ok(outcome)
        })
    }

    pub fn merge_abort(&self, id: Uuid, vcs: &VcsOrchestrator) -> Result<(), WorkspaceError> {
        self.with_workspace(id, |ws, repo| {
            let pending = pending_merge(ws)?;
            vcs.merge_abort(repo, &pending)?;
            ws.vcs_snapshot = refreshed_snapshot(vcs, repo, None)?;
            Ok(())
        })
    }

    /// Commit a resolved merge. Fails with `MergeConflict` while markers remain.
    pub fn merge_continue(
        &self,
        id: Uuid,
        vcs: &VcsOrchestrator,
        message: Option<&str>,
    ) -> Result<String, WorkspaceError> {
        self.with_workspace(id, |ws, repo| {
            let pending = pending_merge(ws)?;
            let commit = vcs.merge_continue(repo, &pending, message)?;
            ws.vcs_snapshot = refreshed_snapshot(vcs, repo, None)?;
            Ok(commit)
        })
    }

    pub fn checkout_branch(
        &self,
        id: Uuid,
        vcs: &VcsOrchestrator,
        branch: &str,
    ) -> Result<(), WorkspaceError> {
        self.with_workspace(id, |ws, repo| {
            refuse_during_merge(ws)?;
            vcs.checkout_branch(repo, branch)?;
            ws.vcs_snapshot = refreshed_snapshot(vcs, repo, None)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryPersistence;
    use crate::store::RepoFactory;
    use crate::workspace::Project;
    use std::path::Path;
    use std::process::Command;
    use std::sync::Arc;
    use wb_vcs::{FileState, VcsConfig};

    fn git(dir: &Path, args: &[&str]) {
        let output = Command::new("git").args(args).current_dir(dir).output().unwrap();
        assert!(output.status.success(), "git {:?}: {}", args, String::from_utf8_lossy(&output.stderr));
    }

    fn init_git_repo(dir: &Path) {
        git(dir, &["init", "-q"]);
        git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(dir, &["config", "user.name", "Test User"]);
        git(dir, &["config", "user.email", "test@example.com"]);
        git(dir, &["config", "commit.gpgsign", "false"]);
        std::fs::write(dir.join("a.txt"), "line1\nline2\n").unwrap();
        git(dir, &["add", "-A"]);
        git(dir, &["commit", "-q", "-m", "Initial commit"]);
    }

    fn setup() -> (tempfile::TempDir, WorkspaceStore, VcsOrchestrator, Uuid) {
        let dir = tempfile::tempdir().unwrap();
        init_git_repo(dir.path());
        let factory: RepoFactory = Arc::new(|id, root| Repo::local(id, root, &VcsConfig::default()));
        let store = WorkspaceStore::new(Arc::new(MemoryPersistence::new()), factory);
        let id = store
            .create(&Project::new("demo", dir.path(), "main"))
            .unwrap();
        (dir, store, VcsOrchestrator::new(VcsConfig::default()), id)
    }

    #[test]
    fn refresh_status_fills_snapshot() {
        let (dir, store, vcs, id) = setup();
        std::fs::write(dir.path().join("a.txt"), "changed\n").unwrap();

        let snapshot = store.refresh_status(id, &vcs).unwrap();
        assert_eq!(snapshot.branch, "main");
        assert_eq!(snapshot.commits.len(), 1);
        assert_eq!(snapshot.status[0].head_state, FileState::Modified);
        assert_eq!(store.get(id).unwrap().vcs_snapshot, snapshot);
    }

    #[test]
    fn failed_operation_keeps_previous_snapshot() {
        let (_dir, store, vcs, id) = setup();
        store.refresh_status(id, &vcs).unwrap();
        let before = store.get(id).unwrap();

        let err = store.stash_save(id, &vcs, None).unwrap_err();
        assert!(matches!(err, WorkspaceError::Vcs(VcsError::NoChanges)));
        assert_eq!(store.get(id).unwrap(), before);
    }

    #[test]
    fn stash_cycle_updates_snapshot() {
        let (dir, store, vcs, id) = setup();
        std::fs::write(dir.path().join("a.txt"), "stashed\n").unwrap();
        store.refresh_status(id, &vcs).unwrap();

        let stash = store.stash_save(id, &vcs, None).unwrap();
        assert!(!store.get(id).unwrap().vcs_snapshot.is_dirty());
        assert_eq!(store.stash_list(id, &vcs).unwrap().len(), 1);

        store.stash_apply(id, &vcs, &stash.id).unwrap();
        assert!(store.get(id).unwrap().vcs_snapshot.is_dirty());

        store.stash_drop(id, &vcs, &stash.id).unwrap();
        assert!(store.stash_list(id, &vcs).unwrap().is_empty());
    }

    #[test]
    fn conflicted_merge_blocks_other_operations_until_resolved() {
        let (dir, store, vcs, id) = setup();
        git(dir.path(), &["checkout", "-q", "-b", "feature"]);
        std::fs::write(dir.path().join("a.txt"), "feature\nline2\n").unwrap();
        git(dir.path(), &["commit", "-q", "-am", "feature"]);
        git(dir.path(), &["checkout", "-q", "main"]);
        std::fs::write(dir.path().join("a.txt"), "main\nline2\n").unwrap();
        git(dir.path(), &["commit", "-q", "-am", "main"]);

        let outcome = store
            .merge(id, &vcs, "feature", MergeOptions::default())
            .unwrap();
        assert_eq!(outcome.conflicts, vec!["a.txt"]);
        assert!(store.get(id).unwrap().vcs_snapshot.is_conflicted());

        assert!(matches!(
            store.merge(id, &vcs, "feature", MergeOptions::default()),
            Err(WorkspaceError::MergeInProgress { .. })
        ));
        assert!(matches!(
            store.merge_continue(id, &vcs, None),
            Err(WorkspaceError::Vcs(VcsError::MergeConflict { .. }))
        ));
        assert!(store.get(id).unwrap().vcs_snapshot.is_conflicted());

        store.merge_abort(id, &vcs).unwrap();
        let ws = store.get(id).unwrap();
        assert!(!ws.vcs_snapshot.is_conflicted());
        assert!(!ws.vcs_snapshot.is_dirty());
        assert!(matches!(
            store.merge_abort(id, &vcs),
            Err(WorkspaceError::NoMergeInProgress { .. })
        ));
    }

    #[test]
    fn commit_and_checkout_through_store() {
        let (dir, store, vcs, id) = setup();
        std::fs::write(dir.path().join("a.txt"), "next\n").unwrap();
        git(dir.path(), &["add", "a.txt"]);

        store.commit(id, &vcs, "next").unwrap();
        let ws = store.get(id).unwrap();
        assert_eq!(ws.vcs_snapshot.commits[0].subject, "next");
        assert!(!ws.vcs_snapshot.is_dirty());

        vcs.create_branch(&store.repo(id).unwrap(), "topic", None).unwrap();
        store.checkout_branch(id, &vcs, "topic").unwrap();
        assert_eq!(store.get(id).unwrap().vcs_snapshot.branch, "topic");
    }
}
