// orchestrator.rs — VcsOrchestrator: high-level intents over engine primitives.
//
// Every operation takes the Repo it acts on and returns a full result or an
// error, never a partial one. Callers recompute their snapshot from
// `snapshot()` after each mutating call.

use std::sync::Arc;

use wb_diff::{compute_diff_bytes, diff_from_patch, has_conflict_markers, DiffLine, MergeLabels};

use crate::config::VcsConfig;
use crate::error::VcsError;
use crate::repo::Repo;
use crate::stash::{StashStrategy, SyntheticStash};
use crate::storage::apply_updates;
use crate::tree::{merge_trees, worktree_tree};
use crate::types::{
    CommitSummary, MergeOptions, MergeOutcome, PendingMerge, Stash, StatusEntry, TreeSnapshot,
    VcsSnapshot,
};

pub struct VcsOrchestrator {
    config: VcsConfig,
    stash: Arc<dyn StashStrategy>,
}

impl VcsOrchestrator {
    /// Orchestrator with the synthesized stash.
    pub fn new(config: VcsConfig) -> Self {
        let stash = Arc::new(SyntheticStash::new(&config));
        Self { config, stash }
    }

    pub fn with_stash(config: VcsConfig, stash: Arc<dyn StashStrategy>) -> Self {
        Self { config, stash }
    }

    pub fn config(&self) -> &VcsConfig {
        &self.config
    }

    /// Full status recompute. Side-effect free.
    pub fn status(&self, repo: &Repo) -> Result<Vec<StatusEntry>, VcsError> {
        repo.engine.status()
    }

    /// Branch, status and recent commits in one read.
    pub fn snapshot(&self, repo: &Repo) -> Result<VcsSnapshot, VcsError> {
        let branch = repo.engine.current_branch()?;
        let status = repo.engine.status()?;
        let commits = match repo.head()? {
            Some(head) => repo.engine.log(&head, self.config.log_depth)?,
            None => Vec::new(),
        };
        Ok(VcsSnapshot {
            branch,
            status,
            commits,
            pending_merge: None,
        })
    }

    /// Stage a path: existing files are added, missing files removed from the index.
    pub fn stage(&self, repo: &Repo, path: &str) -> Result<(), VcsError> {
        match repo.storage.read(path)? {
            Some(_) => repo.engine.add(path),
            None => repo.engine.remove(path),
        }
    }

    /// Commit whatever is staged. Fails with `NoChanges` on an empty index delta.
    pub fn commit(&self, repo: &Repo, message: &str) -> Result<String, VcsError> {
        if !repo.engine.status()?.iter().any(StatusEntry::is_staged) {
            return Err(VcsError::NoChanges);
        }
        let id = repo.engine.commit(message)?;
        tracing::info!(workspace_id = %repo.workspace_id, "committed {}", id);
        Ok(id)
    }

    pub fn stash_save(&self, repo: &Repo, message: Option<&str>) -> Result<Stash, VcsError> {
        self.stash.save(repo, message)
    }

    pub fn stash_apply(&self, repo: &Repo, stash_id: &str) -> Result<Vec<String>, VcsError> {
        self.stash.apply(repo, stash_id)
    }

    pub fn stash_drop(&self, repo: &Repo, stash_id: &str) -> Result<Stash, VcsError> {
        self.stash.drop_stash(repo.workspace_id, stash_id)
    }

    pub fn stash_list(&self, repo: &Repo) -> Result<Vec<Stash>, VcsError> {
        self.stash.list(repo.workspace_id)
    }

    /// Merge `branch` into the current branch.
    ///
    /// Refuses on a dirty tree. Tries fast-forward first, then (unless
    /// fast-forward-only) a three-way merge. A conflicted merge writes marked
    /// files to the working tree and returns the `PendingMerge` the caller
    /// must later continue or abort.
    pub fn merge(
        &self,
        repo: &Repo,
        branch: &str,
        options: MergeOptions,
    ) -> Result<MergeOutcome, VcsError> {
        let status = repo.engine.status()?;
        if !status.is_empty() {
            return Err(VcsError::DirtyWorkingTree {
                paths: status.into_iter().map(|e| e.path).collect(),
            });
        }

        let theirs = repo
            .engine
            .resolve(branch)?
            .ok_or_else(|| VcsError::BranchNotFound(branch.to_string()))?;
        let head = repo.require_head()?;

        if head == theirs || repo.engine.is_ancestor(&theirs, &head)? {
            tracing::info!(workspace_id = %repo.workspace_id, "merge {}: already up to date", branch);
            return Ok(MergeOutcome {
                fast_forward: false,
                already_up_to_date: true,
                result_ref: Some(head),
                conflicts: Vec::new(),
                pending: None,
            });
        }

        if repo.engine.is_ancestor(&head, &theirs)? {
            repo.engine.reset_hard(&theirs)?;
            tracing::info!(workspace_id = %repo.workspace_id, "merge {}: fast-forward to {}", branch, theirs);
            return Ok(MergeOutcome {
                fast_forward: true,
                already_up_to_date: false,
                result_ref: Some(theirs),
                conflicts: Vec::new(),
                pending: None,
            });
        }

        if options.fast_forward_only {
            return Err(VcsError::NotFastForward {
                branch: branch.to_string(),
            });
        }

        let base_tree = match repo.engine.merge_base(&head, &theirs)? {
            Some(base) => repo.engine.read_tree(&base)?,
            None => TreeSnapshot::new(),
        };
        let ours_tree = repo.engine.read_tree(&head)?;
        let theirs_tree = repo.engine.read_tree(&theirs)?;
        let labels = MergeLabels {
            ours: "ours",
            theirs: branch,
        };
        let merged = merge_trees(&base_tree, &ours_tree, &theirs_tree, labels);

        if merged.conflicts.is_empty() {
            let current = repo.engine.current_branch()?;
            let message = format!("Merge branch '{}' into {}", branch, current);
            let commit = repo
                .engine
                .write_commit(&merged.tree, &[head, theirs], &message)?;
            repo.engine.reset_hard(&commit)?;
            tracing::info!(workspace_id = %repo.workspace_id, "merge {}: created {}", branch, commit);
            return Ok(MergeOutcome {
                fast_forward: false,
                already_up_to_date: false,
                result_ref: Some(commit),
                conflicts: Vec::new(),
                pending: None,
            });
        }

        let updates: Vec<(&str, Option<&[u8]>)> = merged
            .updates
            .iter()
            .map(|(path, result)| (path.as_str(), result.as_ref().map(|f| f.content.as_slice())))
            .collect();
        if let Err(e) = apply_updates(repo.storage.as_ref(), &updates) {
            tracing::warn!(
                workspace_id = %repo.workspace_id,
                "merge {}: writing the merged tree failed, working tree restored: {}",
                branch,
                e
            );
            return Err(e.into());
        }
        let introduced_paths = merged
            .updates
            .iter()
            .filter(|(path, result)| result.is_some() && !ours_tree.contains_key(*path))
            .map(|(path, _)| path.clone())
            .collect();

        tracing::warn!(
            workspace_id = %repo.workspace_id,
            "merge {}: conflicts in {}",
            branch,
            merged.conflicts.join(", ")
        );
        let pending = PendingMerge {
            head,
            theirs,
            branch: branch.to_string(),
            conflicts: merged.conflicts.clone(),
            introduced_paths,
        };
        Ok(MergeOutcome {
            fast_forward: false,
            already_up_to_date: false,
            result_ref: None,
            conflicts: merged.conflicts,
            pending: Some(pending),
        })
    }

    /// Discard a conflicted merge and restore the pre-merge `HEAD`.
    pub fn merge_abort(&self, repo: &Repo, pending: &PendingMerge) -> Result<(), VcsError> {
        repo.engine.reset_hard(&pending.head)?;
        for path in &pending.introduced_paths {
            repo.storage.remove(path)?;
        }
        tracing::info!(workspace_id = %repo.workspace_id, "merge {} aborted", pending.branch);
        Ok(())
    }

    /// Record the merge commit once every conflicted path is free of markers.
    pub fn merge_continue(
        &self,
        repo: &Repo,
        pending: &PendingMerge,
        message: Option<&str>,
    ) -> Result<String, VcsError> {
        let mut unresolved = Vec::new();
        for path in &pending.conflicts {
            if let Some(content) = repo.storage.read(path)? {
                if has_conflict_markers(&String::from_utf8_lossy(&content)) {
                    unresolved.push(path.clone());
                }
            }
        }
        if !unresolved.is_empty() {
            return Err(VcsError::MergeConflict { paths: unresolved });
        }

        let head = repo.require_head()?;
        if head != pending.head {
            return Err(VcsError::Engine(format!(
                "HEAD moved from {} to {} during the merge",
                pending.head, head
            )));
        }

        let status = repo.engine.status()?;
        let head_tree = repo.engine.read_tree(&head)?;
        let tree = worktree_tree(repo, &head_tree, &status)?;
        let message = match message {
            Some(m) => m.to_string(),
            None => format!(
                "Merge branch '{}' into {}",
                pending.branch,
                repo.engine.current_branch()?
            ),
        };
        let commit = repo
            .engine
            .write_commit(&tree, &[head, pending.theirs.clone()], &message)?;
        repo.engine.reset_hard(&commit)?;
        tracing::info!(workspace_id = %repo.workspace_id, "merge {}: resolved as {}", pending.branch, commit);
        Ok(commit)
    }

    pub fn branches(&self, repo: &Repo) -> Result<Vec<String>, VcsError> {
        repo.engine.list_branches()
    }

    pub fn create_branch(
        &self,
        repo: &Repo,
        name: &str,
        start: Option<&str>,
    ) -> Result<(), VcsError> {
        repo.engine.create_branch(name, start)
    }

    /// Switch branches. Refuses on a dirty tree.
    pub fn checkout_branch(&self, repo: &Repo, name: &str) -> Result<(), VcsError> {
        let status = repo.engine.status()?;
        if !status.is_empty() {
            return Err(VcsError::DirtyWorkingTree {
                paths: status.into_iter().map(|e| e.path).collect(),
            });
        }
        if repo.engine.resolve(&format!("refs/heads/{}", name))?.is_none() {
            return Err(VcsError::BranchNotFound(name.to_string()));
        }
        repo.engine.checkout(name)
    }

    pub fn log(&self, repo: &Repo, depth: Option<usize>) -> Result<Vec<CommitSummary>, VcsError> {
        match repo.head()? {
            Some(head) => repo
                .engine
                .log(&head, depth.unwrap_or(self.config.log_depth)),
            None => Ok(Vec::new()),
        }
    }

    /// Working tree vs `HEAD` for one path, as structured lines.
    pub fn diff_path(&self, repo: &Repo, path: &str) -> Result<Vec<DiffLine>, VcsError> {
        let head = repo.head()?;
        let listing = repo.engine.diff_listing(head.as_deref(), Some(path))?;
        if !listing.trim().is_empty() {
            return Ok(diff_from_patch(&listing)?);
        }

        // Untracked files never appear in a listing.
        let untracked = repo
            .engine
            .status()?
            .iter()
            .any(|e| e.path == path && e.is_untracked());
        if !untracked {
            return Ok(Vec::new());
        }
        let content = repo.storage.read(path)?.unwrap_or_default();
        Ok(compute_diff_bytes(b"", &content)?)
    }
}
