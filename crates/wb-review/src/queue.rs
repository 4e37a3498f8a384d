// queue.rs — ReviewQueue: the single gate for file mutations.
//
// Every operation on a change runs under its workspace's lock (via
// WorkspaceStore::with_workspace), and the queue's own mutex is taken inside
// that, never around it. So decisions on one workspace's changes are
// serialized with each other and with that workspace's VCS operations.
//
// Accept writes through the workspace's FileStorage first. A failed write
// leaves the change pending. Once the write lands the change is accepted no
// matter what follows; a staging or status-refresh failure after that point
// is returned to the caller but does not undo the acceptance.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use uuid::Uuid;
use wb_diff::DiffLine;
use wb_vcs::{Repo, VcsOrchestrator};
use wb_workspace::{refreshed_snapshot, Workspace, WorkspaceDraft, WorkspaceError, WorkspaceStore};

use crate::change::{ChangeOperation, ChangeOrigin, ChangeStatus, PendingChange, ProposedChange};
use crate::config::{DuplicatePolicy, ReviewConfig};
use crate::error::ReviewError;
use crate::events::{EventDispatcher, EventSink, ReviewEvent};
use crate::select::PathSelector;
use crate::store::ChangeStore;

pub struct ReviewQueue {
    config: ReviewConfig,
    workspaces: Arc<WorkspaceStore>,
    vcs: Arc<VcsOrchestrator>,
    store: Arc<dyn ChangeStore>,
    events: EventDispatcher,
    /// Every known change, in proposal order.
    changes: Mutex<Vec<PendingChange>>,
}

impl ReviewQueue {
    pub fn new(
        config: ReviewConfig,
        workspaces: Arc<WorkspaceStore>,
        vcs: Arc<VcsOrchestrator>,
        store: Arc<dyn ChangeStore>,
    ) -> Self {
        Self {
            config,
            workspaces,
            vcs,
            store,
            events: EventDispatcher::new(),
            changes: Mutex::new(Vec::new()),
        }
    }

    /// Rebuild the queue from a change store after a restart.
    pub fn restore(
        config: ReviewConfig,
        workspaces: Arc<WorkspaceStore>,
        vcs: Arc<VcsOrchestrator>,
        store: Arc<dyn ChangeStore>,
    ) -> Result<Self, ReviewError> {
        let changes = store.load_all()?;
        let pending = changes.iter().filter(|c| c.is_pending()).count();
        tracing::info!("restored {} change(s), {} pending", changes.len(), pending);
        let queue = Self::new(config, workspaces, vcs, store);
        *queue.lock_changes()? = changes;
        Ok(queue)
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.events.add_sink(sink);
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    fn lock_changes(&self) -> Result<MutexGuard<'_, Vec<PendingChange>>, ReviewError> {
        self.changes.lock().map_err(|_| ReviewError::LockPoisoned)
    }

    pub fn get(&self, id: Uuid) -> Result<PendingChange, ReviewError> {
        self.lock_changes()?
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(ReviewError::NotFound(id))
    }

    fn pending(&self, id: Uuid) -> Result<PendingChange, ReviewError> {
        let change = self.get(id)?;
        if !change.is_pending() {
            return Err(ReviewError::NotPending {
                change_id: id,
                status: change.status,
            });
        }
        Ok(change)
    }

    /// Replace the in-memory copy of a change.
    fn replace(&self, change: &PendingChange) -> Result<(), ReviewError> {
        let mut changes = self.lock_changes()?;
        match changes.iter_mut().find(|c| c.id == change.id) {
            Some(slot) => *slot = change.clone(),
            None => changes.push(change.clone()),
        }
        Ok(())
    }

    /// Persist, then publish in memory.
    fn commit_record(&self, change: &PendingChange) -> Result<(), ReviewError> {
        self.store.append(change)?;
        self.replace(change)
    }

    /// Queue a change under the configured duplicate policy.
    pub fn propose(&self, proposal: ProposedChange) -> Result<PendingChange, ReviewError> {
        self.propose_with(proposal, self.config.duplicate_policy)
    }

    /// Queue a change. With `Reject`, a path that already has a pending change
    /// fails with `DuplicatePendingChange`; with `Supersede`, the earlier
    /// change is closed as rejected.
    pub fn propose_with(
        &self,
        proposal: ProposedChange,
        policy: DuplicatePolicy,
    ) -> Result<PendingChange, ReviewError> {
        proposal.validate()?;
        let workspace_id = proposal.workspace_id;

        let (change, superseded) =
            self.workspaces
                .with_workspace(workspace_id, |ws, _| -> Result<_, ReviewError> {
                    let change = PendingChange::from_proposal(proposal, Utc::now());
                    let existing = self
                        .lock_changes()?
                        .iter()
                        .find(|c| {
                            c.is_pending()
                                && c.workspace_id == workspace_id
                                && c.file_path == change.file_path
                        })
                        .cloned();

                    let superseded = match (existing, policy) {
                        (Some(existing), DuplicatePolicy::Reject) => {
                            return Err(ReviewError::DuplicatePendingChange {
                                workspace_id,
                                path: change.file_path.clone(),
                                existing: existing.id,
                            });
                        }
                        (Some(mut existing), DuplicatePolicy::Supersede) => {
                            existing.decide(
                                ChangeStatus::Rejected,
                                Some(format!("superseded by {}", change.id)),
                                Utc::now(),
                            );
                            self.commit_record(&existing)?;
                            Some(existing)
                        }
                        (None, _) => None,
                    };
                    self.commit_record(&change)?;

                    // A human proposal is an edit that exists only in the
                    // editor until accepted.
                    if change.origin == ChangeOrigin::Human {
                        ws.unsaved_paths.insert(change.file_path.clone());
                    }
                    Ok((change, superseded))
                })?;

        if let Some(old) = &superseded {
            tracing::info!(workspace_id = %workspace_id, "change {} superseded by {}", old.id, change.id);
            self.events.dispatch(&ReviewEvent::superseded(old, change.id));
        }
        tracing::info!(
            workspace_id = %workspace_id,
            "proposed {} of {} ({})",
            change.operation,
            change.file_path,
            change.origin
        );
        self.events.dispatch(&ReviewEvent::proposed(&change));
        Ok(change)
    }

    /// Write a pending change through to storage and mark it accepted.
    pub fn accept(&self, id: Uuid) -> Result<PendingChange, ReviewError> {
        let workspace_id = self.get(id)?.workspace_id;

        let (accepted, follow_up) =
            self.workspaces
                .with_workspace(workspace_id, |ws, repo| -> Result<_, ReviewError> {
                    let change = self.pending(id)?;
                    if !change.verify_hash() {
                        return Err(ReviewError::HashMismatch(id));
                    }
                    write_through(repo, &change)?;

                    // Durable from here on.
                    ws.unsaved_paths.remove(&change.file_path);
                    let (accepted, persist_err) = self.settle_accepted(change)?;
                    let sync_err = self
                        .sync_vcs(ws, repo, std::slice::from_ref(&accepted.file_path))
                        .err();
                    Ok((accepted, persist_err.or(sync_err)))
                })?;

        tracing::info!(workspace_id = %workspace_id, "accepted change {}: {}", id, accepted.file_path);
        self.events.dispatch(&ReviewEvent::accepted(&accepted));
        match follow_up {
            Some(e) => {
                tracing::warn!("change {} accepted but follow-up failed: {}", id, e);
                Err(e)
            }
            None => Ok(accepted),
        }
    }

    /// Discard a pending change. Storage and VCS state are untouched.
    pub fn reject(&self, id: Uuid, reason: Option<&str>) -> Result<PendingChange, ReviewError> {
        let workspace_id = self.get(id)?.workspace_id;
        let rejected = self
            .workspaces
            .with_workspace(workspace_id, |_, _| -> Result<_, ReviewError> {
                let mut change = self.pending(id)?;
                change.decide(ChangeStatus::Rejected, reason.map(str::to_string), Utc::now());
                self.commit_record(&change)?;
                Ok(change)
            })?;

        tracing::info!(workspace_id = %workspace_id, "rejected change {}: {}", id, rejected.file_path);
        self.events.dispatch(&ReviewEvent::rejected(&rejected));
        Ok(rejected)
    }

    /// Replace the proposed content of a pending change. It stays pending.
    pub fn edit(&self, id: Uuid, after_content: String) -> Result<PendingChange, ReviewError> {
        let workspace_id = self.get(id)?.workspace_id;
        let edited = self
            .workspaces
            .with_workspace(workspace_id, |_, _| -> Result<_, ReviewError> {
                let mut change = self.pending(id)?;
                if change.operation == ChangeOperation::Delete {
                    return Err(ReviewError::InvalidChange(format!(
                        "{} is a delete; it has no content to edit",
                        change.file_path
                    )));
                }
                change.set_after(after_content);
                self.commit_record(&change)?;
                Ok(change)
            })?;

        tracing::info!(workspace_id = %workspace_id, "edited change {}: {}", id, edited.file_path);
        self.events.dispatch(&ReviewEvent::edited(&edited));
        Ok(edited)
    }

    /// Accept several changes, all or nothing.
    ///
    /// Every write is attempted. If any fails, the writes that landed are
    /// rolled back, nothing is marked accepted, and `BatchFailed` names the
    /// paths that failed.
    pub fn accept_all(&self, ids: &[Uuid]) -> Result<Vec<PendingChange>, ReviewError> {
        let workspace_ids = ids
            .iter()
            .map(|id| self.get(*id).map(|c| c.workspace_id))
            .collect::<Result<Vec<_>, _>>()?;

        let (accepted, follow_up) =
            self.workspaces
                .with_workspaces(&workspace_ids, |drafts| -> Result<_, ReviewError> {
                    let batch = self.pending_batch(ids)?;
                    for change in &batch {
                        if !change.verify_hash() {
                            return Err(ReviewError::HashMismatch(change.id));
                        }
                    }

                    let mut written: Vec<(&PendingChange, Option<Vec<u8>>)> = Vec::new();
                    let mut failed_paths = Vec::new();
                    for change in &batch {
                        let repo = &draft_for(drafts, change.workspace_id)?.repo;
                        let previous = match repo.storage.read(&change.file_path) {
                            Ok(previous) => previous,
                            Err(e) => {
                                tracing::warn!("batch accept: cannot read {}: {}", change.file_path, e);
                                failed_paths.push(change.file_path.clone());
                                continue;
                            }
                        };
                        match write_through(repo, change) {
                            Ok(()) => written.push((change, previous)),
                            Err(e) => {
                                tracing::warn!("batch accept: {}", e);
                                failed_paths.push(change.file_path.clone());
                            }
                        }
                    }

                    if !failed_paths.is_empty() {
                        for (change, previous) in written.into_iter().rev() {
                            let repo = &draft_for(drafts, change.workspace_id)?.repo;
                            let restored = match previous {
                                Some(bytes) => repo.storage.write(&change.file_path, &bytes),
                                None => repo.storage.remove(&change.file_path),
                            };
                            if let Err(e) = restored {
                                tracing::warn!("rollback of {} failed: {}", change.file_path, e);
                                failed_paths.push(change.file_path.clone());
                            }
                        }
                        return Err(ReviewError::BatchFailed { failed_paths });
                    }

                    let mut accepted = Vec::new();
                    let mut follow_up = None;
                    for change in batch {
                        draft_for(drafts, change.workspace_id)?
                            .record
                            .unsaved_paths
                            .remove(&change.file_path);
                        let (change, persist_err) = self.settle_accepted(change)?;
                        follow_up = follow_up.or(persist_err);
                        accepted.push(change);
                    }
                    for (workspace_id, draft) in drafts.iter_mut() {
                        let paths: Vec<String> = accepted
                            .iter()
                            .filter(|c| c.workspace_id == *workspace_id)
                            .map(|c| c.file_path.clone())
                            .collect();
                        if let Err(e) = self.sync_vcs(&mut draft.record, &draft.repo, &paths) {
                            follow_up = follow_up.or(Some(e));
                        }
                    }
                    Ok((accepted, follow_up))
                })?;

        tracing::info!("accepted {} change(s) as a batch", accepted.len());
        for change in &accepted {
            self.events.dispatch(&ReviewEvent::accepted(change));
        }
        match follow_up {
            Some(e) => Err(e),
            None => Ok(accepted),
        }
    }

    /// Reject several changes, all or nothing.
    pub fn reject_all(
        &self,
        ids: &[Uuid],
        reason: Option<&str>,
    ) -> Result<Vec<PendingChange>, ReviewError> {
        let workspace_ids = ids
            .iter()
            .map(|id| self.get(*id).map(|c| c.workspace_id))
            .collect::<Result<Vec<_>, _>>()?;

        let rejected = self
            .workspaces
            .with_workspaces(&workspace_ids, |_| -> Result<_, ReviewError> {
                let now = Utc::now();
                let mut batch = self.pending_batch(ids)?;
                for change in batch.iter_mut() {
                    change.decide(ChangeStatus::Rejected, reason.map(str::to_string), now);
                    self.store.append(change)?;
                }
                for change in &batch {
                    self.replace(change)?;
                }
                Ok(batch)
            })?;

        tracing::info!("rejected {} change(s) as a batch", rejected.len());
        for change in &rejected {
            self.events.dispatch(&ReviewEvent::rejected(change));
        }
        Ok(rejected)
    }

    /// Pending changes of one workspace, oldest first.
    pub fn list_pending(&self, workspace_id: Uuid) -> Result<Vec<PendingChange>, ReviewError> {
        Ok(self
            .list(workspace_id)?
            .into_iter()
            .filter(PendingChange::is_pending)
            .collect())
    }

    /// Every change of one workspace, decided or not, oldest first.
    pub fn list(&self, workspace_id: Uuid) -> Result<Vec<PendingChange>, ReviewError> {
        Ok(self
            .lock_changes()?
            .iter()
            .filter(|c| c.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    /// Pending changes whose path matches any of `patterns`.
    pub fn select<S: AsRef<str>>(
        &self,
        workspace_id: Uuid,
        patterns: &[S],
    ) -> Result<Vec<PendingChange>, ReviewError> {
        let selector = PathSelector::new(patterns)?;
        Ok(self
            .list_pending(workspace_id)?
            .into_iter()
            .filter(|c| selector.matches(&c.file_path))
            .collect())
    }

    pub fn diff(&self, id: Uuid) -> Result<Vec<DiffLine>, ReviewError> {
        Ok(self.get(id)?.diff()?)
    }

    /// Look up `ids` as pending changes, skipping repeats.
    fn pending_batch(&self, ids: &[Uuid]) -> Result<Vec<PendingChange>, ReviewError> {
        let mut seen = HashSet::new();
        ids.iter()
            .filter(|id| seen.insert(**id))
            .map(|id| self.pending(*id))
            .collect()
    }

    /// Mark an already-written change accepted. Memory is updated first since
    /// the content is durable; a persistence error is handed back, not raised.
    fn settle_accepted(
        &self,
        mut change: PendingChange,
    ) -> Result<(PendingChange, Option<ReviewError>), ReviewError> {
        change.decide(ChangeStatus::Accepted, None, Utc::now());
        self.replace(&change)?;
        let persist_err = self.store.append(&change).err();
        Ok((change, persist_err))
    }

    /// Stage written paths and refresh the workspace's snapshot.
    fn sync_vcs(&self, ws: &mut Workspace, repo: &Repo, paths: &[String]) -> Result<(), ReviewError> {
        if self.config.stage_on_accept {
            for path in paths {
                self.vcs.stage(repo, path)?;
            }
        }
        ws.vcs_snapshot =
            refreshed_snapshot(&self.vcs, repo, ws.vcs_snapshot.pending_merge.clone())?;
        Ok(())
    }
}

fn draft_for(
    drafts: &mut BTreeMap<Uuid, WorkspaceDraft>,
    workspace_id: Uuid,
) -> Result<&mut WorkspaceDraft, ReviewError> {
    drafts
        .get_mut(&workspace_id)
        .ok_or(ReviewError::Workspace(WorkspaceError::NotFound(workspace_id)))
}

fn write_through(repo: &Repo, change: &PendingChange) -> Result<(), ReviewError> {
    let result = match change.operation {
        ChangeOperation::Create | ChangeOperation::Modify => repo.storage.write(
            &change.file_path,
            change.after_content.as_deref().unwrap_or("").as_bytes(),
        ),
        ChangeOperation::Delete => repo.storage.remove(&change.file_path),
    };
    result.map_err(|source| ReviewError::StorageWriteFailed {
        path: change.file_path.clone(),
        source,
    })
}
