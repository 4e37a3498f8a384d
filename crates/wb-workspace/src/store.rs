// store.rs — WorkspaceStore: lifecycle and serialized mutation of workspaces.
//
// Locking:
// - `state` (RwLock) guards the slot map and the active id.
// - Each workspace has its own Mutex slot; all mutation of one workspace runs
//   under it, so operations on different workspaces proceed in parallel.
// - Order is always slot -> state. `state` is never held while waiting for a
//   slot, so a busy workspace cannot stall lookups of any other. Several
//   slots are only taken together in ascending id order.
// - Each slot mirrors its `last_active_at` in an atomic so promotion on close
//   never locks other workspaces.
//
// Mutations run against draft copies. Drafts replace the stored records only
// after the operation and every persistence write succeed; a failed write
// restores the records already written.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;
use wb_vcs::Repo;

use crate::error::WorkspaceError;
use crate::persistence::WorkspacePersistence;
use crate::workspace::{CloseMode, Project, SwitchOutcome, Workspace, WorkspacePatch};

/// Builds the Repo for a workspace from its id and checkout root.
pub type RepoFactory = Arc<dyn Fn(Uuid, &Path) -> Repo + Send + Sync>;

/// A workspace record with its repository handle.
struct WorkspaceSlot {
    record: Workspace,
    repo: Repo,
    /// Set by `close`; a stale handle must not act on a closed workspace.
    closed: bool,
}

struct SlotCell {
    slot: Mutex<WorkspaceSlot>,
    last_active_micros: AtomicI64,
}

impl SlotCell {
    fn new(record: Workspace, repo: Repo) -> Arc<Self> {
        Arc::new(Self {
            last_active_micros: AtomicI64::new(record.last_active_at.timestamp_micros()),
            slot: Mutex::new(WorkspaceSlot {
                record,
                repo,
                closed: false,
            }),
        })
    }

    /// Lock the slot, failing with `NotFound` once the workspace is closed.
    fn lock(&self, id: Uuid) -> Result<MutexGuard<'_, WorkspaceSlot>, WorkspaceError> {
        let guard = self.slot.lock().map_err(|_| WorkspaceError::LockPoisoned)?;
        if guard.closed {
            return Err(WorkspaceError::NotFound(id));
        }
        Ok(guard)
    }

    fn last_active_micros(&self) -> i64 {
        self.last_active_micros.load(Ordering::SeqCst)
    }

    /// Replace the stored record with a committed draft.
    fn publish(&self, guard: &mut WorkspaceSlot, record: Workspace) {
        self.last_active_micros
            .store(record.last_active_at.timestamp_micros(), Ordering::SeqCst);
        guard.record = record;
    }
}

#[derive(Default)]
struct StoreState {
    slots: HashMap<Uuid, Arc<SlotCell>>,
    active: Option<Uuid>,
}

impl StoreState {
    /// The open workspace with the greatest `last_active_at`.
    fn most_recently_active(&self) -> Option<Uuid> {
        self.slots
            .iter()
            .max_by_key(|(_, cell)| cell.last_active_micros())
            .map(|(id, _)| *id)
    }
}

/// Owned working copy handed to `with_workspaces` closures.
#[derive(Debug, Clone)]
pub struct WorkspaceDraft {
    pub record: Workspace,
    pub repo: Repo,
}

/// Hands out strictly increasing timestamps so `last_active_at` ordering is
/// never ambiguous, even for calls within the same microsecond.
struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    fn starting_after(floor: Option<DateTime<Utc>>) -> Self {
        Self {
            last_micros: AtomicI64::new(floor.map_or(0, |t| t.timestamp_micros())),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_micros();
        let mut prev = self.last_micros.load(Ordering::SeqCst);
        loop {
            let next = wall.max(prev + 1);
            match self.last_micros.compare_exchange(
                prev,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return DateTime::from_timestamp_micros(next).unwrap_or_else(Utc::now),
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Owner of every open workspace and of the single active-workspace pointer.
pub struct WorkspaceStore {
    state: RwLock<StoreState>,
    persistence: Arc<dyn WorkspacePersistence>,
    repo_factory: RepoFactory,
    clock: MonotonicClock,
}

impl WorkspaceStore {
    pub fn new(persistence: Arc<dyn WorkspacePersistence>, repo_factory: RepoFactory) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            persistence,
            repo_factory,
            clock: MonotonicClock::starting_after(None),
        }
    }

    /// Rebuild the store from persisted records after a restart.
    ///
    /// The persisted active id wins if it still names a record; otherwise the
    /// most recently active record becomes active.
    pub fn restore(
        persistence: Arc<dyn WorkspacePersistence>,
        repo_factory: RepoFactory,
    ) -> Result<Self, WorkspaceError> {
        let records = persistence.load_all()?;
        let saved_active = persistence.load_active()?;
        let latest = records.iter().map(|r| r.last_active_at).max();

        let mut state = StoreState::default();
        for record in records {
            let repo = repo_factory(record.id, &record.root);
            state.slots.insert(record.id, SlotCell::new(record, repo));
        }
        state.active = match saved_active {
            Some(id) if state.slots.contains_key(&id) => Some(id),
            _ => state.most_recently_active(),
        };

        tracing::info!(
            "restored {} workspace(s), active: {:?}",
            state.slots.len(),
            state.active
        );
        Ok(Self {
            state: RwLock::new(state),
            persistence,
            repo_factory,
            clock: MonotonicClock::starting_after(latest),
        })
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, StoreState>, WorkspaceError> {
        self.state.read().map_err(|_| WorkspaceError::LockPoisoned)
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, StoreState>, WorkspaceError> {
        self.state.write().map_err(|_| WorkspaceError::LockPoisoned)
    }

    fn slot(&self, id: Uuid) -> Result<Arc<SlotCell>, WorkspaceError> {
        self.read_state()?
            .slots
            .get(&id)
            .cloned()
            .ok_or(WorkspaceError::NotFound(id))
    }

    /// Persist every record, or none: if one save fails, the records already
    /// written are saved again in their `original` form.
    fn persist_all(&self, drafts: &[(&Workspace, &Workspace)]) -> Result<(), WorkspaceError> {
        for (done, (draft, _)) in drafts.iter().enumerate() {
            if let Err(e) = self.persistence.save(draft) {
                for (_, original) in &drafts[..done] {
                    if let Err(undo) = self.persistence.save(original) {
                        tracing::warn!(
                            workspace_id = %original.id,
                            "could not restore persisted record: {}",
                            undo
                        );
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Open a workspace on `project` and make it active.
    pub fn create(&self, project: &Project) -> Result<Uuid, WorkspaceError> {
        let id = Uuid::new_v4();
        let record = Workspace::for_project(id, project, self.clock.now());
        let repo = (self.repo_factory)(id, &project.root);

        let mut state = self.write_state()?;
        self.persistence.save(&record)?;
        self.persistence.save_active(Some(id))?;
        state.slots.insert(id, SlotCell::new(record, repo));
        state.active = Some(id);

        tracing::info!(workspace_id = %id, "workspace created for project {}", project.name);
        Ok(id)
    }

    /// Make `id` the active workspace.
    ///
    /// Never flushes or refuses on unsaved edits; the outgoing workspace's
    /// unsaved paths are returned so the caller can prompt.
    pub fn switch(&self, id: Uuid) -> Result<SwitchOutcome, WorkspaceError> {
        loop {
            let (incoming, previous, outgoing) = {
                let state = self.read_state()?;
                let incoming = state
                    .slots
                    .get(&id)
                    .cloned()
                    .ok_or(WorkspaceError::NotFound(id))?;
                let outgoing = state
                    .active
                    .and_then(|p| state.slots.get(&p).cloned().map(|c| (p, c)));
                (incoming, state.active, outgoing)
            };
            if previous == Some(id) {
                return Ok(SwitchOutcome {
                    previous,
                    previous_unsaved: Vec::new(),
                    changed: false,
                });
            }

            let mut cells = vec![(id, incoming)];
            cells.extend(outgoing);
            cells.sort_by_key(|(cell_id, _)| *cell_id);
            let mut locked = Vec::with_capacity(cells.len());
            for (cell_id, cell) in &cells {
                match cell.lock(*cell_id) {
                    Ok(guard) => locked.push((cell, guard)),
                    // Outgoing workspace closed meanwhile; nothing to stamp.
                    Err(WorkspaceError::NotFound(closed)) if closed != id => {}
                    Err(e) => return Err(e),
                }
            }
            // Another switch won the race; start over from the new active id.
            if self.read_state()?.active != previous {
                continue;
            }

            let drafts: Vec<Workspace> = locked
                .iter()
                .map(|(_, guard)| {
                    let mut draft = guard.record.clone();
                    draft.last_active_at = self.clock.now();
                    draft
                })
                .collect();
            let pairs: Vec<(&Workspace, &Workspace)> = drafts
                .iter()
                .zip(locked.iter().map(|(_, guard)| &guard.record))
                .collect();
            self.persist_all(&pairs)?;

            {
                let mut state = self.write_state()?;
                if let Err(e) = self.persistence.save_active(Some(id)) {
                    drop(state);
                    let originals: Vec<(&Workspace, &Workspace)> = locked
                        .iter()
                        .map(|(_, guard)| (&guard.record, &guard.record))
                        .collect();
                    if let Err(undo) = self.persist_all(&originals) {
                        tracing::warn!(
                            workspace_id = %id,
                            "could not restore persisted records: {}",
                            undo
                        );
                    }
                    return Err(e);
                }
                state.active = Some(id);
            }

            let mut previous_unsaved = Vec::new();
            for ((cell, guard), draft) in locked.iter_mut().zip(drafts) {
                if Some(draft.id) == previous {
                    previous_unsaved = draft.unsaved_paths.iter().cloned().collect();
                }
                cell.publish(guard, draft);
            }

            if !previous_unsaved.is_empty() {
                tracing::warn!(
                    "switched away from workspace with {} unsaved path(s)",
                    previous_unsaved.len()
                );
            }
            tracing::info!(workspace_id = %id, "workspace activated");
            return Ok(SwitchOutcome {
                previous,
                previous_unsaved,
                changed: true,
            });
        }
    }

    /// Remove a workspace. If it was active, the remaining workspace with the
    /// greatest `last_active_at` becomes active (or none, if none remain).
    pub fn close(&self, id: Uuid, mode: CloseMode) -> Result<Workspace, WorkspaceError> {
        let cell = self.slot(id)?;
        let mut guard = cell.lock(id)?;
        if mode == CloseMode::KeepUnsaved && guard.record.has_unsaved_changes() {
            return Err(WorkspaceError::UnsavedChanges {
                workspace_id: id,
                paths: guard.record.unsaved_paths.iter().cloned().collect(),
            });
        }
        self.persistence.remove(id)?;
        guard.closed = true;
        let record = guard.record.clone();

        let mut state = self.write_state()?;
        state.slots.remove(&id);
        if state.active == Some(id) {
            state.active = state.most_recently_active();
            self.persistence.save_active(state.active)?;
        }

        tracing::info!(workspace_id = %id, "workspace closed, active now {:?}", state.active);
        Ok(record)
    }

    /// Merge a partial update; always stamps `last_active_at`.
    pub fn update_data(&self, id: Uuid, patch: WorkspacePatch) -> Result<Workspace, WorkspaceError> {
        self.with_workspace(id, |ws, _| ws.apply(patch))?;
        self.get(id)
    }

    /// Run `f` on a draft of one workspace under its lock.
    ///
    /// On success the draft is stamped, persisted and stored; on error the
    /// stored record is left as it was.
    pub fn with_workspace<R, E>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Workspace, &Repo) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<WorkspaceError>,
    {
        let cell = self.slot(id)?;
        let mut guard = cell.lock(id)?;
        let mut draft = guard.record.clone();
        let result = f(&mut draft, &guard.repo)?;
        draft.last_active_at = self.clock.now();
        self.persistence.save(&draft)?;
        cell.publish(&mut guard, draft);
        Ok(result)
    }

    /// Run `f` over drafts of several workspaces, all locked for the duration.
    ///
    /// Either every draft is committed, in memory and on disk, or none is.
    pub fn with_workspaces<R, E>(
        &self,
        ids: &[Uuid],
        f: impl FnOnce(&mut BTreeMap<Uuid, WorkspaceDraft>) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<WorkspaceError>,
    {
        let mut ordered: Vec<Uuid> = ids.to_vec();
        ordered.sort();
        ordered.dedup();

        let cells = ordered
            .iter()
            .map(|id| self.slot(*id))
            .collect::<Result<Vec<_>, _>>()?;
        let mut guards = cells
            .iter()
            .zip(&ordered)
            .map(|(cell, id)| cell.lock(*id))
            .collect::<Result<Vec<_>, _>>()?;

        let mut drafts: BTreeMap<Uuid, WorkspaceDraft> = guards
            .iter()
            .map(|g| {
                (
                    g.record.id,
                    WorkspaceDraft {
                        record: g.record.clone(),
                        repo: g.repo.clone(),
                    },
                )
            })
            .collect();
        let result = f(&mut drafts)?;

        let now = self.clock.now();
        for draft in drafts.values_mut() {
            draft.record.last_active_at = now;
        }
        let pairs = guards
            .iter()
            .map(|g| {
                drafts
                    .get(&g.record.id)
                    .map(|d| (&d.record, &g.record))
                    .ok_or(WorkspaceError::NotFound(g.record.id))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.persist_all(&pairs)?;

        for (cell, guard) in cells.iter().zip(guards.iter_mut()) {
            if let Some(draft) = drafts.remove(&guard.record.id) {
                cell.publish(guard, draft.record);
            }
        }
        Ok(result)
    }

    pub fn get(&self, id: Uuid) -> Result<Workspace, WorkspaceError> {
        let cell = self.slot(id)?;
        let guard = cell.lock(id)?;
        Ok(guard.record.clone())
    }

    /// Repository handle of a workspace.
    pub fn repo(&self, id: Uuid) -> Result<Repo, WorkspaceError> {
        let cell = self.slot(id)?;
        let guard = cell.lock(id)?;
        Ok(guard.repo.clone())
    }

    /// All workspaces, oldest first.
    pub fn list(&self) -> Result<Vec<Workspace>, WorkspaceError> {
        let cells: Vec<(Uuid, Arc<SlotCell>)> = self
            .read_state()?
            .slots
            .iter()
            .map(|(id, cell)| (*id, cell.clone()))
            .collect();

        let mut records = Vec::with_capacity(cells.len());
        for (id, cell) in cells {
            match cell.lock(id) {
                Ok(guard) => records.push(guard.record.clone()),
                // Closed after the map was read.
                Err(WorkspaceError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        records.sort_by_key(|w| w.created_at);
        Ok(records)
    }

    pub fn active(&self) -> Result<Option<Uuid>, WorkspaceError> {
        Ok(self.read_state()?.active)
    }

    pub fn active_workspace(&self) -> Result<Option<Workspace>, WorkspaceError> {
        match self.active()? {
            Some(id) => self.get(id).map(Some),
            None => Ok(None),
        }
    }

    /// Open (or focus) a buffer.
    pub fn open_buffer(&self, id: Uuid, path: &str) -> Result<(), WorkspaceError> {
        self.with_workspace(id, |ws, _| {
            if !ws.open_buffers.iter().any(|b| b == path) {
                ws.open_buffers.push(path.to_string());
            }
            ws.active_buffer = Some(path.to_string());
            Ok(())
        })
    }

    /// Close a buffer. Refuses while it has unsaved edits unless discarding.
    pub fn close_buffer(&self, id: Uuid, path: &str, mode: CloseMode) -> Result<(), WorkspaceError> {
        self.with_workspace(id, |ws, _| {
            if ws.unsaved_paths.contains(path) {
                if mode == CloseMode::KeepUnsaved {
                    return Err(WorkspaceError::UnsavedChanges {
                        workspace_id: id,
                        paths: vec![path.to_string()],
                    });
                }
                ws.unsaved_paths.remove(path);
            }
            ws.open_buffers.retain(|b| b != path);
            if ws.active_buffer.as_deref() == Some(path) {
                ws.active_buffer = ws.open_buffers.last().cloned();
            }
            Ok(())
        })
    }

    /// Record that a buffer has in-memory edits.
    pub fn mark_unsaved(&self, id: Uuid, path: &str) -> Result<(), WorkspaceError> {
        self.with_workspace(id, |ws, _| {
            ws.unsaved_paths.insert(path.to_string());
            Ok(())
        })
    }

    /// Record that a buffer's content is now durable in storage.
    pub fn mark_saved(&self, id: Uuid, path: &str) -> Result<(), WorkspaceError> {
        self.with_workspace(id, |ws, _| {
            ws.unsaved_paths.remove(path);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{JsonFilePersistence, MemoryPersistence};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use wb_vcs::VcsConfig;

    /// Memory persistence whose `save` fails for one workspace id.
    struct FailingPersistence {
        inner: MemoryPersistence,
        fail_on: Mutex<Option<Uuid>>,
    }

    impl FailingPersistence {
        fn new() -> Self {
            Self {
                inner: MemoryPersistence::new(),
                fail_on: Mutex::new(None),
            }
        }

        fn fail_saves_of(&self, id: Uuid) {
            *self.fail_on.lock().unwrap() = Some(id);
        }

        fn saved(&self, id: Uuid) -> Workspace {
            self.inner
                .load_all()
                .unwrap()
                .into_iter()
                .find(|w| w.id == id)
                .unwrap()
        }
    }

    impl WorkspacePersistence for FailingPersistence {
        fn save(&self, workspace: &Workspace) -> Result<(), WorkspaceError> {
            if *self.fail_on.lock().unwrap() == Some(workspace.id) {
                return Err(WorkspaceError::IoError {
                    path: format!("{}.json", workspace.id).into(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                });
            }
            self.inner.save(workspace)
        }

        fn remove(&self, id: Uuid) -> Result<(), WorkspaceError> {
            self.inner.remove(id)
        }

        fn load_all(&self) -> Result<Vec<Workspace>, WorkspaceError> {
            self.inner.load_all()
        }

        fn save_active(&self, active: Option<Uuid>) -> Result<(), WorkspaceError> {
            self.inner.save_active(active)
        }

        fn load_active(&self) -> Result<Option<Uuid>, WorkspaceError> {
            self.inner.load_active()
        }
    }

    fn store() -> WorkspaceStore {
        WorkspaceStore::new(Arc::new(MemoryPersistence::new()), local_factory())
    }

    fn local_factory() -> RepoFactory {
        Arc::new(|id, root| Repo::local(id, root, &VcsConfig::default()))
    }

    fn project(name: &str) -> Project {
        Project::new(name, format!("/tmp/{}", name), "main")
    }

    #[test]
    fn create_makes_workspace_active() {
        let store = store();
        let a = store.create(&project("a")).unwrap();
        assert_eq!(store.active().unwrap(), Some(a));
        let b = store.create(&project("b")).unwrap();
        assert_eq!(store.active().unwrap(), Some(b));
        assert_eq!(store.get(a).unwrap().vcs_snapshot.branch, "main");
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn switching_to_active_workspace_is_a_no_op() {
        let store = store();
        let a = store.create(&project("a")).unwrap();
        let before = store.get(a).unwrap();

        let outcome = store.switch(a).unwrap();
        assert!(!outcome.changed);
        assert_eq!(store.get(a).unwrap(), before);
    }

    #[test]
    fn switching_away_touches_only_last_active_at() {
        let store = store();
        let a = store.create(&project("a")).unwrap();
        store.open_buffer(a, "src/main.rs").unwrap();
        store.mark_unsaved(a, "src/main.rs").unwrap();
        let b = store.create(&project("b")).unwrap();

        store.switch(a).unwrap();
        let b_before = store.get(b).unwrap();
        let a_before = store.get(a).unwrap();

        let outcome = store.switch(b).unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.previous, Some(a));
        assert_eq!(outcome.previous_unsaved, vec!["src/main.rs"]);

        let a_after = store.get(a).unwrap();
        assert!(a_after.last_active_at > a_before.last_active_at);
        assert_eq!(
            Workspace {
                last_active_at: a_before.last_active_at,
                ..a_after
            },
            a_before
        );
        assert!(store.get(b).unwrap().last_active_at > b_before.last_active_at);
    }

    #[test]
    fn closing_active_promotes_most_recently_active() {
        let store = store();
        let a = store.create(&project("a")).unwrap();
        let b = store.create(&project("b")).unwrap();
        let c = store.create(&project("c")).unwrap();
        store.switch(a).unwrap();
        store.switch(c).unwrap();

        store.close(c, CloseMode::KeepUnsaved).unwrap();
        assert_eq!(store.active().unwrap(), Some(a));

        store.close(a, CloseMode::KeepUnsaved).unwrap();
        assert_eq!(store.active().unwrap(), Some(b));

        store.close(b, CloseMode::KeepUnsaved).unwrap();
        assert_eq!(store.active().unwrap(), None);
        assert!(matches!(store.get(b), Err(WorkspaceError::NotFound(_))));
    }

    #[test]
    fn closing_inactive_keeps_active() {
        let store = store();
        let a = store.create(&project("a")).unwrap();
        let b = store.create(&project("b")).unwrap();
        store.close(a, CloseMode::KeepUnsaved).unwrap();
        assert_eq!(store.active().unwrap(), Some(b));
    }

    #[test]
    fn close_refuses_unsaved_unless_discarding() {
        let store = store();
        let a = store.create(&project("a")).unwrap();
        store.mark_unsaved(a, "notes.md").unwrap();

        let err = store.close(a, CloseMode::KeepUnsaved).unwrap_err();
        assert!(matches!(err, WorkspaceError::UnsavedChanges { ref paths, .. } if paths == &["notes.md"]));
        assert!(store.get(a).is_ok());

        let closed = store.close(a, CloseMode::Discard).unwrap();
        assert_eq!(closed.id, a);
    }

    #[test]
    fn update_data_validates_and_stamps() {
        let store = store();
        let a = store.create(&project("a")).unwrap();
        let before = store.get(a).unwrap();

        let updated = store
            .update_data(
                a,
                WorkspacePatch {
                    open_buffers: Some(vec!["x".into(), "y".into()]),
                    active_buffer: Some(Some("y".into())),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.open_buffers, vec!["x", "y"]);
        assert!(updated.last_active_at > before.last_active_at);

        let err = store
            .update_data(
                a,
                WorkspacePatch {
                    active_buffer: Some(Some("nope".into())),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidUpdate(_)));
        assert_eq!(store.get(a).unwrap(), updated);
    }

    #[test]
    fn failed_closure_leaves_record_untouched() {
        let store = store();
        let a = store.create(&project("a")).unwrap();
        let before = store.get(a).unwrap();

        let result: Result<(), WorkspaceError> = store.with_workspace(a, |ws, _| {
            ws.unsaved_paths.insert("half-done".into());
            Err(WorkspaceError::InvalidUpdate("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.get(a).unwrap(), before);
    }

    #[test]
    fn buffers_open_close_and_refocus() {
        let store = store();
        let a = store.create(&project("a")).unwrap();
        store.open_buffer(a, "one").unwrap();
        store.open_buffer(a, "two").unwrap();
        store.open_buffer(a, "one").unwrap();
        assert_eq!(store.get(a).unwrap().open_buffers, vec!["one", "two"]);

        store.mark_unsaved(a, "one").unwrap();
        assert!(store.close_buffer(a, "one", CloseMode::KeepUnsaved).is_err());
        store.mark_saved(a, "one").unwrap();
        store.close_buffer(a, "one", CloseMode::KeepUnsaved).unwrap();

        let ws = store.get(a).unwrap();
        assert_eq!(ws.open_buffers, vec!["two"]);
        assert_eq!(ws.active_buffer.as_deref(), Some("two"));
    }

    #[test]
    fn restore_rebuilds_from_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let persistence: Arc<dyn WorkspacePersistence> =
            Arc::new(JsonFilePersistence::new(dir.path()).unwrap());

        let (a, b) = {
            let store = WorkspaceStore::new(persistence.clone(), local_factory());
            let a = store.create(&project("a")).unwrap();
            let b = store.create(&project("b")).unwrap();
            store.switch(a).unwrap();
            store.open_buffer(a, "lib.rs").unwrap();
            (a, b)
        };

        let restored = WorkspaceStore::restore(persistence, local_factory()).unwrap();
        assert_eq!(restored.active().unwrap(), Some(a));
        assert_eq!(restored.get(a).unwrap().open_buffers, vec!["lib.rs"]);
        assert_eq!(restored.repo(b).unwrap().workspace_id, b);

        // The clock continues after restored stamps.
        let before = restored.get(a).unwrap().last_active_at;
        restored.mark_unsaved(a, "lib.rs").unwrap();
        assert!(restored.get(a).unwrap().last_active_at > before);
    }

    #[test]
    fn workspaces_mutate_concurrently() {
        let store = Arc::new(store());
        let ids: Vec<Uuid> = (0..4)
            .map(|i| store.create(&project(&format!("p{}", i))).unwrap())
            .collect();

        let handles: Vec<_> = ids
            .iter()
            .map(|&id| {
                let store = store.clone();
                thread::spawn(move || {
                    for n in 0..25 {
                        store.open_buffer(id, &format!("file{}.rs", n)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for id in ids {
            assert_eq!(store.get(id).unwrap().open_buffers.len(), 25);
        }
    }

    #[test]
    fn batch_drafts_commit_together() {
        let store = store();
        let a = store.create(&project("a")).unwrap();
        let b = store.create(&project("b")).unwrap();

        let result: Result<(), WorkspaceError> = store.with_workspaces(&[b, a, b], |drafts| {
            assert_eq!(drafts.len(), 2);
            for draft in drafts.values_mut() {
                draft.record.unsaved_paths.insert("shared.txt".into());
            }
            Ok(())
        });
        result.unwrap();
        assert!(store.get(a).unwrap().has_unsaved_changes());
        assert!(store.get(b).unwrap().has_unsaved_changes());
    }

    #[test]
    fn failed_switch_save_changes_nothing() {
        let persistence = Arc::new(FailingPersistence::new());
        let store = WorkspaceStore::new(persistence.clone(), local_factory());
        let a = store.create(&project("a")).unwrap();
        let b = store.create(&project("b")).unwrap();
        store.switch(a).unwrap();
        let a_before = store.get(a).unwrap();
        let b_before = store.get(b).unwrap();

        // Whichever of the pair saves second fails, so the first is rolled back.
        persistence.fail_saves_of(a.max(b));
        assert!(matches!(store.switch(b), Err(WorkspaceError::IoError { .. })));

        assert_eq!(store.active().unwrap(), Some(a));
        assert_eq!(store.get(a).unwrap(), a_before);
        assert_eq!(store.get(b).unwrap(), b_before);
        assert_eq!(persistence.saved(a), a_before);
        assert_eq!(persistence.saved(b), b_before);
        assert_eq!(persistence.load_active().unwrap(), Some(a));
    }

    #[test]
    fn failed_batch_save_changes_nothing() {
        let persistence = Arc::new(FailingPersistence::new());
        let store = WorkspaceStore::new(persistence.clone(), local_factory());
        let a = store.create(&project("a")).unwrap();
        let b = store.create(&project("b")).unwrap();
        let (first, second) = (a.min(b), a.max(b));
        let first_before = store.get(first).unwrap();
        let second_before = store.get(second).unwrap();

        persistence.fail_saves_of(second);
        let result: Result<(), WorkspaceError> = store.with_workspaces(&[a, b], |drafts| {
            for draft in drafts.values_mut() {
                draft.record.unsaved_paths.insert("shared.txt".into());
            }
            Ok(())
        });
        assert!(matches!(result, Err(WorkspaceError::IoError { .. })));

        assert_eq!(store.get(first).unwrap(), first_before);
        assert_eq!(store.get(second).unwrap(), second_before);
        assert_eq!(persistence.saved(first), first_before);
        assert_eq!(persistence.saved(second), second_before);
    }

    #[test]
    fn busy_workspace_does_not_block_others() {
        let store = Arc::new(store());
        let a = store.create(&project("a")).unwrap();
        let b = store.create(&project("b")).unwrap();
        let c = store.create(&project("c")).unwrap();
        store.switch(a).unwrap();

        // Hold b's lock until told to let go.
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let holder = {
            let store = store.clone();
            thread::spawn(move || {
                store
                    .with_workspace(b, |_, _| {
                        entered_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Ok::<_, WorkspaceError>(())
                    })
                    .unwrap();
            })
        };
        entered_rx.recv().unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        {
            let store = store.clone();
            thread::spawn(move || {
                store.close(a, CloseMode::KeepUnsaved).unwrap();
                store.open_buffer(c, "lib.rs").unwrap();
                let active = store.active().unwrap();
                done_tx.send(active).unwrap();
            });
        }
        let active = done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("close and open_buffer waited on an unrelated workspace");
        assert_eq!(active, Some(c));

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert_eq!(store.get(c).unwrap().open_buffers, vec!["lib.rs"]);
        assert_eq!(store.list().unwrap().len(), 2);
    }
}
