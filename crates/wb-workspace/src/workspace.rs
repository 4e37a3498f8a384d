// workspace.rs — Workspace and Project records.
//
// A Workspace is one open project session: its buffers, its unsaved edits,
// and the last VCS snapshot taken of its checkout. Records are plain data;
// the WorkspaceStore owns them and serializes all mutation.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wb_vcs::VcsSnapshot;

use crate::error::WorkspaceError;

/// The project a workspace is opened on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    /// Root of the project's checkout.
    pub root: PathBuf,
    /// Branch recorded for the project, used to seed new workspaces.
    pub default_branch: String,
}

impl Project {
    pub fn new(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        default_branch: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            root: root.into(),
            default_branch: default_branch.into(),
        }
    }
}

/// One open project session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub project_id: Uuid,
    pub project_name: String,
    pub root: PathBuf,

    /// Open file paths in tab order, unique.
    #[serde(default)]
    pub open_buffers: Vec<String>,

    /// Focused buffer; always a member of `open_buffers` when set.
    #[serde(default)]
    pub active_buffer: Option<String>,

    /// Paths with in-memory edits not yet written to storage.
    #[serde(default)]
    pub unsaved_paths: BTreeSet<String>,

    #[serde(default)]
    pub vcs_snapshot: VcsSnapshot,

    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Workspace {
    pub(crate) fn for_project(id: Uuid, project: &Project, now: DateTime<Utc>) -> Self {
        Self {
            id,
            project_id: project.id,
            project_name: project.name.clone(),
            root: project.root.clone(),
            open_buffers: Vec::new(),
            active_buffer: None,
            unsaved_paths: BTreeSet::new(),
            vcs_snapshot: VcsSnapshot::on_branch(&project.default_branch),
            created_at: now,
            last_active_at: now,
        }
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.unsaved_paths.is_empty()
    }

    /// Merge a partial update into this record.
    ///
    /// Validates the resulting buffer invariants before changing anything, so
    /// a rejected patch leaves the record untouched. Does not stamp
    /// `last_active_at`; the store does that.
    pub fn apply(&mut self, patch: WorkspacePatch) -> Result<(), WorkspaceError> {
        let open_buffers = match patch.open_buffers {
            Some(buffers) => dedupe(buffers),
            None => self.open_buffers.clone(),
        };
        let active_buffer = match patch.active_buffer {
            Some(active) => active,
            // Drop a focus that no longer points at an open buffer.
            None => self
                .active_buffer
                .clone()
                .filter(|p| open_buffers.contains(p)),
        };
        if let Some(active) = &active_buffer {
            if !open_buffers.contains(active) {
                return Err(WorkspaceError::InvalidUpdate(format!(
                    "active buffer '{}' is not an open buffer",
                    active
                )));
            }
        }

        self.open_buffers = open_buffers;
        self.active_buffer = active_buffer;
        if let Some(unsaved) = patch.unsaved_paths {
            self.unsaved_paths = unsaved;
        }
        if let Some(snapshot) = patch.vcs_snapshot {
            self.vcs_snapshot = snapshot;
        }
        Ok(())
    }
}

/// Partial update for `WorkspaceStore::update_data`. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct WorkspacePatch {
    pub open_buffers: Option<Vec<String>>,
    /// `Some(None)` clears the focus.
    pub active_buffer: Option<Option<String>>,
    pub unsaved_paths: Option<BTreeSet<String>>,
    pub vcs_snapshot: Option<VcsSnapshot>,
}

/// What to do with unsaved edits when closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// Refuse if anything is unsaved.
    KeepUnsaved,
    /// Close anyway, dropping unsaved edits.
    Discard,
}

/// Result of switching the active workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchOutcome {
    /// The workspace that was active before, if any.
    pub previous: Option<Uuid>,
    /// Unsaved paths left behind in `previous`, for the caller to warn about.
    pub previous_unsaved: Vec<String>,
    /// False when the target was already active.
    pub changed: bool,
}

fn dedupe(buffers: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    buffers
        .into_iter()
        .filter(|b| seen.insert(b.clone()))
        .collect()
}
