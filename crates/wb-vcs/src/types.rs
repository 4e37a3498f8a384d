// types.rs — Value types exchanged between the orchestrator and its callers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Condition of a path relative to one comparison point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Unmodified,
    Modified,
    Added,
    Deleted,
}

/// Tri-state condition of one path.
///
/// - `head_state`: working tree vs `HEAD`
/// - `stage_state`: index vs `HEAD`
/// - `workdir_state`: working tree vs index
///
/// Always derived from the engine, never edited by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub path: String,
    pub head_state: FileState,
    pub workdir_state: FileState,
    pub stage_state: FileState,
}

impl StatusEntry {
    /// True if the index differs from `HEAD` for this path.
    pub fn is_staged(&self) -> bool {
        self.stage_state != FileState::Unmodified
    }

    /// True for a path that exists only in the working tree.
    pub fn is_untracked(&self) -> bool {
        self.head_state == FileState::Added && self.stage_state == FileState::Unmodified
    }
}

/// One entry of the commit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub id: String,
    pub short_id: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    /// First line of the commit message.
    pub subject: String,
}

/// A saved set of working-tree changes.
///
/// `id` is the commit the changes were recorded in. The commit has no ref
/// pointing at it, so dropping the record leaves it unreachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stash {
    pub id: String,
    pub workspace_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
    /// The `HEAD` commit the stash was taken on.
    pub parent_ref: String,
    pub branch: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Fail instead of creating a merge commit when a fast-forward is impossible.
    #[serde(default)]
    pub fast_forward_only: bool,
}

/// A three-way merge stopped on conflicts, awaiting continue or abort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMerge {
    /// `HEAD` before the merge started.
    pub head: String,
    /// Tip of the branch being merged in.
    pub theirs: String,
    pub branch: String,
    pub conflicts: Vec<String>,
    /// Paths the merge created that did not exist at `head`.
    #[serde(default)]
    pub introduced_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub fast_forward: bool,
    pub already_up_to_date: bool,
    /// The commit `HEAD` points at afterwards; unset while conflicted.
    pub result_ref: Option<String>,
    pub conflicts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingMerge>,
}

impl MergeOutcome {
    pub fn is_conflicted(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Version-control view of a workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsSnapshot {
    pub branch: String,
    #[serde(default)]
    pub status: Vec<StatusEntry>,
    #[serde(default)]
    pub commits: Vec<CommitSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_merge: Option<PendingMerge>,
}

impl VcsSnapshot {
    pub fn on_branch(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            ..Self::default()
        }
    }

    pub fn is_dirty(&self) -> bool {
        !self.status.is_empty()
    }

    pub fn is_conflicted(&self) -> bool {
        self.pending_merge.is_some()
    }
}

/// One file of a committed tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeFile {
    /// Octal git mode, e.g. `0o100644`.
    pub mode: u32,
    pub content: Vec<u8>,
}

impl TreeFile {
    pub const REGULAR: u32 = 0o100644;

    pub fn regular(content: impl Into<Vec<u8>>) -> Self {
        Self {
            mode: Self::REGULAR,
            content: content.into(),
        }
    }
}

/// Full file listing of a commit, keyed by repository-relative path.
pub type TreeSnapshot = BTreeMap<String, TreeFile>;
