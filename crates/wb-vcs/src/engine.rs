// engine.rs — The VcsEngine seam: primitive operations of the underlying VCS.
//
// The orchestrator only ever talks to this trait. Stash, merge and snapshot
// recompute are composed from these primitives.

use crate::error::VcsError;
use crate::types::{CommitSummary, StatusEntry, TreeSnapshot};

/// Primitive version-control operations for one repository.
///
/// All calls are blocking and must be issued off any UI thread.
pub trait VcsEngine: Send + Sync {
    /// Name of the checked-out branch (`"HEAD"` when detached).
    fn current_branch(&self) -> Result<String, VcsError>;

    /// Resolve a revision to a commit id; `None` if it does not exist.
    fn resolve(&self, rev: &str) -> Result<Option<String>, VcsError>;

    /// Full status matrix, sorted by path, clean paths omitted.
    fn status(&self) -> Result<Vec<StatusEntry>, VcsError>;

    /// Stage a path's working-tree content.
    fn add(&self, path: &str) -> Result<(), VcsError>;

    /// Remove a path from the index, leaving the working tree alone.
    fn remove(&self, path: &str) -> Result<(), VcsError>;

    /// Commit the index on the current branch, returning the new commit id.
    fn commit(&self, message: &str) -> Result<String, VcsError>;

    /// Record `tree` as a commit with the given parents without touching the
    /// index, the working tree, or any ref.
    fn write_commit(
        &self,
        tree: &TreeSnapshot,
        parents: &[String],
        message: &str,
    ) -> Result<String, VcsError>;

    /// Every file of a commit with its content.
    fn read_tree(&self, rev: &str) -> Result<TreeSnapshot, VcsError>;

    /// Point the current branch, index and working tree at `rev`.
    fn reset_hard(&self, rev: &str) -> Result<(), VcsError>;

    fn checkout(&self, branch: &str) -> Result<(), VcsError>;

    /// Create a branch at `start` (or `HEAD`) without checking it out.
    fn create_branch(&self, name: &str, start: Option<&str>) -> Result<(), VcsError>;

    fn list_branches(&self) -> Result<Vec<String>, VcsError>;

    /// Up to `depth` commits reachable from `rev`, newest first.
    fn log(&self, rev: &str, depth: usize) -> Result<Vec<CommitSummary>, VcsError>;

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, VcsError>;

    fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, VcsError>;

    /// Unified diff listing of the working tree against `rev` (or the index
    /// when `rev` is `None`), optionally limited to one path.
    fn diff_listing(&self, rev: Option<&str>, path: Option<&str>) -> Result<String, VcsError>;
}
