//! # wb-diff
//!
//! Pure diff engine for workbench.
//!
//! Given two text blobs (or a raw unified listing produced by the VCS engine),
//! builds a structured line-level model where paired removals and additions
//! carry character-level highlights. Nothing in this crate performs I/O or
//! holds state, so every function is safe to call from any thread.
//!
//! ## Key components
//!
//! - [`compute_diff`] — the line diff with paired intra-line changes.
//! - [`DiffLine`] — one rendered line (context, add, or remove).
//! - [`parse_patch`] — converts `git diff` style listings into [`FileDiff`]s.
//! - [`render_unified`] — hunked unified text for terminal display.
//! - [`merge3`] — line-level three-way merge used for branch merges and
//!   stash replay.

pub mod engine;
pub mod error;
pub mod line;
pub mod merge;
pub mod patch;
pub mod render;

pub use engine::{compute_diff, compute_diff_bytes, reconstruct_after, reconstruct_before};
pub use error::DiffError;
pub use line::{DiffLine, DiffStats, IntraLineChange, LineKind, SegmentKind};
pub use merge::{has_conflict_markers, merge3, MergeLabels, MergeText};
pub use patch::{diff_from_patch, parse_patch, FileDiff};
pub use render::render_unified;
