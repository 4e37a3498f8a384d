// line.rs — The structured line model produced by the diff engine.
//
// A DiffLine is immutable once built. Whenever the before/after content of a
// change is edited, the whole line list is regenerated rather than patched.

use serde::{Deserialize, Serialize};

/// Whether a line is shared by both sides, added, or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    /// Present unchanged on both sides.
    Context,
    /// Present only in the new content.
    Add,
    /// Present only in the old content.
    Remove,
}

/// Classification of a character run inside a changed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Equal,
    Insert,
    Delete,
}

/// A run of characters within a paired line, tagged by how it changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntraLineChange {
    pub text: String,
    pub kind: SegmentKind,
}

/// One line of a structured diff.
///
/// Line numbers are 1-based. Removed lines carry only `old_line_number`,
/// added lines only `new_line_number`, context lines both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    #[serde(rename = "type")]
    pub kind: LineKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_line_number: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_line_number: Option<usize>,

    /// Line text without its `\n` terminator.
    pub content: String,

    /// Character-level highlights, present only on paired remove/add lines.
    /// A removed line holds `equal`/`delete` runs, an added line holds
    /// `equal`/`insert` runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intra_line_changes: Option<Vec<IntraLineChange>>,

    /// Set on the final line of a side that does not end with `\n`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_newline_at_eof: bool,
}

impl DiffLine {
    pub fn context(old: usize, new: usize, content: impl Into<String>) -> Self {
        Self::plain(LineKind::Context, Some(old), Some(new), content)
    }

    pub fn add(new: usize, content: impl Into<String>) -> Self {
        Self::plain(LineKind::Add, None, Some(new), content)
    }

    pub fn remove(old: usize, content: impl Into<String>) -> Self {
        Self::plain(LineKind::Remove, Some(old), None, content)
    }

    fn plain(
        kind: LineKind,
        old_line_number: Option<usize>,
        new_line_number: Option<usize>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            old_line_number,
            new_line_number,
            content: content.into(),
            intra_line_changes: None,
            no_newline_at_eof: false,
        }
    }

    /// Mark this line as lacking a trailing newline (builder style).
    pub fn without_newline(mut self) -> Self {
        self.no_newline_at_eof = true;
        self
    }

    pub fn is_change(&self) -> bool {
        self.kind != LineKind::Context
    }
}

/// Added/removed line counts for a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub added: usize,
    pub removed: usize,
}

impl DiffStats {
    pub fn of(lines: &[DiffLine]) -> Self {
        let mut stats = Self::default();
        for line in lines {
            match line.kind {
                LineKind::Add => stats.added += 1,
                LineKind::Remove => stats.removed += 1,
                LineKind::Context => {}
            }
        }
        stats
    }

    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_line_serializes_kind_as_type() {
        let line = DiffLine::add(3, "hello");
        let json = serde_json::to_string(&line).unwrap();
        assert!(json.contains("\"type\":\"add\""));
        assert!(json.contains("\"new_line_number\":3"));
        assert!(!json.contains("old_line_number"));
        assert!(!json.contains("no_newline_at_eof"));
    }

    #[test]
    fn stats_count_adds_and_removes() {
        let lines = vec![
            DiffLine::context(1, 1, "a"),
            DiffLine::remove(2, "b"),
            DiffLine::add(2, "c"),
            DiffLine::add(3, "d"),
        ];
        let stats = DiffStats::of(&lines);
        assert_eq!(stats, DiffStats { added: 2, removed: 1 });
        assert!(!stats.is_empty());
    }
}
