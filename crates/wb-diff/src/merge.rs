// merge.rs — Line-based three-way merge with conflict markers.
//
// Each side is diffed against the base. Changed regions from both sides are
// collected, sorted by base position, and grouped whenever they overlap or
// touch. A group changed by one side only takes that side's text. A group
// changed by both sides is clean only when both produce the same text;
// otherwise it becomes a marked conflict.

use similar::{capture_diff_slices, Algorithm, DiffTag};

/// Labels written after the `<<<<<<<` and `>>>>>>>` conflict markers.
#[derive(Debug, Clone, Copy)]
pub struct MergeLabels<'a> {
    pub ours: &'a str,
    pub theirs: &'a str,
}

impl Default for MergeLabels<'_> {
    fn default() -> Self {
        Self {
            ours: "ours",
            theirs: "theirs",
        }
    }
}

/// Result of a three-way text merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeText {
    Clean(String),
    Conflicted { text: String, conflicts: usize },
}

impl MergeText {
    pub fn text(&self) -> &str {
        match self {
            MergeText::Clean(text) => text,
            MergeText::Conflicted { text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            MergeText::Clean(text) => text,
            MergeText::Conflicted { text, .. } => text,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, MergeText::Clean(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Ours,
    Theirs,
}

/// A replaced base range `[start, end)` and the lines one side put there.
#[derive(Debug)]
struct Hunk<'t> {
    side: Side,
    start: usize,
    end: usize,
    lines: Vec<&'t str>,
}

/// Merge `ours` and `theirs`, both derived from `base`.
pub fn merge3(base: &str, ours: &str, theirs: &str, labels: MergeLabels<'_>) -> MergeText {
    let base_lines: Vec<&str> = base.split_inclusive('\n').collect();
    let ours_lines: Vec<&str> = ours.split_inclusive('\n').collect();
    let theirs_lines: Vec<&str> = theirs.split_inclusive('\n').collect();

    let mut hunks = side_hunks(Side::Ours, &base_lines, &ours_lines);
    hunks.extend(side_hunks(Side::Theirs, &base_lines, &theirs_lines));
    hunks.sort_by_key(|h| (h.start, h.end));

    let mut out = String::new();
    let mut conflicts = 0;
    let mut cursor = 0;
    let mut idx = 0;

    while idx < hunks.len() {
        let group_start = hunks[idx].start;
        let mut group_end = hunks[idx].end;
        let mut next = idx + 1;
        while next < hunks.len() && hunks[next].start <= group_end {
            group_end = group_end.max(hunks[next].end);
            next += 1;
        }
        let group = &hunks[idx..next];
        idx = next;

        for line in &base_lines[cursor..group_start] {
            out.push_str(line);
        }
        cursor = group_end;

        let touched_by = |side: Side| group.iter().any(|h| h.side == side);
        let ours_text = apply_side(&base_lines, group_start, group_end, group, Side::Ours);
        let theirs_text = apply_side(&base_lines, group_start, group_end, group, Side::Theirs);

        match (touched_by(Side::Ours), touched_by(Side::Theirs)) {
            (true, false) => out.push_str(&ours_text),
            (false, true) => out.push_str(&theirs_text),
            _ if ours_text == theirs_text => out.push_str(&ours_text),
            _ => {
                conflicts += 1;
                out.push_str(&format!("<<<<<<< {}\n", labels.ours));
                push_block(&mut out, &ours_text);
                out.push_str("=======\n");
                push_block(&mut out, &theirs_text);
                out.push_str(&format!(">>>>>>> {}\n", labels.theirs));
            }
        }
    }

    for line in &base_lines[cursor..] {
        out.push_str(line);
    }

    if conflicts == 0 {
        MergeText::Clean(out)
    } else {
        MergeText::Conflicted {
            text: out,
            conflicts,
        }
    }
}

/// True if any line opens or closes a conflict block.
pub fn has_conflict_markers(text: &str) -> bool {
    text.lines()
        .any(|line| line.starts_with("<<<<<<< ") || line.starts_with(">>>>>>> "))
}

/// Changed base regions for one side, with consecutive edits coalesced.
fn side_hunks<'t>(side: Side, base: &[&str], changed: &[&'t str]) -> Vec<Hunk<'t>> {
    let mut hunks = Vec::new();
    let mut open: Option<Hunk<'t>> = None;

    for op in capture_diff_slices(Algorithm::Lcs, base, changed) {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            hunks.extend(open.take());
            continue;
        }
        let hunk = open.get_or_insert_with(|| Hunk {
            side,
            start: old_range.start,
            end: old_range.start,
            lines: Vec::new(),
        });
        hunk.end = hunk.end.max(old_range.end);
        hunk.lines.extend_from_slice(&changed[new_range]);
    }
    hunks.extend(open);
    hunks
}

/// The text one side produces for base lines `[start, end)`.
fn apply_side(base: &[&str], start: usize, end: usize, group: &[Hunk<'_>], side: Side) -> String {
    let mut text = String::new();
    let mut cursor = start;
    for hunk in group.iter().filter(|h| h.side == side) {
        for line in &base[cursor..hunk.start] {
            text.push_str(line);
        }
        for line in &hunk.lines {
            text.push_str(line);
        }
        cursor = hunk.end;
    }
    for line in &base[cursor..end] {
        text.push_str(line);
    }
    text
}

fn push_block(out: &mut String, block: &str) {
    out.push_str(block);
    if !block.is_empty() && !block.ends_with('\n') {
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> MergeLabels<'static> {
        MergeLabels {
            ours: "ours",
            theirs: "feature",
        }
    }

    #[test]
    fn disjoint_edits_merge_cleanly() {
        let base = "a\nb\nc\nd\ne\n";
        let ours = "a\nB\nc\nd\ne\n";
        let theirs = "a\nb\nc\nD\ne\n";
        assert_eq!(
            merge3(base, ours, theirs, labels()),
            MergeText::Clean("a\nB\nc\nD\ne\n".into())
        );
    }

    #[test]
    fn identical_edits_apply_once() {
        let merged = merge3("a\nb\nc\n", "a\nB\nc\n", "a\nB\nc\n", labels());
        assert_eq!(merged, MergeText::Clean("a\nB\nc\n".into()));
    }

    #[test]
    fn competing_edits_produce_markers() {
        let merged = merge3("keep\nx\n", "keep\ny\n", "keep\nz\n", labels());
        assert_eq!(
            merged,
            MergeText::Conflicted {
                text: "keep\n<<<<<<< ours\ny\n=======\nz\n>>>>>>> feature\n".into(),
                conflicts: 1,
            }
        );
        assert!(has_conflict_markers(merged.text()));
    }

    #[test]
    fn insertions_at_the_same_point_conflict() {
        let merged = merge3("a\n", "a\nb\n", "a\nc\n", labels());
        assert!(!merged.is_clean());
        assert!(merged.text().contains("<<<<<<< ours\nb\n=======\nc\n>>>>>>> feature\n"));
    }

    #[test]
    fn one_sided_deletion_is_clean() {
        let merged = merge3("a\nb\n", "a\nb\n", "", labels());
        assert_eq!(merged, MergeText::Clean(String::new()));
    }

    #[test]
    fn conflict_blocks_end_with_newline() {
        let merged = merge3("x", "y", "z", labels());
        assert_eq!(
            merged.text(),
            "<<<<<<< ours\ny\n=======\nz\n>>>>>>> feature\n"
        );
    }

    #[test]
    fn empty_base_with_one_new_side() {
        let merged = merge3("", "fresh\n", "", labels());
        assert_eq!(merged, MergeText::Clean("fresh\n".into()));
    }

    #[test]
    fn marker_detection_ignores_plain_text() {
        assert!(!has_conflict_markers("a < b\n=======\n"));
        assert!(has_conflict_markers("x\n>>>>>>> theirs\n"));
    }
}
