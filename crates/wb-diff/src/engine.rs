// engine.rs — Line diff with paired intra-line highlighting.
//
// Two passes:
// 1. An LCS line edit script between the two texts.
// 2. Every run of removals immediately followed by a run of additions is
//    paired index-by-index up to min(removed, added). Each pair gets a
//    character-level diff; surplus lines in the longer run stay plain.
//
// The pairing is positional, not similarity-based: a 3-line removal
// followed by a 1-line addition pairs line 1 with the addition and leaves
// lines 2-3 as plain removals.

use similar::{Algorithm, ChangeTag, TextDiff};

use crate::error::DiffError;
use crate::line::{DiffLine, IntraLineChange, LineKind, SegmentKind};

/// Compute the structured diff between two texts.
///
/// Deterministic for identical inputs. Empty strings are valid: empty vs
/// empty yields no lines, empty vs non-empty yields only additions.
pub fn compute_diff(before: &str, after: &str) -> Result<Vec<DiffLine>, DiffError> {
    validate_text("before", before)?;
    validate_text("after", after)?;

    let diff = TextDiff::configure()
        .algorithm(Algorithm::Lcs)
        .diff_lines(before, after);

    let lines = diff
        .iter_all_changes()
        .map(|change| {
            let (content, terminated) = strip_terminator(change.value());
            let kind = match change.tag() {
                ChangeTag::Equal => LineKind::Context,
                ChangeTag::Insert => LineKind::Add,
                ChangeTag::Delete => LineKind::Remove,
            };
            DiffLine {
                kind,
                old_line_number: change.old_index().map(|i| i + 1),
                new_line_number: change.new_index().map(|i| i + 1),
                content: content.to_string(),
                intra_line_changes: None,
                no_newline_at_eof: !terminated,
            }
        })
        .collect();

    Ok(pair_changed_runs(lines))
}

/// Byte-oriented front door: rejects content that is not valid UTF-8.
pub fn compute_diff_bytes(before: &[u8], after: &[u8]) -> Result<Vec<DiffLine>, DiffError> {
    let before = std::str::from_utf8(before)
        .map_err(|e| DiffError::InvalidInput(format!("before is not valid UTF-8: {e}")))?;
    let after = std::str::from_utf8(after)
        .map_err(|e| DiffError::InvalidInput(format!("after is not valid UTF-8: {e}")))?;
    compute_diff(before, after)
}

/// Rebuild the new text by replaying context and added lines in order.
pub fn reconstruct_after(lines: &[DiffLine]) -> String {
    reconstruct(lines, LineKind::Remove)
}

/// Rebuild the old text by replaying context and removed lines in order.
pub fn reconstruct_before(lines: &[DiffLine]) -> String {
    reconstruct(lines, LineKind::Add)
}

fn reconstruct(lines: &[DiffLine], skip: LineKind) -> String {
    let mut out = String::new();
    for line in lines.iter().filter(|l| l.kind != skip) {
        out.push_str(&line.content);
        if !line.no_newline_at_eof {
            out.push('\n');
        }
    }
    out
}

/// Pair removal runs with the addition runs that directly follow them.
pub(crate) fn pair_changed_runs(lines: Vec<DiffLine>) -> Vec<DiffLine> {
    let mut out = Vec::with_capacity(lines.len());
    let mut iter = lines.into_iter().peekable();

    while let Some(line) = iter.next() {
        if line.kind != LineKind::Remove {
            out.push(line);
            continue;
        }

        let mut removed = vec![line];
        while let Some(next) = iter.next_if(|l| l.kind == LineKind::Remove) {
            removed.push(next);
        }
        let mut added = Vec::new();
        while let Some(next) = iter.next_if(|l| l.kind == LineKind::Add) {
            added.push(next);
        }

        for (old, new) in removed.iter_mut().zip(added.iter_mut()) {
            let (old_segments, new_segments) = intra_line(&old.content, &new.content);
            old.intra_line_changes = Some(old_segments);
            new.intra_line_changes = Some(new_segments);
        }

        out.extend(removed);
        out.extend(added);
    }

    out
}

/// Character-level diff of one paired line.
///
/// Returns the segments for the old line (equal/delete) and the new line
/// (equal/insert).
fn intra_line(old: &str, new: &str) -> (Vec<IntraLineChange>, Vec<IntraLineChange>) {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Lcs)
        .diff_chars(old, new);

    let mut old_segments = Vec::new();
    let mut new_segments = Vec::new();
    for change in diff.iter_all_changes() {
        let text = change.value();
        match change.tag() {
            ChangeTag::Equal => {
                push_segment(&mut old_segments, SegmentKind::Equal, text);
                push_segment(&mut new_segments, SegmentKind::Equal, text);
            }
            ChangeTag::Delete => push_segment(&mut old_segments, SegmentKind::Delete, text),
            ChangeTag::Insert => push_segment(&mut new_segments, SegmentKind::Insert, text),
        }
    }
    (old_segments, new_segments)
}

fn push_segment(segments: &mut Vec<IntraLineChange>, kind: SegmentKind, text: &str) {
    match segments.last_mut() {
        Some(last) if last.kind == kind => last.text.push_str(text),
        _ => segments.push(IntraLineChange {
            text: text.to_string(),
            kind,
        }),
    }
}

/// Split a line value into its text and whether it carried a `\n`.
pub(crate) fn strip_terminator(value: &str) -> (&str, bool) {
    match value.strip_suffix('\n') {
        Some(content) => (content, true),
        None => (value, false),
    }
}

fn validate_text(side: &str, text: &str) -> Result<(), DiffError> {
    if text.contains('\0') {
        return Err(DiffError::InvalidInput(format!(
            "{side} contains a NUL byte; binary content cannot be diffed by line"
        )));
    }
    Ok(())
}
