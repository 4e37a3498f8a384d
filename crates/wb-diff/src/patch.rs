// patch.rs — Convert engine-produced unified listings into DiffLines.
//
// The VCS engine already knows how to produce `git diff` style output. This
// module reads that listing back into the same structured model that
// compute_diff() produces, so both sources render identically. It is not a
// general patch-file tool: only the subset git emits is understood.

use serde::{Deserialize, Serialize};

use crate::engine::pair_changed_runs;
use crate::error::DiffError;
use crate::line::{DiffLine, LineKind};

/// The structured diff of one path inside a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    /// Path on the old side (`None` for a created file).
    pub old_path: Option<String>,
    /// Path on the new side (`None` for a deleted file).
    pub new_path: Option<String>,
    pub lines: Vec<DiffLine>,
    /// The engine reported a binary difference with no line content.
    #[serde(default)]
    pub binary: bool,
}

impl FileDiff {
    fn empty() -> Self {
        Self {
            old_path: None,
            new_path: None,
            lines: Vec::new(),
            binary: false,
        }
    }

    /// The path to show for this entry (new side preferred).
    pub fn display_path(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or("")
    }
}

/// Hunk cursor: remaining line budget and next line numbers per side.
struct Hunk {
    old_remaining: usize,
    new_remaining: usize,
    old_next: usize,
    new_next: usize,
    lines: Vec<DiffLine>,
}

impl Hunk {
    fn is_open(&self) -> bool {
        self.old_remaining > 0 || self.new_remaining > 0
    }
}

/// Parse a multi-file unified listing.
pub fn parse_patch(listing: &str) -> Result<Vec<FileDiff>, DiffError> {
    let mut files: Vec<FileDiff> = Vec::new();
    let mut current: Option<FileDiff> = None;
    let mut hunk: Option<Hunk> = None;

    for (index, raw) in listing.lines().enumerate() {
        let line_no = index + 1;

        // "\ No newline at end of file" trails the line it describes, which
        // may be the last line of a hunk whose budget is already spent.
        if raw.starts_with("\\ ") {
            let target = hunk
                .as_mut()
                .and_then(|h| h.lines.last_mut())
                .ok_or_else(|| {
                    DiffError::InvalidInput(format!("line {line_no}: stray no-newline marker"))
                })?;
            target.no_newline_at_eof = true;
            continue;
        }

        if let Some(open) = hunk.as_mut().filter(|h| h.is_open()) {
            read_hunk_line(open, raw, line_no)?;
            continue;
        }

        if let Some(rest) = raw.strip_prefix("diff --git ") {
            flush_hunk(&mut current, &mut hunk);
            files.extend(current.take());
            let mut file = FileDiff::empty();
            if let Some((old, new)) = rest.split_once(" b/") {
                file.old_path = Some(old.trim_start_matches("a/").to_string());
                file.new_path = Some(new.to_string());
            }
            current = Some(file);
        } else if let Some(rest) = raw.strip_prefix("--- ") {
            flush_hunk(&mut current, &mut hunk);
            // Plain `diff -u` listings have no `diff --git` line between files.
            if current.as_ref().is_some_and(|f| !f.lines.is_empty()) {
                files.extend(current.take());
            }
            let file = current.get_or_insert_with(FileDiff::empty);
            file.old_path = side_path(rest, "a/");
        } else if let Some(rest) = raw.strip_prefix("+++ ") {
            let file = current.get_or_insert_with(FileDiff::empty);
            file.new_path = side_path(rest, "b/");
        } else if raw.starts_with("@@ ") {
            flush_hunk(&mut current, &mut hunk);
            if current.is_none() {
                current = Some(FileDiff::empty());
            }
            hunk = Some(parse_hunk_header(raw, line_no)?);
        } else if raw.starts_with("Binary files ") {
            let file = current.get_or_insert_with(FileDiff::empty);
            file.binary = true;
        }
        // Other header lines (index, mode, rename, similarity) carry nothing
        // the line model needs.
    }

    if let Some(open) = hunk.as_ref().filter(|h| h.is_open()) {
        return Err(DiffError::InvalidInput(format!(
            "truncated hunk: {} old and {} new lines missing",
            open.old_remaining, open.new_remaining
        )));
    }
    flush_hunk(&mut current, &mut hunk);
    files.extend(current);
    Ok(files)
}

/// Parse a listing that covers a single path and return its lines.
///
/// Listings with several files are concatenated in order.
pub fn diff_from_patch(listing: &str) -> Result<Vec<DiffLine>, DiffError> {
    Ok(parse_patch(listing)?
        .into_iter()
        .flat_map(|f| f.lines)
        .collect())
}

fn flush_hunk(current: &mut Option<FileDiff>, hunk: &mut Option<Hunk>) {
    if let Some(done) = hunk.take() {
        let file = current.get_or_insert_with(FileDiff::empty);
        file.lines.extend(pair_changed_runs(done.lines));
    }
}

fn read_hunk_line(hunk: &mut Hunk, raw: &str, line_no: usize) -> Result<(), DiffError> {
    let (kind, content) = match raw.chars().next() {
        Some(' ') => (LineKind::Context, &raw[1..]),
        Some('-') => (LineKind::Remove, &raw[1..]),
        Some('+') => (LineKind::Add, &raw[1..]),
        // Some tools strip the leading space from blank context lines.
        None => (LineKind::Context, ""),
        Some(other) => {
            return Err(DiffError::InvalidInput(format!(
                "line {line_no}: unexpected '{other}' inside hunk"
            )))
        }
    };

    let budget_ok = match kind {
        LineKind::Context => hunk.old_remaining > 0 && hunk.new_remaining > 0,
        LineKind::Remove => hunk.old_remaining > 0,
        LineKind::Add => hunk.new_remaining > 0,
    };
    if !budget_ok {
        return Err(DiffError::InvalidInput(format!(
            "line {line_no}: hunk body exceeds its header counts"
        )));
    }

    let line = match kind {
        LineKind::Context => {
            let line = DiffLine::context(hunk.old_next, hunk.new_next, content);
            hunk.old_next += 1;
            hunk.new_next += 1;
            hunk.old_remaining -= 1;
            hunk.new_remaining -= 1;
            line
        }
        LineKind::Remove => {
            let line = DiffLine::remove(hunk.old_next, content);
            hunk.old_next += 1;
            hunk.old_remaining -= 1;
            line
        }
        LineKind::Add => {
            let line = DiffLine::add(hunk.new_next, content);
            hunk.new_next += 1;
            hunk.new_remaining -= 1;
            line
        }
    };
    hunk.lines.push(line);
    Ok(())
}

/// Parse `@@ -a[,b] +c[,d] @@ optional section`.
fn parse_hunk_header(raw: &str, line_no: usize) -> Result<Hunk, DiffError> {
    let invalid = || DiffError::InvalidInput(format!("line {line_no}: malformed hunk header"));

    let body = raw.strip_prefix("@@ ").ok_or_else(invalid)?;
    let (ranges, _) = body.split_once(" @@").ok_or_else(invalid)?;
    let (old, new) = ranges.split_once(' ').ok_or_else(invalid)?;
    let (old_start, old_count) = parse_range(old.strip_prefix('-').ok_or_else(invalid)?)
        .ok_or_else(invalid)?;
    let (new_start, new_count) = parse_range(new.strip_prefix('+').ok_or_else(invalid)?)
        .ok_or_else(invalid)?;

    // A zero-length side names the line *before* the hunk, so numbering of
    // the (absent) lines starts one past it.
    Ok(Hunk {
        old_remaining: old_count,
        new_remaining: new_count,
        old_next: if old_count == 0 { old_start + 1 } else { old_start },
        new_next: if new_count == 0 { new_start + 1 } else { new_start },
        lines: Vec::new(),
    })
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

fn side_path(rest: &str, prefix: &str) -> Option<String> {
    let path = rest.split('\t').next().unwrap_or(rest).trim_end();
    if path == "/dev/null" {
        return None;
    }
    Some(path.strip_prefix(prefix).unwrap_or(path).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::SegmentKind;

    const MODIFY: &str = concat!(
        "diff --git a/a.txt b/a.txt\n",
        "index 83db48f..bf269f4 100644\n",
        "--- a/a.txt\n",
        "+++ b/a.txt\n",
        "@@ -1,2 +1,2 @@\n",
        " line1\n",
        "-line2\n",
        "+lineTWO\n",
    );

    #[test]
    fn parses_single_file_modification() {
        let files = parse_patch(MODIFY).unwrap();
        assert_eq!(files.len(), 1);
        let file = &files[0];
        assert_eq!(file.old_path.as_deref(), Some("a.txt"));
        assert_eq!(file.new_path.as_deref(), Some("a.txt"));
        assert_eq!(file.lines.len(), 3);

        assert_eq!(file.lines[0], DiffLine::context(1, 1, "line1"));
        assert_eq!(file.lines[1].kind, LineKind::Remove);
        assert_eq!(file.lines[1].old_line_number, Some(2));
        assert_eq!(file.lines[2].kind, LineKind::Add);
        assert_eq!(file.lines[2].new_line_number, Some(2));

        let segments = file.lines[2].intra_line_changes.as_ref().unwrap();
        assert_eq!(segments[1].text, "TWO");
        assert_eq!(segments[1].kind, SegmentKind::Insert);
    }

    #[test]
    fn listing_matches_computed_diff() {
        let computed = crate::compute_diff("line1\nline2\n", "line1\nlineTWO\n").unwrap();
        assert_eq!(diff_from_patch(MODIFY).unwrap(), computed);
    }

    #[test]
    fn parses_created_and_deleted_files() {
        let listing = concat!(
            "diff --git a/new.txt b/new.txt\n",
            "new file mode 100644\n",
            "--- /dev/null\n",
            "+++ b/new.txt\n",
            "@@ -0,0 +1,2 @@\n",
            "+hello\n",
            "+world\n",
            "\\ No newline at end of file\n",
            "diff --git a/old.txt b/old.txt\n",
            "deleted file mode 100644\n",
            "--- a/old.txt\n",
            "+++ /dev/null\n",
            "@@ -1 +0,0 @@\n",
            "-bye\n",
        );
        let files = parse_patch(listing).unwrap();
        assert_eq!(files.len(), 2);

        assert_eq!(files[0].old_path, None);
        assert_eq!(files[0].display_path(), "new.txt");
        assert_eq!(files[0].lines.len(), 2);
        assert_eq!(files[0].lines[0].new_line_number, Some(1));
        assert!(files[0].lines[1].no_newline_at_eof);

        assert_eq!(files[1].new_path, None);
        assert_eq!(files[1].display_path(), "old.txt");
        assert_eq!(files[1].lines, vec![DiffLine::remove(1, "bye")]);
    }

    #[test]
    fn binary_entries_are_flagged() {
        let listing = concat!(
            "diff --git a/logo.png b/logo.png\n",
            "index 1111111..2222222 100644\n",
            "Binary files a/logo.png and b/logo.png differ\n",
        );
        let files = parse_patch(listing).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].binary);
        assert!(files[0].lines.is_empty());
    }

    #[test]
    fn malformed_header_is_invalid_input() {
        let err = parse_patch("--- a/x\n+++ b/x\n@@ -x +1 @@\n").unwrap_err();
        assert!(matches!(err, DiffError::InvalidInput(_)));
    }

    #[test]
    fn truncated_hunk_is_invalid_input() {
        let err = parse_patch("--- a/x\n+++ b/x\n@@ -1,3 +1,3 @@\n a\n").unwrap_err();
        assert!(matches!(err, DiffError::InvalidInput(_)));
    }

    #[test]
    fn unexpected_prefix_inside_hunk_is_invalid_input() {
        let err = parse_patch("--- a/x\n+++ b/x\n@@ -1 +1 @@\n?odd\n").unwrap_err();
        assert!(matches!(err, DiffError::InvalidInput(_)));
    }

    #[test]
    fn empty_listing_has_no_files() {
        assert!(parse_patch("").unwrap().is_empty());
    }
}
