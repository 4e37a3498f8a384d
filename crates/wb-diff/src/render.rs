// render.rs — Unified-diff text rendering for terminal display.

use crate::line::{DiffLine, LineKind};

/// Render lines as unified diff text with `context` lines around each change.
///
/// Returns an empty string when there is nothing to show.
pub fn render_unified(path: &str, lines: &[DiffLine], context: usize) -> String {
    let hunks = hunk_ranges(lines, context);
    if hunks.is_empty() {
        return String::new();
    }

    let mut output = String::new();
    output.push_str(&format!("--- a/{}\n", path));
    output.push_str(&format!("+++ b/{}\n", path));

    for (start, end) in hunks {
        let body = &lines[start..end];
        let old_count = body.iter().filter(|l| l.kind != LineKind::Add).count();
        let new_count = body.iter().filter(|l| l.kind != LineKind::Remove).count();
        let old_start = start_number(&lines[..end], start, |l| l.old_line_number, old_count);
        let new_start = start_number(&lines[..end], start, |l| l.new_line_number, new_count);

        output.push_str(&format!(
            "@@ -{} +{} @@\n",
            format_range(old_start, old_count),
            format_range(new_start, new_count)
        ));

        for line in body {
            let prefix = match line.kind {
                LineKind::Context => ' ',
                LineKind::Add => '+',
                LineKind::Remove => '-',
            };
            output.push(prefix);
            output.push_str(&line.content);
            output.push('\n');
            if line.no_newline_at_eof {
                output.push_str("\\ No newline at end of file\n");
            }
        }
    }

    output
}

/// Index ranges `[start, end)` of hunks, merging changes whose context overlaps.
fn hunk_ranges(lines: &[DiffLine], context: usize) -> Vec<(usize, usize)> {
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if !line.is_change() {
            continue;
        }
        let start = idx.saturating_sub(context);
        let end = (idx + 1 + context).min(lines.len());
        match ranges.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => ranges.push((start, end)),
        }
    }
    ranges
}

/// First line number of a hunk side. An empty side uses the number of the
/// line just before the hunk (0 at the top of the file), matching git.
fn start_number(
    prefix: &[DiffLine],
    start: usize,
    number: impl Fn(&DiffLine) -> Option<usize>,
    count: usize,
) -> usize {
    if count > 0 {
        return prefix[start..].iter().find_map(&number).unwrap_or(1);
    }
    prefix[..start].iter().rev().find_map(&number).unwrap_or(0)
}

fn format_range(start: usize, count: usize) -> String {
    if count == 1 {
        start.to_string()
    } else {
        format!("{},{}", start, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compute_diff, diff_from_patch};

    #[test]
    fn unchanged_content_renders_nothing() {
        let lines = compute_diff("a\nb\n", "a\nb\n").unwrap();
        assert_eq!(render_unified("a.txt", &lines, 3), "");
    }

    #[test]
    fn renders_single_hunk_with_context() {
        let lines = compute_diff("line1\nline2\n", "line1\nlineTWO\n").unwrap();
        let text = render_unified("a.txt", &lines, 3);
        assert_eq!(
            text,
            "--- a/a.txt\n+++ b/a.txt\n@@ -1,2 +1,2 @@\n line1\n-line2\n+lineTWO\n"
        );
    }

    #[test]
    fn distant_changes_split_into_hunks() {
        let before: String = (1..=20).map(|i| format!("l{i}\n")).collect();
        let after = before.replace("l2\n", "L2\n").replace("l19\n", "L19\n");
        let lines = compute_diff(&before, &after).unwrap();
        let text = render_unified("f", &lines, 1);
        assert_eq!(text.matches("@@ ").count(), 2);
        assert!(text.contains("@@ -1,3 +1,3 @@"));
        assert!(text.contains("@@ -18,3 +18,3 @@"));
    }

    #[test]
    fn rendered_text_parses_back_to_the_same_lines() {
        let lines = compute_diff("a\nb\nc\n", "a\nB\nc\nd").unwrap();
        let text = render_unified("f", &lines, 10);
        assert_eq!(diff_from_patch(&text).unwrap(), lines);
    }

    #[test]
    fn pure_addition_uses_zero_start_on_empty_side() {
        let lines = compute_diff("", "new\n").unwrap();
        let text = render_unified("f", &lines, 3);
        assert!(text.contains("@@ -0,0 +1 @@"));
    }
}
