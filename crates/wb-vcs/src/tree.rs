// tree.rs — Whole-tree helpers shared by stash and merge.
//
// A three-way decision is made per path:
// - both sides agree, or only ours changed: keep ours
// - only theirs changed: take theirs
// - both changed text files: line merge, conflict markers on overlap
// - both changed otherwise (binary, modify/delete): conflict, keep the
//   side that still has content (ours when both do)

use std::collections::{BTreeMap, BTreeSet};

use wb_diff::{merge3, MergeLabels, MergeText};

use crate::error::VcsError;
use crate::repo::Repo;
use crate::types::{StatusEntry, TreeFile, TreeSnapshot};

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum EntryMerge {
    Keep,
    Take(Option<TreeFile>),
    Conflict(Option<TreeFile>),
}

pub(crate) fn merge_entry(
    base: Option<&TreeFile>,
    ours: Option<&TreeFile>,
    theirs: Option<&TreeFile>,
    labels: MergeLabels<'_>,
) -> EntryMerge {
    if ours == theirs || base == theirs {
        return EntryMerge::Keep;
    }
    if base == ours {
        return EntryMerge::Take(theirs.cloned());
    }

    match (ours, theirs) {
        (Some(o), Some(t)) => {
            let base_text = match base {
                Some(b) => as_text(b),
                None => Some(""),
            };
            let (Some(base_text), Some(ours_text), Some(theirs_text)) =
                (base_text, as_text(o), as_text(t))
            else {
                return EntryMerge::Conflict(Some(o.clone()));
            };
            let mode = match base {
                Some(b) if b.mode == o.mode => t.mode,
                _ => o.mode,
            };
            match merge3(base_text, ours_text, theirs_text, labels) {
                MergeText::Clean(text) => EntryMerge::Take(Some(TreeFile {
                    mode,
                    content: text.into_bytes(),
                })),
                MergeText::Conflicted { text, .. } => EntryMerge::Conflict(Some(TreeFile {
                    mode,
                    content: text.into_bytes(),
                })),
            }
        }
        (Some(o), None) => EntryMerge::Conflict(Some(o.clone())),
        (None, Some(t)) => EntryMerge::Conflict(Some(t.clone())),
        (None, None) => EntryMerge::Keep,
    }
}

fn as_text(file: &TreeFile) -> Option<&str> {
    std::str::from_utf8(&file.content)
        .ok()
        .filter(|s| !s.contains('\0'))
}

/// Result of merging two full trees against their base.
#[derive(Debug)]
pub(crate) struct TreeMerge {
    /// Ours with every update applied.
    pub tree: TreeSnapshot,
    /// Paths whose result differs from ours; `None` means deleted.
    pub updates: BTreeMap<String, Option<TreeFile>>,
    pub conflicts: Vec<String>,
}

pub(crate) fn merge_trees(
    base: &TreeSnapshot,
    ours: &TreeSnapshot,
    theirs: &TreeSnapshot,
    labels: MergeLabels<'_>,
) -> TreeMerge {
    let paths: BTreeSet<&String> = base.keys().chain(ours.keys()).chain(theirs.keys()).collect();

    let mut tree = ours.clone();
    let mut updates = BTreeMap::new();
    let mut conflicts = Vec::new();

    for path in paths {
        let (result, conflicted) = match merge_entry(
            base.get(path),
            ours.get(path),
            theirs.get(path),
            labels,
        ) {
            EntryMerge::Keep => continue,
            EntryMerge::Take(file) => (file, false),
            EntryMerge::Conflict(file) => (file, true),
        };
        match &result {
            Some(file) => tree.insert(path.clone(), file.clone()),
            None => tree.remove(path),
        };
        if conflicted {
            conflicts.push(path.clone());
        }
        updates.insert(path.clone(), result);
    }

    TreeMerge {
        tree,
        updates,
        conflicts,
    }
}

/// The working tree as a full snapshot: `head_tree` overlaid with the current
/// content of every path the status lists.
pub(crate) fn worktree_tree(
    repo: &Repo,
    head_tree: &TreeSnapshot,
    status: &[StatusEntry],
) -> Result<TreeSnapshot, VcsError> {
    let mut tree = head_tree.clone();
    for entry in status {
        match repo.storage.read(&entry.path)? {
            Some(content) => {
                let mode = head_tree
                    .get(&entry.path)
                    .map_or(TreeFile::REGULAR, |f| f.mode);
                tree.insert(entry.path.clone(), TreeFile { mode, content });
            }
            None => {
                tree.remove(&entry.path);
            }
        }
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(text: &str) -> TreeFile {
        TreeFile::regular(text)
    }

    fn labels() -> MergeLabels<'static> {
        MergeLabels {
            ours: "ours",
            theirs: "topic",
        }
    }

    #[test]
    fn one_sided_changes_resolve_without_conflict() {
        let base = file("a\n");
        let changed = file("b\n");
        assert_eq!(
            merge_entry(Some(&base), Some(&base), Some(&changed), labels()),
            EntryMerge::Take(Some(changed.clone()))
        );
        assert_eq!(
            merge_entry(Some(&base), Some(&changed), Some(&base), labels()),
            EntryMerge::Keep
        );
        assert_eq!(
            merge_entry(Some(&base), Some(&base), None, labels()),
            EntryMerge::Take(None)
        );
    }

    #[test]
    fn modify_delete_keeps_modified_side() {
        let base = file("a\n");
        let modified = file("a2\n");
        assert_eq!(
            merge_entry(Some(&base), None, Some(&modified), labels()),
            EntryMerge::Conflict(Some(modified.clone()))
        );
    }

    #[test]
    fn binary_conflict_keeps_ours() {
        let base = TreeFile::regular(vec![0u8, 1]);
        let ours = TreeFile::regular(vec![0u8, 2]);
        let theirs = TreeFile::regular(vec![0u8, 3]);
        assert_eq!(
            merge_entry(Some(&base), Some(&ours), Some(&theirs), labels()),
            EntryMerge::Conflict(Some(ours.clone()))
        );
    }

    #[test]
    fn tree_merge_collects_updates_and_conflicts() {
        let base: TreeSnapshot = [("same.txt", "s\n"), ("clash.txt", "x\n")]
            .into_iter()
            .map(|(p, c)| (p.to_string(), file(c)))
            .collect();
        let mut ours = base.clone();
        ours.insert("clash.txt".into(), file("ours\n"));
        let mut theirs = base.clone();
        theirs.insert("clash.txt".into(), file("theirs\n"));
        theirs.insert("new.txt".into(), file("n\n"));

        let merged = merge_trees(&base, &ours, &theirs, labels());
        assert_eq!(merged.conflicts, vec!["clash.txt"]);
        assert_eq!(merged.updates.len(), 2);
        assert_eq!(merged.tree["new.txt"].content, b"n\n");
        assert_eq!(
            merged.tree["clash.txt"].content,
            b"<<<<<<< ours\nours\n=======\ntheirs\n>>>>>>> topic\n"
        );
    }
}
