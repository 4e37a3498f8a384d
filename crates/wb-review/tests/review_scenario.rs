// review_scenario.rs — A human edit through the review queue on a real checkout.
//
// Flow:
//   1. Git checkout with a.txt = "line1\nline2\n", opened as a workspace
//   2. Propose modifying line 2 to "lineTWO"
//   3. The diff pairs the removed and added line and isolates "2" vs "TWO"
//   4. Accept → file written, path staged, unsaved set cleared
//   5. Status: clean against the index, modified against HEAD until committed

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use wb_diff::{IntraLineChange, LineKind, SegmentKind};
use wb_review::{
    ChangeOrigin, ChangeStatus, MemoryChangeStore, ProposedChange, ReviewConfig, ReviewQueue,
};
use wb_vcs::{FileState, Repo, VcsConfig, VcsOrchestrator};
use wb_workspace::{MemoryPersistence, Project, RepoFactory, WorkspaceStore};

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(output.status.success(), "git {:?} failed", args);
}

fn segment(text: &str, kind: SegmentKind) -> IntraLineChange {
    IntraLineChange {
        text: text.to_string(),
        kind,
    }
}

#[test]
fn human_edit_is_reviewed_then_applied() {
    let project = tempfile::tempdir().unwrap();
    let root = project.path();
    git(root, &["init", "-q"]);
    git(root, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(root, &["config", "user.name", "Test User"]);
    git(root, &["config", "user.email", "test@example.com"]);
    git(root, &["config", "commit.gpgsign", "false"]);
    std::fs::write(root.join("a.txt"), "line1\nline2\n").unwrap();
    git(root, &["add", "-A"]);
    git(root, &["commit", "-q", "-m", "Initial commit"]);

    let factory: RepoFactory = Arc::new(|id, root| Repo::local(id, root, &VcsConfig::default()));
    let workspaces = Arc::new(WorkspaceStore::new(
        Arc::new(MemoryPersistence::new()),
        factory,
    ));
    let vcs = Arc::new(VcsOrchestrator::new(VcsConfig::default()));
    let ws = workspaces
        .create(&Project::new("scenario", root, "main"))
        .unwrap();
    let queue = ReviewQueue::new(
        ReviewConfig::default(),
        workspaces.clone(),
        vcs.clone(),
        Arc::new(MemoryChangeStore::new()),
    );

    // =========================================================
    // Propose and inspect the diff
    // =========================================================

    let change = queue
        .propose(
            ProposedChange::modify(
                ws,
                ChangeOrigin::Human,
                "a.txt",
                "line1\nline2\n",
                "line1\nlineTWO\n",
            )
            .unwrap(),
        )
        .unwrap();

    let diff = queue.diff(change.id).unwrap();
    let kinds: Vec<LineKind> = diff.iter().map(|l| l.kind).collect();
    assert_eq!(kinds, vec![LineKind::Context, LineKind::Remove, LineKind::Add]);
    assert_eq!(
        diff[1].intra_line_changes,
        Some(vec![
            segment("line", SegmentKind::Equal),
            segment("2", SegmentKind::Delete),
        ])
    );
    assert_eq!(
        diff[2].intra_line_changes,
        Some(vec![
            segment("line", SegmentKind::Equal),
            segment("TWO", SegmentKind::Insert),
        ])
    );

    // =========================================================
    // Accept and check the workspace
    // =========================================================

    let accepted = queue.accept(change.id).unwrap();
    assert_eq!(accepted.status, ChangeStatus::Accepted);
    assert_eq!(
        std::fs::read_to_string(root.join("a.txt")).unwrap(),
        "line1\nlineTWO\n"
    );

    let workspace = workspaces.get(ws).unwrap();
    assert!(!workspace.unsaved_paths.contains("a.txt"));

    let status = vcs.status(&workspaces.repo(ws).unwrap()).unwrap();
    assert_eq!(status, workspace.vcs_snapshot.status);
    let entry = status.iter().find(|e| e.path == "a.txt").unwrap();
    assert_eq!(entry.workdir_state, FileState::Unmodified);
    assert_eq!(entry.head_state, FileState::Modified);

    // Committing brings it level with HEAD.
    workspaces.commit(ws, &vcs, "Rename line two").unwrap();
    assert!(vcs.status(&workspaces.repo(ws).unwrap()).unwrap().is_empty());
}
