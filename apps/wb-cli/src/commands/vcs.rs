// vcs.rs — status, diff, commit, branch, stash, merge.

use anyhow::{bail, Context};
use clap::Subcommand;
use wb_diff::{render_unified, DiffStats};
use wb_vcs::{FileState, MergeOptions, StatusEntry};
use wb_workspace::Workspace;

use crate::app::{resolve_prefix, short, Workbench};

#[derive(Subcommand)]
pub enum BranchCommands {
    /// List local branches.
    List,
    /// Create a branch.
    Create {
        name: String,
        /// Start point (defaults to HEAD).
        #[arg(long)]
        from: Option<String>,
    },
    /// Switch the working tree to a branch. Refuses when dirty.
    Checkout { name: String },
}

#[derive(Subcommand)]
pub enum StashCommands {
    /// Stash every working-tree change and reset to HEAD.
    Save {
        #[arg(short, long)]
        message: Option<String>,
    },
    /// List this workspace's stashes, newest first.
    List,
    /// Replay a stash onto the working tree. The stash is kept.
    Apply { id: String },
    /// Forget a stash. Its commit is left in place.
    Drop { id: String },
}

fn state_code(state: FileState) -> char {
    match state {
        FileState::Unmodified => '.',
        FileState::Modified => 'M',
        FileState::Added => 'A',
        FileState::Deleted => 'D',
    }
}

fn status_line(entry: &StatusEntry) -> String {
    format!(
        "{}{}{}  {}",
        state_code(entry.head_state),
        state_code(entry.stage_state),
        state_code(entry.workdir_state),
        entry.path
    )
}

pub fn status(app: &Workbench, ws: &Workspace, log: usize) -> anyhow::Result<()> {
    let snapshot = app.workspaces.refresh_status(ws.id, &app.vcs)?;

    println!("Workspace {} ({})", short(&ws.id.to_string()), ws.project_name);
    println!("On branch {}", snapshot.branch);
    if let Some(pending) = &snapshot.pending_merge {
        println!(
            "Merging {}: {} conflicted path(s). Resolve and run `wb merge --continue`, or `wb merge --abort`.",
            pending.branch,
            pending.conflicts.len()
        );
        for path in &pending.conflicts {
            println!("  both modified: {}", path);
        }
    }

    if snapshot.status.is_empty() {
        println!("\nWorking tree clean.");
    } else {
        println!("\nHEAD/index/worktree  path");
        for entry in &snapshot.status {
            println!("  {}", status_line(entry));
        }
    }

    let unsaved = app.workspaces.get(ws.id)?.unsaved_paths;
    if !unsaved.is_empty() {
        println!("\nUnsaved edits:");
        for path in unsaved {
            println!("  {}", path);
        }
    }

    if log > 0 {
        println!("\nRecent commits:");
        for commit in snapshot.commits.iter().take(log) {
            println!("  {} {}", commit.short_id, commit.subject);
        }
    }
    Ok(())
}

pub fn diff(app: &Workbench, ws: &Workspace, path: &str, context: usize) -> anyhow::Result<()> {
    let repo = app.workspaces.repo(ws.id)?;
    let lines = app.vcs.diff_path(&repo, path)?;
    if lines.is_empty() {
        println!("No changes to {}.", path);
        return Ok(());
    }
    print!("{}", render_unified(path, &lines, context));
    let stats = DiffStats::of(&lines);
    println!("\n{} insertion(s), {} deletion(s)", stats.added, stats.removed);
    Ok(())
}

pub fn commit(app: &Workbench, ws: &Workspace, message: &str, all: bool) -> anyhow::Result<()> {
    if all {
        let repo = app.workspaces.repo(ws.id)?;
        for entry in app.vcs.status(&repo)? {
            app.vcs.stage(&repo, &entry.path)?;
        }
    }
    let id = app
        .workspaces
        .commit(ws.id, &app.vcs, message)
        .context("nothing to commit; stage changes or pass --all")?;
    println!("Committed {}: {}", short(&id), message);
    Ok(())
}

pub fn branch(app: &Workbench, ws: &Workspace, cmd: &BranchCommands) -> anyhow::Result<()> {
    let repo = app.workspaces.repo(ws.id)?;
    match cmd {
        BranchCommands::List => {
            let current = app.workspaces.refresh_status(ws.id, &app.vcs)?.branch;
            for name in app.vcs.branches(&repo)? {
                let marker = if name == current { "*" } else { " " };
                println!("{} {}", marker, name);
            }
        }
        BranchCommands::Create { name, from } => {
            app.vcs.create_branch(&repo, name, from.as_deref())?;
            println!("Created branch {}", name);
        }
        BranchCommands::Checkout { name } => {
            app.workspaces.checkout_branch(ws.id, &app.vcs, name)?;
            println!("Switched to branch {}", name);
        }
    }
    Ok(())
}

pub fn stash(app: &Workbench, ws: &Workspace, cmd: &StashCommands) -> anyhow::Result<()> {
    let resolve = |prefix: &str| -> anyhow::Result<String> {
        let stashes = app.workspaces.stash_list(ws.id, &app.vcs)?;
        resolve_prefix("stash", prefix, stashes.into_iter().map(|s| (s.id.clone(), s.id)))
    };

    match cmd {
        StashCommands::Save { message } => {
            let stash = app.workspaces.stash_save(ws.id, &app.vcs, message.as_deref())?;
            println!("Saved stash {}: {}", short(&stash.id), stash.message);
        }
        StashCommands::List => {
            let stashes = app.workspaces.stash_list(ws.id, &app.vcs)?;
            if stashes.is_empty() {
                println!("No stashes.");
            }
            for stash in stashes {
                println!(
                    "{}  {}  {}",
                    short(&stash.id),
                    stash.created_at.format("%Y-%m-%d %H:%M"),
                    stash.message
                );
            }
        }
        StashCommands::Apply { id } => {
            let id = resolve(id)?;
            let written = app.workspaces.stash_apply(ws.id, &app.vcs, &id)?;
            println!("Applied stash {} ({} path(s))", short(&id), written.len());
        }
        StashCommands::Drop { id } => {
            let id = resolve(id)?;
            let dropped = app.workspaces.stash_drop(ws.id, &app.vcs, &id)?;
            println!("Dropped stash {}: {}", short(&dropped.id), dropped.message);
        }
    }
    app.save_stashes()
}

pub fn merge(
    app: &Workbench,
    ws: &Workspace,
    branch: Option<&str>,
    ff_only: bool,
    abort: bool,
    resume: bool,
    message: Option<&str>,
) -> anyhow::Result<()> {
    if abort {
        app.workspaces.merge_abort(ws.id, &app.vcs)?;
        println!("Merge aborted; working tree restored to the pre-merge HEAD.");
        return Ok(());
    }
    if resume {
        let id = app.workspaces.merge_continue(ws.id, &app.vcs, message)?;
        println!("Merge committed as {}", short(&id));
        return Ok(());
    }

    let Some(branch) = branch else {
        bail!("name a branch to merge, or pass --abort / --continue");
    };
    let outcome = app.workspaces.merge(
        ws.id,
        &app.vcs,
        branch,
        MergeOptions {
            fast_forward_only: ff_only,
        },
    )?;

    if outcome.already_up_to_date {
        println!("Already up to date.");
    } else if outcome.is_conflicted() {
        println!("Merge of {} stopped with conflicts in:", branch);
        for path in &outcome.conflicts {
            println!("  {}", path);
        }
        println!("Resolve them, then run `wb merge --continue` (or `wb merge --abort`).");
    } else if let Some(result) = &outcome.result_ref {
        let how = if outcome.fast_forward {
            "Fast-forwarded"
        } else {
            "Merged"
        };
        println!("{} {} → {}", how, branch, short(result));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_shows_three_states() {
        let entry = StatusEntry {
            path: "src/lib.rs".into(),
            head_state: FileState::Modified,
            workdir_state: FileState::Unmodified,
            stage_state: FileState::Modified,
        };
        assert_eq!(status_line(&entry), "MM.  src/lib.rs");
    }
}
