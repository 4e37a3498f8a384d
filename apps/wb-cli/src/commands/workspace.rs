// workspace.rs — open, list, switch, close.

use std::path::Path;

use anyhow::Context;
use wb_vcs::{GitCli, VcsEngine};
use wb_workspace::{CloseMode, Project};

use crate::app::{short, Workbench};

pub fn open(
    app: &Workbench,
    path: &Path,
    name: Option<&str>,
    branch: Option<&str>,
) -> anyhow::Result<()> {
    let root = path
        .canonicalize()
        .with_context(|| format!("cannot open {}", path.display()))?;
    let name = match name {
        Some(name) => name.to_string(),
        None => root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string()),
    };
    let branch = match branch {
        Some(branch) => branch.to_string(),
        None => GitCli::new(&root, &app.config.vcs)
            .current_branch()
            .with_context(|| format!("{} is not a git checkout", root.display()))?,
    };

    let id = app.workspaces.create(&Project::new(&name, &root, &branch))?;
    app.workspaces.refresh_status(id, &app.vcs)?;

    println!("Opened workspace {} for {}", id, name);
    println!("  Root:   {}", root.display());
    println!("  Branch: {}", branch);
    Ok(())
}

pub fn list(app: &Workbench) -> anyhow::Result<()> {
    let workspaces = app.workspaces.list()?;
    if workspaces.is_empty() {
        println!("No open workspaces.");
        return Ok(());
    }
    let active = app.workspaces.active()?;

    println!(
        "  {:<10} {:<20} {:<16} {:<8} {:<8}",
        "ID", "PROJECT", "BRANCH", "CHANGED", "UNSAVED"
    );
    for ws in &workspaces {
        let marker = if Some(ws.id) == active { "*" } else { " " };
        println!(
            "{} {:<10} {:<20} {:<16} {:<8} {:<8}",
            marker,
            short(&ws.id.to_string()),
            ws.project_name,
            ws.vcs_snapshot.branch,
            ws.vcs_snapshot.status.len(),
            ws.unsaved_paths.len(),
        );
    }
    println!("\n{} workspace(s).", workspaces.len());
    Ok(())
}

pub fn switch(app: &Workbench, prefix: &str) -> anyhow::Result<()> {
    let ws = app.workspace(Some(prefix))?;
    let outcome = app.workspaces.switch(ws.id)?;
    if !outcome.changed {
        println!("Workspace {} is already active.", ws.project_name);
        return Ok(());
    }
    if !outcome.previous_unsaved.is_empty() {
        println!(
            "Warning: the previous workspace still has unsaved edits in: {}",
            outcome.previous_unsaved.join(", ")
        );
    }
    println!("Switched to workspace {} ({})", short(&ws.id.to_string()), ws.project_name);
    Ok(())
}

pub fn close(app: &Workbench, prefix: &str, discard: bool) -> anyhow::Result<()> {
    let ws = app.workspace(Some(prefix))?;
    let mode = if discard {
        CloseMode::Discard
    } else {
        CloseMode::KeepUnsaved
    };
    let closed = app
        .workspaces
        .close(ws.id, mode)
        .context("close refused; save or review the edits, or pass --discard")?;
    println!("Closed workspace {} ({})", short(&closed.id.to_string()), closed.project_name);
    match app.workspaces.active_workspace()? {
        Some(active) => println!("Active workspace is now {}", active.project_name),
        None => println!("No workspaces remain open."),
    }
    Ok(())
}
