// review.rs — propose changes and review them: list, show, accept, reject, edit.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Subcommand};
use uuid::Uuid;
use wb_diff::{render_unified, DiffStats};
use wb_review::{ChangeOrigin, DuplicatePolicy, PendingChange, ProposedChange};
use wb_workspace::Workspace;

use crate::app::{short, Workbench};

/// Where new file content comes from.
#[derive(Args)]
#[group(multiple = false)]
pub struct ContentSource {
    /// Content given inline.
    #[arg(long)]
    content: Option<String>,
    /// Content read from a file.
    #[arg(long)]
    from_file: Option<PathBuf>,
}

impl ContentSource {
    fn read(&self) -> anyhow::Result<Option<String>> {
        match (&self.content, &self.from_file) {
            (Some(content), _) => Ok(Some(content.clone())),
            (None, Some(file)) => std::fs::read_to_string(file)
                .map(Some)
                .with_context(|| format!("cannot read {}", file.display())),
            (None, None) => Ok(None),
        }
    }
}

#[derive(Args)]
pub struct ProposeArgs {
    /// Path relative to the workspace root.
    path: String,
    #[command(flatten)]
    source: ContentSource,
    /// Propose deleting the file instead.
    #[arg(long, conflicts_with_all = ["content", "from_file"])]
    delete: bool,
    /// Who is proposing: human, merge:<branch> or agent:<id>.
    #[arg(long, default_value = "human")]
    origin: String,
    /// Replace an existing pending change for the same path.
    #[arg(long)]
    supersede: bool,
}

#[derive(Subcommand)]
pub enum ReviewCommands {
    /// List pending changes.
    List {
        /// Include accepted and rejected changes.
        #[arg(long)]
        all: bool,
    },
    /// Show a change and its diff.
    Show {
        id: String,
        /// Lines of context around each hunk.
        #[arg(long, default_value_t = 3)]
        context: usize,
    },
    /// Accept changes; several at once are accepted all-or-nothing.
    Accept {
        ids: Vec<String>,
        /// Also accept pending changes whose path matches (e.g. "src/**").
        #[arg(long = "glob")]
        globs: Vec<String>,
    },
    /// Reject changes.
    Reject {
        ids: Vec<String>,
        #[arg(long = "glob")]
        globs: Vec<String>,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Replace the proposed content of a pending change.
    Edit {
        id: String,
        #[command(flatten)]
        source: ContentSource,
    },
}

pub fn propose(app: &Workbench, ws: &Workspace, args: &ProposeArgs) -> anyhow::Result<()> {
    let origin: ChangeOrigin = args.origin.parse()?;
    let repo = app.workspaces.repo(ws.id)?;
    let current = match repo.storage.read(&args.path)? {
        Some(bytes) => Some(
            String::from_utf8(bytes).with_context(|| format!("{} is not UTF-8 text", args.path))?,
        ),
        None => None,
    };

    let proposal = if args.delete {
        let before = current.with_context(|| format!("{} does not exist", args.path))?;
        ProposedChange::delete(ws.id, origin, &args.path, before)?
    } else {
        let after = args
            .source
            .read()?
            .context("give the new content with --content or --from-file")?;
        match current {
            Some(before) => ProposedChange::modify(ws.id, origin, &args.path, before, after)?,
            None => ProposedChange::create(ws.id, origin, &args.path, after)?,
        }
    };

    let policy = if args.supersede {
        DuplicatePolicy::Supersede
    } else {
        app.config.review.duplicate_policy
    };
    let change = app.queue.propose_with(proposal, policy)?;
    let stats = DiffStats::of(&change.diff()?);
    println!(
        "Proposed {} {} of {} (+{} -{})",
        change.id, change.operation, change.file_path, stats.added, stats.removed
    );
    Ok(())
}

pub fn execute(app: &Workbench, ws: &Workspace, cmd: &ReviewCommands) -> anyhow::Result<()> {
    match cmd {
        ReviewCommands::List { all } => list(app, ws, *all),
        ReviewCommands::Show { id, context } => show(app, ws, id, *context),
        ReviewCommands::Accept { ids, globs } => accept(app, ws, ids, globs),
        ReviewCommands::Reject { ids, globs, reason } => {
            reject(app, ws, ids, globs, reason.as_deref())
        }
        ReviewCommands::Edit { id, source } => edit(app, ws, id, source),
    }
}

fn list(app: &Workbench, ws: &Workspace, all: bool) -> anyhow::Result<()> {
    let changes = if all {
        app.queue.list(ws.id)?
    } else {
        app.queue.list_pending(ws.id)?
    };
    if changes.is_empty() {
        println!("No {}changes.", if all { "" } else { "pending " });
        return Ok(());
    }

    println!(
        "{:<10} {:<9} {:<8} {:<18} {}",
        "ID", "STATUS", "OP", "ORIGIN", "PATH"
    );
    for c in &changes {
        println!(
            "{:<10} {:<9} {:<8} {:<18} {}",
            short(&c.id.to_string()),
            c.status.to_string(),
            c.operation.to_string(),
            c.origin.to_string(),
            c.file_path
        );
    }
    println!("\n{} change(s).", changes.len());
    Ok(())
}

fn show(app: &Workbench, ws: &Workspace, prefix: &str, context: usize) -> anyhow::Result<()> {
    let change = app.change(ws.id, prefix)?;
    println!("Change {}", change.id);
    println!("  Path:    {}", change.file_path);
    println!("  Op:      {}", change.operation);
    println!("  Origin:  {}", change.origin);
    println!("  Status:  {}", change.status);
    println!("  Created: {}", change.created_at.to_rfc3339());
    if let Some(note) = &change.resolution_note {
        println!("  Note:    {}", note);
    }
    if !change.verify_hash() {
        println!("  WARNING: content hash does not match; this record was altered.");
    }
    println!();
    print!("{}", render_unified(&change.file_path, &change.diff()?, context));
    Ok(())
}

/// Resolve explicit ids plus glob selections to a deduplicated id list.
fn targets(
    app: &Workbench,
    ws: &Workspace,
    ids: &[String],
    globs: &[String],
) -> anyhow::Result<Vec<PendingChange>> {
    let mut changes = Vec::new();
    for prefix in ids {
        changes.push(app.change(ws.id, prefix)?);
    }
    if !globs.is_empty() {
        changes.extend(app.queue.select(ws.id, globs)?);
    }
    let mut seen = HashSet::new();
    changes.retain(|c| seen.insert(c.id));
    if changes.is_empty() {
        bail!("no changes selected");
    }
    Ok(changes)
}

fn ids_of(changes: &[PendingChange]) -> Vec<Uuid> {
    changes.iter().map(|c| c.id).collect()
}

fn accept(app: &Workbench, ws: &Workspace, ids: &[String], globs: &[String]) -> anyhow::Result<()> {
    let changes = targets(app, ws, ids, globs)?;
    let accepted = match changes.as_slice() {
        [one] => vec![app.queue.accept(one.id)?],
        many => app.queue.accept_all(&ids_of(many))?,
    };
    for change in &accepted {
        println!("Accepted {}: {}", short(&change.id.to_string()), change.file_path);
    }
    Ok(())
}

fn reject(
    app: &Workbench,
    ws: &Workspace,
    ids: &[String],
    globs: &[String],
    reason: Option<&str>,
) -> anyhow::Result<()> {
    let changes = targets(app, ws, ids, globs)?;
    let rejected = match changes.as_slice() {
        [one] => vec![app.queue.reject(one.id, reason)?],
        many => app.queue.reject_all(&ids_of(many), reason)?,
    };
    for change in &rejected {
        println!("Rejected {}: {}", short(&change.id.to_string()), change.file_path);
    }
    Ok(())
}

fn edit(app: &Workbench, ws: &Workspace, prefix: &str, source: &ContentSource) -> anyhow::Result<()> {
    let change = app.change(ws.id, prefix)?;
    let content = source
        .read()?
        .context("give the new content with --content or --from-file")?;
    let edited = app.queue.edit(change.id, content)?;
    let stats = DiffStats::of(&edited.diff()?);
    println!(
        "Edited {}: {} (+{} -{})",
        short(&edited.id.to_string()),
        edited.file_path,
        stats.added,
        stats.removed
    );
    Ok(())
}
