//! # wb-cli
//!
//! Command-line interface for workbench.
//!
//! Opens project checkouts as workspaces and routes every edit through review:
//! - `wb open/list/switch/close` — manage workspaces
//! - `wb status/diff/commit/branch/stash/merge` — version control per workspace
//! - `wb propose` — queue a file change for review
//! - `wb review list/show/accept/reject/edit` — decide on queued changes

mod app;
mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use app::Workbench;
use config::StateLayout;

/// Workbench CLI — review every edit before it lands.
#[derive(Parser)]
#[command(name = "wb", version, about)]
struct Cli {
    /// State directory (defaults to $WB_STATE_DIR, then ~/.wb).
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Workspace id prefix (defaults to the active workspace).
    #[arg(long, short = 'w', global = true)]
    workspace: Option<String>,

    /// More log output on stderr (-v info, -vv debug).
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a git checkout as a new workspace and make it active.
    Open {
        path: PathBuf,
        /// Project name (defaults to the directory name).
        #[arg(long)]
        name: Option<String>,
        /// Branch to record (defaults to the checked-out branch).
        #[arg(long)]
        branch: Option<String>,
    },
    /// List open workspaces.
    List,
    /// Make another workspace active.
    Switch { id: String },
    /// Close a workspace.
    Close {
        id: String,
        /// Close even with unsaved edits.
        #[arg(long)]
        discard: bool,
    },
    /// Show branch, file states, unsaved edits, and merge progress.
    Status {
        /// Also show this many recent commits.
        #[arg(long, default_value_t = 0)]
        log: usize,
    },
    /// Show working-tree changes to a file against HEAD.
    Diff {
        path: String,
        #[arg(long, default_value_t = 3)]
        context: usize,
    },
    /// Commit staged changes.
    Commit {
        #[arg(short, long)]
        message: String,
        /// Stage every changed path first.
        #[arg(long)]
        all: bool,
    },
    /// Manage branches.
    Branch {
        #[command(subcommand)]
        command: commands::vcs::BranchCommands,
    },
    /// Manage stashes.
    Stash {
        #[command(subcommand)]
        command: commands::vcs::StashCommands,
    },
    /// Merge a branch into the current one, or finish an interrupted merge.
    Merge {
        #[arg(required_unless_present_any = ["abort", "resume"])]
        branch: Option<String>,
        /// Fail unless the merge is a fast-forward.
        #[arg(long)]
        ff_only: bool,
        /// Abandon the merge in progress.
        #[arg(long, conflicts_with_all = ["branch", "resume"])]
        abort: bool,
        /// Commit the merge once conflicts are resolved.
        #[arg(long = "continue", conflicts_with = "branch")]
        resume: bool,
        /// Merge commit message for --continue.
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Queue a file change for review.
    Propose(commands::review::ProposeArgs),
    /// Review queued changes.
    Review {
        #[command(subcommand)]
        command: commands::review::ReviewCommands,
    },
}

fn init_tracing(verbose: u8, json: bool) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // Logs go to stderr; stdout carries command output.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let layout = StateLayout::resolve(cli.state_dir.as_deref())?;
    tracing::debug!("state directory: {}", layout.root.display());
    let app = Workbench::open(layout)?;
    let selected = cli.workspace.as_deref();

    match &cli.command {
        Commands::Open { path, name, branch } => {
            commands::workspace::open(&app, path, name.as_deref(), branch.as_deref())
        }
        Commands::List => commands::workspace::list(&app),
        Commands::Switch { id } => commands::workspace::switch(&app, id),
        Commands::Close { id, discard } => commands::workspace::close(&app, id, *discard),
        Commands::Status { log } => commands::vcs::status(&app, &app.workspace(selected)?, *log),
        Commands::Diff { path, context } => {
            commands::vcs::diff(&app, &app.workspace(selected)?, path, *context)
        }
        Commands::Commit { message, all } => {
            commands::vcs::commit(&app, &app.workspace(selected)?, message, *all)
        }
        Commands::Branch { command } => {
            commands::vcs::branch(&app, &app.workspace(selected)?, command)
        }
        Commands::Stash { command } => commands::vcs::stash(&app, &app.workspace(selected)?, command),
        Commands::Merge {
            branch,
            ff_only,
            abort,
            resume,
            message,
        } => commands::vcs::merge(
            &app,
            &app.workspace(selected)?,
            branch.as_deref(),
            *ff_only,
            *abort,
            *resume,
            message.as_deref(),
        ),
        Commands::Propose(args) => {
            commands::review::propose(&app, &app.workspace(selected)?, args)
        }
        Commands::Review { command } => {
            commands::review::execute(&app, &app.workspace(selected)?, command)
        }
    }
}
