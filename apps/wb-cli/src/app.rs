// app.rs — Workbench: the core services wired to the state directory.
//
// Each CLI invocation restores the workspace store, the review queue and the
// stash index from disk, runs one command, and writes the stash index back.
// Workspace and change records persist themselves as they change.

use std::sync::Arc;

use anyhow::{bail, Context};
use uuid::Uuid;
use wb_review::{JsonlChangeStore, JsonlEventLog, PendingChange, ReviewQueue};
use wb_vcs::{Repo, StashIndex, SyntheticStash, VcsOrchestrator};
use wb_workspace::{JsonFilePersistence, RepoFactory, Workspace, WorkspaceStore};

use crate::config::{StateLayout, WorkbenchConfig};

pub struct Workbench {
    pub layout: StateLayout,
    pub config: WorkbenchConfig,
    pub workspaces: Arc<WorkspaceStore>,
    pub vcs: Arc<VcsOrchestrator>,
    pub queue: ReviewQueue,
    stash: Arc<SyntheticStash>,
}

impl Workbench {
    pub fn open(layout: StateLayout) -> anyhow::Result<Self> {
        let config = WorkbenchConfig::load_or_default(&layout.config_file);

        let persistence = Arc::new(
            JsonFilePersistence::new(&layout.workspaces_dir)
                .context("failed to open the workspace directory")?,
        );
        let vcs_config = config.vcs.clone();
        let factory: RepoFactory = Arc::new(move |id, root| Repo::local(id, root, &vcs_config));
        let workspaces = Arc::new(
            WorkspaceStore::restore(persistence, factory).context("failed to restore workspaces")?,
        );

        let index = StashIndex::load(&layout.stashes_file).context("failed to read the stash index")?;
        let stash = Arc::new(SyntheticStash::with_index(index, &config.vcs));
        let vcs = Arc::new(VcsOrchestrator::with_stash(config.vcs.clone(), stash.clone()));

        let changes = Arc::new(
            JsonlChangeStore::new(&layout.changes_dir).context("failed to open the change log")?,
        );
        let mut queue = ReviewQueue::restore(
            config.review.clone(),
            workspaces.clone(),
            vcs.clone(),
            changes,
        )
        .context("failed to restore the review queue")?;
        queue.add_sink(Box::new(JsonlEventLog::new(&layout.events_log)));

        Ok(Self {
            layout,
            config,
            workspaces,
            vcs,
            queue,
            stash,
        })
    }

    /// Write the stash index back to disk.
    pub fn save_stashes(&self) -> anyhow::Result<()> {
        self.stash
            .index_snapshot()?
            .save(&self.layout.stashes_file)
            .context("failed to write the stash index")
    }

    /// The workspace named by `prefix`, or the active one.
    pub fn workspace(&self, prefix: Option<&str>) -> anyhow::Result<Workspace> {
        match prefix {
            Some(prefix) => {
                let all = self.workspaces.list()?;
                let id = resolve_prefix(
                    "workspace",
                    prefix,
                    all.iter().map(|w| (w.id.to_string(), w.id)),
                )?;
                Ok(self.workspaces.get(id)?)
            }
            None => self
                .workspaces
                .active_workspace()?
                .context("no active workspace; run `wb open <path>` first"),
        }
    }

    /// A change in `workspace_id` named by a unique id prefix.
    pub fn change(&self, workspace_id: Uuid, prefix: &str) -> anyhow::Result<PendingChange> {
        let all = self.queue.list(workspace_id)?;
        let id = resolve_prefix("change", prefix, all.iter().map(|c| (c.id.to_string(), c.id)))?;
        Ok(self.queue.get(id)?)
    }
}

/// Find the single candidate whose key starts with `prefix`.
pub fn resolve_prefix<T>(
    what: &str,
    prefix: &str,
    candidates: impl IntoIterator<Item = (String, T)>,
) -> anyhow::Result<T> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        bail!("empty {} id", what);
    }
    let mut matches: Vec<(String, T)> = candidates
        .into_iter()
        .filter(|(key, _)| key.starts_with(prefix))
        .collect();
    match matches.len() {
        0 => bail!("no {} matches '{}'", what, prefix),
        1 => Ok(matches.remove(0).1),
        n => bail!(
            "'{}' is ambiguous: {} {}s match ({})",
            prefix,
            n,
            what,
            matches
                .iter()
                .map(|(key, _)| short(key))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// First eight characters of an id, for tables.
pub fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_must_be_unique() {
        let candidates = || vec![("abc123".to_string(), 1), ("abd456".to_string(), 2)];
        assert_eq!(resolve_prefix("change", "abc", candidates()).unwrap(), 1);
        assert_eq!(resolve_prefix("change", "abd456", candidates()).unwrap(), 2);

        let err = resolve_prefix("change", "ab", candidates()).unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
        assert!(resolve_prefix("change", "zz", candidates()).is_err());
        assert!(resolve_prefix("change", " ", candidates()).is_err());
    }

    #[test]
    fn short_ids_never_panic() {
        assert_eq!(short("0123456789"), "01234567");
        assert_eq!(short("abc"), "abc");
    }
}
