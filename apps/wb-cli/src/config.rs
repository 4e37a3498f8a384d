// config.rs — State directory layout and `config.toml`.
//
// Everything the CLI keeps between runs lives under one state directory:
//
//   <state>/config.toml     settings (optional)
//   <state>/workspaces/     one JSON file per workspace + active.json
//   <state>/changes/        one JSONL change log per workspace
//   <state>/stashes.json    stash index
//   <state>/events.jsonl    review event log

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use wb_review::ReviewConfig;
use wb_vcs::VcsConfig;

/// Environment variable naming the state directory.
pub const STATE_DIR_ENV: &str = "WB_STATE_DIR";

/// Top-level settings from `<state>/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkbenchConfig {
    #[serde(default)]
    pub vcs: VcsConfig,

    #[serde(default)]
    pub review: ReviewConfig,
}

impl WorkbenchConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load the config, falling back to defaults when the file is missing.
    /// A file that exists but doesn't parse is reported and ignored.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("ignoring unreadable config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Paths under the state directory.
#[derive(Debug, Clone)]
pub struct StateLayout {
    pub root: PathBuf,
    pub config_file: PathBuf,
    pub workspaces_dir: PathBuf,
    pub changes_dir: PathBuf,
    pub stashes_file: PathBuf,
    pub events_log: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            config_file: root.join("config.toml"),
            workspaces_dir: root.join("workspaces"),
            changes_dir: root.join("changes"),
            stashes_file: root.join("stashes.json"),
            events_log: root.join("events.jsonl"),
            root,
        }
    }

    /// `--state-dir`, else `$WB_STATE_DIR`, else `~/.wb`.
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(dir) = explicit {
            return Ok(Self::new(dir));
        }
        if let Some(dir) = std::env::var_os(STATE_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(Self::new(PathBuf::from(dir)));
        }
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .ok_or_else(|| {
                anyhow::anyhow!("cannot find a home directory; pass --state-dir or set {}", STATE_DIR_ENV)
            })?;
        Ok(Self::new(PathBuf::from(home).join(".wb")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wb_review::DuplicatePolicy;

    #[test]
    fn missing_file_gives_defaults() {
        let config = WorkbenchConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.vcs.git_binary, "git");
        assert!(config.review.stage_on_accept);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[vcs]\nlog_depth = 5\n\n[vcs.identity]\nname = \"Bot\"\nemail = \"bot@example.com\"\n\n[review]\nduplicate_policy = \"supersede\"\n",
        )
        .unwrap();

        let config = WorkbenchConfig::load_or_default(&path);
        assert_eq!(config.vcs.log_depth, 5);
        assert_eq!(config.vcs.git_binary, "git");
        assert_eq!(config.vcs.identity.unwrap().name, "Bot");
        assert_eq!(config.review.duplicate_policy, DuplicatePolicy::Supersede);
    }

    #[test]
    fn broken_toml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[vcs\nlog_depth = ").unwrap();
        assert_eq!(WorkbenchConfig::load_or_default(&path).vcs.log_depth, 20);
    }

    #[test]
    fn layout_places_files_under_root() {
        let layout = StateLayout::new("/tmp/wb-state");
        assert_eq!(layout.workspaces_dir, PathBuf::from("/tmp/wb-state/workspaces"));
        assert_eq!(layout.stashes_file, PathBuf::from("/tmp/wb-state/stashes.json"));
        assert_eq!(
            StateLayout::resolve(Some(Path::new("/x"))).unwrap().root,
            PathBuf::from("/x")
        );
    }
}
