//! VCS configuration structures

use serde::{Deserialize, Serialize};

/// Settings for the git-backed engine and the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcsConfig {
    /// Path or name of the git executable
    #[serde(default = "default_git_binary")]
    pub git_binary: String,

    /// Number of commits kept in a workspace's snapshot
    #[serde(default = "default_log_depth")]
    pub log_depth: usize,

    /// Author/committer for commits the orchestrator creates.
    /// Falls back to the repository's own git config when unset.
    #[serde(default)]
    pub identity: Option<GitIdentity>,

    /// Prefix of the default stash message ("WIP on main: ...")
    #[serde(default = "default_stash_message_prefix")]
    pub stash_message_prefix: String,
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            git_binary: default_git_binary(),
            log_depth: default_log_depth(),
            identity: None,
            stash_message_prefix: default_stash_message_prefix(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

// Serde default functions
fn default_git_binary() -> String {
    "git".to_string()
}

fn default_log_depth() -> usize {
    20
}

fn default_stash_message_prefix() -> String {
    "WIP on".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: VcsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.git_binary, "git");
        assert_eq!(config.log_depth, 20);
        assert!(config.identity.is_none());
        assert_eq!(config.stash_message_prefix, "WIP on");
    }
}
