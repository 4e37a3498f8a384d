//! Review queue configuration

use serde::{Deserialize, Serialize};

/// What `propose` does when the path already has a pending change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Refuse the new proposal.
    #[default]
    Reject,
    /// Close the earlier change as rejected and queue the new one.
    Supersede,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Default policy when a proposal doesn't name one
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,

    /// Stage the path in the index after an accepted write
    #[serde(default = "default_stage_on_accept")]
    pub stage_on_accept: bool,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::default(),
            stage_on_accept: default_stage_on_accept(),
        }
    }
}

fn default_stage_on_accept() -> bool {
    true
}
