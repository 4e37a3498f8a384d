// change.rs — ProposedChange and PendingChange, the unit of review.
//
// Every mutation source (a human save, a merge resolution, an agent edit)
// produces a ProposedChange. The queue turns it into a PendingChange, which
// ends accepted or rejected. Content is hashed at proposal time so a record
// read back from disk can be checked before it is written through.

use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use wb_diff::{compute_diff, DiffError, DiffLine};

use crate::error::ReviewError;

/// Where a change came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeOrigin {
    /// A person edited and saved the file.
    Human,
    /// A resolved merge conflict.
    Merge { branch: String },
    /// An automated code-generation agent.
    Agent { agent_id: String },
}

impl fmt::Display for ChangeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeOrigin::Human => write!(f, "human"),
            ChangeOrigin::Merge { branch } => write!(f, "merge:{}", branch),
            ChangeOrigin::Agent { agent_id } => write!(f, "agent:{}", agent_id),
        }
    }
}

/// Parses `human`, `merge:<branch>` or `agent:<id>`.
impl FromStr for ChangeOrigin {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, detail) = match s.split_once(':') {
            Some((kind, detail)) => (kind, Some(detail)),
            None => (s, None),
        };
        match (kind, detail) {
            ("human", None) => Ok(ChangeOrigin::Human),
            ("merge", Some(branch)) if !branch.is_empty() => Ok(ChangeOrigin::Merge {
                branch: branch.to_string(),
            }),
            ("agent", Some(id)) if !id.is_empty() => Ok(ChangeOrigin::Agent {
                agent_id: id.to_string(),
            }),
            _ => Err(ReviewError::InvalidChange(format!(
                "unknown origin '{}' (expected human, merge:<branch> or agent:<id>)",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Create,
    Modify,
    Delete,
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeOperation::Create => write!(f, "create"),
            ChangeOperation::Modify => write!(f, "modify"),
            ChangeOperation::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Pending,
    Accepted,
    Rejected,
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeStatus::Pending => write!(f, "pending"),
            ChangeStatus::Accepted => write!(f, "accepted"),
            ChangeStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// A mutation offered for review, not yet queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedChange {
    pub workspace_id: Uuid,
    pub origin: ChangeOrigin,
    pub operation: ChangeOperation,
    /// Path relative to the workspace root, `/`-separated.
    pub file_path: String,
    pub before_content: Option<String>,
    pub after_content: Option<String>,
}

impl ProposedChange {
    /// Build a proposal, checking that before/after fit the operation.
    pub fn new(
        workspace_id: Uuid,
        origin: ChangeOrigin,
        operation: ChangeOperation,
        file_path: impl Into<String>,
        before_content: Option<String>,
        after_content: Option<String>,
    ) -> Result<Self, ReviewError> {
        let change = Self {
            workspace_id,
            origin,
            operation,
            file_path: file_path.into(),
            before_content,
            after_content,
        };
        change.validate()?;
        Ok(change)
    }

    pub fn create(
        workspace_id: Uuid,
        origin: ChangeOrigin,
        file_path: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Self, ReviewError> {
        Self::new(
            workspace_id,
            origin,
            ChangeOperation::Create,
            file_path,
            None,
            Some(content.into()),
        )
    }

    pub fn modify(
        workspace_id: Uuid,
        origin: ChangeOrigin,
        file_path: impl Into<String>,
        before: impl Into<String>,
        after: impl Into<String>,
    ) -> Result<Self, ReviewError> {
        Self::new(
            workspace_id,
            origin,
            ChangeOperation::Modify,
            file_path,
            Some(before.into()),
            Some(after.into()),
        )
    }

    pub fn delete(
        workspace_id: Uuid,
        origin: ChangeOrigin,
        file_path: impl Into<String>,
        before: impl Into<String>,
    ) -> Result<Self, ReviewError> {
        Self::new(
            workspace_id,
            origin,
            ChangeOperation::Delete,
            file_path,
            Some(before.into()),
            None,
        )
    }

    pub fn validate(&self) -> Result<(), ReviewError> {
        validate_path(&self.file_path)?;
        let shape_ok = match self.operation {
            ChangeOperation::Create => {
                self.before_content.is_none() && self.after_content.is_some()
            }
            ChangeOperation::Modify => {
                self.before_content.is_some() && self.after_content.is_some()
            }
            ChangeOperation::Delete => {
                self.before_content.is_some() && self.after_content.is_none()
            }
        };
        if !shape_ok {
            return Err(ReviewError::InvalidChange(format!(
                "{} of {} needs {}",
                self.operation,
                self.file_path,
                match self.operation {
                    ChangeOperation::Create => "after content and no before content",
                    ChangeOperation::Modify => "both before and after content",
                    ChangeOperation::Delete => "before content and no after content",
                }
            )));
        }
        Ok(())
    }
}

fn validate_path(path: &str) -> Result<(), ReviewError> {
    if path.is_empty() || path.contains('\0') {
        return Err(ReviewError::InvalidChange(format!("unusable path {:?}", path)));
    }
    let escapes = Path::new(path)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(ReviewError::InvalidChange(format!(
            "path must stay inside the workspace: {}",
            path
        )));
    }
    Ok(())
}

/// A queued change and its review state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub origin: ChangeOrigin,
    pub operation: ChangeOperation,
    pub file_path: String,
    #[serde(default)]
    pub before_content: Option<String>,
    #[serde(default)]
    pub after_content: Option<String>,
    pub status: ChangeStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
    /// Why it was rejected, e.g. "superseded by <id>".
    #[serde(default)]
    pub resolution_note: Option<String>,
    /// SHA-256 over before/after content.
    pub content_hash: String,
}

impl PendingChange {
    pub fn from_proposal(proposal: ProposedChange, now: DateTime<Utc>) -> Self {
        let content_hash =
            compute_content_hash(&proposal.before_content, &proposal.after_content);
        Self {
            id: Uuid::new_v4(),
            workspace_id: proposal.workspace_id,
            origin: proposal.origin,
            operation: proposal.operation,
            file_path: proposal.file_path,
            before_content: proposal.before_content,
            after_content: proposal.after_content,
            status: ChangeStatus::Pending,
            created_at: now,
            decided_at: None,
            resolution_note: None,
            content_hash,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ChangeStatus::Pending
    }

    pub fn verify_hash(&self) -> bool {
        self.content_hash == compute_content_hash(&self.before_content, &self.after_content)
    }

    /// Replace the after content, keeping the hash in step.
    pub(crate) fn set_after(&mut self, after: String) {
        self.after_content = Some(after);
        self.content_hash = compute_content_hash(&self.before_content, &self.after_content);
    }

    pub(crate) fn decide(&mut self, status: ChangeStatus, note: Option<String>, now: DateTime<Utc>) {
        self.status = status;
        self.decided_at = Some(now);
        self.resolution_note = note;
    }

    /// Line diff of before vs after. A missing side diffs as empty.
    pub fn diff(&self) -> Result<Vec<DiffLine>, DiffError> {
        compute_diff(
            self.before_content.as_deref().unwrap_or(""),
            self.after_content.as_deref().unwrap_or(""),
        )
    }
}

fn compute_content_hash(before: &Option<String>, after: &Option<String>) -> String {
    let mut hasher = Sha256::new();
    for side in [before, after] {
        match side {
            Some(content) => {
                hasher.update([1u8]);
                hasher.update((content.len() as u64).to_le_bytes());
                hasher.update(content.as_bytes());
            }
            None => hasher.update([0u8]),
        }
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_enforce_operation_shape() {
        let ws = Uuid::new_v4();
        assert!(ProposedChange::create(ws, ChangeOrigin::Human, "a.txt", "x").is_ok());
        assert!(ProposedChange::delete(ws, ChangeOrigin::Human, "a.txt", "x").is_ok());

        let err = ProposedChange::new(
            ws,
            ChangeOrigin::Human,
            ChangeOperation::Modify,
            "a.txt",
            None,
            Some("x".into()),
        )
        .unwrap_err();
        assert!(matches!(err, ReviewError::InvalidChange(_)));
    }

    #[test]
    fn paths_must_stay_relative() {
        let ws = Uuid::new_v4();
        for bad in ["", "/etc/passwd", "../outside.txt", "a/../../b"] {
            assert!(
                ProposedChange::create(ws, ChangeOrigin::Human, bad, "x").is_err(),
                "accepted {:?}",
                bad
            );
        }
        assert!(ProposedChange::create(ws, ChangeOrigin::Human, "src/./lib.rs", "x").is_ok());
    }

    #[test]
    fn hash_tracks_content() {
        let proposal =
            ProposedChange::modify(Uuid::new_v4(), ChangeOrigin::Human, "a.txt", "1\n", "2\n")
                .unwrap();
        let mut change = PendingChange::from_proposal(proposal, Utc::now());
        assert!(change.verify_hash());

        change.after_content = Some("tampered\n".into());
        assert!(!change.verify_hash());

        change.set_after("3\n".into());
        assert!(change.verify_hash());
    }

    #[test]
    fn create_and_delete_hash_differently() {
        let a = compute_content_hash(&None, &Some("x".into()));
        let b = compute_content_hash(&Some("x".into()), &None);
        assert_ne!(a, b);
    }

    #[test]
    fn origin_parses_and_displays() {
        for text in ["human", "merge:feature", "agent:gpt-coder"] {
            let origin: ChangeOrigin = text.parse().unwrap();
            assert_eq!(origin.to_string(), text);
        }
        assert!("robot".parse::<ChangeOrigin>().is_err());
        assert!("agent:".parse::<ChangeOrigin>().is_err());
    }

    #[test]
    fn origin_serializes_as_tagged_variant() {
        let json = serde_json::to_string(&ChangeOrigin::Agent {
            agent_id: "a1".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"agent","agent_id":"a1"}"#);
    }
}
