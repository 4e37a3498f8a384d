// events.rs — Review events and sink dispatch.
//
// The queue emits an event after every state transition has been persisted.
// Sinks (the JSONL event log, a host UI) observe; a failing sink is logged
// and never fails the operation that produced the event.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::change::{ChangeOrigin, PendingChange};
use crate::error::ReviewError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ReviewEvent {
    Proposed {
        change_id: Uuid,
        workspace_id: Uuid,
        path: String,
        origin: ChangeOrigin,
        timestamp: DateTime<Utc>,
    },
    Accepted {
        change_id: Uuid,
        workspace_id: Uuid,
        path: String,
        timestamp: DateTime<Utc>,
    },
    Rejected {
        change_id: Uuid,
        workspace_id: Uuid,
        path: String,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Edited {
        change_id: Uuid,
        workspace_id: Uuid,
        path: String,
        timestamp: DateTime<Utc>,
    },
    /// A newer proposal for the same path replaced this change.
    Superseded {
        change_id: Uuid,
        superseded_by: Uuid,
        workspace_id: Uuid,
        path: String,
        timestamp: DateTime<Utc>,
    },
}

impl ReviewEvent {
    pub fn event_type(&self) -> &str {
        match self {
            ReviewEvent::Proposed { .. } => "proposed",
            ReviewEvent::Accepted { .. } => "accepted",
            ReviewEvent::Rejected { .. } => "rejected",
            ReviewEvent::Edited { .. } => "edited",
            ReviewEvent::Superseded { .. } => "superseded",
        }
    }

    pub fn change_id(&self) -> Uuid {
        match self {
            ReviewEvent::Proposed { change_id, .. }
            | ReviewEvent::Accepted { change_id, .. }
            | ReviewEvent::Rejected { change_id, .. }
            | ReviewEvent::Edited { change_id, .. }
            | ReviewEvent::Superseded { change_id, .. } => *change_id,
        }
    }

    pub fn proposed(change: &PendingChange) -> Self {
        ReviewEvent::Proposed {
            change_id: change.id,
            workspace_id: change.workspace_id,
            path: change.file_path.clone(),
            origin: change.origin.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn accepted(change: &PendingChange) -> Self {
        ReviewEvent::Accepted {
            change_id: change.id,
            workspace_id: change.workspace_id,
            path: change.file_path.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn rejected(change: &PendingChange) -> Self {
        ReviewEvent::Rejected {
            change_id: change.id,
            workspace_id: change.workspace_id,
            path: change.file_path.clone(),
            reason: change.resolution_note.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn edited(change: &PendingChange) -> Self {
        ReviewEvent::Edited {
            change_id: change.id,
            workspace_id: change.workspace_id,
            path: change.file_path.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn superseded(change: &PendingChange, by: Uuid) -> Self {
        ReviewEvent::Superseded {
            change_id: change.id,
            superseded_by: by,
            workspace_id: change.workspace_id,
            path: change.file_path.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Receives review events.
pub trait EventSink: Send + Sync {
    /// Handle an event. Errors are logged by the dispatcher.
    fn send(&self, event: &ReviewEvent) -> Result<(), ReviewError>;
}

/// Appends events as JSONL to a file.
pub struct JsonlEventLog {
    path: PathBuf,
}

impl JsonlEventLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl EventSink for JsonlEventLog {
    fn send(&self, event: &ReviewEvent) -> Result<(), ReviewError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ReviewError::IoError {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| ReviewError::IoError {
                path: self.path.display().to_string(),
                source,
            })?;

        let json = serde_json::to_string(event)?;
        writeln!(file, "{}", json).map_err(|source| ReviewError::IoError {
            path: self.path.display().to_string(),
            source,
        })
    }
}

/// Fans events out to every sink.
#[derive(Default)]
pub struct EventDispatcher {
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn dispatch(&self, event: &ReviewEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event) {
                tracing::warn!("review event sink error: {}", e);
            }
        }
    }
}
