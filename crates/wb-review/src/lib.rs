//! # wb-review
//!
//! Change review queue for workbench.
//!
//! Every file mutation, whether a human save, a merge resolution or an
//! agent's edit, is proposed as a [`ProposedChange`], reviewed as a
//! [`PendingChange`], and only written to the workspace when accepted.
//!
//! ## Key components
//!
//! - [`ReviewQueue`] — propose/accept/reject/edit, batch accept/reject, and
//!   glob selection of pending changes.
//! - [`ChangeStore`] — trait for persisting change records;
//!   [`JsonlChangeStore`] keeps an append-only JSONL log per workspace.
//! - [`ReviewEvent`] / [`EventSink`] — notifications after each transition;
//!   [`JsonlEventLog`] appends them to a file.

pub mod change;
pub mod config;
pub mod error;
pub mod events;
pub mod queue;
pub mod select;
pub mod store;

pub use change::{ChangeOperation, ChangeOrigin, ChangeStatus, PendingChange, ProposedChange};
pub use config::{DuplicatePolicy, ReviewConfig};
pub use error::ReviewError;
pub use events::{EventDispatcher, EventSink, JsonlEventLog, ReviewEvent};
pub use queue::ReviewQueue;
pub use select::PathSelector;
pub use store::{ChangeStore, JsonlChangeStore, MemoryChangeStore};
