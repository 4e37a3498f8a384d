// error.rs — Error types for the diff engine.

use thiserror::Error;

/// Errors that can occur while building a diff.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiffError {
    /// Input that cannot be diffed line-by-line (binary content, invalid
    /// UTF-8, or a malformed engine listing).
    #[error("invalid diff input: {0}")]
    InvalidInput(String),
}
