//! Error types for the storysync engine.
//!
//! Conflicts and transient failures are outcomes, not errors. Everything here
//! is a contract violation by the caller.

use crate::{DocumentId, Version};
use thiserror::Error;

/// All possible errors from the storysync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("no document loaded")]
    NoDocumentLoaded,

    #[error("no conflict pending")]
    NoConflictPending,

    #[error("a save is already in flight")]
    SaveInFlight,

    #[error("no save in flight")]
    NoSaveInFlight,

    #[error("document mismatch: expected {expected}, got {actual}")]
    DocumentMismatch {
        expected: DocumentId,
        actual: DocumentId,
    },

    #[error("version regression: known {known}, got {actual}")]
    VersionRegression { known: Version, actual: Version },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
