//! Error types for the client runtime.

use storysync_engine::DocumentId;

/// Failures talking to the remote store.
///
/// A rejected save is not an error; it comes back as a conflict response.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("document not found: {0}")]
    NotFound(DocumentId),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("remote unavailable")]
    Unavailable,

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("invalid remote url: {0}")]
    InvalidUrl(String),

    #[error("engine error: {0}")]
    Engine(#[from] storysync_engine::Error),
}

/// Errors surfaced to the host of a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session closed")]
    Closed,

    #[error(transparent)]
    Engine(#[from] storysync_engine::Error),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Result type alias for remote calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
