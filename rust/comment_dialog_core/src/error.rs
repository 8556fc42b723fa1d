//! Error types for the editor, the stores and the configuration layer.

use thiserror::Error;

/// A failed round-trip while saving, destroying or loading a comment.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("{0}")]
    Server(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("comment is not attached to a review")]
    Unattached,
}

/// A failed listing request while gathering link candidates.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("{0}")]
    Server(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// A required condition for an editor operation did not hold.
///
/// These are caller bugs: the UI layer must never offer the action while the
/// matching capability flag is false.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum Precondition {
    #[error("no comment is bound to the editor")]
    NoComment,
    #[error("editing is not permitted")]
    CannotEdit,
    #[error("the comment cannot be saved in its current state")]
    CannotSave,
    #[error("the comment cannot be deleted in its current state")]
    CannotDelete,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EditorError {
    #[error("precondition violated: {0}")]
    Precondition(#[from] Precondition),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("server base_url must not be empty")]
    MissingBaseUrl,
}

pub type Result<T, E = EditorError> = std::result::Result<T, E>;
