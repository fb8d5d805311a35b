//! Error type shared by the store, registries and request cache

use thiserror::Error;

/// Errors raised by bit operations.
///
/// Missing data is never an error: absent paths and empty global slots
/// resolve to `None`. These variants cover the cases a caller asked to be
/// strict about.
#[derive(Debug, Error)]
pub enum BitError {
    #[error("action not registered: {0}")]
    ActionNotRegistered(String),

    #[error("action argument {index} is missing")]
    MissingArgument { index: usize },

    #[error("action argument {index} has the wrong shape: {source}")]
    InvalidArgument {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot write `{path}`: `{blocked_at}` holds a non-container value")]
    NotAContainer { path: String, blocked_at: String },

    #[error("cannot write `{path}`: index {index} is too far past the end of `{at}`")]
    IndexTooFar {
        path: String,
        at: String,
        index: usize,
    },

    #[error("global `{0}` is already registered")]
    AlreadyRegistered(&'static str),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

/// Result alias used across bit.
pub type Result<T> = std::result::Result<T, BitError>;
