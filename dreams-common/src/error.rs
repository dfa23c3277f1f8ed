//! Common error types for Dreams

use crate::catalog::ClipId;
use thiserror::Error;

/// Common result type for Dreams operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types shared by the player and the stream daemon
#[derive(Error, Debug)]
pub enum Error {
    /// Clip audio failed to load or decode; that clip's start attempt aborts
    #[error("Asset unavailable for clip {clip}: {reason}")]
    AssetUnavailable { clip: ClipId, reason: String },

    /// Selection candidate set was empty
    #[error("No clip available for selection (catalog too small)")]
    EmptyCatalog,

    /// Mix/encode collaborator failure (served stream only)
    #[error("Encode error: {0}")]
    Encode(String),

    /// Play-count store read/write failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an `AssetUnavailable` error for a clip
    pub fn asset_unavailable(clip: ClipId, reason: impl Into<String>) -> Self {
        Error::AssetUnavailable {
            clip,
            reason: reason.into(),
        }
    }
}
