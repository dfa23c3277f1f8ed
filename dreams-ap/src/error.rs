//! Error types for dreams-ap
//!
//! Audio-pipeline errors live here; catalog, selection and persistence errors
//! come from `dreams_common` and convert via `Common`.

use thiserror::Error;

/// Main error type for dreams-ap
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Sample rate conversion errors
    #[error("Resample error: {0}")]
    Resample(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Shared-library errors (catalog, selection, persistence, config)
    #[error(transparent)]
    Common(#[from] dreams_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using dreams-ap Error
pub type Result<T> = std::result::Result<T, Error>;
