//! Error types for chime-am
//!
//! Only load failures reach callers of the playback operations. Playback
//! failures on the element backend and engine construction failures are
//! contained and logged by the manager.

use std::sync::Arc;
use thiserror::Error;

/// Main error type for the audio manager
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Fetching raw bytes for a resource failed
    #[error("Fetch failed for {id}: {reason}")]
    Fetch { id: String, reason: String },

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// A resource could not be loaded through any backend.
    ///
    /// The source is shared between every caller that awaited the same
    /// in-flight load.
    #[error("Failed to load {id}: {source}")]
    Load {
        id: String,
        #[source]
        source: Arc<Error>,
    },

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Playback errors on a single element or source
    #[error("Playback error: {0}")]
    Playback(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared chime library
    #[error(transparent)]
    Common(#[from] chime_common::Error),
}

impl Error {
    /// True for errors that represent a failed resource load
    pub fn is_load_failure(&self) -> bool {
        matches!(self, Error::Load { .. })
    }

    pub(crate) fn fetch(id: &str, reason: impl std::fmt::Display) -> Self {
        Error::Fetch {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Convenience Result type using chime-am Error
pub type Result<T> = std::result::Result<T, Error>;
