//! Error types for speakboard-ap
//!
//! [`PlaybackError`] is what playback callers see; [`Error`] covers the
//! service around the manager.

use thiserror::Error;

/// Errors surfaced by `play_single` and `play_sequence`
///
/// Supersession by a newer playback is not an error; it is reported as
/// `PlaybackOutcome::Superseded` instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// Empty or missing clip reference (caller bug, never retried)
    #[error("Invalid clip reference: {0:?}")]
    InvalidReference(String),

    /// Fetch, decode or readiness failure, including readiness timeout
    #[error("Failed to load clip {reference}: {reason}")]
    MediaLoad { reference: String, reason: String },

    /// The output refused to start playback
    #[error("Playback refused for clip {reference}: {reason}")]
    PlaybackStart { reference: String, reason: String },
}

impl PlaybackError {
    /// The offending reference, for diagnostics
    pub fn reference(&self) -> &str {
        match self {
            PlaybackError::InvalidReference(reference)
            | PlaybackError::MediaLoad { reference, .. }
            | PlaybackError::PlaybackStart { reference, .. } => reference,
        }
    }
}

/// Main error type for the speakboard-ap service
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(#[from] speakboard_common::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Playback errors
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// Convenience Result type using speakboard-ap Error
pub type Result<T> = std::result::Result<T, Error>;
