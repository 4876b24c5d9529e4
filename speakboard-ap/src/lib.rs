//! # Speakboard Audio Player Library (speakboard-ap)
//!
//! Playback manager for a picture-tile communication board.
//!
//! **Purpose:** Play the clip behind a tapped tile, speak a whole sentence as
//! an ordered clip sequence, warm clips ahead of use, and stop everything on
//! demand, with at most one playback audible at any time.
//!
//! **Architecture:** a session-token [`AudioManager`] over a pluggable
//! [`media::MediaResolver`]; the production resolver fetches clips (data URI,
//! HTTP, file), decodes them with symphonia, resamples with rubato and plays
//! them through a single cpal output stream.

pub mod api;
pub mod config;
pub mod error;
pub mod media;
pub mod playback;

pub use config::PlaybackSettings;
pub use error::{Error, PlaybackError, Result};
pub use media::ClipReference;
pub use playback::{
    AudioManager, PlaybackOutcome, PlayerStatus, SequenceOutcome, SequencePlayback,
    SequenceProgress,
};
