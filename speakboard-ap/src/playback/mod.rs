//! Playback management
//!
//! - [`manager`]: the public [`AudioManager`] facade
//! - [`session`]: session tokens and supersession
//! - [`single`]: single-clip player
//! - [`sequence`]: ordered sequence player
//! - [`preload`]: advisory preload cache

pub mod manager;
pub mod preload;
pub mod sequence;
pub mod session;
pub mod single;

pub use manager::{AudioManager, PlayerStatus, SequencePlayback};

use serde::Serialize;

/// How a single-clip playback ended, when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackOutcome {
    /// The clip reached its natural end
    Completed,
    /// A newer playback or `stop_all` took over before the end
    Superseded,
}

/// How a sequence playback ended, when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceOutcome {
    /// Every playable entry reached its natural end
    Completed,
    /// Cancelled by a newer playback or `stop_all`
    Cancelled,
}

/// Progress reported by a sequence before each clip and once at the end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceProgress {
    /// Zero-based index about to play
    Playing(usize),
    /// Nothing from the sequence is playing any more
    Idle,
}

impl SequenceProgress {
    /// Index form used on the wire: the position, or -1 when idle
    pub fn as_index(&self) -> i64 {
        match self {
            SequenceProgress::Playing(index) => *index as i64,
            SequenceProgress::Idle => -1,
        }
    }
}
