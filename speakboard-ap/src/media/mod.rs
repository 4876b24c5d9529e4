//! Media layer: clip references, media handles and resolvers
//!
//! The playback manager only talks to [`MediaResolver`] and
//! [`MediaHandle`]. Media events (ready, rewound, ended, error) are exposed
//! as awaitable operations so the players read as straight-line code.
//!
//! The production resolver is [`device::DeviceResolver`]:
//! - [`source`]: reference → encoded bytes (data URI, HTTP, file)
//! - [`decode`]: encoded bytes → interleaved stereo f32 at the output rate
//! - [`output`]: single-voice cpal output stream

pub mod decode;
pub mod device;
pub mod output;
pub mod source;

use crate::error::PlaybackError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Opaque identifier for a playable clip (URL, path or data URI)
///
/// Equality is by string identity. Cloning is cheap.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ClipReference(Arc<str>);

impl ClipReference {
    /// Wrap a reference, rejecting empty or whitespace-only strings
    pub fn new(reference: impl Into<String>) -> Result<Self, PlaybackError> {
        let reference = reference.into();
        if reference.trim().is_empty() {
            return Err(PlaybackError::InvalidReference(reference));
        }
        Ok(Self(Arc::from(reference)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClipReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ClipReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Embedded data URIs can be hundreds of kilobytes
        if self.0.len() > 64 {
            let cut = self
                .0
                .char_indices()
                .map(|(i, _)| i)
                .take_while(|&i| i <= 48)
                .last()
                .unwrap_or(0);
            write!(f, "ClipReference({:?}… {} bytes)", &self.0[..cut], self.0.len())
        } else {
            write!(f, "ClipReference({:?})", &*self.0)
        }
    }
}

/// Fully decoded clip, interleaved stereo f32
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClip {
    /// Interleaved stereo samples [L, R, L, R, ...]
    pub samples: Vec<f32>,
    /// Sample rate of `samples`
    pub sample_rate: u32,
}

impl DecodedClip {
    /// Number of stereo frames
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Failure reported by a media handle or resolver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct MediaError(pub String);

impl MediaError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// One attempt to play one clip
///
/// Handles are single-use. The single-clip player drives them strictly in
/// the order `ready` → `rewind` → `start` → `finished` and calls `release`
/// on every exit path. `release` must be idempotent and must silence the
/// handle if it is audible.
#[async_trait]
pub trait MediaHandle: Send {
    /// Reference this handle was opened for
    fn reference(&self) -> &ClipReference;

    /// Resolves once the clip can start (loaded and decoded)
    async fn ready(&mut self) -> Result<(), MediaError>;

    /// Seek to position zero; resolves once the seek is acknowledged
    async fn rewind(&mut self) -> Result<(), MediaError>;

    /// Begin playback. An error means the output refused to start.
    async fn start(&mut self) -> Result<(), MediaError>;

    /// Resolves when playback reaches its natural end
    async fn finished(&mut self) -> Result<(), MediaError>;

    /// Detach from the output and free resources
    fn release(&mut self);
}

/// Platform media subsystem consumed by the playback manager
#[async_trait]
pub trait MediaResolver: Send + Sync + 'static {
    /// Acquire a fresh handle for `reference`.
    ///
    /// Loading may begin in the background; `warmed` carries a clip the
    /// preload cache already decoded.
    fn open(
        &self,
        reference: &ClipReference,
        warmed: Option<Arc<DecodedClip>>,
    ) -> Box<dyn MediaHandle>;

    /// Fetch and decode a clip for the preload cache
    async fn fetch(&self, reference: &ClipReference) -> Result<Arc<DecodedClip>, MediaError>;

    /// Silence whatever is audible right now
    fn silence(&self) {}
}
