//! Event types and broadcast bus
//!
//! The audio player publishes a [`BoardEvent`] for every playback
//! transition. Subscribers (the SSE endpoint, tests) receive all events
//! emitted after they subscribe.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// How a sequence playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceEnd {
    Completed,
    Cancelled,
    Failed,
}

/// Events published by the audio player
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BoardEvent {
    /// A clip passed readiness and rewind and is now audible
    ClipStarted {
        reference: String,
        session: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A clip reached its natural end
    ClipCompleted {
        reference: String,
        session: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A clip failed to load or to start
    ClipFailed {
        reference: String,
        session: u64,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Sequence cursor moved
    ///
    /// `index` is the zero-based position about to play, or -1 once nothing
    /// from the sequence is playing any more.
    SequenceProgress {
        sequence_id: Uuid,
        index: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Sequence playback ended
    SequenceFinished {
        sequence_id: Uuid,
        outcome: SequenceEnd,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// `stop_all` silenced the player
    PlaybackStopped {
        session: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl BoardEvent {
    /// Event name used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            BoardEvent::ClipStarted { .. } => "ClipStarted",
            BoardEvent::ClipCompleted { .. } => "ClipCompleted",
            BoardEvent::ClipFailed { .. } => "ClipFailed",
            BoardEvent::SequenceProgress { .. } => "SequenceProgress",
            BoardEvent::SequenceFinished { .. } => "SequenceFinished",
            BoardEvent::PlaybackStopped { .. } => "PlaybackStopped",
        }
    }
}

/// One-to-many event distribution over `tokio::sync::broadcast`
///
/// Slow subscribers lose the oldest events once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BoardEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: BoardEvent,
    ) -> Result<usize, broadcast::error::SendError<BoardEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: BoardEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
