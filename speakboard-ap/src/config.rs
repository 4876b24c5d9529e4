//! speakboard-ap specific configuration

use speakboard_common::config::{
    PlayerConfig, DEFAULT_INTER_CLIP_GAP_MS, DEFAULT_READINESS_TIMEOUT_MS,
};
use speakboard_common::FailurePolicy;
use std::time::Duration;

/// Knobs the playback manager reads on every call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSettings {
    /// Bound on waiting for a clip to become playable
    pub readiness_timeout: Duration,
    /// Pause inserted between two clips of a sequence
    pub inter_clip_gap: Duration,
    /// What a sequence does when a clip fails
    pub failure_policy: FailurePolicy,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            readiness_timeout: Duration::from_millis(DEFAULT_READINESS_TIMEOUT_MS),
            inter_clip_gap: Duration::from_millis(DEFAULT_INTER_CLIP_GAP_MS),
            failure_policy: FailurePolicy::FailFast,
        }
    }
}

impl From<&PlayerConfig> for PlaybackSettings {
    fn from(config: &PlayerConfig) -> Self {
        Self {
            readiness_timeout: config.readiness_timeout,
            inter_clip_gap: config.inter_clip_gap,
            failure_policy: config.failure_policy,
        }
    }
}
