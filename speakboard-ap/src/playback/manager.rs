//! Audio manager
//!
//! Owns the active session, the preload cache and the media resolver, and
//! exposes the four operations the board uses: `play_single`,
//! `play_sequence`, `preload` and `stop_all`.
//!
//! Both play operations claim the session when they are *called*, not when
//! the returned future is first polled, so the most recent call always
//! wins even if older futures have not started running yet.

use super::preload::{self, PreloadCache};
use super::sequence::{self, Reporter, SequenceState};
use super::session::{ActiveSession, SessionToken};
use super::single;
use super::{PlaybackOutcome, SequenceOutcome, SequenceProgress};
use crate::config::PlaybackSettings;
use crate::error::PlaybackError;
use crate::media::{ClipReference, MediaResolver};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use speakboard_common::{BoardEvent, EventBus};
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

/// State shared by the manager and its in-flight playbacks
pub(crate) struct Shared {
    pub(crate) resolver: Arc<dyn MediaResolver>,
    pub(crate) session: ActiveSession,
    pub(crate) cache: Arc<PreloadCache>,
    pub(crate) events: EventBus,
    pub(crate) settings: PlaybackSettings,
}

impl Shared {
    /// Take over the output for a new playback
    fn claim(&self) -> SessionToken {
        let token = self.session.claim();
        self.resolver.silence();
        debug!("Session {} claimed", token);
        token
    }
}

/// A claimed session, marked finished when dropped
///
/// Travels inside the `play_single` future so the session is settled
/// even when the caller drops the future before it completes.
struct ClaimGuard {
    shared: Arc<Shared>,
    token: SessionToken,
}

impl ClaimGuard {
    fn claim(shared: &Arc<Shared>) -> Self {
        Self {
            token: shared.claim(),
            shared: Arc::clone(shared),
        }
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.shared.session.finish(self.token);
    }
}

/// Snapshot returned by [`AudioManager::status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerStatus {
    pub playing: bool,
    pub current_reference: Option<String>,
    pub session: u64,
    pub preloaded: usize,
}

/// A started sequence playback
///
/// Await it (it implements `IntoFuture`) to learn how the sequence ended.
/// The session is already claimed when this value exists.
pub struct SequencePlayback {
    id: Uuid,
    run: BoxFuture<'static, Result<SequenceOutcome, PlaybackError>>,
}

impl SequencePlayback {
    /// Id carried by this sequence's events
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl IntoFuture for SequencePlayback {
    type Output = Result<SequenceOutcome, PlaybackError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        self.run
    }
}

/// Playback manager with at most one active playback
///
/// Dropping the manager stops everything, so tearing down the host that
/// owns it never leaves audio playing.
pub struct AudioManager {
    shared: Arc<Shared>,
}

impl AudioManager {
    pub fn new(resolver: Arc<dyn MediaResolver>, settings: PlaybackSettings, events: EventBus) -> Self {
        info!(
            "Audio manager ready (readiness timeout {}ms, gap {}ms, {:?})",
            settings.readiness_timeout.as_millis(),
            settings.inter_clip_gap.as_millis(),
            settings.failure_policy
        );
        Self {
            shared: Arc::new(Shared {
                resolver,
                session: ActiveSession::new(),
                cache: Arc::new(PreloadCache::new()),
                events,
                settings,
            }),
        }
    }

    /// Play one clip to its natural end.
    ///
    /// An empty reference fails with `InvalidReference` and leaves the
    /// current playback alone. Otherwise the current playback is stopped at
    /// once, even when it is the same clip, and the returned future resolves
    /// when this clip ends, fails, or is superseded.
    pub fn play_single(
        &self,
        reference: impl Into<String>,
    ) -> impl Future<Output = Result<PlaybackOutcome, PlaybackError>> + Send + 'static {
        let claimed = ClipReference::new(reference).map(|r| (ClaimGuard::claim(&self.shared), r));

        async move {
            let (claim, reference) = claimed?;
            single::play_clip(&claim.shared, claim.token, reference).await
        }
    }

    /// Play clips in order, reporting the index about to play and finally
    /// `SequenceProgress::Idle`.
    ///
    /// Empty entries are skipped but keep their index. An empty list is a
    /// no-op. A later `play_single`, `play_sequence` or `stop_all` cancels
    /// the sequence, which then resolves to `SequenceOutcome::Cancelled`.
    pub fn play_sequence<I, S, F>(&self, references: I, on_progress: F) -> SequencePlayback
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnMut(SequenceProgress) + Send + 'static,
    {
        let id = Uuid::new_v4();
        let state = SequenceState::new(id, references);

        if state.is_empty() {
            return SequencePlayback {
                id,
                run: async { Ok(SequenceOutcome::Completed) }.boxed(),
            };
        }

        let token = self.shared.claim();
        let reporter = Reporter::new(Arc::clone(&self.shared), token, id, on_progress);
        SequencePlayback {
            id,
            run: sequence::play_sequence(reporter, state).boxed(),
        }
    }

    /// Warm a clip in the background. Repeated calls are no-ops and
    /// failures are only logged. A warm-up is bounded by the readiness
    /// timeout.
    pub fn preload(&self, reference: impl Into<String>) {
        if let Ok(reference) = ClipReference::new(reference) {
            preload::spawn_warm(
                Arc::clone(&self.shared.cache),
                Arc::clone(&self.shared.resolver),
                reference,
                self.shared.settings.readiness_timeout,
            );
        }
    }

    /// Warm every clip of a category
    pub fn preload_all<I, S>(&self, references: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for reference in references {
            self.preload(reference);
        }
    }

    pub fn is_warm(&self, reference: &str) -> bool {
        ClipReference::new(reference)
            .map(|r| self.shared.cache.is_warm(&r))
            .unwrap_or(false)
    }

    pub fn preloaded_count(&self) -> usize {
        self.shared.cache.warm_count()
    }

    /// Stop everything. Safe to call at any time, including when idle.
    pub fn stop_all(&self) {
        let token = self.shared.session.invalidate();
        self.shared.resolver.silence();
        self.shared.events.emit_lossy(BoardEvent::PlaybackStopped {
            session: token,
            timestamp: chrono::Utc::now(),
        });
        debug!("Stopped all playback (session {})", token);
    }

    pub fn is_playing(&self) -> bool {
        self.shared.session.is_playing()
    }

    pub fn status(&self) -> PlayerStatus {
        let (playing, current, session) = self.shared.session.snapshot();
        PlayerStatus {
            playing,
            current_reference: current.map(|r| r.to_string()),
            session,
            preloaded: self.shared.cache.warm_count(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<BoardEvent> {
        self.shared.events.subscribe()
    }
}

impl Drop for AudioManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}
