//! Single-clip player
//!
//! Drives one [`MediaHandle`] through ready → rewind → start → finished.
//! After every suspension point the captured session token is re-checked;
//! a stale token abandons the attempt silently.

use super::manager::Shared;
use super::session::{self, SessionToken};
use super::PlaybackOutcome;
use crate::error::PlaybackError;
use crate::media::{ClipReference, MediaHandle};
use speakboard_common::BoardEvent;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Releases the handle on every exit path, including cancellation
struct HandleGuard(Box<dyn MediaHandle>);

impl Deref for HandleGuard {
    type Target = dyn MediaHandle;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl DerefMut for HandleGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.0
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Await `step` unless the session moves on first.
///
/// `None` means superseded, whether it happened while waiting or at the
/// moment `step` completed.
async fn unless_superseded<F: Future>(
    shared: &Shared,
    watcher: &mut watch::Receiver<SessionToken>,
    token: SessionToken,
    step: F,
) -> Option<F::Output> {
    let output = tokio::select! {
        biased;
        _ = session::superseded(watcher, token) => return None,
        output = step => output,
    };
    shared.session.is_current(token).then_some(output)
}

enum Step {
    Load,
    Start,
}

fn fail(
    shared: &Shared,
    token: SessionToken,
    reference: &ClipReference,
    step: Step,
    reason: String,
) -> PlaybackError {
    let error = match step {
        Step::Load => PlaybackError::MediaLoad {
            reference: reference.to_string(),
            reason,
        },
        Step::Start => PlaybackError::PlaybackStart {
            reference: reference.to_string(),
            reason,
        },
    };
    warn!("{}", error);
    shared.events.emit_lossy(BoardEvent::ClipFailed {
        reference: reference.to_string(),
        session: token,
        error: error.to_string(),
        timestamp: chrono::Utc::now(),
    });
    error
}

/// Play `reference` to its natural end under session `token`.
///
/// The caller has already claimed `token`. Session bookkeeping beyond the
/// current clip (the playing flag) is left to the caller.
pub(crate) async fn play_clip(
    shared: &Shared,
    token: SessionToken,
    reference: ClipReference,
) -> Result<PlaybackOutcome, PlaybackError> {
    if !shared.session.is_current(token) {
        debug!("{:?} superseded before opening", reference);
        return Ok(PlaybackOutcome::Superseded);
    }

    let mut watcher = shared.session.watcher();
    let warmed = shared.cache.get(&reference);
    if warmed.is_some() {
        debug!("{:?} starting from preload cache", reference);
    }
    let mut handle = HandleGuard(shared.resolver.open(&reference, warmed));

    // Readiness, bounded
    let timeout = shared.settings.readiness_timeout;
    match unless_superseded(
        shared,
        &mut watcher,
        token,
        tokio::time::timeout(timeout, handle.ready()),
    )
    .await
    {
        None => return Ok(abandoned(&reference)),
        Some(Err(_elapsed)) => {
            return Err(fail(
                shared,
                token,
                &reference,
                Step::Load,
                format!("not ready within {}ms", timeout.as_millis()),
            ));
        }
        Some(Ok(Err(e))) => return Err(fail(shared, token, &reference, Step::Load, e.to_string())),
        Some(Ok(Ok(()))) => debug!("{:?} ready", reference),
    }

    // Seek to zero must be acknowledged before play is issued
    match unless_superseded(shared, &mut watcher, token, handle.rewind()).await {
        None => return Ok(abandoned(&reference)),
        Some(Err(e)) => return Err(fail(shared, token, &reference, Step::Load, e.to_string())),
        Some(Ok(())) => {}
    }

    match unless_superseded(shared, &mut watcher, token, handle.start()).await {
        None => return Ok(abandoned(&reference)),
        Some(Err(e)) => return Err(fail(shared, token, &reference, Step::Start, e.to_string())),
        Some(Ok(())) => {}
    }

    shared.session.set_current(token, Some(reference.clone()));
    shared.events.emit_lossy(BoardEvent::ClipStarted {
        reference: reference.to_string(),
        session: token,
        timestamp: chrono::Utc::now(),
    });
    debug!("{:?} playing", reference);

    match unless_superseded(shared, &mut watcher, token, handle.finished()).await {
        None => Ok(abandoned(&reference)),
        Some(Err(e)) => {
            shared.session.set_current(token, None);
            Err(fail(shared, token, &reference, Step::Load, e.to_string()))
        }
        Some(Ok(())) => {
            shared.session.set_current(token, None);
            shared.events.emit_lossy(BoardEvent::ClipCompleted {
                reference: reference.to_string(),
                session: token,
                timestamp: chrono::Utc::now(),
            });
            debug!("{:?} completed", reference);
            Ok(PlaybackOutcome::Completed)
        }
    }
}

fn abandoned(reference: &ClipReference) -> PlaybackOutcome {
    debug!("{:?} superseded", reference);
    PlaybackOutcome::Superseded
}
