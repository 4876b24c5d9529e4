//! Sequence player
//!
//! Plays a list of clips strictly in order under one session token, so a
//! newer playback or `stop_all` cancels the rest of the list in one step.

use super::manager::Shared;
use super::session::{self, SessionToken};
use super::single::play_clip;
use super::{PlaybackOutcome, SequenceOutcome, SequenceProgress};
use crate::error::PlaybackError;
use crate::media::ClipReference;
use speakboard_common::events::SequenceEnd;
use speakboard_common::{BoardEvent, FailurePolicy};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Ordered clips plus a cursor
///
/// Empty entries keep their index but are never played.
pub(crate) struct SequenceState {
    id: Uuid,
    clips: Vec<Option<ClipReference>>,
    cursor: Option<usize>,
}

impl SequenceState {
    pub(crate) fn new<I, S>(id: Uuid, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            clips: references
                .into_iter()
                .map(|r| ClipReference::new(r).ok())
                .collect(),
            cursor: None,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Move to the next playable clip
    fn advance(&mut self) -> Option<(usize, ClipReference)> {
        let mut index = self.cursor.map_or(0, |i| i + 1);
        while index < self.clips.len() {
            self.cursor = Some(index);
            match &self.clips[index] {
                Some(reference) => return Some((index, reference.clone())),
                None => debug!("Sequence {} skipping empty entry {}", self.id, index),
            }
            index += 1;
        }
        self.cursor = None;
        None
    }
}

/// Reports progress to the caller and the event bus
///
/// Owns the sequence's claim on the session. Dropping it before
/// [`Reporter::finish`] ran (the playback future was dropped) still reports
/// `Idle` and ends the session as cancelled.
pub(crate) struct Reporter<F: FnMut(SequenceProgress)> {
    shared: Arc<Shared>,
    token: SessionToken,
    sequence_id: Uuid,
    on_progress: F,
    finished: bool,
}

impl<F: FnMut(SequenceProgress)> Reporter<F> {
    pub(crate) fn new(
        shared: Arc<Shared>,
        token: SessionToken,
        sequence_id: Uuid,
        on_progress: F,
    ) -> Self {
        Self {
            shared,
            token,
            sequence_id,
            on_progress,
            finished: false,
        }
    }

    fn report(&mut self, progress: SequenceProgress) {
        (self.on_progress)(progress);
        self.shared.events.emit_lossy(BoardEvent::SequenceProgress {
            sequence_id: self.sequence_id,
            index: progress.as_index(),
            timestamp: chrono::Utc::now(),
        });
    }

    fn finish(&mut self, outcome: SequenceEnd) {
        self.finished = true;
        self.report(SequenceProgress::Idle);
        self.shared.session.finish(self.token);
        self.shared.events.emit_lossy(BoardEvent::SequenceFinished {
            sequence_id: self.sequence_id,
            outcome,
            timestamp: chrono::Utc::now(),
        });
    }
}

impl<F: FnMut(SequenceProgress)> Drop for Reporter<F> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Sequence {} dropped before finishing", self.sequence_id);
            self.finish(SequenceEnd::Cancelled);
        }
    }
}

pub(crate) async fn play_sequence<F>(
    mut reporter: Reporter<F>,
    mut state: SequenceState,
) -> Result<SequenceOutcome, PlaybackError>
where
    F: FnMut(SequenceProgress),
{
    let shared = Arc::clone(&reporter.shared);
    let token = reporter.token;
    let gap = shared.settings.inter_clip_gap;
    let mut watcher = shared.session.watcher();
    let mut played_before = false;

    info!("Sequence {} started ({} entries)", state.id, state.clips.len());

    while let Some((index, reference)) = state.advance() {
        if played_before && !gap.is_zero() {
            tokio::select! {
                biased;
                _ = session::superseded(&mut watcher, token) => {}
                _ = tokio::time::sleep(gap) => {}
            }
        }
        if !shared.session.is_current(token) {
            break;
        }

        reporter.report(SequenceProgress::Playing(index));

        match play_clip(&shared, token, reference).await {
            Ok(PlaybackOutcome::Completed) => played_before = true,
            Ok(PlaybackOutcome::Superseded) => break,
            Err(e) => match shared.settings.failure_policy {
                FailurePolicy::FailFast => {
                    warn!("Sequence {} aborted at index {}: {}", state.id, index, e);
                    reporter.finish(SequenceEnd::Failed);
                    return Err(e);
                }
                FailurePolicy::SkipFailed => {
                    warn!("Sequence {} skipping index {}: {}", state.id, index, e);
                    played_before = true;
                }
            },
        }
    }

    if shared.session.is_current(token) {
        info!("Sequence {} completed", state.id);
        reporter.finish(SequenceEnd::Completed);
        Ok(SequenceOutcome::Completed)
    } else {
        info!("Sequence {} cancelled", state.id);
        reporter.finish(SequenceEnd::Cancelled);
        Ok(SequenceOutcome::Cancelled)
    }
}
