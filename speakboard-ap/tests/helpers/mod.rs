//! Test helper modules for speakboard-ap integration tests
//!
//! - FakeResolver: scripted media with an inspectable event log
//! - Manager construction, progress recording and event draining

#![allow(dead_code)]

pub mod fake_media;

pub use fake_media::{ClipScript, FakeResolver, MediaEvent, Step};

use speakboard_ap::{AudioManager, PlaybackSettings, SequenceProgress};
use speakboard_common::{BoardEvent, EventBus};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub fn manager(media: &FakeResolver) -> AudioManager {
    manager_with(media, PlaybackSettings::default())
}

pub fn manager_with(media: &FakeResolver, settings: PlaybackSettings) -> AudioManager {
    AudioManager::new(Arc::new(media.clone()), settings, EventBus::default())
}

/// Progress indices as reported to the caller (-1 for idle)
pub type ProgressLog = Arc<Mutex<Vec<i64>>>;

pub fn progress_recorder() -> (ProgressLog, impl FnMut(SequenceProgress) + Send + 'static) {
    let log = ProgressLog::default();
    let sink = Arc::clone(&log);
    (log, move |progress: SequenceProgress| {
        sink.lock().unwrap().push(progress.as_index())
    })
}

pub fn progress(log: &ProgressLog) -> Vec<i64> {
    log.lock().unwrap().clone()
}

/// Let spawned tasks run; with a paused clock this advances 1ms
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Everything received so far, without waiting
pub fn drain(events: &mut broadcast::Receiver<BoardEvent>) -> Vec<BoardEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}
