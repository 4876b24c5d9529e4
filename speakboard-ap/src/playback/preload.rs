//! Preload cache
//!
//! Advisory map from reference to a decoded clip. An absent entry only
//! means a cold start; it never makes playback fail. Entries are never
//! evicted: the clip set is curated by an operator and small.

use crate::media::{ClipReference, DecodedClip, MediaResolver};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub enum PreloadEntry {
    /// A warm-up task is running
    Loading,
    /// Decoded and ready to start without loading
    Warm(Arc<DecodedClip>),
}

#[derive(Debug, Default)]
pub struct PreloadCache {
    entries: Mutex<HashMap<ClipReference, PreloadEntry>>,
}

impl PreloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ClipReference, PreloadEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserve `reference` for loading. False if it is already loading or warm.
    pub fn begin(&self, reference: &ClipReference) -> bool {
        let mut entries = self.entries();
        if entries.contains_key(reference) {
            return false;
        }
        entries.insert(reference.clone(), PreloadEntry::Loading);
        true
    }

    pub fn complete(&self, reference: &ClipReference, clip: Arc<DecodedClip>) {
        self.entries()
            .insert(reference.clone(), PreloadEntry::Warm(clip));
    }

    /// Forget a failed load so a later preload can retry
    pub fn abandon(&self, reference: &ClipReference) {
        let mut entries = self.entries();
        if matches!(entries.get(reference), Some(PreloadEntry::Loading)) {
            entries.remove(reference);
        }
    }

    /// Warm clip for `reference`, if any
    pub fn get(&self, reference: &ClipReference) -> Option<Arc<DecodedClip>> {
        match self.entries().get(reference) {
            Some(PreloadEntry::Warm(clip)) => Some(Arc::clone(clip)),
            _ => None,
        }
    }

    pub fn is_warm(&self, reference: &ClipReference) -> bool {
        self.get(reference).is_some()
    }

    /// Number of warm entries
    pub fn warm_count(&self) -> usize {
        self.entries()
            .values()
            .filter(|e| matches!(e, PreloadEntry::Warm(_)))
            .count()
    }
}

/// Warm `reference` in the background unless it is already loading or warm
///
/// A load that takes longer than `bound` is abandoned so a later preload
/// retries it. Requires a tokio runtime; without one the request is dropped.
pub(crate) fn spawn_warm(
    cache: Arc<PreloadCache>,
    resolver: Arc<dyn MediaResolver>,
    reference: ClipReference,
    bound: Duration,
) {
    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(runtime) => runtime,
        Err(_) => {
            warn!("No async runtime, skipping preload of {:?}", reference);
            return;
        }
    };

    if !cache.begin(&reference) {
        return;
    }

    runtime.spawn(async move {
        match tokio::time::timeout(bound, resolver.fetch(&reference)).await {
            Ok(Ok(clip)) => {
                debug!("Preloaded {:?}", reference);
                cache.complete(&reference, clip);
            }
            Ok(Err(e)) => {
                warn!("Preload of {:?} failed: {}", reference, e);
                cache.abandon(&reference);
            }
            Err(_elapsed) => {
                warn!(
                    "Preload of {:?} timed out after {}ms",
                    reference,
                    bound.as_millis()
                );
                cache.abandon(&reference);
            }
        }
    });
}
