//! Scripted in-memory media for playback tests
//!
//! Each reference follows a [`ClipScript`] describing how its readiness,
//! start and natural end behave. Every handle interaction is appended to a
//! shared log so tests can assert on exactly what the manager did.

use async_trait::async_trait;
use speakboard_ap::media::{ClipReference, DecodedClip, MediaError, MediaHandle, MediaResolver};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

/// How one media event resolves
#[derive(Debug, Clone)]
pub enum Step {
    Immediate,
    After(Duration),
    /// Resolves when the test calls [`FakeResolver::end`]
    Manual,
    Never,
    Fail(String),
}

#[derive(Debug, Clone)]
pub struct ClipScript {
    pub ready: Step,
    pub start: Result<(), String>,
    pub finish: Step,
}

impl ClipScript {
    pub fn plays_for(duration: Duration) -> Self {
        Self {
            ready: Step::Immediate,
            start: Ok(()),
            finish: Step::After(duration),
        }
    }

    pub fn manual() -> Self {
        Self {
            finish: Step::Manual,
            ..Self::plays_for(Duration::ZERO)
        }
    }

    pub fn endless() -> Self {
        Self {
            finish: Step::Never,
            ..Self::plays_for(Duration::ZERO)
        }
    }

    pub fn never_ready() -> Self {
        Self {
            ready: Step::Never,
            ..Self::plays_for(Duration::from_millis(100))
        }
    }

    pub fn ready_after(delay: Duration, plays_for: Duration) -> Self {
        Self {
            ready: Step::After(delay),
            ..Self::plays_for(plays_for)
        }
    }

    pub fn fails_to_load(reason: &str) -> Self {
        Self {
            ready: Step::Fail(reason.to_string()),
            ..Self::plays_for(Duration::from_millis(100))
        }
    }

    pub fn refuses_to_start(reason: &str) -> Self {
        Self {
            start: Err(reason.to_string()),
            ..Self::plays_for(Duration::from_millis(100))
        }
    }
}

impl Default for ClipScript {
    fn default() -> Self {
        Self::plays_for(Duration::from_millis(100))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    Opened { reference: String, warmed: bool },
    Ready(String),
    Rewound(String),
    Started(String),
    Ended(String),
    Released(String),
}

#[derive(Default)]
struct FakeState {
    scripts: HashMap<String, ClipScript>,
    endings: HashMap<String, Arc<Notify>>,
    log: Vec<MediaEvent>,
    fetches: HashMap<String, usize>,
    failing_fetches: HashMap<String, usize>,
    fetch_delay: Duration,
    audible: HashSet<u64>,
    max_audible: usize,
    silenced: usize,
    next_handle: u64,
}

impl FakeState {
    fn ending(&mut self, reference: &str) -> Arc<Notify> {
        Arc::clone(
            self.endings
                .entry(reference.to_string())
                .or_insert_with(|| Arc::new(Notify::new())),
        )
    }
}

/// Fake media subsystem; clones share state
#[derive(Clone, Default)]
pub struct FakeResolver {
    state: Arc<Mutex<FakeState>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Script `reference`; unscripted references play for 100ms
    pub fn script(&self, reference: &str, script: ClipScript) -> &Self {
        self.state().scripts.insert(reference.to_string(), script);
        self
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.state().fetch_delay = delay;
    }

    /// Make the next `times` fetches of `reference` fail
    pub fn fail_fetches(&self, reference: &str, times: usize) {
        self.state()
            .failing_fetches
            .insert(reference.to_string(), times);
    }

    /// Fire the natural end of a `Step::Manual` clip
    pub fn end(&self, reference: &str) {
        self.state().ending(reference).notify_one();
    }

    pub fn log(&self) -> Vec<MediaEvent> {
        self.state().log.clone()
    }

    /// References in the order they started playing
    pub fn started(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|event| match event {
                MediaEvent::Started(reference) => Some(reference),
                _ => None,
            })
            .collect()
    }

    pub fn opened(&self, reference: &str) -> usize {
        self.log()
            .iter()
            .filter(|event| matches!(event, MediaEvent::Opened { reference: r, .. } if r == reference))
            .count()
    }

    pub fn released(&self, reference: &str) -> usize {
        self.log()
            .iter()
            .filter(|event| matches!(event, MediaEvent::Released(r) if r == reference))
            .count()
    }

    pub fn fetch_count(&self, reference: &str) -> usize {
        self.state().fetches.get(reference).copied().unwrap_or(0)
    }

    /// Most handles ever audible at the same time
    pub fn max_audible(&self) -> usize {
        self.state().max_audible
    }

    pub fn audible_count(&self) -> usize {
        self.state().audible.len()
    }

    pub fn silenced_count(&self) -> usize {
        self.state().silenced
    }
}

#[async_trait]
impl MediaResolver for FakeResolver {
    fn open(
        &self,
        reference: &ClipReference,
        warmed: Option<Arc<DecodedClip>>,
    ) -> Box<dyn MediaHandle> {
        let mut state = self.state();
        state.next_handle += 1;
        let id = state.next_handle;
        state.log.push(MediaEvent::Opened {
            reference: reference.to_string(),
            warmed: warmed.is_some(),
        });
        let script = state
            .scripts
            .get(reference.as_str())
            .cloned()
            .unwrap_or_default();
        let ending = state.ending(reference.as_str());

        Box::new(FakeHandle {
            id,
            reference: reference.clone(),
            script,
            warmed: warmed.is_some(),
            ending,
            state: Arc::clone(&self.state),
            released: false,
        })
    }

    async fn fetch(&self, reference: &ClipReference) -> Result<Arc<DecodedClip>, MediaError> {
        let (delay, fail) = {
            let mut state = self.state();
            *state.fetches.entry(reference.to_string()).or_default() += 1;
            let fail = match state.failing_fetches.get_mut(reference.as_str()) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
            (state.fetch_delay, fail)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(MediaError::new("fetch failed"));
        }
        Ok(Arc::new(DecodedClip {
            samples: vec![0.0; 16],
            sample_rate: 44100,
        }))
    }

    fn silence(&self) {
        let mut state = self.state();
        state.silenced += 1;
        state.audible.clear();
    }
}

struct FakeHandle {
    id: u64,
    reference: ClipReference,
    script: ClipScript,
    warmed: bool,
    ending: Arc<Notify>,
    state: Arc<Mutex<FakeState>>,
    released: bool,
}

impl FakeHandle {
    fn record(&self, event: MediaEvent) {
        self.state.lock().unwrap().log.push(event);
    }
}

async fn wait(step: &Step, ending: &Notify) -> Result<(), MediaError> {
    match step {
        Step::Immediate => Ok(()),
        Step::After(duration) => {
            tokio::time::sleep(*duration).await;
            Ok(())
        }
        Step::Manual => {
            ending.notified().await;
            Ok(())
        }
        Step::Never => std::future::pending().await,
        Step::Fail(reason) => Err(MediaError::new(reason.clone())),
    }
}

#[async_trait]
impl MediaHandle for FakeHandle {
    fn reference(&self) -> &ClipReference {
        &self.reference
    }

    async fn ready(&mut self) -> Result<(), MediaError> {
        // Warmed clips are already decoded
        if !self.warmed {
            wait(&self.script.ready, &self.ending).await?;
        }
        self.record(MediaEvent::Ready(self.reference.to_string()));
        Ok(())
    }

    async fn rewind(&mut self) -> Result<(), MediaError> {
        self.record(MediaEvent::Rewound(self.reference.to_string()));
        Ok(())
    }

    async fn start(&mut self) -> Result<(), MediaError> {
        if let Err(reason) = &self.script.start {
            return Err(MediaError::new(reason.clone()));
        }
        let mut state = self.state.lock().unwrap();
        state.audible.insert(self.id);
        state.max_audible = state.max_audible.max(state.audible.len());
        state
            .log
            .push(MediaEvent::Started(self.reference.to_string()));
        Ok(())
    }

    async fn finished(&mut self) -> Result<(), MediaError> {
        wait(&self.script.finish, &self.ending).await?;
        let mut state = self.state.lock().unwrap();
        state.audible.remove(&self.id);
        state.log.push(MediaEvent::Ended(self.reference.to_string()));
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut state = self.state.lock().unwrap();
        state.audible.remove(&self.id);
        state
            .log
            .push(MediaEvent::Released(self.reference.to_string()));
    }
}
