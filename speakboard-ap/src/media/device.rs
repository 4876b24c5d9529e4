//! Production media resolver: source loader + decoder + cpal output

use super::decode::{self, TARGET_SAMPLE_RATE};
use super::output::{AudioOutput, VoiceId};
use super::source::ClipSource;
use super::{ClipReference, DecodedClip, MediaError, MediaHandle, MediaResolver};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{oneshot, OnceCell};
use tokio::task::JoinHandle;
use tracing::debug;

struct DeviceShared {
    source: ClipSource,
    device_name: Option<String>,
    /// Opened on first start so a missing device only fails playback
    output: OnceCell<Arc<AudioOutput>>,
}

impl DeviceShared {
    async fn fetch(&self, reference: &ClipReference) -> Result<Arc<DecodedClip>, MediaError> {
        let encoded = self.source.load(reference).await?;
        let rate = self
            .output
            .get()
            .map(|o| o.sample_rate())
            .unwrap_or(TARGET_SAMPLE_RATE);
        let clip = tokio::task::spawn_blocking(move || decode::decode_clip(&encoded, rate))
            .await
            .map_err(|e| MediaError::new(format!("decoder task failed: {}", e)))??;
        debug!("{:?} decoded ({:.2}s)", reference, clip.duration().as_secs_f32());
        Ok(Arc::new(clip))
    }

    async fn output(&self) -> Result<Arc<AudioOutput>, MediaError> {
        self.output
            .get_or_try_init(|| async {
                let device_name = self.device_name.clone();
                let output = tokio::task::spawn_blocking(move || AudioOutput::open(device_name))
                    .await
                    .map_err(|e| MediaError::new(format!("output task failed: {}", e)))??;
                Ok::<_, MediaError>(Arc::new(output))
            })
            .await
            .cloned()
    }
}

/// Resolves references to clips played on a real output device
#[derive(Clone)]
pub struct DeviceResolver {
    shared: Arc<DeviceShared>,
}

impl DeviceResolver {
    /// `clip_root` anchors relative references; `device_name` picks the
    /// cpal output device (default device when `None` or not found)
    pub fn new(clip_root: PathBuf, device_name: Option<String>) -> Self {
        Self {
            shared: Arc::new(DeviceShared {
                source: ClipSource::new(clip_root),
                device_name,
                output: OnceCell::new(),
            }),
        }
    }
}

#[async_trait]
impl MediaResolver for DeviceResolver {
    fn open(
        &self,
        reference: &ClipReference,
        warmed: Option<Arc<DecodedClip>>,
    ) -> Box<dyn MediaHandle> {
        let load = match warmed {
            Some(clip) => Load::Ready(clip),
            None => {
                let shared = Arc::clone(&self.shared);
                let reference = reference.clone();
                Load::Pending(tokio::spawn(async move { shared.fetch(&reference).await }))
            }
        };
        Box::new(DeviceHandle {
            reference: reference.clone(),
            shared: Arc::clone(&self.shared),
            load,
            voice: None,
            ended: None,
        })
    }

    async fn fetch(&self, reference: &ClipReference) -> Result<Arc<DecodedClip>, MediaError> {
        self.shared.fetch(reference).await
    }

    fn silence(&self) {
        if let Some(output) = self.shared.output.get() {
            output.silence();
        }
    }
}

enum Load {
    Pending(JoinHandle<Result<Arc<DecodedClip>, MediaError>>),
    Ready(Arc<DecodedClip>),
    Released,
}

/// One playback attempt on the device
pub struct DeviceHandle {
    reference: ClipReference,
    shared: Arc<DeviceShared>,
    load: Load,
    voice: Option<(Arc<AudioOutput>, VoiceId)>,
    ended: Option<oneshot::Receiver<()>>,
}

impl DeviceHandle {
    fn clip(&self) -> Result<Arc<DecodedClip>, MediaError> {
        match &self.load {
            Load::Ready(clip) => Ok(Arc::clone(clip)),
            Load::Pending(_) => Err(MediaError::new("clip is not loaded yet")),
            Load::Released => Err(MediaError::new("handle was released")),
        }
    }
}

#[async_trait]
impl MediaHandle for DeviceHandle {
    fn reference(&self) -> &ClipReference {
        &self.reference
    }

    async fn ready(&mut self) -> Result<(), MediaError> {
        if let Load::Pending(task) = &mut self.load {
            let clip = task
                .await
                .map_err(|e| MediaError::new(format!("loader task failed: {}", e)))??;
            self.load = Load::Ready(clip);
        }
        self.clip().map(|_| ())
    }

    async fn rewind(&mut self) -> Result<(), MediaError> {
        // Voices always start at frame zero; nothing is audible yet to seek
        self.clip().map(|_| ())
    }

    async fn start(&mut self) -> Result<(), MediaError> {
        let clip = self.clip()?;
        let output = self.shared.output().await?;
        let rate = output.sample_rate();
        let clip = if clip.sample_rate == rate {
            clip
        } else {
            tokio::task::spawn_blocking(move || decode::conform_rate(clip, rate))
                .await
                .map_err(|e| MediaError::new(format!("resampler task failed: {}", e)))??
        };
        let (id, ended) = output.play(clip);
        self.voice = Some((output, id));
        self.ended = Some(ended);
        Ok(())
    }

    async fn finished(&mut self) -> Result<(), MediaError> {
        let ended = self
            .ended
            .take()
            .ok_or_else(|| MediaError::new("playback was not started"))?;
        ended
            .await
            .map_err(|_| MediaError::new("playback interrupted before the end"))
    }

    fn release(&mut self) {
        if let Load::Pending(task) = &self.load {
            task.abort();
        }
        self.load = Load::Released;
        self.ended = None;
        if let Some((output, id)) = self.voice.take() {
            output.stop_voice(id);
        }
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.release();
    }
}
