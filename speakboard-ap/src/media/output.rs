//! Audio output using cpal
//!
//! One output stream with one voice slot. Starting a voice replaces the
//! previous one, so the device itself can never mix two clips.
//!
//! cpal streams are not `Send` on every platform, so the stream lives on a
//! dedicated thread for the whole life of [`AudioOutput`]. The audio callback
//! and the async side share only the voice slot.

use super::{DecodedClip, MediaError};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Identifies one started voice
pub type VoiceId = u64;

/// A clip being rendered by the output callback
struct Voice {
    id: VoiceId,
    clip: Arc<DecodedClip>,
    /// Position in clip frames (fractional when rates differ)
    position: f64,
    /// Clip frames advanced per device frame
    step: f64,
    ended: Option<oneshot::Sender<()>>,
}

impl Voice {
    fn next_frame(&mut self) -> (f32, f32) {
        let index = self.position as usize;
        if index >= self.clip.frames() {
            return (0.0, 0.0);
        }
        self.position += self.step;
        (self.clip.samples[index * 2], self.clip.samples[index * 2 + 1])
    }

    fn is_finished(&self) -> bool {
        self.position as usize >= self.clip.frames()
    }
}

type VoiceSlot = Arc<Mutex<Option<Voice>>>;

fn lock_slot(slot: &VoiceSlot) -> MutexGuard<'_, Option<Voice>> {
    // A panic while holding the slot cannot leave it half-written
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Audio output manager using cpal.
pub struct AudioOutput {
    voice: VoiceSlot,
    sample_rate: u32,
    device_name: String,
    next_voice: AtomicU64,
    /// Dropping this sender ends the stream thread
    _shutdown: mpsc::Sender<()>,
}

impl AudioOutput {
    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open the output device and start a silent stream.
    ///
    /// Falls back to the default device when `device_name` is not found.
    /// Blocks until the stream thread reports success or failure.
    pub fn open(device_name: Option<String>) -> std::result::Result<Self, MediaError> {
        let voice: VoiceSlot = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread_voice = Arc::clone(&voice);
        std::thread::Builder::new()
            .name("speakboard-output".to_string())
            .spawn(move || {
                let stream = match start_stream(device_name, thread_voice) {
                    Ok((stream, rate, name)) => {
                        let _ = ready_tx.send(Ok((rate, name)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Park until the owning AudioOutput is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("Output stream thread exiting");
            })
            .map_err(|e| MediaError::new(format!("cannot spawn output thread: {}", e)))?;

        let (sample_rate, device_name) = ready_rx
            .recv()
            .map_err(|_| MediaError::new("output thread exited during startup"))??;

        info!("Audio output ready on '{}' at {}Hz", device_name, sample_rate);
        Ok(Self {
            voice,
            sample_rate,
            device_name,
            next_voice: AtomicU64::new(1),
            _shutdown: shutdown_tx,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Start rendering `clip` from its first frame, replacing any voice.
    ///
    /// The receiver resolves when the clip's last frame has been rendered;
    /// it errors if the voice is replaced or stopped first.
    pub fn play(&self, clip: Arc<DecodedClip>) -> (VoiceId, oneshot::Receiver<()>) {
        let id = self.next_voice.fetch_add(1, Ordering::Relaxed);
        let (ended_tx, ended_rx) = oneshot::channel();
        let step = if clip.sample_rate == 0 {
            1.0
        } else {
            clip.sample_rate as f64 / self.sample_rate as f64
        };

        let voice = Voice {
            id,
            clip,
            position: 0.0,
            step,
            ended: Some(ended_tx),
        };
        if let Some(previous) = lock_slot(&self.voice).replace(voice) {
            debug!("Voice {} replaced by voice {}", previous.id, id);
        }
        (id, ended_rx)
    }

    /// Stop voice `id` if it is still the current voice
    pub fn stop_voice(&self, id: VoiceId) {
        let mut slot = lock_slot(&self.voice);
        if slot.as_ref().is_some_and(|v| v.id == id) {
            *slot = None;
            debug!("Voice {} stopped", id);
        }
    }

    /// Stop whatever voice is current
    pub fn silence(&self) {
        if let Some(voice) = lock_slot(&self.voice).take() {
            debug!("Voice {} silenced", voice.id);
        }
    }

    /// Id of the voice being rendered, if any
    pub fn current_voice(&self) -> Option<VoiceId> {
        lock_slot(&self.voice).as_ref().map(|v| v.id)
    }
}

/// Runs on the output thread: pick a device, build and play the stream
fn start_stream(
    device_name: Option<String>,
    voice: VoiceSlot,
) -> std::result::Result<(Stream, u32, String), MediaError> {
    let host = cpal::default_host();

    let device = match device_name.as_ref() {
        Some(name) => {
            let mut devices = host
                .output_devices()
                .map_err(|e| MediaError::new(format!("Failed to enumerate devices: {}", e)))?;
            match devices.find(|d| d.name().ok().as_ref() == Some(name)) {
                Some(dev) => dev,
                None => {
                    warn!("Requested device '{}' not found, falling back to default device", name);
                    host.default_output_device().ok_or_else(|| {
                        MediaError::new(format!(
                            "Device '{}' not found and no default device available",
                            name
                        ))
                    })?
                }
            }
        }
        None => host
            .default_output_device()
            .ok_or_else(|| MediaError::new("No default output device found"))?,
    };
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let (config, sample_format) = best_config(&device)?;
    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, voice)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, voice)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, voice)?,
        other => {
            return Err(MediaError::new(format!("Unsupported sample format: {:?}", other)));
        }
    };

    stream
        .play()
        .map_err(|e| MediaError::new(format!("Failed to start stream: {}", e)))?;

    Ok((stream, config.sample_rate.0, name))
}

/// Prefer 44.1kHz stereo f32 (the decoder's output format), else the default
fn best_config(device: &Device) -> std::result::Result<(StreamConfig, SampleFormat), MediaError> {
    let mut supported = device
        .supported_output_configs()
        .map_err(|e| MediaError::new(format!("Failed to get device configs: {}", e)))?;

    let preferred = supported.find(|config| {
        config.channels() == 2
            && config.min_sample_rate().0 <= 44100
            && config.max_sample_rate().0 >= 44100
            && config.sample_format() == SampleFormat::F32
    });

    if let Some(config) = preferred {
        let sample_format = config.sample_format();
        return Ok((config.with_sample_rate(cpal::SampleRate(44100)).config(), sample_format));
    }

    let default = device
        .default_output_config()
        .map_err(|e| MediaError::new(format!("Failed to get default config: {}", e)))?;
    Ok((default.config(), default.sample_format()))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    voice: VoiceSlot,
) -> std::result::Result<Stream, MediaError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut slot = lock_slot(&voice);

                for frame in data.chunks_mut(channels) {
                    let (left, right) = match slot.as_mut() {
                        Some(v) => v.next_frame(),
                        None => (0.0, 0.0),
                    };
                    for (ch, out) in frame.iter_mut().enumerate() {
                        *out = match ch {
                            0 => T::from_sample(left.clamp(-1.0, 1.0)),
                            1 => T::from_sample(right.clamp(-1.0, 1.0)),
                            _ => T::EQUILIBRIUM,
                        };
                    }
                }

                if slot.as_ref().is_some_and(Voice::is_finished) {
                    if let Some(mut finished) = slot.take() {
                        if let Some(ended) = finished.ended.take() {
                            let _ = ended.send(());
                        }
                    }
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| MediaError::new(format!("Failed to build stream: {}", e)))
}
