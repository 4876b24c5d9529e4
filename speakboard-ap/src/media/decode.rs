//! Clip decoding using symphonia
//!
//! Clips are short (a word or a phrase), so each one is decoded fully into
//! memory in one pass.
//!
//! # Sample Format
//!
//! - Output: stereo f32 samples (interleaved: [L, R, L, R, ...])
//! - Mono files: duplicated to stereo
//! - Multi-channel: downmixed to stereo
//! - Resampled with rubato to the requested output rate

use super::source::EncodedClip;
use super::{DecodedClip, MediaError};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::io::Cursor;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Output rate clips are normalized to
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// Decode an encoded clip to interleaved stereo f32 at `output_rate`
///
/// CPU bound; run it on a blocking thread.
pub fn decode_clip(encoded: &EncodedClip, output_rate: u32) -> Result<DecodedClip, MediaError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(encoded.bytes.clone())), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = encoded.hint.as_deref() {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| MediaError::new(format!("unsupported format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| MediaError::new("no audio track found"))?;
    let track_id = track.id;
    let native_rate = track.codec_params.sample_rate.unwrap_or(TARGET_SAMPLE_RATE);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| MediaError::new(format!("unsupported codec: {}", e)))?;

    let mut stereo = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(MediaError::new(format!("read failed: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt frame: skip it, keep the rest of the clip
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(MediaError::new(format!("decode failed: {}", e))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let buf = sample_buf.get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
        if buf.capacity() < decoded.capacity() * channels {
            *buf = SampleBuffer::new(decoded.capacity() as u64, spec);
        }
        buf.copy_interleaved_ref(decoded);
        push_stereo(&mut stereo, buf.samples(), channels);
    }

    if stereo.is_empty() {
        return Err(MediaError::new("clip contains no audio"));
    }

    debug!(
        "Decoded {} frames at {}Hz",
        stereo.len() / 2,
        native_rate
    );

    let samples = resample_stereo(stereo, native_rate, output_rate)?;
    Ok(DecodedClip {
        samples,
        sample_rate: output_rate,
    })
}

/// Append interleaved `channels`-channel samples to a stereo buffer
fn push_stereo(out: &mut Vec<f32>, interleaved: &[f32], channels: usize) {
    match channels {
        0 => {}
        1 => {
            for &sample in interleaved {
                out.push(sample);
                out.push(sample);
            }
        }
        2 => out.extend_from_slice(interleaved),
        _ => {
            // Even channels feed left, odd channels feed right
            let half = channels as f32 / 2.0;
            for frame in interleaved.chunks_exact(channels) {
                let mut left = 0.0f32;
                let mut right = 0.0f32;
                for (ch, &sample) in frame.iter().enumerate() {
                    if ch % 2 == 0 {
                        left += sample;
                    } else {
                        right += sample;
                    }
                }
                out.push(left / half);
                out.push(right / half);
            }
        }
    }
}

/// Bring a decoded clip to `output_rate`, reusing it when the rate matches
///
/// Clips decoded before the output opened carry the default rate.
pub fn conform_rate(
    clip: Arc<DecodedClip>,
    output_rate: u32,
) -> Result<Arc<DecodedClip>, MediaError> {
    if clip.sample_rate == output_rate {
        return Ok(clip);
    }
    let samples = resample_stereo(clip.samples.clone(), clip.sample_rate, output_rate)?;
    Ok(Arc::new(DecodedClip {
        samples,
        sample_rate: output_rate,
    }))
}

/// Resample interleaved stereo from `input_rate` to `output_rate`
pub fn resample_stereo(
    input: Vec<f32>,
    input_rate: u32,
    output_rate: u32,
) -> Result<Vec<f32>, MediaError> {
    if input_rate == output_rate || input.is_empty() {
        return Ok(input);
    }

    debug!("Resampling from {}Hz to {}Hz", input_rate, output_rate);

    let frames = input.len() / 2;
    let mut planar = vec![Vec::with_capacity(frames), Vec::with_capacity(frames)];
    for frame in input.chunks_exact(2) {
        planar[0].push(frame[0]);
        planar[1].push(frame[1]);
    }

    let mut resampler = FastFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        frames,
        2,
    )
    .map_err(|e| MediaError::new(format!("failed to create resampler: {}", e)))?;

    let planar_out = resampler
        .process(&planar, None)
        .map_err(|e| MediaError::new(format!("resampling failed: {}", e)))?;

    let out_frames = planar_out[0].len().min(planar_out[1].len());
    let mut interleaved = Vec::with_capacity(out_frames * 2);
    for i in 0..out_frames {
        interleaved.push(planar_out[0][i]);
        interleaved.push(planar_out[1][i]);
    }
    Ok(interleaved)
}
