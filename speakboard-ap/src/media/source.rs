//! Clip source loading
//!
//! Turns a [`ClipReference`] into encoded audio bytes plus a format hint.
//!
//! Supported references:
//! - `data:[<mime>][;base64],<payload>` embedded clips
//! - `http://` / `https://` URLs (fetched with reqwest)
//! - `file://` URLs and plain paths inside the clip root; relative paths
//!   resolve against it and `..` segments are refused

use super::{ClipReference, MediaError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on one HTTP clip download
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Encoded clip bytes ready for the decoder
#[derive(Debug, Clone)]
pub struct EncodedClip {
    pub bytes: Vec<u8>,
    /// File extension style hint ("mp3", "wav", ...) for format detection
    pub hint: Option<String>,
}

/// Where a reference points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind<'a> {
    Data {
        mime: &'a str,
        base64: bool,
        payload: &'a str,
    },
    Http(&'a str),
    File(PathBuf),
}

/// Classify a reference without touching the network or disk
pub fn classify<'a>(reference: &'a str, clip_root: &Path) -> Result<SourceKind<'a>, MediaError> {
    if let Some(rest) = reference.strip_prefix("data:") {
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| MediaError::new("data URI has no ',' separator"))?;
        let (mime, base64) = match meta.strip_suffix(";base64") {
            Some(mime) => (mime, true),
            None => (meta, false),
        };
        // Drop parameters such as ";codecs=opus"
        let mime = mime.split(';').next().unwrap_or("");
        return Ok(SourceKind::Data {
            mime,
            base64,
            payload,
        });
    }

    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Ok(SourceKind::Http(reference));
    }

    let path = reference.strip_prefix("file://").unwrap_or(reference);
    let path = Path::new(path);
    // Clips on disk must stay under the clip root
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(MediaError::new(format!("path leaves the clip root: {}", reference)));
    }
    if path.is_absolute() {
        if !path.starts_with(clip_root) {
            return Err(MediaError::new(format!(
                "path is outside the clip root {}: {}",
                clip_root.display(),
                reference
            )));
        }
        Ok(SourceKind::File(path.to_path_buf()))
    } else {
        Ok(SourceKind::File(clip_root.join(path)))
    }
}

/// Map an audio MIME type to the extension hint symphonia understands
pub fn hint_from_mime(mime: &str) -> Option<&'static str> {
    match mime.trim().to_ascii_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" | "audio/mpeg3" => Some("mp3"),
        "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => Some("wav"),
        "audio/ogg" | "audio/vorbis" => Some("ogg"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/aac" => Some("aac"),
        _ => None,
    }
}

/// Extension of the last path segment of a URL, ignoring query and fragment
///
/// Storage URLs often percent-encode folders (`audio%2Fhola.mp3`), so only
/// the text after the final '.' counts.
pub fn hint_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = last.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Loads encoded clip bytes
#[derive(Debug, Clone)]
pub struct ClipSource {
    http: reqwest::Client,
    clip_root: PathBuf,
}

impl ClipSource {
    pub fn new(clip_root: PathBuf) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("HTTP client setup failed ({}), using defaults", e);
                reqwest::Client::new()
            });
        Self { http, clip_root }
    }

    pub fn clip_root(&self) -> &Path {
        &self.clip_root
    }

    /// Load the encoded bytes behind `reference`
    pub async fn load(&self, reference: &ClipReference) -> Result<EncodedClip, MediaError> {
        match classify(reference.as_str(), &self.clip_root)? {
            SourceKind::Data {
                mime,
                base64,
                payload,
            } => {
                let bytes = if base64 {
                    STANDARD
                        .decode(payload.trim())
                        .map_err(|e| MediaError::new(format!("invalid base64 payload: {}", e)))?
                } else {
                    payload.as_bytes().to_vec()
                };
                debug!("Decoded data URI ({}, {} bytes)", mime, bytes.len());
                Ok(EncodedClip {
                    bytes,
                    hint: hint_from_mime(mime).map(str::to_string),
                })
            }
            SourceKind::Http(url) => self.fetch_http(url).await,
            SourceKind::File(path) => {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| MediaError::new(format!("{}: {}", path.display(), e)))?;
                debug!("Read {} ({} bytes)", path.display(), bytes.len());
                Ok(EncodedClip {
                    bytes,
                    hint: path
                        .extension()
                        .and_then(|e| e.to_str())
                        .map(str::to_ascii_lowercase),
                })
            }
        }
    }

    async fn fetch_http(&self, url: &str) -> Result<EncodedClip, MediaError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| MediaError::new(format!("request failed: {}", e)))?;

        let mime_hint = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| hint_from_mime(v.split(';').next().unwrap_or(v)));

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MediaError::new(format!("body read failed: {}", e)))?;
        debug!("Fetched {} bytes", bytes.len());

        Ok(EncodedClip {
            bytes: bytes.to_vec(),
            hint: mime_hint.map(str::to_string).or_else(|| hint_from_url(url)),
        })
    }
}
