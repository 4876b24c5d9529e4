//! HTTP request handlers
//!
//! Implements REST API endpoints for playback control.

use super::AppState;
use crate::error::PlaybackError;
use crate::media::output::AudioOutput;
use crate::playback::{PlaybackOutcome, PlayerStatus};
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    port: u16,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
pub struct PlaySingleRequest {
    /// Missing or null is treated as an empty reference
    #[serde(default)]
    reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlaySingleResponse {
    outcome: PlaybackOutcome,
}

#[derive(Debug, Deserialize)]
pub struct PlaySequenceRequest {
    /// Null entries are skipped but keep their index
    references: Vec<Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct PlaySequenceResponse {
    sequence_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PreloadRequest {
    references: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PreloadResponse {
    requested: usize,
}

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    devices: Vec<String>,
}

type ApiError = (StatusCode, Json<StatusResponse>);

fn playback_error(e: PlaybackError) -> ApiError {
    let status = match e {
        PlaybackError::InvalidReference(_) => StatusCode::BAD_REQUEST,
        PlaybackError::MediaLoad { .. } => StatusCode::BAD_GATEWAY,
        PlaybackError::PlaybackStart { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "speakboard-ap".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        port: state.port,
    })
}

// ============================================================================
// Audio Device Endpoints
// ============================================================================

/// GET /audio/devices - List available audio output devices
pub async fn list_audio_devices() -> Result<Json<DeviceListResponse>, ApiError> {
    let devices = tokio::task::spawn_blocking(AudioOutput::list_devices)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusResponse {
                    status: format!("error: {}", e),
                }),
            )
        })?;

    match devices {
        Ok(devices) => {
            info!("Found {} audio devices", devices.len());
            Ok(Json(DeviceListResponse { devices }))
        }
        Err(e) => {
            error!("Failed to list audio devices: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusResponse {
                    status: format!("error: {}", e),
                }),
            ))
        }
    }
}

// ============================================================================
// Playback Control Endpoints
// ============================================================================

/// GET /playback/state - What is audible right now
pub async fn get_state(State(state): State<AppState>) -> Json<PlayerStatus> {
    Json(state.manager.status())
}

/// POST /playback/single - Play one clip and wait for it to end
///
/// Responds `superseded` when a newer playback took over first.
pub async fn play_single(
    State(state): State<AppState>,
    Json(request): Json<PlaySingleRequest>,
) -> Result<Json<PlaySingleResponse>, ApiError> {
    let reference = request.reference.unwrap_or_default();
    let outcome = state
        .manager
        .play_single(reference)
        .await
        .map_err(playback_error)?;
    Ok(Json(PlaySingleResponse { outcome }))
}

/// POST /playback/sequence - Start speaking a sentence
///
/// Runs in the background; progress arrives on `/events`.
pub async fn play_sequence(
    State(state): State<AppState>,
    Json(request): Json<PlaySequenceRequest>,
) -> (StatusCode, Json<PlaySequenceResponse>) {
    let references = request
        .references
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect::<Vec<_>>();

    let playback = state.manager.play_sequence(references, |_| {});
    let sequence_id = playback.id();
    info!("Sequence {} requested", sequence_id);

    tokio::spawn(async move {
        if let Err(e) = playback.await {
            warn!("Sequence {} failed: {}", sequence_id, e);
        }
    });

    (StatusCode::ACCEPTED, Json(PlaySequenceResponse { sequence_id }))
}

/// POST /playback/preload - Warm clips for the category being shown
pub async fn preload(
    State(state): State<AppState>,
    Json(request): Json<PreloadRequest>,
) -> (StatusCode, Json<PreloadResponse>) {
    let requested = request.references.len();
    state.manager.preload_all(request.references);
    (StatusCode::ACCEPTED, Json(PreloadResponse { requested }))
}

/// POST /playback/stop - Stop everything
pub async fn stop(State(state): State<AppState>) -> Json<StatusResponse> {
    state.manager.stop_all();
    Json(StatusResponse {
        status: "stopped".to_string(),
    })
}
