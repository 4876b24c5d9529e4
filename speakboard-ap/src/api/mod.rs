//! REST API for the audio player
//!
//! Thin HTTP/SSE surface over [`AudioManager`] so board front ends in any
//! language can drive playback.

pub mod handlers;
pub mod sse;

use crate::error::{Error, Result};
use crate::playback::AudioManager;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Playback manager
    pub manager: Arc<AudioManager>,
    /// Server port
    pub port: u16,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))

        // Audio device listing
        .route("/audio/devices", get(handlers::list_audio_devices))

        // Playback control
        .route("/playback/state", get(handlers::get_state))
        .route("/playback/single", post(handlers::play_single))
        .route("/playback/sequence", post(handlers::play_sequence))
        .route("/playback/preload", post(handlers::preload))
        .route("/playback/stop", post(handlers::stop))

        // SSE event stream
        .route("/events", get(sse::event_stream))

        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // Board front ends are served from elsewhere on the local network
        .layer(CorsLayer::permissive())
}

/// Run the HTTP server until `shutdown` resolves
pub async fn serve<S>(state: AppState, shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], state.port));
    let app = create_router(state);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
