//! # Speakboard Common Library
//!
//! Shared code for the speakboard services including:
//! - Configuration loading (TOML file, environment, compiled defaults)
//! - Event types (BoardEvent enum) and the broadcast EventBus
//! - Common error type

pub mod config;
pub mod error;
pub mod events;

pub use config::{FailurePolicy, PlayerConfig};
pub use error::{Error, Result};
pub use events::{BoardEvent, EventBus};
