//! Configuration loading and resolution
//!
//! Every setting follows the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Command-line and environment values arrive together in [`ConfigOverrides`]
//! (clap reads both), so this module only layers them over the TOML file.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default HTTP port for the audio player
pub const DEFAULT_PORT: u16 = 5745;

/// Default bound on waiting for a clip to become playable
pub const DEFAULT_READINESS_TIMEOUT_MS: u64 = 5000;

/// Default pause between two clips of a sequence
pub const DEFAULT_INTER_CLIP_GAP_MS: u64 = 50;

/// What a sequence does when one of its clips fails to load or play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the rest of the sequence and return the error
    #[default]
    FailFast,
    /// Log the failure and continue with the next clip
    SkipFailed,
}

impl std::str::FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_fast" => Ok(FailurePolicy::FailFast),
            "skip_failed" => Ok(FailurePolicy::SkipFailed),
            other => Err(Error::InvalidInput(format!(
                "unknown failure policy '{}' (expected fail_fast or skip_failed)",
                other
            ))),
        }
    }
}

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    pub port: Option<u16>,
    pub clip_root: Option<PathBuf>,
    pub readiness_timeout_ms: Option<u64>,
    pub inter_clip_gap_ms: Option<u64>,
    pub failure_policy: Option<FailurePolicy>,
    pub output_device: Option<String>,
    pub log_level: Option<String>,
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    /// Load from an explicit path. A missing file is an error here.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let config = Self::parse(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from the first platform config file that exists.
    ///
    /// No config file at all is not an error: a warning is logged and
    /// compiled defaults apply. A file that exists but does not parse is.
    pub fn load_default() -> Result<Self> {
        match default_config_file() {
            Some(path) => Self::load(&path),
            None => {
                warn!("No config file found, using compiled defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Values supplied on the command line or through `SPEAKBOARD_*` variables
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub clip_root: Option<PathBuf>,
    pub readiness_timeout_ms: Option<u64>,
    pub inter_clip_gap_ms: Option<u64>,
    pub failure_policy: Option<FailurePolicy>,
    pub output_device: Option<String>,
    pub log_level: Option<String>,
}

/// Fully resolved audio player configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    pub port: u16,
    pub clip_root: PathBuf,
    pub readiness_timeout: Duration,
    pub inter_clip_gap: Duration,
    pub failure_policy: FailurePolicy,
    pub output_device: Option<String>,
    pub log_level: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            clip_root: default_clip_root(),
            readiness_timeout: Duration::from_millis(DEFAULT_READINESS_TIMEOUT_MS),
            inter_clip_gap: Duration::from_millis(DEFAULT_INTER_CLIP_GAP_MS),
            failure_policy: FailurePolicy::FailFast,
            output_device: None,
            log_level: "info".to_string(),
        }
    }
}

impl PlayerConfig {
    /// Resolve configuration from overrides and a config file.
    ///
    /// `config_file` names an explicit file (which must exist); `None`
    /// searches the platform locations.
    pub fn resolve(overrides: &ConfigOverrides, config_file: Option<&Path>) -> Result<Self> {
        let file = match config_file {
            Some(path) => TomlConfig::load(path)?,
            None => TomlConfig::load_default()?,
        };
        let config = Self::merge(overrides, &file)?;
        info!(
            "Configuration resolved: port={}, clip_root={}, policy={:?}",
            config.port,
            config.clip_root.display(),
            config.failure_policy
        );
        Ok(config)
    }

    /// Layer overrides over file values over compiled defaults
    pub fn merge(overrides: &ConfigOverrides, file: &TomlConfig) -> Result<Self> {
        let defaults = Self::default();

        let readiness_timeout_ms = overrides
            .readiness_timeout_ms
            .or(file.readiness_timeout_ms)
            .unwrap_or(DEFAULT_READINESS_TIMEOUT_MS);
        if readiness_timeout_ms == 0 {
            return Err(Error::Config(
                "readiness_timeout_ms must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            port: overrides.port.or(file.port).unwrap_or(defaults.port),
            clip_root: overrides
                .clip_root
                .clone()
                .or_else(|| file.clip_root.clone())
                .unwrap_or(defaults.clip_root),
            readiness_timeout: Duration::from_millis(readiness_timeout_ms),
            inter_clip_gap: Duration::from_millis(
                overrides
                    .inter_clip_gap_ms
                    .or(file.inter_clip_gap_ms)
                    .unwrap_or(DEFAULT_INTER_CLIP_GAP_MS),
            ),
            failure_policy: overrides
                .failure_policy
                .or(file.failure_policy)
                .unwrap_or_default(),
            output_device: overrides
                .output_device
                .clone()
                .or_else(|| file.output_device.clone()),
            log_level: overrides
                .log_level
                .clone()
                .or_else(|| file.log_level.clone())
                .unwrap_or(defaults.log_level),
        })
    }
}

/// First existing platform config file, if any
///
/// Linux checks `~/.config/speakboard/config.toml` then
/// `/etc/speakboard/config.toml`; other platforms only the user config dir.
pub fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("speakboard").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/speakboard/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default folder for clips referenced by relative path
fn default_clip_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("speakboard").join("clips"))
        .unwrap_or_else(|| PathBuf::from("./speakboard_data/clips"))
}
