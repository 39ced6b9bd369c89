//! Session settings that persist between runs
//!
//! These settings are independent of any project file and control how the
//! capture session is wired: which operation mode builds frames, how large the
//! detector buffer and work queue may grow, and whether plugin clients are
//! served. They are stored as TOML in the app data directory.
//!
//! # Main Types
//!
//! - [`SessionSettings`] - Pipeline and mode settings
//! - [`OverflowPolicy`] - What the producer does when the work queue is full
//! - [`PluginSettings`] - TCP plugin server options

use super::{
    ensure_app_data_dir, settings_path, DecoderMethod, OperationMode, DEFAULT_MAX_BUFFER_SIZE,
    SETTINGS_FILE,
};
use crate::error::{Result, SerialVisError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default TCP port used by the plugin server
pub const PLUGINS_TCP_PORT: u16 = 7777;

/// Default number of points kept per plot curve
pub const DEFAULT_PLOT_POINTS: usize = 100;

/// Default capacity of the payload work queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Behaviour of the producer when the work queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverflowPolicy {
    /// Wait for the consumer to make room
    Block,
    /// Evict the oldest queued payload
    #[default]
    DropOldest,
}

/// Options for the plugin TCP server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    /// Whether the server is started with the session
    pub enabled: bool,
    /// Address the server listens on
    pub bind_address: String,
    /// Interval between frame batches in milliseconds
    pub batch_interval_ms: u64,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: format!("127.0.0.1:{}", PLUGINS_TCP_PORT),
            batch_interval_ms: 1000,
        }
    }
}

impl PluginSettings {
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms.max(1))
    }
}

/// Settings for a capture session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// How payloads are turned into frames
    pub operation_mode: OperationMode,
    /// Payload decoder outside of project mode
    pub decoder: DecoderMethod,
    /// Cap on bytes held by the frame detector while waiting for a boundary
    pub max_buffer_size: usize,
    /// Capacity of the payload work queue
    pub queue_capacity: usize,
    /// What to do when the work queue is full
    pub overflow_policy: OverflowPolicy,
    /// Points kept per plot and multiplot curve
    pub plot_points: usize,
    pub plugin: PluginSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            operation_mode: OperationMode::default(),
            decoder: DecoderMethod::default(),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
            plot_points: DEFAULT_PLOT_POINTS,
            plugin: PluginSettings::default(),
        }
    }
}

impl SessionSettings {
    /// Parse settings from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SerialVisError::Config(format!("Failed to parse settings: {}", e)))
    }

    /// Load settings from a TOML file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SerialVisError::Config(format!("Failed to read settings {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load settings from the default location
    pub fn load() -> Result<Self> {
        let path = settings_path().ok_or_else(|| {
            SerialVisError::Config("Could not determine settings path".to_string())
        })?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(path)
    }

    /// Load settings, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load session settings, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save settings to a TOML file
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| SerialVisError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            SerialVisError::Config(format!("Failed to write settings {:?}: {}", path, e))
        })
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save_to(dir.join(SETTINGS_FILE))
    }

    /// Queue capacity clamped to at least one slot
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}
