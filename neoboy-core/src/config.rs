//! Bridge configuration.
//!
//! Loaded from a TOML file; every field has a default so a missing file or a partial file is
//! fine.
//!
//! ```toml
//! [audio]
//! sample_rate = 44100
//! lead_ms = 10.0
//!
//! [pacing]
//! threshold_ms = 16.6
//!
//! [marshal]
//! save_state_scratch_bytes = 1048576
//!
//! [engine]
//! max_memory_bytes = 67108864
//!
//! [storage]
//! save_dir = "/home/me/.local/share/neoboy/saves"
//! ```

use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::abi::{DEFAULT_SAMPLE_RATE, SAVE_STATE_SCRATCH_BYTES};
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub audio: AudioConfig,
    pub pacing: PacingConfig,
    pub marshal: MarshalConfig,
    pub engine: EngineConfig,
    pub storage: StorageConfig,
}

impl BridgeConfig {
    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Lead applied when scheduling recovers from an underrun.
    pub lead_ms: f64,
    /// Start with audio enabled.
    pub enabled: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            lead_ms: 10.0,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Minimum time between logical steps (approximates 60 Hz).
    pub threshold_ms: f64,
    /// Length of the rate measurement window.
    pub rate_window_ms: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            threshold_ms: 16.6,
            rate_window_ms: 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarshalConfig {
    /// Size of the scratch region handed to `save_state`.
    pub save_state_scratch_bytes: u32,
}

impl Default for MarshalConfig {
    fn default() -> Self {
        Self {
            save_state_scratch_bytes: SAVE_STATE_SCRATCH_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound for guest linear memory. `None` leaves growth to the module's own limits.
    pub max_memory_bytes: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub save_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Configured save directory, or the platform data directory.
    pub fn resolved_save_dir(&self) -> Option<PathBuf> {
        self.save_dir.clone().or_else(|| {
            ProjectDirs::from("", "", "neoboy").map(|dirs| dirs.data_dir().join("saves"))
        })
    }
}
