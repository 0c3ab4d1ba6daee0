//! # Engine configuration
//!
//! All tunables of the engine live in one TOML file. Every section and field
//! has a default, so a missing file or a partial file still yields a usable
//! configuration. Values are read once when the engine is constructed and are
//! never re-read while ticking.
//!
//! The default location is `~/.config/padfusion/config.toml`. It is created
//! with the default values on first run.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = ".config/padfusion";
const CONFIG_FILE: &str = "config.toml";

/// Root of the configuration file.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub input: InputSettings,
    pub motion: MotionSettings,
    pub output: OutputSettings,
    pub poller: PollerSettings,
}

/// Button repeat timing and analog thresholds.
///
/// Deadzones are in raw stick units (±127). The trigger threshold is in raw
/// trigger units (0-255) and decides when a trigger counts as a pressed button.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct InputSettings {
    /// Seconds between the first press and the first repeat
    pub initial_repeat_delay: f32,
    /// Seconds between subsequent repeats
    pub repeat_delay: f32,
    pub left_thumb_deadzone: i16,
    pub right_thumb_deadzone: i16,
    pub trigger_threshold: i16,
    /// Extract right-stick left/right from the Y axis, as older builds did.
    /// Both buttons then collide with right-stick up/down.
    pub legacy_right_stick_horizontal: bool,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            initial_repeat_delay: 0.2,
            repeat_delay: 0.1,
            left_thumb_deadzone: 30,
            right_thumb_deadzone: 30,
            trigger_threshold: 30,
            legacy_right_stick_horizontal: false,
        }
    }
}

/// Motion fusion and gyro camera tuning.
///
/// Angular thresholds are in degrees per second, accelerations in g.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MotionSettings {
    pub continuous_calibration: bool,
    pub use_world_space: bool,
    pub tightening_threshold: f32,
    pub smoothing_lower_threshold: f32,
    pub smoothing_upper_threshold: f32,
    pub smoothing_buffer_size: usize,
    pub stillness_gyro_threshold: f32,
    pub stillness_accel_tolerance: f32,
    /// Samples averaged before the bias estimate switches to an exponential update
    pub calibration_window: u32,
    /// Fraction of the tilt error corrected per second
    pub gravity_correction_rate: f32,
    pub yaw_relax_factor: f32,
    /// Longest gap in seconds integrated as one step; longer stalls and
    /// clock jumps are clamped to this
    pub max_delta_time: f32,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            continuous_calibration: true,
            use_world_space: true,
            tightening_threshold: 100.0,
            smoothing_lower_threshold: 50.0,
            smoothing_upper_threshold: 100.0,
            smoothing_buffer_size: 16,
            stillness_gyro_threshold: 5.0,
            stillness_accel_tolerance: 0.05,
            calibration_window: 200,
            gravity_correction_rate: 2.0,
            yaw_relax_factor: 1.41,
            max_delta_time: 0.1,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct OutputSettings {
    /// Send the composed rumble magnitudes to the device. When false the
    /// packet still carries the magnitudes but both motor bytes are zero.
    pub transmit_rumble: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PollerSettings {
    pub tick_interval_ms: u64,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 8,
        }
    }
}

impl EngineConfig {
    pub fn default_path() -> PathBuf {
        let mut path = get_home_dir();
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| eyre!("Failed to parse engine config: {}", e))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| eyre!("Failed to serialize engine config: {}", e))
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Config file {} not found, using default settings",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded engine config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }
        let content = self.to_toml_string()?;
        fs::write(path, content)
            .map_err(|e| eyre!("Failed to write config file {}: {}", path.display(), e))?;
        Ok(())
    }

    /// Write the default configuration to `path` unless a file is already there.
    pub fn ensure_default(path: &Path) -> Result<()> {
        if !path.exists() {
            info!("Creating default configuration at {}", path.display());
            Self::default().save(path)?;
        }
        Ok(())
    }
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}
