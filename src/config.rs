//! Configuration management for dualcam
//!
//! Provides loading, saving and validation of the tunables for capture graph
//! setup, the degradation ladder, picture-in-picture compositing, recording,
//! pressure throttling and audio metering.

use crate::buffer::DevicePosition;
use crate::errors::{DualCamError, Result};
use crate::graph::VideoOrientation;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DualCamConfig {
    pub capture: CaptureConfig,
    pub degradation: DegradationConfig,
    pub pip: PipConfig,
    pub recording: RecordingConfig,
    pub pressure: PressureConfig,
    pub metering: MeteringConfig,
}

/// Capture graph construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Orientation applied to both video data connections
    pub video_orientation: VideoOrientation,
    /// Mirror the front camera's data and preview connections
    pub mirror_front_camera: bool,
}

/// Thresholds for the cost degradation ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationConfig {
    /// Normalized cost above which a metric counts as exceeded
    pub cost_ceiling: f64,
    /// Resolution is never reduced once the active format fits in this
    pub min_width: u32,
    pub min_height: u32,
    /// Frames per second removed by one frame-rate step
    pub frame_rate_step: f64,
    /// Frame-rate steps never go below this rate
    pub min_frame_rate: f64,
    /// Upper bound on steps applied in one adaptation run
    pub max_steps: u32,
}

/// Picture-in-picture compositing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipConfig {
    /// Camera shown in the inset when the session starts
    pub initial_inset: DevicePosition,
    /// Output buffers the compositor may hand out at once
    pub retained_buffer_hint: usize,
}

/// Movie recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Directory for temporary movie files
    pub output_directory: String,
    /// Prefix for generated file names
    pub file_prefix: String,
    /// Hand finished movies to the media library
    pub save_to_library: bool,
}

/// Response to serious/critical system pressure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureConfig {
    pub throttle_enabled: bool,
    /// Highest frame rate allowed while throttled
    pub throttle_max_fps: f64,
    /// Lowest frame rate allowed while throttled
    pub throttle_min_fps: f64,
}

/// Audio level metering events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeteringConfig {
    pub enabled: bool,
    /// Minimum time between two level events in milliseconds
    pub interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            video_orientation: VideoOrientation::Portrait,
            mirror_front_camera: true,
        }
    }
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            cost_ceiling: 1.0,
            min_width: 640,
            min_height: 480,
            frame_rate_step: 10.0,
            min_frame_rate: 15.0,
            max_steps: 64,
        }
    }
}

impl Default for PipConfig {
    fn default() -> Self {
        Self {
            initial_inset: DevicePosition::Front,
            retained_buffer_hint: 3,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_directory: std::env::temp_dir()
                .join("dualcam")
                .to_string_lossy()
                .to_string(),
            file_prefix: "pip".to_string(),
            save_to_library: true,
        }
    }
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            throttle_enabled: true,
            throttle_max_fps: 20.0,
            throttle_min_fps: 15.0,
        }
    }
}

impl Default for MeteringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 100,
        }
    }
}

impl Default for DualCamConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            degradation: DegradationConfig::default(),
            pip: PipConfig::default(),
            recording: RecordingConfig::default(),
            pressure: PressureConfig::default(),
            metering: MeteringConfig::default(),
        }
    }
}

impl DualCamConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            DualCamError::Configuration(format!("Failed to read config file: {}", e))
        })?;

        let config: DualCamConfig = toml::from_str(&contents).map_err(|e| {
            DualCamError::Configuration(format!("Failed to parse config file: {}", e))
        })?;

        config.validate().map_err(DualCamError::Configuration)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                DualCamError::Configuration(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            DualCamError::Configuration(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, toml_string).map_err(|e| {
            DualCamError::Configuration(format!("Failed to write config file: {}", e))
        })?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("dualcam.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), String> {
        let d = &self.degradation;
        if !(d.cost_ceiling > 0.0) {
            return Err("Cost ceiling must be positive".to_string());
        }
        if d.min_width == 0 || d.min_height == 0 {
            return Err("Minimum resolution must be non-zero".to_string());
        }
        if !(d.frame_rate_step > 0.0) {
            return Err("Frame rate step must be positive".to_string());
        }
        if !(d.min_frame_rate >= 1.0) {
            return Err("Minimum frame rate must be at least 1".to_string());
        }
        if d.max_steps == 0 {
            return Err("Degradation step limit must be at least 1".to_string());
        }

        if self.pip.retained_buffer_hint == 0 || self.pip.retained_buffer_hint > 16 {
            return Err("Retained buffer hint must be between 1 and 16".to_string());
        }

        if self.recording.output_directory.is_empty() {
            return Err("Recording output directory must be set".to_string());
        }
        if self.recording.file_prefix.contains(std::path::MAIN_SEPARATOR) {
            return Err("Recording file prefix must not contain a path separator".to_string());
        }

        let p = &self.pressure;
        if !(p.throttle_min_fps >= 1.0) || p.throttle_min_fps > p.throttle_max_fps {
            return Err("Pressure throttle range must satisfy 1 <= min <= max".to_string());
        }

        Ok(())
    }
}
