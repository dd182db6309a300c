//! Capture device and device enumeration collaborators

use crate::buffer::{DevicePosition, MediaKind};
use crate::errors::Result;
use crate::timing::MediaTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    BuiltInWideAngleCamera,
    /// Virtual device fusing wide and tele lenses; exposes ports for both.
    BuiltInDualCamera,
    BuiltInMicrophone,
}

/// Inclusive frame-rate range supported by a format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameRateRange {
    pub min_fps: f64,
    pub max_fps: f64,
}

/// One supported capture format of a camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceFormat {
    pub width: u32,
    pub height: u32,
    pub frame_rate_ranges: Vec<FrameRateRange>,
    pub multi_cam_supported: bool,
}

impl DeviceFormat {
    pub fn new(width: u32, height: u32, max_fps: f64, multi_cam_supported: bool) -> Self {
        Self {
            width,
            height,
            frame_rate_ranges: vec![FrameRateRange {
                min_fps: 1.0,
                max_fps,
            }],
            multi_cam_supported,
        }
    }

    pub fn max_frame_rate(&self) -> f64 {
        self.frame_rate_ranges
            .iter()
            .map(|r| r.max_fps)
            .fold(0.0, f64::max)
    }

    /// True when either dimension is strictly smaller than `other`'s.
    pub fn is_smaller_than(&self, other: &DeviceFormat) -> bool {
        self.width < other.width || self.height < other.height
    }

    /// True when both dimensions fit inside `width`×`height`.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width <= width && self.height <= height
    }
}

impl fmt::Display for DeviceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.max_frame_rate())
    }
}

/// Thermal / power pressure reported by a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    Nominal,
    Fair,
    Serious,
    Critical,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    NotDetermined,
    Authorized,
    Denied,
    Restricted,
}

impl AuthorizationStatus {
    pub fn is_blocked(&self) -> bool {
        matches!(self, AuthorizationStatus::Denied | AuthorizationStatus::Restricted)
    }
}

/// A physical or virtual capture device.
///
/// Mutators are only valid between `lock_for_configuration` and
/// `unlock_for_configuration`; use [`lock_device`] rather than calling the
/// pair directly.
pub trait CaptureDevice: Send + Sync + fmt::Debug {
    fn unique_id(&self) -> String;
    fn device_type(&self) -> DeviceType;
    fn position(&self) -> Option<DevicePosition>;
    fn media_kind(&self) -> MediaKind;

    /// Supported formats, ordered from smallest to largest.
    fn formats(&self) -> Vec<DeviceFormat>;
    fn active_format(&self) -> Option<DeviceFormat>;
    /// Shortest frame duration currently allowed, i.e. `1 / max fps`.
    fn active_min_frame_duration(&self) -> MediaTime;

    fn lock_for_configuration(&self) -> Result<()>;
    fn unlock_for_configuration(&self);

    fn set_active_format(&self, format: &DeviceFormat) -> Result<()>;
    fn set_min_frame_duration_override(&self, duration: MediaTime) -> Result<()>;
    fn set_frame_duration_range(&self, min: MediaTime, max: MediaTime) -> Result<()>;

    fn system_pressure_level(&self) -> PressureLevel;
}

/// Holds a device configuration lock; unlocks on drop.
pub struct DeviceConfigurationLock<'a> {
    device: &'a dyn CaptureDevice,
}

impl<'a> DeviceConfigurationLock<'a> {
    pub fn device(&self) -> &dyn CaptureDevice {
        self.device
    }
}

impl Drop for DeviceConfigurationLock<'_> {
    fn drop(&mut self) {
        self.device.unlock_for_configuration();
    }
}

pub fn lock_device(device: &dyn CaptureDevice) -> Result<DeviceConfigurationLock<'_>> {
    device.lock_for_configuration()?;
    Ok(DeviceConfigurationLock { device })
}

/// Read-only device enumeration.
pub trait DeviceDiscovery: Send + Sync {
    fn authorization_status(&self, kind: MediaKind) -> AuthorizationStatus;
    fn is_multi_cam_supported(&self) -> bool;
    fn default_device(
        &self,
        kind: MediaKind,
        device_type: Option<DeviceType>,
        position: Option<DevicePosition>,
    ) -> Option<Arc<dyn CaptureDevice>>;
}
