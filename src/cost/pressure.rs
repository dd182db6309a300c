//! System pressure level throttle

use crate::buffer::DevicePosition;
use crate::config::PressureConfig;
use crate::graph::{camera_device_at, lock_device, CaptureGraph, PressureLevel};
use crate::timing::MediaTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PressureResponse {
    /// Nothing to do at this level.
    Ignored,
    /// Back camera frame duration range clamped.
    Throttled,
    /// Throttling skipped: recording in progress or throttling disabled.
    Deferred,
    /// The lock or the device refused the new range.
    Failed,
    /// The system is about to stop capture.
    Shutdown,
}

/// React to a pressure level reported by the back camera.
pub fn apply_pressure_level<G: CaptureGraph + ?Sized>(
    graph: &G,
    level: PressureLevel,
    recording_active: bool,
    config: &PressureConfig,
) -> PressureResponse {
    match level {
        PressureLevel::Serious | PressureLevel::Critical => {
            if recording_active || !config.throttle_enabled {
                log::warn!("Reached elevated system pressure level: {:?}", level);
                return PressureResponse::Deferred;
            }
            let Some(device) = camera_device_at(graph, DevicePosition::Back) else {
                return PressureResponse::Failed;
            };

            let lock = match lock_device(device.as_ref()) {
                Ok(lock) => lock,
                Err(e) => {
                    log::warn!("Could not lock device for configuration: {}", e);
                    return PressureResponse::Failed;
                }
            };
            let min = MediaTime::frame_duration(config.throttle_max_fps);
            let max = MediaTime::frame_duration(config.throttle_min_fps);
            if let Err(e) = lock.device().set_frame_duration_range(min, max) {
                log::warn!("Could not throttle back camera: {}", e);
                return PressureResponse::Failed;
            }

            log::warn!(
                "Reached elevated system pressure level: {:?}. Throttling frame rate to {}-{} fps.",
                level,
                config.throttle_min_fps,
                config.throttle_max_fps
            );
            PressureResponse::Throttled
        }
        PressureLevel::Shutdown => {
            log::error!("Session stopped running due to shutdown system pressure level.");
            PressureResponse::Shutdown
        }
        PressureLevel::Nominal | PressureLevel::Fair => PressureResponse::Ignored,
    }
}
