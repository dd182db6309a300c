//! In-memory capture devices and discovery

use std::sync::{Arc, Mutex};

use crate::buffer::{DevicePosition, MediaKind};
use crate::errors::{DualCamError, Result};
use crate::graph::{
    AuthorizationStatus, CaptureDevice, DeviceDiscovery, DeviceFormat, DeviceType, PressureLevel,
};
use crate::timing::MediaTime;

/// Formats of a typical phone camera, smallest first. The largest one
/// cannot run alongside another camera.
pub fn standard_formats() -> Vec<DeviceFormat> {
    vec![
        DeviceFormat::new(640, 480, 30.0, true),
        DeviceFormat::new(1280, 720, 30.0, true),
        DeviceFormat::new(1920, 1080, 30.0, true),
        DeviceFormat::new(4032, 3024, 30.0, false),
    ]
}

/// A device mutation performed under a configuration lock.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceMutation {
    ActiveFormat(DeviceFormat),
    MinFrameDurationOverride(MediaTime),
    FrameDurationRange { min: MediaTime, max: MediaTime },
}

#[derive(Debug)]
struct DeviceState {
    formats: Vec<DeviceFormat>,
    active: Option<usize>,
    min_frame_duration: MediaTime,
    frame_duration_range: Option<(MediaTime, MediaTime)>,
    locked: bool,
    fail_lock: bool,
    pressure: PressureLevel,
    mutations: Vec<DeviceMutation>,
}

#[derive(Debug)]
pub struct FakeCaptureDevice {
    unique_id: String,
    device_type: DeviceType,
    position: Option<DevicePosition>,
    media_kind: MediaKind,
    state: Mutex<DeviceState>,
}

impl FakeCaptureDevice {
    fn build(
        unique_id: String,
        device_type: DeviceType,
        position: Option<DevicePosition>,
        media_kind: MediaKind,
        formats: Vec<DeviceFormat>,
        active: Option<usize>,
    ) -> Self {
        let fps = active
            .and_then(|i| formats.get(i))
            .map(|f| f.max_frame_rate())
            .unwrap_or(30.0);
        Self {
            unique_id,
            device_type,
            position,
            media_kind,
            state: Mutex::new(DeviceState {
                formats,
                active,
                min_frame_duration: MediaTime::frame_duration(fps),
                frame_duration_range: None,
                locked: false,
                fail_lock: false,
                pressure: PressureLevel::Nominal,
                mutations: Vec::new(),
            }),
        }
    }

    /// Wide-angle camera running `formats[active]`.
    pub fn camera(position: DevicePosition, formats: Vec<DeviceFormat>, active: usize) -> Self {
        Self::build(
            format!("{}-wide", position),
            DeviceType::BuiltInWideAngleCamera,
            Some(position),
            MediaKind::Video,
            formats,
            Some(active),
        )
    }

    /// Wide-angle camera on the standard formats, active at 1920x1080.
    pub fn standard_camera(position: DevicePosition) -> Self {
        Self::camera(position, standard_formats(), 2)
    }

    /// Dual-lens virtual camera on the standard formats.
    pub fn dual_camera(position: DevicePosition) -> Self {
        Self::build(
            format!("{}-dual", position),
            DeviceType::BuiltInDualCamera,
            Some(position),
            MediaKind::Video,
            standard_formats(),
            Some(2),
        )
    }

    pub fn microphone() -> Self {
        Self::build(
            "microphone".to_string(),
            DeviceType::BuiltInMicrophone,
            None,
            MediaKind::Audio,
            Vec::new(),
            None,
        )
    }

    fn state(&self) -> std::sync::MutexGuard<'_, DeviceState> {
        self.state.lock().expect("lock poisoned")
    }

    pub fn set_fail_lock(&self, fail: bool) {
        self.state().fail_lock = fail;
    }

    pub fn set_pressure_level(&self, level: PressureLevel) {
        self.state().pressure = level;
    }

    pub fn is_locked(&self) -> bool {
        self.state().locked
    }

    /// Current maximum frame rate.
    pub fn frame_rate(&self) -> f64 {
        self.state().min_frame_duration.as_frame_rate()
    }

    pub fn frame_duration_range(&self) -> Option<(MediaTime, MediaTime)> {
        self.state().frame_duration_range
    }

    pub fn mutations(&self) -> Vec<DeviceMutation> {
        self.state().mutations.clone()
    }

    fn require_lock(state: &DeviceState, what: &str) -> Result<()> {
        if state.locked {
            Ok(())
        } else {
            Err(DualCamError::DeviceLock(format!(
                "{} requires a configuration lock",
                what
            )))
        }
    }
}

impl CaptureDevice for FakeCaptureDevice {
    fn unique_id(&self) -> String {
        self.unique_id.clone()
    }

    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn position(&self) -> Option<DevicePosition> {
        self.position
    }

    fn media_kind(&self) -> MediaKind {
        self.media_kind
    }

    fn formats(&self) -> Vec<DeviceFormat> {
        self.state().formats.clone()
    }

    fn active_format(&self) -> Option<DeviceFormat> {
        let state = self.state();
        state.active.and_then(|i| state.formats.get(i).cloned())
    }

    fn active_min_frame_duration(&self) -> MediaTime {
        self.state().min_frame_duration
    }

    fn lock_for_configuration(&self) -> Result<()> {
        let mut state = self.state();
        if state.fail_lock {
            return Err(DualCamError::DeviceLock(format!(
                "{} is busy",
                self.unique_id
            )));
        }
        state.locked = true;
        Ok(())
    }

    fn unlock_for_configuration(&self) {
        self.state().locked = false;
    }

    fn set_active_format(&self, format: &DeviceFormat) -> Result<()> {
        let mut state = self.state();
        Self::require_lock(&state, "set_active_format")?;
        let index = state
            .formats
            .iter()
            .position(|f| f == format)
            .ok_or_else(|| DualCamError::Device(format!("unsupported format {}", format)))?;
        state.active = Some(index);
        state.min_frame_duration = MediaTime::frame_duration(format.max_frame_rate());
        state
            .mutations
            .push(DeviceMutation::ActiveFormat(format.clone()));
        Ok(())
    }

    fn set_min_frame_duration_override(&self, duration: MediaTime) -> Result<()> {
        let mut state = self.state();
        Self::require_lock(&state, "set_min_frame_duration_override")?;
        state.min_frame_duration = duration;
        state
            .mutations
            .push(DeviceMutation::MinFrameDurationOverride(duration));
        Ok(())
    }

    fn set_frame_duration_range(&self, min: MediaTime, max: MediaTime) -> Result<()> {
        let mut state = self.state();
        Self::require_lock(&state, "set_frame_duration_range")?;
        state.min_frame_duration = min;
        state.frame_duration_range = Some((min, max));
        state
            .mutations
            .push(DeviceMutation::FrameDurationRange { min, max });
        Ok(())
    }

    fn system_pressure_level(&self) -> PressureLevel {
        self.state().pressure
    }
}

/// Device enumeration over a fixed set of fake devices.
#[derive(Debug)]
pub struct FakeDeviceDiscovery {
    authorization: AuthorizationStatus,
    multi_cam_supported: bool,
    back: Option<Arc<FakeCaptureDevice>>,
    front: Option<Arc<FakeCaptureDevice>>,
    microphone: Option<Arc<FakeCaptureDevice>>,
}

impl Default for FakeDeviceDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDeviceDiscovery {
    /// Authorized, multi-cam capable, with standard back and front cameras
    /// and a microphone.
    pub fn new() -> Self {
        Self {
            authorization: AuthorizationStatus::Authorized,
            multi_cam_supported: true,
            back: Some(Arc::new(FakeCaptureDevice::standard_camera(
                DevicePosition::Back,
            ))),
            front: Some(Arc::new(FakeCaptureDevice::standard_camera(
                DevicePosition::Front,
            ))),
            microphone: Some(Arc::new(FakeCaptureDevice::microphone())),
        }
    }

    pub fn with_authorization(mut self, status: AuthorizationStatus) -> Self {
        self.authorization = status;
        self
    }

    pub fn with_multi_cam(mut self, supported: bool) -> Self {
        self.multi_cam_supported = supported;
        self
    }

    pub fn with_camera(mut self, camera: Arc<FakeCaptureDevice>) -> Self {
        match camera.position() {
            Some(DevicePosition::Back) => self.back = Some(camera),
            Some(DevicePosition::Front) => self.front = Some(camera),
            None => {}
        }
        self
    }

    pub fn without_camera(mut self, position: DevicePosition) -> Self {
        match position {
            DevicePosition::Back => self.back = None,
            DevicePosition::Front => self.front = None,
        }
        self
    }

    pub fn without_microphone(mut self) -> Self {
        self.microphone = None;
        self
    }

    pub fn camera(&self, position: DevicePosition) -> Option<Arc<FakeCaptureDevice>> {
        match position {
            DevicePosition::Back => self.back.clone(),
            DevicePosition::Front => self.front.clone(),
        }
    }

    pub fn microphone(&self) -> Option<Arc<FakeCaptureDevice>> {
        self.microphone.clone()
    }
}

impl DeviceDiscovery for FakeDeviceDiscovery {
    fn authorization_status(&self, _kind: MediaKind) -> AuthorizationStatus {
        self.authorization
    }

    fn is_multi_cam_supported(&self) -> bool {
        self.multi_cam_supported
    }

    fn default_device(
        &self,
        kind: MediaKind,
        device_type: Option<DeviceType>,
        position: Option<DevicePosition>,
    ) -> Option<Arc<dyn CaptureDevice>> {
        let device = match kind {
            MediaKind::Audio => self.microphone.clone(),
            MediaKind::Video => position.and_then(|p| self.camera(p)),
        }?;
        if device_type.is_some_and(|t| t != device.device_type()) {
            return None;
        }
        Some(device as Arc<dyn CaptureDevice>)
    }
}
