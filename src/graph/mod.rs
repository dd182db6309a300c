//! Capture graph abstraction
//!
//! A capture graph owns device inputs, data outputs and explicit
//! port-to-target connections. Every mutation happens inside a
//! begin/commit configuration transaction; [`transaction`] gives a guard
//! that commits when dropped, so early returns never leave a
//! transaction open.

mod device;

pub use device::{
    lock_device, AuthorizationStatus, CaptureDevice, DeviceConfigurationLock, DeviceDiscovery,
    DeviceFormat, DeviceType, FrameRateRange, PressureLevel,
};

use crate::buffer::{DevicePosition, MediaKind, PixelFormat};
use crate::errors::Result;
use crate::recording::{AudioSettings, VideoSettings};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

/// A stream exposed by an input: one media type from one source sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputPort {
    pub input: InputId,
    pub media: MediaKind,
    pub source_device_type: DeviceType,
    pub source_position: Option<DevicePosition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputKind {
    VideoData { pixel_format: PixelFormat },
    AudioData,
}

/// Preview layer owned by the UI, one per camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreviewSinkId(pub DevicePosition);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionTarget {
    Output(OutputId),
    Preview(PreviewSinkId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoOrientation {
    Portrait,
    PortraitUpsideDown,
    LandscapeRight,
    LandscapeLeft,
}

impl VideoOrientation {
    /// Clockwise rotation from portrait, in degrees.
    pub fn degrees(&self) -> u32 {
        match self {
            VideoOrientation::Portrait => 0,
            VideoOrientation::LandscapeRight => 90,
            VideoOrientation::PortraitUpsideDown => 180,
            VideoOrientation::LandscapeLeft => 270,
        }
    }
}

/// Requested connection, before the graph assigns it an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub ports: Vec<InputPort>,
    pub target: ConnectionTarget,
    pub orientation: Option<VideoOrientation>,
    pub mirrored: bool,
}

impl ConnectionSpec {
    pub fn to_output(port: InputPort, output: OutputId) -> Self {
        Self {
            ports: vec![port],
            target: ConnectionTarget::Output(output),
            orientation: None,
            mirrored: false,
        }
    }

    pub fn to_preview(port: InputPort, sink: PreviewSinkId) -> Self {
        Self {
            ports: vec![port],
            target: ConnectionTarget::Preview(sink),
            orientation: None,
            mirrored: false,
        }
    }

    pub fn with_orientation(mut self, orientation: VideoOrientation) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn with_mirroring(mut self, mirrored: bool) -> Self {
        self.mirrored = mirrored;
        self
    }

    /// Same connection fed from a different port.
    pub fn rewired(&self, port: InputPort) -> Self {
        Self {
            ports: vec![port],
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub spec: ConnectionSpec,
}

impl Connection {
    pub fn ports(&self) -> &[InputPort] {
        &self.spec.ports
    }

    pub fn target(&self) -> ConnectionTarget {
        self.spec.target
    }
}

/// Normalized costs of the running configuration; 1.0 is the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CostState {
    pub pressure_cost: f64,
    pub hardware_cost: f64,
}

impl CostState {
    pub fn new(pressure_cost: f64, hardware_cost: f64) -> Self {
        Self {
            pressure_cost,
            hardware_cost,
        }
    }
}

impl fmt::Display for CostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pressure={:.2} hardware={:.2}",
            self.pressure_cost, self.hardware_cost
        )
    }
}

/// Platform capture session seen through its capabilities.
pub trait CaptureGraph: Send {
    fn begin_configuration(&mut self);
    fn commit_configuration(&mut self);

    /// Add an input without creating implicit connections.
    fn add_input(&mut self, device: Arc<dyn CaptureDevice>) -> Result<InputId>;
    fn remove_input(&mut self, input: InputId);
    fn input_device(&self, input: InputId) -> Option<Arc<dyn CaptureDevice>>;
    fn ports(
        &self,
        input: InputId,
        media: MediaKind,
        device_type: DeviceType,
        position: Option<DevicePosition>,
    ) -> Vec<InputPort>;

    /// Add an output without creating implicit connections.
    fn add_output(&mut self, kind: OutputKind) -> Result<OutputId>;
    fn remove_output(&mut self, output: OutputId);

    fn add_connection(&mut self, spec: ConnectionSpec) -> Result<ConnectionId>;
    fn remove_connection(&mut self, connection: ConnectionId);
    fn connections(&self) -> Vec<Connection>;

    fn cost_state(&self) -> CostState;

    fn start_running(&mut self) -> Result<()>;
    fn stop_running(&mut self);
    fn is_running(&self) -> bool;

    fn recommended_video_settings(&self, output: OutputId) -> Option<VideoSettings>;
    fn recommended_audio_settings(&self, output: OutputId) -> Option<AudioSettings>;
}

impl<G: CaptureGraph + ?Sized> CaptureGraph for Box<G> {
    fn begin_configuration(&mut self) {
        (**self).begin_configuration()
    }
    fn commit_configuration(&mut self) {
        (**self).commit_configuration()
    }
    fn add_input(&mut self, device: Arc<dyn CaptureDevice>) -> Result<InputId> {
        (**self).add_input(device)
    }
    fn remove_input(&mut self, input: InputId) {
        (**self).remove_input(input)
    }
    fn input_device(&self, input: InputId) -> Option<Arc<dyn CaptureDevice>> {
        (**self).input_device(input)
    }
    fn ports(
        &self,
        input: InputId,
        media: MediaKind,
        device_type: DeviceType,
        position: Option<DevicePosition>,
    ) -> Vec<InputPort> {
        (**self).ports(input, media, device_type, position)
    }
    fn add_output(&mut self, kind: OutputKind) -> Result<OutputId> {
        (**self).add_output(kind)
    }
    fn remove_output(&mut self, output: OutputId) {
        (**self).remove_output(output)
    }
    fn add_connection(&mut self, spec: ConnectionSpec) -> Result<ConnectionId> {
        (**self).add_connection(spec)
    }
    fn remove_connection(&mut self, connection: ConnectionId) {
        (**self).remove_connection(connection)
    }
    fn connections(&self) -> Vec<Connection> {
        (**self).connections()
    }
    fn cost_state(&self) -> CostState {
        (**self).cost_state()
    }
    fn start_running(&mut self) -> Result<()> {
        (**self).start_running()
    }
    fn stop_running(&mut self) {
        (**self).stop_running()
    }
    fn is_running(&self) -> bool {
        (**self).is_running()
    }
    fn recommended_video_settings(&self, output: OutputId) -> Option<VideoSettings> {
        (**self).recommended_video_settings(output)
    }
    fn recommended_audio_settings(&self, output: OutputId) -> Option<AudioSettings> {
        (**self).recommended_audio_settings(output)
    }
}

/// Open configuration transaction; commits on drop.
pub struct ConfigurationTransaction<'a, G: CaptureGraph + ?Sized> {
    graph: &'a mut G,
}

impl<G: CaptureGraph + ?Sized> Deref for ConfigurationTransaction<'_, G> {
    type Target = G;

    fn deref(&self) -> &G {
        self.graph
    }
}

impl<G: CaptureGraph + ?Sized> DerefMut for ConfigurationTransaction<'_, G> {
    fn deref_mut(&mut self) -> &mut G {
        self.graph
    }
}

impl<G: CaptureGraph + ?Sized> Drop for ConfigurationTransaction<'_, G> {
    fn drop(&mut self) {
        self.graph.commit_configuration();
    }
}

pub fn transaction<G: CaptureGraph + ?Sized>(graph: &mut G) -> ConfigurationTransaction<'_, G> {
    graph.begin_configuration();
    ConfigurationTransaction { graph }
}

/// The capture device behind the first video port of any connection fed by
/// the camera at `position`.
pub fn camera_device_at<G: CaptureGraph + ?Sized>(
    graph: &G,
    position: DevicePosition,
) -> Option<Arc<dyn CaptureDevice>> {
    graph
        .connections()
        .into_iter()
        .flat_map(|c| c.spec.ports)
        .find(|p| p.media == MediaKind::Video && p.source_position == Some(position))
        .and_then(|p| graph.input_device(p.input))
}
