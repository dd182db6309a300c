//! Capture graph builder
//!
//! Builds two camera pipelines and a two-port microphone pipeline with
//! explicit connections, inside one configuration transaction. A failed
//! build removes everything it added, newest first, before the transaction
//! commits.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::buffer::{DevicePosition, MediaKind, PixelFormat};
use crate::config::CaptureConfig;
use crate::cost::{CostMonitor, DegradationReport};
use crate::errors::{DualCamError, Result};
use crate::graph::{
    transaction, CaptureDevice, CaptureGraph, ConnectionId, ConnectionSpec, DeviceDiscovery, DeviceType, InputId,
    OutputId, OutputKind, PreviewSinkId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionSetupResult {
    Success,
    NotAuthorized,
    ConfigurationFailed,
    MultiCamNotSupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraPipeline {
    pub input: InputId,
    pub video_output: OutputId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicrophonePipeline {
    pub input: InputId,
    pub back_output: OutputId,
    pub front_output: OutputId,
}

/// Inputs and outputs created by a successful configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphTopology {
    pub back: CameraPipeline,
    pub front: CameraPipeline,
    pub microphone: MicrophonePipeline,
}

impl GraphTopology {
    pub fn camera(&self, position: DevicePosition) -> CameraPipeline {
        match position {
            DevicePosition::Back => self.back,
            DevicePosition::Front => self.front,
        }
    }

    pub fn audio_output(&self, position: DevicePosition) -> OutputId {
        match position {
            DevicePosition::Back => self.microphone.back_output,
            DevicePosition::Front => self.microphone.front_output,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetupOutcome {
    pub result: SessionSetupResult,
    /// Why setup failed.
    pub reason: Option<String>,
    pub topology: Option<GraphTopology>,
    /// The cost check run after a successful build.
    pub degradation: Option<DegradationReport>,
}

impl SetupOutcome {
    fn failed(result: SessionSetupResult, reason: impl Into<String>) -> Self {
        Self {
            result,
            reason: Some(reason.into()),
            topology: None,
            degradation: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == SessionSetupResult::Success
    }
}

#[derive(Debug, Clone, Copy)]
enum Added {
    Input(InputId),
    Output(OutputId),
    Connection(ConnectionId),
}

/// Records every graph item a build adds so a failure can undo them.
struct Assembly<'g, G: CaptureGraph + ?Sized> {
    graph: &'g mut G,
    added: Vec<Added>,
}

impl<'g, G: CaptureGraph + ?Sized> Assembly<'g, G> {
    fn add_input(&mut self, device: Arc<dyn CaptureDevice>) -> Result<InputId> {
        let id = self.graph.add_input(device)?;
        self.added.push(Added::Input(id));
        Ok(id)
    }

    fn add_output(&mut self, kind: OutputKind) -> Result<OutputId> {
        let id = self.graph.add_output(kind)?;
        self.added.push(Added::Output(id));
        Ok(id)
    }

    fn add_connection(&mut self, spec: ConnectionSpec) -> Result<ConnectionId> {
        let id = self.graph.add_connection(spec)?;
        self.added.push(Added::Connection(id));
        Ok(id)
    }

    fn roll_back(&mut self) {
        while let Some(item) = self.added.pop() {
            match item {
                Added::Connection(id) => self.graph.remove_connection(id),
                Added::Output(id) => self.graph.remove_output(id),
                Added::Input(id) => self.graph.remove_input(id),
            }
        }
    }
}

/// Build the capture graph. On success the cost monitor runs once.
pub fn configure<G: CaptureGraph + ?Sized>(
    graph: &mut G,
    discovery: &dyn DeviceDiscovery,
    capture: &CaptureConfig,
    monitor: &CostMonitor,
) -> SetupOutcome {
    let built = {
        let mut tx = transaction(graph);

        if discovery.authorization_status(MediaKind::Video).is_blocked() {
            log::warn!("Camera access not authorized");
            return SetupOutcome::failed(
                SessionSetupResult::NotAuthorized,
                "camera access is denied or restricted",
            );
        }
        if !discovery.is_multi_cam_supported() {
            log::warn!("MultiCam not supported on this device");
            return SetupOutcome::failed(
                SessionSetupResult::MultiCamNotSupported,
                "simultaneous capture from multiple cameras is not supported",
            );
        }

        let mut assembly = Assembly {
            graph: &mut *tx,
            added: Vec::new(),
        };
        let built = build(&mut assembly, discovery, capture);
        if built.is_err() {
            assembly.roll_back();
        }
        built
    };

    match built {
        Ok(topology) => {
            log::info!("Capture graph configured");
            let report = monitor.check_system_cost(graph);
            SetupOutcome {
                result: SessionSetupResult::Success,
                reason: None,
                topology: Some(topology),
                degradation: Some(report),
            }
        }
        Err(e) => {
            log::error!("Capture graph configuration failed: {}", e);
            SetupOutcome::failed(SessionSetupResult::ConfigurationFailed, e.to_string())
        }
    }
}

fn build<G: CaptureGraph + ?Sized>(
    assembly: &mut Assembly<'_, G>,
    discovery: &dyn DeviceDiscovery,
    capture: &CaptureConfig,
) -> Result<GraphTopology> {
    let back = add_camera(assembly, discovery, DevicePosition::Back, capture)?;
    let front = add_camera(assembly, discovery, DevicePosition::Front, capture)?;
    let microphone = add_microphone(assembly, discovery)?;
    Ok(GraphTopology {
        back,
        front,
        microphone,
    })
}

fn add_camera<G: CaptureGraph + ?Sized>(
    assembly: &mut Assembly<'_, G>,
    discovery: &dyn DeviceDiscovery,
    position: DevicePosition,
    capture: &CaptureConfig,
) -> Result<CameraPipeline> {
    let camera = discovery
        .default_device(
            MediaKind::Video,
            Some(DeviceType::BuiltInWideAngleCamera),
            Some(position),
        )
        .ok_or_else(|| DualCamError::Device(format!("Could not find the {} camera", position)))?;

    let input = assembly.add_input(camera.clone()).map_err(|e| {
        DualCamError::Graph(format!("Could not add {} camera device input: {}", position, e))
    })?;

    let port = assembly
        .graph
        .ports(input, MediaKind::Video, camera.device_type(), camera.position())
        .into_iter()
        .next()
        .ok_or_else(|| {
            DualCamError::Graph(format!(
                "Could not find the {} camera device input's video port",
                position
            ))
        })?;

    let video_output = assembly
        .add_output(OutputKind::VideoData {
            pixel_format: PixelFormat::Bgra32,
        })
        .map_err(|e| {
            DualCamError::Graph(format!(
                "Could not add the {} camera video data output: {}",
                position, e
            ))
        })?;

    let mirrored = position == DevicePosition::Front && capture.mirror_front_camera;

    assembly
        .add_connection(
            ConnectionSpec::to_output(port, video_output)
                .with_orientation(capture.video_orientation)
                .with_mirroring(mirrored),
        )
        .map_err(|e| {
            DualCamError::Graph(format!(
                "Could not add a connection to the {} camera video data output: {}",
                position, e
            ))
        })?;

    assembly
        .add_connection(
            ConnectionSpec::to_preview(port, PreviewSinkId(position)).with_mirroring(mirrored),
        )
        .map_err(|e| {
            DualCamError::Graph(format!(
                "Could not add a connection to the {} camera video preview layer: {}",
                position, e
            ))
        })?;

    log::debug!("Configured {} camera {}", position, camera.unique_id());
    Ok(CameraPipeline {
        input,
        video_output,
    })
}

fn add_microphone<G: CaptureGraph + ?Sized>(
    assembly: &mut Assembly<'_, G>,
    discovery: &dyn DeviceDiscovery,
) -> Result<MicrophonePipeline> {
    let microphone = discovery
        .default_device(MediaKind::Audio, None, None)
        .ok_or_else(|| DualCamError::Device("Could not find the microphone".to_string()))?;

    let input = assembly.add_input(microphone.clone()).map_err(|e| {
        DualCamError::Graph(format!("Could not add microphone device input: {}", e))
    })?;

    let port_for = |position: DevicePosition| {
        assembly
            .graph
            .ports(input, MediaKind::Audio, microphone.device_type(), Some(position))
            .into_iter()
            .next()
            .ok_or_else(|| {
                DualCamError::Graph(format!(
                    "Could not find the microphone's {} audio port",
                    position
                ))
            })
    };
    let back_port = port_for(DevicePosition::Back)?;
    let front_port = port_for(DevicePosition::Front)?;

    let back_output = assembly.add_output(OutputKind::AudioData).map_err(|e| {
        DualCamError::Graph(format!("Could not add the back microphone audio data output: {}", e))
    })?;
    let front_output = assembly.add_output(OutputKind::AudioData).map_err(|e| {
        DualCamError::Graph(format!("Could not add the front microphone audio data output: {}", e))
    })?;

    assembly
        .add_connection(ConnectionSpec::to_output(back_port, back_output))
        .map_err(|e| {
            DualCamError::Graph(format!(
                "Could not add a connection to the back microphone audio data output: {}",
                e
            ))
        })?;
    assembly
        .add_connection(ConnectionSpec::to_output(front_port, front_output))
        .map_err(|e| {
            DualCamError::Graph(format!(
                "Could not add a connection to the front microphone audio data output: {}",
                e
            ))
        })?;

    Ok(MicrophonePipeline {
        input,
        back_output,
        front_output,
    })
}
