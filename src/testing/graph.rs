//! In-memory capture graph with scripted costs and failure injection

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::buffer::{DevicePosition, MediaKind};
use crate::errors::{DualCamError, Result};
use crate::graph::{
    CaptureDevice, CaptureGraph, Connection, ConnectionId, ConnectionSpec, ConnectionTarget,
    CostState, DeviceType, InputId, InputPort, OutputId, OutputKind,
};
use crate::recording::{AudioCodec, AudioSettings, VideoSettings};

type ConnectionFilter = Box<dyn Fn(&ConnectionSpec) -> bool + Send>;

#[derive(Default)]
struct Failures {
    camera_input: Option<DevicePosition>,
    microphone_input: bool,
    output_at: Option<usize>,
    connection: Option<ConnectionFilter>,
    start: bool,
}

pub struct FakeCaptureGraph {
    next_id: u64,
    inputs: BTreeMap<InputId, Arc<dyn CaptureDevice>>,
    outputs: BTreeMap<OutputId, OutputKind>,
    connections: BTreeMap<ConnectionId, ConnectionSpec>,
    configuration_depth: u32,
    commits: u32,
    violations: Vec<String>,
    costs: Mutex<VecDeque<CostState>>,
    cost_reads: AtomicU32,
    outputs_added: usize,
    running: bool,
    failures: Failures,
    video_settings: VideoSettings,
    video_overrides: HashMap<DevicePosition, VideoSettings>,
    audio_settings: AudioSettings,
    audio_overrides: HashMap<DevicePosition, AudioSettings>,
}

impl Default for FakeCaptureGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCaptureGraph {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            connections: BTreeMap::new(),
            configuration_depth: 0,
            commits: 0,
            violations: Vec::new(),
            costs: Mutex::new(VecDeque::new()),
            cost_reads: AtomicU32::new(0),
            outputs_added: 0,
            running: false,
            failures: Failures::default(),
            video_settings: VideoSettings::h264(1920, 1080, 30.0),
            video_overrides: HashMap::new(),
            audio_settings: AudioSettings::new(AudioCodec::Aac, 48_000, 1),
            audio_overrides: HashMap::new(),
        }
    }

    /// Costs returned by successive reads. The last one repeats.
    pub fn with_costs(mut self, costs: impl IntoIterator<Item = CostState>) -> Self {
        self.set_costs(costs);
        self
    }

    pub fn set_costs(&mut self, costs: impl IntoIterator<Item = CostState>) {
        *self.costs.lock().expect("lock poisoned") = costs.into_iter().collect();
    }

    pub fn reject_camera_input(mut self, position: DevicePosition) -> Self {
        self.failures.camera_input = Some(position);
        self
    }

    pub fn reject_microphone_input(mut self) -> Self {
        self.failures.microphone_input = true;
        self
    }

    /// Fail the `nth` (zero-based) `add_output` call.
    pub fn reject_output(mut self, nth: usize) -> Self {
        self.failures.output_at = Some(nth);
        self
    }

    pub fn reject_connections<F>(mut self, filter: F) -> Self
    where
        F: Fn(&ConnectionSpec) -> bool + Send + 'static,
    {
        self.failures.connection = Some(Box::new(filter));
        self
    }

    pub fn fail_start(mut self) -> Self {
        self.failures.start = true;
        self
    }

    pub fn set_start_fails(&mut self, fails: bool) {
        self.failures.start = fails;
    }

    pub fn with_video_settings(mut self, position: DevicePosition, settings: VideoSettings) -> Self {
        self.video_overrides.insert(position, settings);
        self
    }

    pub fn with_audio_settings(mut self, position: DevicePosition, settings: AudioSettings) -> Self {
        self.audio_overrides.insert(position, settings);
        self
    }

    /// Simulate the platform stopping the graph on its own.
    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty() && self.connections.is_empty()
    }

    pub fn in_configuration(&self) -> bool {
        self.configuration_depth > 0
    }

    /// Completed outermost configuration transactions.
    pub fn commit_count(&self) -> u32 {
        self.commits
    }

    /// Mutations attempted outside a configuration transaction.
    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    /// Number of `cost_state` calls so far.
    pub fn cost_reads(&self) -> u32 {
        self.cost_reads.load(Ordering::SeqCst)
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_configuring(&mut self, operation: &str) {
        if self.configuration_depth == 0 {
            self.violations
                .push(format!("{} outside a configuration transaction", operation));
        }
    }

    fn all_ports(&self, input: InputId) -> Vec<InputPort> {
        let Some(device) = self.inputs.get(&input) else {
            return Vec::new();
        };
        let port = |media, source_device_type, source_position| InputPort {
            input,
            media,
            source_device_type,
            source_position,
        };
        match device.device_type() {
            DeviceType::BuiltInWideAngleCamera => vec![port(
                MediaKind::Video,
                DeviceType::BuiltInWideAngleCamera,
                device.position(),
            )],
            DeviceType::BuiltInDualCamera => vec![
                port(MediaKind::Video, DeviceType::BuiltInDualCamera, device.position()),
                port(MediaKind::Video, DeviceType::BuiltInWideAngleCamera, device.position()),
            ],
            DeviceType::BuiltInMicrophone => vec![
                port(
                    MediaKind::Audio,
                    DeviceType::BuiltInMicrophone,
                    Some(DevicePosition::Back),
                ),
                port(
                    MediaKind::Audio,
                    DeviceType::BuiltInMicrophone,
                    Some(DevicePosition::Front),
                ),
            ],
        }
    }

    /// Source position of the connection feeding `output`.
    fn feeding_position(&self, output: OutputId, media: MediaKind) -> Option<DevicePosition> {
        self.connections
            .values()
            .filter(|spec| spec.target == ConnectionTarget::Output(output))
            .flat_map(|spec| spec.ports.iter())
            .find(|p| p.media == media)
            .and_then(|p| p.source_position)
    }
}

impl fmt::Debug for FakeCaptureGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeCaptureGraph")
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs)
            .field("connections", &self.connections)
            .field("running", &self.running)
            .finish()
    }
}

impl CaptureGraph for FakeCaptureGraph {
    fn begin_configuration(&mut self) {
        self.configuration_depth += 1;
    }

    fn commit_configuration(&mut self) {
        match self.configuration_depth {
            0 => self
                .violations
                .push("commit without begin_configuration".to_string()),
            1 => {
                self.configuration_depth = 0;
                self.commits += 1;
            }
            _ => self.configuration_depth -= 1,
        }
    }

    fn add_input(&mut self, device: Arc<dyn CaptureDevice>) -> Result<InputId> {
        self.check_configuring("add_input");
        let rejected = match device.media_kind() {
            MediaKind::Audio => self.failures.microphone_input,
            MediaKind::Video => {
                self.failures.camera_input.is_some()
                    && self.failures.camera_input == device.position()
            }
        };
        if rejected {
            return Err(DualCamError::Graph(format!(
                "cannot add input for {}",
                device.unique_id()
            )));
        }
        let id = InputId(self.allocate_id());
        self.inputs.insert(id, device);
        Ok(id)
    }

    fn remove_input(&mut self, input: InputId) {
        self.check_configuring("remove_input");
        self.inputs.remove(&input);
        self.connections
            .retain(|_, spec| spec.ports.iter().all(|p| p.input != input));
    }

    fn input_device(&self, input: InputId) -> Option<Arc<dyn CaptureDevice>> {
        self.inputs.get(&input).cloned()
    }

    fn ports(
        &self,
        input: InputId,
        media: MediaKind,
        source_device_type: DeviceType,
        source_position: Option<DevicePosition>,
    ) -> Vec<InputPort> {
        self.all_ports(input)
            .into_iter()
            .filter(|p| p.media == media && p.source_device_type == source_device_type)
            .filter(|p| source_position.is_none() || p.source_position == source_position)
            .collect()
    }

    fn add_output(&mut self, kind: OutputKind) -> Result<OutputId> {
        self.check_configuring("add_output");
        let nth = self.outputs_added;
        self.outputs_added += 1;
        if self.failures.output_at == Some(nth) {
            return Err(DualCamError::Graph(format!("cannot add output {:?}", kind)));
        }
        let id = OutputId(self.allocate_id());
        self.outputs.insert(id, kind);
        Ok(id)
    }

    fn remove_output(&mut self, output: OutputId) {
        self.check_configuring("remove_output");
        self.outputs.remove(&output);
        self.connections
            .retain(|_, spec| spec.target != ConnectionTarget::Output(output));
    }

    fn add_connection(&mut self, spec: ConnectionSpec) -> Result<ConnectionId> {
        self.check_configuring("add_connection");
        if let Some(port) = spec.ports.iter().find(|p| !self.inputs.contains_key(&p.input)) {
            return Err(DualCamError::Graph(format!(
                "connection port references missing input {:?}",
                port.input
            )));
        }
        if let ConnectionTarget::Output(output) = spec.target {
            if !self.outputs.contains_key(&output) {
                return Err(DualCamError::Graph(format!(
                    "connection targets missing output {:?}",
                    output
                )));
            }
        }
        if self
            .failures
            .connection
            .as_ref()
            .is_some_and(|reject| reject(&spec))
        {
            return Err(DualCamError::Graph("cannot add connection".to_string()));
        }
        let id = ConnectionId(self.allocate_id());
        self.connections.insert(id, spec);
        Ok(id)
    }

    fn remove_connection(&mut self, connection: ConnectionId) {
        self.check_configuring("remove_connection");
        self.connections.remove(&connection);
    }

    fn connections(&self) -> Vec<Connection> {
        self.connections
            .iter()
            .map(|(id, spec)| Connection {
                id: *id,
                spec: spec.clone(),
            })
            .collect()
    }

    fn cost_state(&self) -> CostState {
        self.cost_reads.fetch_add(1, Ordering::SeqCst);
        let mut costs = self.costs.lock().expect("lock poisoned");
        if costs.len() > 1 {
            costs.pop_front().unwrap_or_default()
        } else {
            costs.front().copied().unwrap_or_default()
        }
    }

    fn start_running(&mut self) -> Result<()> {
        if self.failures.start {
            return Err(DualCamError::Session("capture graph failed to start".to_string()));
        }
        self.running = true;
        Ok(())
    }

    fn stop_running(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn recommended_video_settings(&self, output: OutputId) -> Option<VideoSettings> {
        if !matches!(self.outputs.get(&output), Some(OutputKind::VideoData { .. })) {
            return None;
        }
        let position = self.feeding_position(output, MediaKind::Video)?;
        Some(
            self.video_overrides
                .get(&position)
                .cloned()
                .unwrap_or_else(|| self.video_settings.clone()),
        )
    }

    fn recommended_audio_settings(&self, output: OutputId) -> Option<AudioSettings> {
        if self.outputs.get(&output) != Some(&OutputKind::AudioData) {
            return None;
        }
        let position = self.feeding_position(output, MediaKind::Audio)?;
        Some(
            self.audio_overrides
                .get(&position)
                .cloned()
                .unwrap_or_else(|| self.audio_settings.clone()),
        )
    }
}
