//! Session lifecycle controller
//!
//! Owns the capture graph on the session-configuration queue and the router
//! and recorder on the data-delivery queue. Public methods are called from
//! the UI thread; they never block on frame delivery, and configuration work
//! never blocks on frames.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::builder::{configure, GraphTopology, SessionSetupResult, SetupOutcome};
use super::events::{EventReceiver, EventSink, SessionEvent};
use super::queue::SerialQueue;
use crate::buffer::{audio_levels, DevicePosition, SampleBuffer};
use crate::config::DualCamConfig;
use crate::cost::{apply_pressure_level, CostMonitor, DegradationReport, PressureResponse};
use crate::errors::{DualCamError, Result};
use crate::graph::{
    transaction, CaptureGraph, ConnectionTarget, DeviceDiscovery, PressureLevel, VideoOrientation,
};
use crate::recording::{
    save_recording, AudioSettings, BackgroundTaskGuard, BackgroundTaskHost, MediaLibrary,
    MovieRecorder, MovieWriterFactory, RecorderSettings, RecordingOutcome, VideoSettings,
    VideoTransform,
};
use crate::routing::{FrameRouter, NormalizedRect, PipState, PreviewLayout, Routed};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotConfigured,
    Configuring,
    Running,
    Stopped,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionReason {
    VideoDeviceInUseByAnotherClient,
    VideoDeviceNotAvailableWithMultipleForegroundApps,
    AudioDeviceInUseByAnotherClient,
    VideoDeviceNotAvailableDueToSystemPressure,
    VideoDeviceNotAvailableInBackground,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The media server restarted; a running session can be restarted.
    MediaServicesWereReset,
    Other(String),
}

/// Platform services the controller talks to besides the graph.
#[derive(Clone)]
pub struct SessionCollaborators {
    pub discovery: Arc<dyn DeviceDiscovery>,
    pub writer_factory: Arc<dyn MovieWriterFactory>,
    pub media_library: Option<Arc<dyn MediaLibrary>>,
    pub background_tasks: Arc<dyn BackgroundTaskHost>,
}

/// Recommended writer settings, refreshed after every graph change.
#[derive(Debug, Clone, Default)]
struct RecordingInputs {
    back_audio: Option<AudioSettings>,
    front_audio: Option<AudioSettings>,
    back_video: Option<VideoSettings>,
    front_video: Option<VideoSettings>,
    capture_orientation: Option<VideoOrientation>,
}

struct SessionCore<G> {
    graph: G,
    topology: Option<GraphTopology>,
    setup_result: Option<SessionSetupResult>,
    monitor: CostMonitor,
}

struct DeliveryCore {
    router: FrameRouter,
    recorder: MovieRecorder,
    last_levels: Option<Instant>,
}

#[derive(Debug, Clone, Copy, Default)]
struct PipUi {
    state: PipState,
    layout: Option<PreviewLayout>,
}

/// State shared by jobs on both queues. Every lock here is held briefly.
struct Shared {
    config: DualCamConfig,
    collaborators: SessionCollaborators,
    events: EventSink,
    state: Mutex<SessionState>,
    recording_active: AtomicBool,
    recording_busy: AtomicBool,
    recording_inputs: Mutex<RecordingInputs>,
    device_orientation: Mutex<VideoOrientation>,
    background_task: Mutex<Option<BackgroundTaskGuard>>,
}

impl Shared {
    fn set_state(&self, state: SessionState) {
        *self.state.lock().expect("lock poisoned") = state;
    }

    fn state(&self) -> SessionState {
        *self.state.lock().expect("lock poisoned")
    }

    fn set_running(&self, running: bool) {
        self.set_state(if running {
            SessionState::Running
        } else {
            SessionState::Stopped
        });
        self.events.emit(SessionEvent::RunningChanged(running));
        self.events
            .emit(SessionEvent::RecordAvailabilityChanged(running));
    }
}

/// Drives one dual-camera capture session.
pub struct SessionController<G: CaptureGraph + 'static> {
    shared: Arc<Shared>,
    session: Arc<Mutex<SessionCore<G>>>,
    delivery: Arc<Mutex<DeliveryCore>>,
    session_queue: SerialQueue,
    delivery_queue: SerialQueue,
    pip: Mutex<PipUi>,
}

impl<G: CaptureGraph + 'static> SessionController<G> {
    pub fn new(
        graph: G,
        collaborators: SessionCollaborators,
        config: DualCamConfig,
    ) -> Result<(Self, EventReceiver)> {
        config.validate().map_err(DualCamError::Configuration)?;

        let (events, receiver) = EventSink::channel();
        let pip = PipState::with_inset(config.pip.initial_inset);

        let recorder = MovieRecorder::new(
            collaborators.writer_factory.clone(),
            PathBuf::from(&config.recording.output_directory),
            config.recording.file_prefix.clone(),
        );
        let delivery = DeliveryCore {
            router: FrameRouter::new(pip, config.pip.retained_buffer_hint),
            recorder,
            last_levels: None,
        };
        let session = SessionCore {
            graph,
            topology: None,
            setup_result: None,
            monitor: CostMonitor::new(config.degradation.clone()),
        };

        let shared = Arc::new(Shared {
            config,
            collaborators,
            events,
            state: Mutex::new(SessionState::NotConfigured),
            recording_active: AtomicBool::new(false),
            recording_busy: AtomicBool::new(false),
            recording_inputs: Mutex::new(RecordingInputs::default()),
            device_orientation: Mutex::new(VideoOrientation::Portrait),
            background_task: Mutex::new(None),
        });

        let controller = Self {
            shared,
            session: Arc::new(Mutex::new(session)),
            delivery: Arc::new(Mutex::new(delivery)),
            session_queue: SerialQueue::new("dualcam-session")?,
            delivery_queue: SerialQueue::new("dualcam-data-output")?,
            pip: Mutex::new(PipUi {
                state: pip,
                layout: None,
            }),
        };
        Ok((controller, receiver))
    }

    pub fn config(&self) -> &DualCamConfig {
        &self.shared.config
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recording_active.load(Ordering::SeqCst)
    }

    pub fn pip_state(&self) -> PipState {
        self.pip.lock().expect("lock poisoned").state
    }

    /// Build the capture graph. A failure is emitted once as
    /// [`SessionEvent::SetupFailed`] and leaves the session unconfigured.
    pub fn configure(&self) -> Result<SetupOutcome> {
        let shared = self.shared.clone();
        let session = self.session.clone();
        self.session_queue.dispatch_sync(move || {
            let mut core = session.lock().expect("lock poisoned");
            if core.setup_result == Some(SessionSetupResult::Success) {
                log::debug!("Session already configured");
                return SetupOutcome {
                    result: SessionSetupResult::Success,
                    reason: None,
                    topology: core.topology,
                    degradation: None,
                };
            }

            shared.set_state(SessionState::Configuring);
            let core = &mut *core;
            let outcome = configure(
                &mut core.graph,
                shared.collaborators.discovery.as_ref(),
                &shared.config.capture,
                &core.monitor,
            );
            core.setup_result = Some(outcome.result);

            if outcome.is_success() {
                core.topology = outcome.topology;
                refresh_recording_inputs(&shared, core);
                shared.set_state(SessionState::Stopped);
            } else {
                shared.set_state(SessionState::NotConfigured);
                shared.events.emit(SessionEvent::SetupFailed {
                    result: outcome.result,
                    reason: outcome.reason.clone().unwrap_or_default(),
                });
                // Allow a later configure attempt.
                core.setup_result = None;
            }
            outcome
        })
    }

    /// Start the configured graph.
    pub fn start(&self) -> Result<()> {
        let shared = self.shared.clone();
        let session = self.session.clone();
        self.session_queue.dispatch_sync(move || {
            let mut core = session.lock().expect("lock poisoned");
            if core.setup_result != Some(SessionSetupResult::Success) {
                return Err(DualCamError::Session(
                    "cannot start an unconfigured session".to_string(),
                ));
            }
            if core.graph.is_running() && shared.state() == SessionState::Running {
                return Ok(());
            }
            core.graph.start_running()?;
            let running = core.graph.is_running();
            shared.set_running(running);
            Ok(())
        })?
    }

    /// Configure, then start when setup succeeded.
    pub fn configure_and_start(&self) -> Result<SetupOutcome> {
        let outcome = self.configure()?;
        if outcome.is_success() {
            self.start()?;
        }
        Ok(outcome)
    }

    /// Stop the graph. Pending frames still drain through the delivery queue.
    pub fn stop(&self) -> Result<()> {
        let shared = self.shared.clone();
        let session = self.session.clone();
        self.session_queue.dispatch_sync(move || {
            let mut core = session.lock().expect("lock poisoned");
            if !core.graph.is_running() && shared.state() != SessionState::Running {
                return;
            }
            core.graph.stop_running();
            shared.set_running(false);
        })
    }

    /// Run a graph mutation in one transaction, then re-check costs.
    pub fn reconfigure<F>(&self, mutate: F) -> Result<DegradationReport>
    where
        F: FnOnce(&mut G) + Send + 'static,
    {
        let shared = self.shared.clone();
        let session = self.session.clone();
        self.session_queue.dispatch_sync(move || {
            let mut core = session.lock().expect("lock poisoned");
            let core = &mut *core;
            {
                let mut tx = transaction(&mut core.graph);
                mutate(&mut *tx);
            }
            let report = core.monitor.check_system_cost(&mut core.graph);
            refresh_recording_inputs(&shared, core);
            report
        })
    }

    /// Run the degradation ladder against the current costs.
    pub fn check_system_cost(&self) -> Result<DegradationReport> {
        let shared = self.shared.clone();
        let session = self.session.clone();
        self.session_queue.dispatch_sync(move || {
            let mut core = session.lock().expect("lock poisoned");
            let core = &mut *core;
            let report = core.monitor.check_system_cost(&mut core.graph);
            if report.graph_changed() {
                refresh_recording_inputs(&shared, core);
            }
            report
        })
    }

    /// System pressure level reported by the back camera.
    pub fn handle_pressure_level(&self, level: PressureLevel) -> Result<PressureResponse> {
        let shared = self.shared.clone();
        let session = self.session.clone();
        self.session_queue.dispatch_sync(move || {
            let core = session.lock().expect("lock poisoned");
            let recording = shared.recording_active.load(Ordering::SeqCst);
            apply_pressure_level(&core.graph, level, recording, &shared.config.pressure)
        })
    }

    pub fn handle_runtime_error(&self, error: RuntimeError) {
        let shared = self.shared.clone();
        let session = self.session.clone();
        self.session_queue.dispatch(move || {
            log::error!("Capture session runtime error: {:?}", error);
            let mut core = session.lock().expect("lock poisoned");
            let was_running = shared.state() == SessionState::Running;

            if error == RuntimeError::MediaServicesWereReset && was_running {
                let restarted = core.graph.start_running().is_ok() && core.graph.is_running();
                if restarted {
                    log::info!("Restarted session after media services reset");
                    return;
                }
                log::warn!("Automatic restart after media services reset failed");
            }

            shared.set_running(false);
            shared.events.emit(SessionEvent::ShowResumeButton(true));
        });
    }

    /// Manually restart after a runtime error or interruption.
    pub fn resume(&self) {
        let shared = self.shared.clone();
        let session = self.session.clone();
        self.session_queue.dispatch(move || {
            let mut core = session.lock().expect("lock poisoned");
            let started = core.graph.start_running().is_ok() && core.graph.is_running();
            if started {
                shared.set_running(true);
                shared.events.emit(SessionEvent::ShowResumeButton(false));
            } else {
                log::warn!("Unable to resume capture session");
                shared.events.emit(SessionEvent::ResumeFailed);
            }
        });
    }

    pub fn handle_interruption(&self, reason: InterruptionReason) {
        let shared = self.shared.clone();
        self.session_queue.dispatch(move || {
            log::info!("Capture session was interrupted with reason {:?}", reason);
            if shared.state() == SessionState::Running {
                shared.set_state(SessionState::Interrupted);
            }
            match reason {
                InterruptionReason::VideoDeviceInUseByAnotherClient => {
                    shared.events.emit(SessionEvent::ShowResumeButton(true));
                }
                InterruptionReason::VideoDeviceNotAvailableWithMultipleForegroundApps => {
                    shared.events.emit(SessionEvent::ShowCameraUnavailable(true));
                }
                _ => {}
            }
        });
    }

    pub fn handle_interruption_ended(&self) {
        let shared = self.shared.clone();
        self.session_queue.dispatch(move || {
            log::info!("Capture session interruption ended");
            shared.events.emit(SessionEvent::ShowResumeButton(false));
            shared.events.emit(SessionEvent::ShowCameraUnavailable(false));
            if shared.state() == SessionState::Interrupted {
                shared.set_state(SessionState::Running);
            }
        });
    }

    /// App moved to the background: stop rendering and release compositor
    /// buffers.
    pub fn enter_background(&self) {
        let delivery = self.delivery.clone();
        self.delivery_queue.dispatch(move || {
            delivery.lock().expect("lock poisoned").router.enter_background();
        });
    }

    pub fn enter_foreground(&self) {
        let delivery = self.delivery.clone();
        self.delivery_queue.dispatch(move || {
            delivery.lock().expect("lock poisoned").router.enter_foreground();
        });
    }

    pub fn set_rendering_enabled(&self, enabled: bool) {
        let delivery = self.delivery.clone();
        self.delivery_queue.dispatch(move || {
            delivery
                .lock()
                .expect("lock poisoned")
                .router
                .set_rendering_enabled(enabled);
        });
    }

    /// Orientation the device is held in; sets the recording transform.
    pub fn set_device_orientation(&self, orientation: VideoOrientation) {
        *self.shared.device_orientation.lock().expect("lock poisoned") = orientation;
    }

    /// Swap which camera is in the inset. Takes effect from the next buffer.
    pub fn toggle_pip(&self) -> PipState {
        let mut pip = self.pip.lock().expect("lock poisoned");
        pip.state = pip.state.toggled();
        self.publish_pip(*pip);
        pip.state
    }

    /// Preview view frames changed.
    pub fn update_preview_layout(&self, layout: PreviewLayout) {
        let mut pip = self.pip.lock().expect("lock poisoned");
        pip.layout = Some(layout);
        self.publish_pip(*pip);
    }

    fn publish_pip(&self, pip: PipUi) {
        let inset_rect = pip
            .layout
            .and_then(|layout| layout.normalized_inset(pip.state));
        let delivery = self.delivery.clone();
        self.delivery_queue.dispatch(move || {
            let mut core = delivery.lock().expect("lock poisoned");
            core.router.set_pip(pip.state);
            if let Some(rect) = inset_rect {
                core.router.set_inset_rect(rect);
            }
        });
        self.shared.events.emit(SessionEvent::PipChanged {
            state: pip.state,
            inset_rect,
        });
    }

    /// Hand a captured buffer to the data-delivery queue.
    pub fn deliver(&self, buffer: SampleBuffer) {
        let shared = self.shared.clone();
        let delivery = self.delivery.clone();
        self.delivery_queue.dispatch(move || {
            let mut core = delivery.lock().expect("lock poisoned");
            process_buffer(&shared, &mut core, buffer);
        });
    }

    /// Start or stop recording. Returns `false` when a previous toggle is
    /// still being handled.
    pub fn toggle_recording(&self) -> bool {
        if self
            .shared
            .recording_busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("Recording toggle already in progress");
            return false;
        }
        self.shared
            .events
            .emit(SessionEvent::RecordAvailabilityChanged(false));

        let shared = self.shared.clone();
        let delivery = self.delivery.clone();
        self.delivery_queue.dispatch(move || {
            {
                let mut core = delivery.lock().expect("lock poisoned");
                if core.recorder.is_recording() {
                    stop_recording(&shared, &mut core);
                } else {
                    start_recording(&shared, &mut core);
                }
            }
            shared.recording_busy.store(false, Ordering::SeqCst);
            let running = shared.state() == SessionState::Running;
            shared
                .events
                .emit(SessionEvent::RecordAvailabilityChanged(running));
        });
        true
    }

    /// Wait until work queued so far on both queues has run.
    pub fn flush(&self) -> Result<()> {
        self.session_queue.dispatch_sync(|| ())?;
        self.delivery_queue.dispatch_sync(|| ())
    }

    /// Inspect the graph on the session queue.
    pub fn with_graph<T, F>(&self, inspect: F) -> Result<T>
    where
        F: FnOnce(&G) -> T + Send + 'static,
        T: Send + 'static,
    {
        let session = self.session.clone();
        self.session_queue
            .dispatch_sync(move || inspect(&session.lock().expect("lock poisoned").graph))
    }

    /// Current inset rectangle as seen by the router.
    pub fn inset_rect(&self) -> Result<NormalizedRect> {
        let delivery = self.delivery.clone();
        self.delivery_queue
            .dispatch_sync(move || delivery.lock().expect("lock poisoned").router.inset_rect())
    }
}

fn refresh_recording_inputs<G: CaptureGraph>(shared: &Shared, core: &SessionCore<G>) {
    let Some(topology) = core.topology else {
        return;
    };
    let graph = &core.graph;
    let back_video_output = topology.camera(DevicePosition::Back).video_output;
    let capture_orientation = graph
        .connections()
        .into_iter()
        .find(|c| c.target() == ConnectionTarget::Output(back_video_output))
        .and_then(|c| c.spec.orientation);

    *shared.recording_inputs.lock().expect("lock poisoned") = RecordingInputs {
        back_audio: graph.recommended_audio_settings(topology.audio_output(DevicePosition::Back)),
        front_audio: graph.recommended_audio_settings(topology.audio_output(DevicePosition::Front)),
        back_video: graph.recommended_video_settings(back_video_output),
        front_video: graph
            .recommended_video_settings(topology.camera(DevicePosition::Front).video_output),
        capture_orientation,
    };
}

fn process_buffer(shared: &Shared, core: &mut DeliveryCore, buffer: SampleBuffer) {
    match core.router.route(buffer) {
        Routed::Composite(frame) => {
            if core.recorder.is_recording() {
                core.recorder.record_video(&frame);
            }
        }
        Routed::Audio(audio) => {
            publish_levels(shared, core, &audio);
            if core.recorder.is_recording() {
                core.recorder.record_audio(&audio);
            }
        }
        Routed::InsetCached | Routed::Dropped(_) => {}
    }
}

fn publish_levels(shared: &Shared, core: &mut DeliveryCore, audio: &SampleBuffer) {
    let metering = &shared.config.metering;
    if !metering.enabled {
        return;
    }
    let now = Instant::now();
    if let Some(last) = core.last_levels {
        if now.duration_since(last) < Duration::from_millis(metering.interval_ms) {
            return;
        }
    }
    if let Some(levels) = audio_levels(audio) {
        core.last_levels = Some(now);
        shared.events.emit(SessionEvent::AudioLevels {
            position: audio.source().position(),
            levels,
        });
    }
}

fn start_recording(shared: &Shared, core: &mut DeliveryCore) {
    let guard = BackgroundTaskGuard::begin(shared.collaborators.background_tasks.clone());

    let inputs = shared
        .recording_inputs
        .lock()
        .expect("lock poisoned")
        .clone();
    let device_orientation = *shared.device_orientation.lock().expect("lock poisoned");
    let transform = VideoTransform::between(
        inputs
            .capture_orientation
            .unwrap_or(VideoOrientation::Portrait),
        device_orientation,
    );

    let track_format = core.router.video_track_format();
    let started = RecorderSettings::from_recommendations(
        inputs.back_audio,
        inputs.front_audio,
        inputs.back_video,
        inputs.front_video,
        transform,
    )
    .and_then(|mut settings| {
        // Composites keep the first format seen, even after the cost
        // monitor lowers the recommended size.
        if let Some(format) = track_format {
            settings.video.width = format.width;
            settings.video.height = format.height;
        }
        core.recorder.start(settings)
    });

    match started {
        Ok(true) => {
            shared.recording_active.store(true, Ordering::SeqCst);
            *shared.background_task.lock().expect("lock poisoned") = Some(guard);
            if let Some(path) = core.recorder.current_path() {
                shared.events.emit(SessionEvent::RecordingStarted {
                    path: path.to_path_buf(),
                });
            }
        }
        Ok(false) => {}
        Err(e) => {
            log::error!("Could not start recording: {}", e);
            shared
                .events
                .emit(SessionEvent::RecordingFailed(e.to_string()));
        }
    }
}

fn stop_recording(shared: &Arc<Shared>, core: &mut DeliveryCore) {
    let guard = shared.background_task.lock().expect("lock poisoned").take();
    let shared_for_completion = shared.clone();
    core.recorder.stop(move |outcome| {
        shared_for_completion
            .recording_active
            .store(false, Ordering::SeqCst);
        finish_recording(shared_for_completion, outcome, guard);
    });
}

fn finish_recording(
    shared: Arc<Shared>,
    outcome: Result<RecordingOutcome>,
    guard: Option<BackgroundTaskGuard>,
) {
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            shared
                .events
                .emit(SessionEvent::RecordingFailed(e.to_string()));
            return;
        }
    };
    shared.events.emit(SessionEvent::RecordingFinished {
        path: outcome.path.clone(),
    });

    let library = match (&shared.collaborators.media_library, shared.config.recording.save_to_library) {
        (Some(library), true) => library.clone(),
        _ => return,
    };
    let guard = guard.unwrap_or_else(|| {
        BackgroundTaskGuard::begin(shared.collaborators.background_tasks.clone())
    });

    let events = shared.events.clone();
    let path = outcome.path;
    let spawned = std::thread::Builder::new()
        .name("dualcam-media-library".to_string())
        .spawn(move || match save_recording(library.as_ref(), &path, guard) {
            Ok(()) => events.emit(SessionEvent::RecordingSaved),
            Err(e) => events.emit(SessionEvent::SaveFailed {
                path,
                reason: e.to_string(),
            }),
        });
    if let Err(e) = spawned {
        log::error!("Could not spawn media library save: {}", e);
        shared.events.emit(SessionEvent::RecordingFailed(format!(
            "could not save recording: {}",
            e
        )));
    }
}
