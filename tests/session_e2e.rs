//! End-to-end session tests: configure, degrade, composite, record, save
//!
//! Run with: cargo test --test session_e2e

use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;
use tokio::time::timeout;

use dualcam::buffer::DevicePosition;
use dualcam::config::DualCamConfig;
use dualcam::cost::DegradationStep;
use dualcam::graph::{CaptureDevice, CaptureGraph, CostState, PressureLevel, VideoOrientation};
use dualcam::recording::MovieWriterFactory;
use dualcam::routing::{PipState, PreviewLayout, ViewRect};
use dualcam::session::{
    EventReceiver, SessionCollaborators, SessionController, SessionEvent, SessionState,
};
use dualcam::testing::{
    read_manifest, synthetic_audio_buffer, synthetic_video_buffer, FakeBackgroundTaskHost,
    FakeCaptureGraph, FakeDeviceDiscovery, FakeMediaLibrary, ManifestWriterFactory,
};

async fn next_matching<F>(events: &mut EventReceiver, mut predicate: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    loop {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed");
        if predicate(&event) {
            return event;
        }
    }
}

struct Rig {
    controller: SessionController<FakeCaptureGraph>,
    events: EventReceiver,
    discovery: Arc<FakeDeviceDiscovery>,
    library: Arc<FakeMediaLibrary>,
    tasks: Arc<FakeBackgroundTaskHost>,
}

fn rig(
    graph: FakeCaptureGraph,
    writer_factory: Arc<dyn MovieWriterFactory>,
    output_directory: &std::path::Path,
    save_to_library: bool,
) -> Rig {
    let discovery = Arc::new(FakeDeviceDiscovery::new());
    let library = Arc::new(FakeMediaLibrary::new());
    let tasks = Arc::new(FakeBackgroundTaskHost::new());

    let mut config = DualCamConfig::default();
    config.recording.output_directory = output_directory.to_string_lossy().to_string();
    config.recording.save_to_library = save_to_library;

    let collaborators = SessionCollaborators {
        discovery: discovery.clone(),
        writer_factory,
        media_library: Some(library.clone()),
        background_tasks: tasks.clone(),
    };
    let (controller, events) = SessionController::new(graph, collaborators, config).unwrap();
    Rig {
        controller,
        events,
        discovery,
        library,
        tasks,
    }
}

#[tokio::test]
async fn test_setup_degrades_front_camera_once() {
    let dir = tempdir().unwrap();
    let graph = FakeCaptureGraph::new()
        .with_costs([CostState::new(1.3, 0.5), CostState::new(0.5, 0.5)]);
    let mut rig = rig(graph, Arc::new(ManifestWriterFactory::new()), dir.path(), true);

    let outcome = rig.controller.configure_and_start().unwrap();
    let report = outcome.degradation.unwrap();
    assert_eq!(
        report.steps_applied,
        vec![DegradationStep::ReduceResolution(DevicePosition::Front)]
    );
    assert_eq!(report.checks, 2);
    assert_eq!(
        rig.discovery
            .camera(DevicePosition::Front)
            .unwrap()
            .active_format()
            .map(|f| (f.width, f.height)),
        Some((1280, 720))
    );

    assert_eq!(
        next_matching(&mut rig.events, |_| true).await,
        SessionEvent::RunningChanged(true)
    );
    assert_eq!(rig.controller.state(), SessionState::Running);
}

#[tokio::test]
async fn test_pip_recording_round_trip() {
    let dir = tempdir().unwrap();
    let mut rig = rig(
        FakeCaptureGraph::new(),
        Arc::new(ManifestWriterFactory::new()),
        dir.path(),
        false,
    );
    rig.controller.configure_and_start().unwrap();
    rig.controller.update_preview_layout(PreviewLayout {
        back: ViewRect::new(0.0, 0.0, 360.0, 640.0),
        front: ViewRect::new(240.0, 480.0, 90.0, 120.0),
    });

    assert!(rig.controller.toggle_recording());
    next_matching(&mut rig.events, |e| {
        matches!(e, SessionEvent::RecordingStarted { .. })
    })
    .await;

    // Front is the inset: its audio is ignored, back audio is recorded.
    rig.controller
        .deliver(synthetic_video_buffer(DevicePosition::Front, 0, 36, 64, 30).unwrap());
    for n in 0..10u64 {
        rig.controller
            .deliver(synthetic_video_buffer(DevicePosition::Back, n, 36, 64, 30).unwrap());
        rig.controller
            .deliver(synthetic_audio_buffer(DevicePosition::Back, n, 1600, 48_000, 1).unwrap());
        rig.controller
            .deliver(synthetic_audio_buffer(DevicePosition::Front, n, 1600, 48_000, 1).unwrap());
    }

    // Swap mid-recording; front becomes full screen.
    assert_eq!(rig.controller.toggle_pip(), PipState::BackIsInset);
    rig.controller
        .deliver(synthetic_video_buffer(DevicePosition::Front, 10, 36, 64, 30).unwrap());
    rig.controller.flush().unwrap();

    assert!(rig.controller.toggle_recording());
    let finished = next_matching(&mut rig.events, |e| {
        matches!(
            e,
            SessionEvent::RecordingFinished { .. } | SessionEvent::RecordingFailed(_)
        )
    })
    .await;
    let SessionEvent::RecordingFinished { path } = finished else {
        panic!("recording failed: {:?}", finished);
    };

    let manifest = read_manifest(&path).unwrap();
    assert!(manifest.finished);
    assert_eq!(manifest.video.len(), 11);
    assert_eq!(manifest.audio.len(), 10);
    assert!(rig.library.saved().is_empty());
    assert_eq!(rig.tasks.active_count(), 0);
    assert_eq!(manifest.settings.transform.rotation_degrees, 0);
}

#[tokio::test]
async fn test_landscape_device_rotates_recording() {
    let dir = tempdir().unwrap();
    let mut rig = rig(
        FakeCaptureGraph::new(),
        Arc::new(ManifestWriterFactory::new()),
        dir.path(),
        false,
    );
    rig.controller.configure_and_start().unwrap();
    rig.controller
        .set_device_orientation(VideoOrientation::LandscapeRight);

    assert!(rig.controller.toggle_recording());
    let SessionEvent::RecordingStarted { path } = next_matching(&mut rig.events, |e| {
        matches!(e, SessionEvent::RecordingStarted { .. })
    })
    .await
    else {
        unreachable!()
    };
    let manifest = read_manifest(&path).unwrap();
    assert_eq!(manifest.settings.transform.rotation_degrees, 90);
}

#[tokio::test]
async fn test_pressure_throttles_back_camera_until_recording() {
    let dir = tempdir().unwrap();
    let rig = rig(
        FakeCaptureGraph::new(),
        Arc::new(ManifestWriterFactory::new()),
        dir.path(),
        false,
    );
    rig.controller.configure_and_start().unwrap();

    rig.controller
        .handle_pressure_level(PressureLevel::Serious)
        .unwrap();
    let back = rig.discovery.camera(DevicePosition::Back).unwrap();
    assert!(back.frame_duration_range().is_some());
    assert!((back.frame_rate() - 20.0).abs() < 1e-6);

    assert!(rig.controller.toggle_recording());
    rig.controller.flush().unwrap();
    assert!(rig.controller.is_recording());
    let mutations = back.mutations().len();
    rig.controller
        .handle_pressure_level(PressureLevel::Critical)
        .unwrap();
    assert_eq!(back.mutations().len(), mutations);
}

#[tokio::test]
async fn test_graph_left_consistent_after_session() {
    let dir = tempdir().unwrap();
    let rig = rig(
        FakeCaptureGraph::new(),
        Arc::new(ManifestWriterFactory::new()),
        dir.path(),
        false,
    );
    rig.controller.configure_and_start().unwrap();
    rig.controller.check_system_cost().unwrap();
    rig.controller.stop().unwrap();

    let (violations, running, connections) = rig
        .controller
        .with_graph(|g| (g.violations().to_vec(), g.is_running(), g.connection_count()))
        .unwrap();
    assert!(violations.is_empty(), "{:?}", violations);
    assert!(!running);
    assert_eq!(connections, 6);
}
