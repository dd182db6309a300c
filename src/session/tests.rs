//! Tests for graph construction and the session lifecycle

#[cfg(test)]
mod builder_tests {
    use crate::buffer::DevicePosition;
    use crate::config::CaptureConfig;
    use crate::cost::{AdaptationOutcome, CostMonitor, DegradationStep};
    use crate::graph::{
        AuthorizationStatus, CaptureDevice, CaptureGraph, ConnectionTarget, CostState,
        PreviewSinkId,
    };
    use crate::session::{configure, SessionSetupResult};
    use crate::testing::{FakeCaptureGraph, FakeDeviceDiscovery};

    fn build(graph: &mut FakeCaptureGraph, discovery: &FakeDeviceDiscovery) -> crate::session::SetupOutcome {
        configure(
            graph,
            discovery,
            &CaptureConfig::default(),
            &CostMonitor::default(),
        )
    }

    #[test]
    fn test_configure_builds_full_topology() {
        let mut graph = FakeCaptureGraph::new();
        let discovery = FakeDeviceDiscovery::new();
        let outcome = build(&mut graph, &discovery);

        assert_eq!(outcome.result, SessionSetupResult::Success);
        assert!(outcome.topology.is_some());
        assert_eq!(graph.input_count(), 3);
        assert_eq!(graph.output_count(), 4);
        // Data and preview per camera, two microphone ports.
        assert_eq!(graph.connection_count(), 6);
        assert!(graph.violations().is_empty(), "{:?}", graph.violations());
        assert!(!graph.in_configuration());

        let previews: Vec<_> = graph
            .connections()
            .into_iter()
            .filter(|c| matches!(c.target(), ConnectionTarget::Preview(_)))
            .collect();
        assert_eq!(previews.len(), 2);
        let front_preview = previews
            .iter()
            .find(|c| c.target() == ConnectionTarget::Preview(PreviewSinkId(DevicePosition::Front)))
            .unwrap();
        assert!(front_preview.spec.mirrored);
    }

    #[test]
    fn test_denied_authorization_builds_nothing() {
        let mut graph = FakeCaptureGraph::new();
        let discovery = FakeDeviceDiscovery::new().with_authorization(AuthorizationStatus::Denied);
        let outcome = build(&mut graph, &discovery);

        assert_eq!(outcome.result, SessionSetupResult::NotAuthorized);
        assert!(graph.is_empty());
        assert!(!graph.in_configuration());
    }

    #[test]
    fn test_multi_cam_unsupported() {
        let mut graph = FakeCaptureGraph::new();
        let discovery = FakeDeviceDiscovery::new().with_multi_cam(false);
        let outcome = build(&mut graph, &discovery);

        assert_eq!(outcome.result, SessionSetupResult::MultiCamNotSupported);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_failures_roll_back_everything() {
        let failing_graphs: Vec<(&str, FakeCaptureGraph)> = vec![
            ("back input", FakeCaptureGraph::new().reject_camera_input(DevicePosition::Back)),
            ("front input", FakeCaptureGraph::new().reject_camera_input(DevicePosition::Front)),
            ("microphone input", FakeCaptureGraph::new().reject_microphone_input()),
            ("front audio output", FakeCaptureGraph::new().reject_output(3)),
            (
                "front preview",
                FakeCaptureGraph::new().reject_connections(|spec| {
                    spec.target == ConnectionTarget::Preview(PreviewSinkId(DevicePosition::Front))
                }),
            ),
        ];

        for (name, mut graph) in failing_graphs {
            let outcome = build(&mut graph, &FakeDeviceDiscovery::new());
            assert_eq!(outcome.result, SessionSetupResult::ConfigurationFailed, "{}", name);
            assert!(outcome.reason.is_some(), "{}", name);
            assert!(graph.is_empty(), "{} left {:?}", name, graph);
            assert!(graph.violations().is_empty(), "{}", name);
            assert!(!graph.in_configuration(), "{}", name);
        }
    }

    #[test]
    fn test_missing_camera_fails_configuration() {
        let mut graph = FakeCaptureGraph::new();
        let discovery = FakeDeviceDiscovery::new().without_camera(DevicePosition::Front);
        let outcome = build(&mut graph, &discovery);
        assert_eq!(outcome.result, SessionSetupResult::ConfigurationFailed);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_pressure_cost_reduces_front_resolution_once() {
        let mut graph = FakeCaptureGraph::new()
            .with_costs([CostState::new(1.3, 0.5), CostState::new(0.5, 0.5)]);
        let discovery = FakeDeviceDiscovery::new();
        let outcome = build(&mut graph, &discovery);

        let report = outcome.degradation.unwrap();
        assert_eq!(report.steps_applied, vec![DegradationStep::ReduceResolution(DevicePosition::Front)]);
        assert_eq!(report.checks, 2);
        assert_eq!(report.outcome, AdaptationOutcome::WithinBudget);
        assert_eq!(graph.cost_reads(), 2);

        let front = discovery.camera(DevicePosition::Front).unwrap();
        let back = discovery.camera(DevicePosition::Back).unwrap();
        assert_eq!(front.active_format().map(|f| (f.width, f.height)), Some((1280, 720)));
        assert_eq!(back.active_format().map(|f| (f.width, f.height)), Some((1920, 1080)));
    }

    #[test]
    fn test_failed_setup_skips_cost_check() {
        let mut graph = FakeCaptureGraph::new()
            .reject_microphone_input()
            .with_costs([CostState::new(2.0, 2.0)]);
        let outcome = build(&mut graph, &FakeDeviceDiscovery::new());
        assert!(outcome.degradation.is_none());
        assert_eq!(graph.cost_reads(), 0);
    }
}

#[cfg(test)]
mod controller_tests {
    use std::sync::Arc;

    use crate::buffer::DevicePosition;
    use crate::config::DualCamConfig;
    use crate::graph::{AuthorizationStatus, CaptureGraph, CostState};
    use crate::routing::{PipState, PreviewLayout, ViewRect};
    use crate::session::{
        EventReceiver, InterruptionReason, RuntimeError, SessionCollaborators, SessionController,
        SessionEvent, SessionSetupResult, SessionState,
    };
    use crate::testing::{
        FakeBackgroundTaskHost, FakeCaptureGraph, FakeDeviceDiscovery, FakeMediaLibrary,
        ManifestWriterFactory,
    };

    fn collaborators(discovery: FakeDeviceDiscovery) -> SessionCollaborators {
        SessionCollaborators {
            discovery: Arc::new(discovery),
            writer_factory: Arc::new(ManifestWriterFactory::new()),
            media_library: Some(Arc::new(FakeMediaLibrary::new())),
            background_tasks: Arc::new(FakeBackgroundTaskHost::new()),
        }
    }

    fn controller(
        graph: FakeCaptureGraph,
        discovery: FakeDeviceDiscovery,
    ) -> (SessionController<FakeCaptureGraph>, EventReceiver) {
        SessionController::new(graph, collaborators(discovery), DualCamConfig::default()).unwrap()
    }

    fn drain(events: &mut EventReceiver) -> Vec<SessionEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }

    #[test]
    fn test_configure_and_start_emits_running() {
        let (controller, mut events) = controller(FakeCaptureGraph::new(), FakeDeviceDiscovery::new());
        assert_eq!(controller.state(), SessionState::NotConfigured);

        let outcome = controller.configure_and_start().unwrap();
        assert!(outcome.is_success());
        assert_eq!(controller.state(), SessionState::Running);
        assert!(controller.with_graph(|g| g.is_running()).unwrap());

        assert_eq!(
            drain(&mut events),
            vec![
                SessionEvent::RunningChanged(true),
                SessionEvent::RecordAvailabilityChanged(true)
            ]
        );
    }

    #[test]
    fn test_setup_failure_emitted_once() {
        let discovery = FakeDeviceDiscovery::new().with_authorization(AuthorizationStatus::Restricted);
        let (controller, mut events) = controller(FakeCaptureGraph::new(), discovery);

        let outcome = controller.configure_and_start().unwrap();
        assert_eq!(outcome.result, SessionSetupResult::NotAuthorized);
        assert_eq!(controller.state(), SessionState::NotConfigured);
        assert!(controller.start().is_err());

        let seen = drain(&mut events);
        assert_eq!(seen.len(), 1);
        assert!(matches!(
            seen[0],
            SessionEvent::SetupFailed {
                result: SessionSetupResult::NotAuthorized,
                ..
            }
        ));
    }

    #[test]
    fn test_stop_emits_not_running() {
        let (controller, mut events) = controller(FakeCaptureGraph::new(), FakeDeviceDiscovery::new());
        controller.configure_and_start().unwrap();
        drain(&mut events);

        controller.stop().unwrap();
        assert_eq!(controller.state(), SessionState::Stopped);
        assert_eq!(
            drain(&mut events),
            vec![
                SessionEvent::RunningChanged(false),
                SessionEvent::RecordAvailabilityChanged(false)
            ]
        );
    }

    #[test]
    fn test_toggle_pip_twice_restores_state() {
        let (controller, mut events) = controller(FakeCaptureGraph::new(), FakeDeviceDiscovery::new());
        controller.update_preview_layout(PreviewLayout {
            back: ViewRect::new(0.0, 0.0, 400.0, 800.0),
            front: ViewRect::new(20.0, 40.0, 100.0, 200.0),
        });
        let initial = controller.inset_rect().unwrap();

        assert_eq!(controller.toggle_pip(), PipState::BackIsInset);
        assert_eq!(controller.toggle_pip(), PipState::FrontIsInset);
        assert_eq!(controller.inset_rect().unwrap(), initial);
        assert_eq!(initial.width, 0.25);

        let pip_events: Vec<_> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::PipChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            pip_events,
            vec![PipState::FrontIsInset, PipState::BackIsInset, PipState::FrontIsInset]
        );
    }

    #[test]
    fn test_interruption_affordances() {
        let (controller, mut events) = controller(FakeCaptureGraph::new(), FakeDeviceDiscovery::new());
        controller.configure_and_start().unwrap();
        drain(&mut events);

        controller.handle_interruption(InterruptionReason::VideoDeviceInUseByAnotherClient);
        controller.flush().unwrap();
        assert_eq!(controller.state(), SessionState::Interrupted);
        assert_eq!(drain(&mut events), vec![SessionEvent::ShowResumeButton(true)]);

        controller.handle_interruption(
            InterruptionReason::VideoDeviceNotAvailableWithMultipleForegroundApps,
        );
        controller.flush().unwrap();
        assert_eq!(drain(&mut events), vec![SessionEvent::ShowCameraUnavailable(true)]);

        controller.handle_interruption(InterruptionReason::AudioDeviceInUseByAnotherClient);
        controller.flush().unwrap();
        assert!(drain(&mut events).is_empty());

        controller.handle_interruption_ended();
        controller.flush().unwrap();
        assert_eq!(controller.state(), SessionState::Running);
        assert_eq!(
            drain(&mut events),
            vec![
                SessionEvent::ShowResumeButton(false),
                SessionEvent::ShowCameraUnavailable(false)
            ]
        );
    }

    #[test]
    fn test_media_services_reset_restarts_running_session() {
        let (controller, mut events) = controller(FakeCaptureGraph::new(), FakeDeviceDiscovery::new());
        controller.configure_and_start().unwrap();
        drain(&mut events);

        controller.handle_runtime_error(RuntimeError::MediaServicesWereReset);
        controller.flush().unwrap();
        assert_eq!(controller.state(), SessionState::Running);
        assert!(drain(&mut events).is_empty());
    }

    #[test]
    fn test_failed_restart_offers_resume() {
        let (controller, mut events) = controller(FakeCaptureGraph::new(), FakeDeviceDiscovery::new());
        controller.configure_and_start().unwrap();
        controller.reconfigure(|g| g.set_start_fails(true)).unwrap();
        drain(&mut events);

        controller.handle_runtime_error(RuntimeError::MediaServicesWereReset);
        controller.flush().unwrap();
        assert_eq!(controller.state(), SessionState::Stopped);
        let seen = drain(&mut events);
        assert!(seen.contains(&SessionEvent::ShowResumeButton(true)));

        controller.resume();
        controller.flush().unwrap();
        assert_eq!(drain(&mut events), vec![SessionEvent::ResumeFailed]);

        controller.reconfigure(|g| g.set_start_fails(false)).unwrap();
        controller.resume();
        controller.flush().unwrap();
        assert_eq!(controller.state(), SessionState::Running);
        assert!(drain(&mut events).contains(&SessionEvent::ShowResumeButton(false)));
    }

    #[test]
    fn test_other_runtime_error_stops_session() {
        let (controller, mut events) = controller(FakeCaptureGraph::new(), FakeDeviceDiscovery::new());
        controller.configure_and_start().unwrap();
        drain(&mut events);

        controller.handle_runtime_error(RuntimeError::Other("device lost".to_string()));
        controller.flush().unwrap();
        assert_eq!(controller.state(), SessionState::Stopped);
        assert_eq!(
            drain(&mut events),
            vec![
                SessionEvent::RunningChanged(false),
                SessionEvent::RecordAvailabilityChanged(false),
                SessionEvent::ShowResumeButton(true)
            ]
        );
    }

    #[test]
    fn test_reconfigure_rechecks_cost() {
        let (controller, _events) = controller(FakeCaptureGraph::new(), FakeDeviceDiscovery::new());
        controller.configure().unwrap();

        let report = controller
            .reconfigure(|g| g.set_costs([CostState::new(0.4, 1.6), CostState::new(0.4, 0.8)]))
            .unwrap();
        assert_eq!(report.steps_applied.len(), 1);
        assert_eq!(report.checks, 2);
        assert!(controller.with_graph(|g| g.violations().is_empty()).unwrap());
    }

    #[test]
    fn test_metering_reports_full_screen_microphone() {
        let mut config = DualCamConfig::default();
        config.metering.enabled = true;
        config.metering.interval_ms = 0;
        let (controller, mut events) = SessionController::new(
            FakeCaptureGraph::new(),
            collaborators(FakeDeviceDiscovery::new()),
            config,
        )
        .unwrap();

        let audio = |position| {
            crate::testing::synthetic_audio_buffer(position, 0, 480, 48_000, 1).unwrap()
        };
        controller.deliver(audio(DevicePosition::Front));
        controller.deliver(audio(DevicePosition::Back));
        controller.flush().unwrap();

        let levels: Vec<_> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::AudioLevels { position, levels } => Some((position, levels.len())),
                _ => None,
            })
            .collect();
        assert_eq!(levels, vec![(DevicePosition::Back, 1)]);
    }
}
