//! Property-Based Tests for frame routing and compositing
//!
//! Run with: cargo test --test routing_props

use proptest::prelude::*;

use dualcam::buffer::{DevicePosition, MediaKind, SourceId, VideoFormat};
use dualcam::routing::{classify, DropReason, FrameRouter, NormalizedRect, PipState, Role, Routed};
use dualcam::testing::{synthetic_audio_buffer, synthetic_video_buffer};

#[derive(Debug, Clone, Copy)]
enum Input {
    Video(DevicePosition),
    Audio(DevicePosition),
    Toggle,
}

fn position() -> impl Strategy<Value = DevicePosition> {
    prop_oneof![Just(DevicePosition::Back), Just(DevicePosition::Front)]
}

fn input() -> impl Strategy<Value = Input> {
    prop_oneof![
        4 => position().prop_map(Input::Video),
        2 => position().prop_map(Input::Audio),
        1 => Just(Input::Toggle),
    ]
}

proptest! {
    /// Toggling twice always restores the classification table.
    #[test]
    fn double_toggle_restores_roles(inset in position(), source in position()) {
        let pip = PipState::with_inset(inset);
        let twice = pip.toggled().toggled();
        prop_assert_eq!(pip, twice);
        for id in [SourceId::Camera(source), SourceId::Microphone(source)] {
            prop_assert_eq!(classify(pip, id), classify(twice, id));
            prop_assert_ne!(classify(pip, id), classify(pip.toggled(), id));
        }
    }

    /// Composites appear only for full-screen frames after some inset frame
    /// has been cached, carry the full-screen PTS, and always have the
    /// first-seen video format. Only full-screen-side audio is forwarded.
    #[test]
    fn routing_respects_roles(
        inputs in prop::collection::vec(input(), 1..60),
        first_width in prop_oneof![Just(32u32), Just(48u32)],
    ) {
        let mut router = FrameRouter::new(PipState::FrontIsInset, 3);
        router.set_inset_rect(NormalizedRect::new(0.7, 0.7, 0.25, 0.25));
        let mut pip = router.pip();
        let mut seen_inset = false;
        let mut first_format: Option<VideoFormat> = None;

        for (n, input) in inputs.into_iter().enumerate() {
            match input {
                Input::Toggle => {
                    pip = pip.toggled();
                    router.set_pip(pip);
                }
                Input::Video(position) => {
                    // Alternate sizes so resampling is exercised.
                    let width = if n % 2 == 0 { first_width } else { 40 };
                    let frame = synthetic_video_buffer(position, n as u64, width, 24, 30).unwrap();
                    let format = *frame.format().video().unwrap();
                    first_format.get_or_insert(format);
                    let pts = frame.pts();

                    match router.route(frame) {
                        Routed::InsetCached => {
                            prop_assert_eq!(classify(pip, SourceId::Camera(position)), Role::Inset);
                            seen_inset = true;
                        }
                        Routed::Composite(composite) => {
                            prop_assert_eq!(classify(pip, SourceId::Camera(position)), Role::FullScreen);
                            prop_assert!(seen_inset);
                            prop_assert_eq!(composite.pts(), pts);
                            prop_assert_eq!(composite.kind(), MediaKind::Video);
                            prop_assert_eq!(composite.format().video().copied(), first_format);
                        }
                        Routed::Dropped(DropReason::NoInsetFrame) => prop_assert!(!seen_inset),
                        other => prop_assert!(false, "unexpected {:?}", other),
                    }
                }
                Input::Audio(position) => {
                    let audio = synthetic_audio_buffer(position, n as u64, 480, 48_000, 1).unwrap();
                    match router.route(audio) {
                        Routed::Audio(forwarded) => {
                            prop_assert_eq!(forwarded.source(), SourceId::Microphone(pip.full_screen_position()));
                        }
                        Routed::Dropped(DropReason::InsetMicrophone) => {
                            prop_assert_eq!(position, pip.inset_position());
                        }
                        other => prop_assert!(false, "unexpected {:?}", other),
                    }
                }
            }
        }
    }

    /// Any inset rectangle converts to pixels inside the frame.
    #[test]
    fn inset_pixels_stay_in_frame(
        x in -1.0f64..2.0,
        y in -1.0f64..2.0,
        w in 0.0f64..1.5,
        h in 0.0f64..1.5,
        fw in 1u32..2000,
        fh in 1u32..2000,
    ) {
        if let Some(px) = NormalizedRect::new(x, y, w, h).to_pixels(fw, fh) {
            prop_assert!(px.width > 0 && px.height > 0);
            prop_assert!(px.x + px.width <= fw);
            prop_assert!(px.y + px.height <= fh);
        }
    }
}

#[test]
fn test_composite_tagged_with_full_screen_camera() {
    let mut router = FrameRouter::new(PipState::BackIsInset, 2);
    router.route(synthetic_video_buffer(DevicePosition::Back, 0, 16, 16, 30).unwrap());
    match router.route(synthetic_video_buffer(DevicePosition::Front, 1, 16, 16, 30).unwrap()) {
        Routed::Composite(frame) => {
            assert_eq!(frame.source(), SourceId::Camera(DevicePosition::Front));
        }
        other => panic!("expected composite, got {:?}", other),
    }
}

#[test]
fn test_rendering_disabled_drops_everything_video() {
    let mut router = FrameRouter::new(PipState::FrontIsInset, 2);
    router.set_rendering_enabled(false);
    for position in [DevicePosition::Front, DevicePosition::Back] {
        assert!(matches!(
            router.route(synthetic_video_buffer(position, 0, 16, 16, 30).unwrap()),
            Routed::Dropped(DropReason::RenderingDisabled)
        ));
    }
    // Audio still flows.
    assert!(matches!(
        router.route(synthetic_audio_buffer(DevicePosition::Back, 0, 480, 48_000, 1).unwrap()),
        Routed::Audio(_)
    ));
}

#[test]
fn test_pool_never_exceeds_hint() {
    let mut router = FrameRouter::new(PipState::FrontIsInset, 2);
    router.route(synthetic_video_buffer(DevicePosition::Front, 0, 16, 16, 30).unwrap());

    let mut held = Vec::new();
    let mut dropped = 0;
    for n in 1..6 {
        match router.route(synthetic_video_buffer(DevicePosition::Back, n, 16, 16, 30).unwrap()) {
            Routed::Composite(frame) => held.push(frame),
            Routed::Dropped(DropReason::CompositeFailed) => dropped += 1,
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(held.len(), 2);
    assert_eq!(dropped, 3);
    assert_eq!(router.compositor().retained_buffer_count(), 2);

    held.clear();
    assert!(matches!(
        router.route(synthetic_video_buffer(DevicePosition::Back, 9, 16, 16, 30).unwrap()),
        Routed::Composite(_)
    ));
}
